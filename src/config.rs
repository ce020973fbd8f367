use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::BackendKind;
use crate::index::table::DEFAULT_INITIAL_CAPACITY;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_pretty_json")]
    pub pretty_json: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            initial_capacity: default_initial_capacity(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            pretty_json: default_pretty_json(),
        }
    }
}

fn default_initial_capacity() -> usize { DEFAULT_INITIAL_CAPACITY }
fn default_pretty_json() -> bool { true }

/// `framecut.toml` in the working directory, then the user config locations.
pub fn find_config() -> Option<PathBuf> {
    let local = PathBuf::from("framecut.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("framecut").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("framecut").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            log::warn!("Invalid config {}: {}", path.display(), e);
            None
        }
    }
}
