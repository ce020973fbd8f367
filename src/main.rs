mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

use cli::{Cli, Command};
use framecut::audio::{self, BackendKind};
use framecut::config;
use framecut::index::table::DEFAULT_INITIAL_CAPACITY;
use framecut::{extract, seekable_offset, seekable_offset_at_seconds, FrameIndex, FrameScanner, LogObserver};

const PROGRESS_STEPS: u64 = 1000;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    let config_path = cli.config.clone().or_else(config::find_config);
    let mut pretty_json = true;
    if let Some(ref path) = config_path {
        if let Some(cfg) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            // Config values apply only when the CLI flag is at its default
            if cli.backend == BackendKind::Frames { cli.backend = cfg.scan.backend; }
            if cli.initial_capacity == DEFAULT_INITIAL_CAPACITY { cli.initial_capacity = cfg.scan.initial_capacity; }
            pretty_json = cfg.output.pretty_json;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    audio::init();

    let scanner = FrameScanner::new(cli.backend).with_initial_capacity(cli.initial_capacity);
    log::debug!("Scanning with the {} backend", scanner.backend().name());

    match cli.command {
        Command::Scan { inputs, json, max_fraction } => {
            run_scan(&scanner, &inputs, json.as_deref(), max_fraction, pretty_json)
        }
        Command::Seek { input, frame, seconds } => {
            let index = scan_one(&scanner, &input, &MultiProgress::new(), None)?;
            let offset = match (frame, seconds) {
                (_, Some(secs)) => seekable_offset_at_seconds(&index, secs),
                (Some(frame), None) => seekable_offset(&index, frame),
                (None, None) => anyhow::bail!("Either a frame number or --seconds is required"),
            };
            println!("{}", offset);
            Ok(())
        }
        Command::Extract { input, start, count, output } => {
            let index = scan_one(&scanner, &input, &MultiProgress::new(), None)?;
            if index.is_empty() {
                anyhow::bail!("No frames found in {}, nothing to extract", input.display());
            }
            let written = extract(&input, &index, start, count, &output)
                .with_context(|| format!("Failed to extract frames from {}", input.display()))?;
            log::info!(
                "{:.2}s of audio, {} bytes",
                index.frames_to_seconds(count),
                written
            );
            println!("{}", output.display());
            Ok(())
        }
    }
}

fn run_scan(
    scanner: &FrameScanner,
    inputs: &[PathBuf],
    json: Option<&Path>,
    max_fraction: Option<f64>,
    pretty_json: bool,
) -> Result<()> {
    let bars = MultiProgress::new();

    // Independent files, each scan owns its own backend
    let results: Vec<(PathBuf, Result<FrameIndex>)> = inputs
        .par_iter()
        .map(|input| (input.clone(), scan_one(scanner, input, &bars, max_fraction)))
        .collect();

    let mut failed = 0;
    for (input, result) in &results {
        match result {
            Ok(index) => {
                print_summary(input, index);
                if let Some(json) = json {
                    let target = json_target(json, input, inputs.len() > 1);
                    write_json(&target, index, pretty_json)?;
                    log::info!("Index written to {}", target.display());
                }
            }
            Err(e) => {
                failed += 1;
                log::error!("{}: {:#}", input.display(), e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} files could not be scanned", failed, inputs.len());
    }
    Ok(())
}

fn scan_one(
    scanner: &FrameScanner,
    input: &Path,
    bars: &MultiProgress,
    max_fraction: Option<f64>,
) -> Result<FrameIndex> {
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    if !audio::has_supported_extension(input) {
        log::warn!("{} does not look like an MP3 file", input.display());
    }

    let pb = bars.add(ProgressBar::new(PROGRESS_STEPS));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {percent:>3}% {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("=>-"),
    );
    pb.set_message(
        input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );

    let limit = max_fraction.unwrap_or(f64::INFINITY);
    let result = scanner.scan(
        input,
        |fraction| {
            pb.set_position((fraction * PROGRESS_STEPS as f64) as u64);
            fraction <= limit
        },
        &mut LogObserver,
    );
    pb.finish_and_clear();
    bars.remove(&pb);

    result.with_context(|| format!("Failed to scan {}", input.display()))
}

fn print_summary(input: &Path, index: &FrameIndex) {
    let s = index.summary();
    println!("{}", input.display());
    if index.is_empty() {
        println!("  no frames found, nothing to edit ({:?})", s.completion);
        return;
    }
    println!("  type:        {} layer {}", s.file_type, s.layer);
    println!("  frames:      {}", s.num_frames);
    println!("  size:        {} bytes", s.file_size_bytes);
    println!("  bitrate:     {} kbps avg", s.avg_bitrate_kbps);
    println!("  sample rate: {} Hz, {} ch", s.sample_rate, s.channels);
    println!("  frame:       {} samples", s.samples_per_frame);
    println!("  duration:    {:.2}s", s.duration_seconds);
    println!("  gain:        {}..{}", s.min_gain, s.max_gain);
    println!("  completion:  {:?}", s.completion);
}

fn json_target(json: &Path, input: &Path, many: bool) -> PathBuf {
    if !many {
        return json.to_path_buf();
    }
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    json.join(format!("{}.json", stem))
}

fn write_json(target: &Path, index: &FrameIndex, pretty: bool) -> Result<()> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let file = std::fs::File::create(target)
        .with_context(|| format!("Failed to create {}", target.display()))?;
    let writer = std::io::BufWriter::new(file);
    if pretty {
        serde_json::to_writer_pretty(writer, index)
    } else {
        serde_json::to_writer(writer, index)
    }
    .with_context(|| format!("Failed to write index to {}", target.display()))?;
    Ok(())
}
