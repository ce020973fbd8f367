use clap::{Parser, Subcommand};
use std::path::PathBuf;

use framecut::audio::BackendKind;
use framecut::index::table::DEFAULT_INITIAL_CAPACITY;

#[derive(Parser, Debug)]
#[command(name = "framecut", version, about = "Frame-accurate MP3 indexing, seeking and cutting")]
pub struct Cli {
    /// Decoding backend used to scan frames
    #[arg(long, global = true, value_enum, default_value_t = BackendKind::Frames)]
    pub backend: BackendKind,

    /// Frame slots allocated before the first growth
    #[arg(long, global = true, default_value_t = DEFAULT_INITIAL_CAPACITY)]
    pub initial_capacity: usize,

    /// Config file (defaults to framecut.toml or the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Index one or more files and print their summaries
    Scan {
        /// Input MP3 files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Write the index as JSON (a directory when several inputs are given)
        #[arg(long)]
        json: Option<PathBuf>,

        /// Stop scanning once this fraction of the file has been read
        #[arg(long)]
        max_fraction: Option<f64>,
    },
    /// Print the byte offset a frame (or time) can be played from
    Seek {
        input: PathBuf,

        /// Frame number; clamps to the start or end of the file
        #[arg(allow_negative_numbers = true, required_unless_present = "seconds")]
        frame: Option<i64>,

        /// Time position in seconds instead of a frame number
        #[arg(long, conflicts_with = "frame")]
        seconds: Option<f64>,
    },
    /// Copy a frame range into a new file without re-encoding
    Extract {
        input: PathBuf,

        /// First frame to copy
        #[arg(short, long)]
        start: usize,

        /// Number of frames to copy
        #[arg(short = 'n', long)]
        count: usize,

        /// Destination file (overwritten)
        #[arg(short, long)]
        output: PathBuf,
    },
}
