use std::path::PathBuf;

/// Result alias used across the indexing core.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors surfaced by scanning, seeking and extraction.
///
/// Mid-stream problems never escape a scan: they end it early and are kept
/// on the resulting index as its completion state. [`IndexError::Stream`]
/// is what a [`FrameSource`](crate::audio::FrameSource) reports in that case.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The source file is missing or unreadable.
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The decoding backend refused to start on the file.
    #[error("backend could not open {}: {message}", path.display())]
    OpenBackend { path: PathBuf, message: String },
    /// Frame offsets are 32-bit, so larger inputs cannot be indexed.
    #[error("{} is {size} bytes, larger than an index can address", path.display())]
    TooLarge { path: PathBuf, size: u64 },
    /// Malformed frame header or decode failure mid-stream.
    #[error("stream error: {0}")]
    Stream(String),
    /// Extraction asked for frames outside the index.
    #[error("frames {start}..{start}+{count} out of range, index has {num_frames} frames")]
    Range {
        start: usize,
        count: usize,
        num_frames: usize,
    },
    /// The destination of an extraction could not be created or written.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Copying frame bytes between source and destination failed.
    #[error("frame transfer failed: {0}")]
    Transfer(#[from] std::io::Error),
}

impl IndexError {
    pub(crate) fn stream<T: Into<String>>(msg: T) -> Self {
        Self::Stream(msg.into())
    }
}
