//! Decoding backends that feed the frame scanner.
//!
//! Two interchangeable implementations exist behind [`FrameSource`]:
//! [`frames::FrameReader`] walks frame headers directly in the file, and
//! [`demux::DemuxSource`] lets symphonia's MPEG audio demuxer delimit
//! frames. The scanner only ever sees the trait object.

pub mod demux;
pub mod frames;
pub mod header;

use std::path::Path;
use std::sync::Once;

use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::errors::Error as SymphoniaError;

use crate::error::Result;
pub use header::{FrameHeader, MpegVersion};

/// File extensions the indexer is meant for.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3"];

/// Per-frame access to an encoded stream.
///
/// Resources are released on drop, including after an error.
pub trait FrameSource {
    /// Advance to the next frame. `Ok(None)` marks the end of the stream.
    fn next_header(&mut self) -> Result<Option<FrameHeader>>;

    /// Decode the frame returned by the last [`next_header`](Self::next_header)
    /// call into interleaved 16-bit PCM.
    fn decode_frame(&mut self) -> Result<&[i16]>;

    /// Samples per channel per frame, if the backend knows it yet.
    fn samples_per_frame(&self) -> Option<u32>;
}

/// Which backend a scan drives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Header walker with symphonia's codec for PCM.
    #[default]
    Frames,
    /// symphonia's probe and demuxer.
    ///
    /// The demuxer swallows a leading ID3v2 tag and a Xing/Info frame, so
    /// offsets on such files (most LAME encodes) land one frame early and
    /// seeks or cuts are shifted accordingly. Prefer `Frames` when byte
    /// offsets matter.
    Symphonia,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Frames => "frames",
            BackendKind::Symphonia => "symphonia",
        }
    }
}

static INIT: Once = Once::new();

/// One-time process initialisation of the decoding registries.
///
/// Call at startup; later calls do nothing. Scans assume it has run but
/// stay correct without it, since the registries initialise lazily.
pub fn init() {
    INIT.call_once(|| {
        let _ = symphonia::default::get_probe();
        let _ = symphonia::default::get_codecs();
        log::debug!(
            "Decoding backends ready: {}, {}",
            BackendKind::Frames.name(),
            BackendKind::Symphonia.name()
        );
    });
}

/// Open `path` with the requested backend.
pub fn open(kind: BackendKind, path: &Path) -> Result<Box<dyn FrameSource>> {
    log::debug!("Opening {} with the {} backend", path.display(), kind.name());
    match kind {
        BackendKind::Frames => Ok(Box::new(frames::FrameReader::open(path)?)),
        BackendKind::Symphonia => Ok(Box::new(demux::DemuxSource::open(path)?)),
    }
}

/// Whether `path` carries one of [`SUPPORTED_EXTENSIONS`].
pub fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
}

/// Reusable interleaved i16 conversion buffer shared by both backends.
#[derive(Default)]
pub(crate) struct PcmScratch {
    buffer: Option<SampleBuffer<i16>>,
}

impl PcmScratch {
    pub(crate) fn fill(&mut self, decoded: AudioBufferRef<'_>) -> &[i16] {
        let spec = *decoded.spec();
        let capacity = decoded.capacity() as u64;
        let too_small = self
            .buffer
            .as_ref()
            .map_or(true, |b| (b.capacity() as u64) < capacity * spec.channels.count() as u64);
        if too_small {
            self.buffer = Some(SampleBuffer::<i16>::new(capacity, spec));
        }
        match self.buffer.as_mut() {
            Some(buf) => {
                buf.copy_interleaved_ref(decoded);
                buf.samples()
            }
            None => &[],
        }
    }
}

/// symphonia decode errors on one frame (e.g. bit reservoir underflow
/// after a cut) are not fatal to indexing; everything else is.
pub(crate) fn is_recoverable(err: &SymphoniaError) -> bool {
    matches!(err, SymphoniaError::DecodeError(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_match_config_spelling() {
        #[derive(serde::Deserialize)]
        struct Wrapper {
            backend: BackendKind,
        }
        let kind = toml::from_str::<Wrapper>("backend = \"symphonia\"").unwrap().backend;
        assert_eq!(kind, BackendKind::Symphonia);
        assert_eq!(kind.name(), "symphonia");
        assert_eq!(BackendKind::default().name(), "frames");
    }

    #[test]
    fn init_is_idempotent() {
        init();
        init();
    }

    #[test]
    fn extension_check_ignores_case() {
        assert!(has_supported_extension(Path::new("song.MP3")));
        assert!(has_supported_extension(Path::new("/a/b/c.mp3")));
        assert!(!has_supported_extension(Path::new("song.flac")));
        assert!(!has_supported_extension(Path::new("noext")));
    }
}
