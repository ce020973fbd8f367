//! Frame index for MP3 streams.
//!
//! A single scan records where every encoded frame starts, how long it is
//! and a rough loudness value. The index then maps frame numbers to byte
//! offsets and cuts frame ranges out of the source without re-encoding.

pub mod audio;
pub mod config;
pub mod error;
pub mod extract;
pub mod index;
pub mod scan;
pub mod seek;

pub use audio::{BackendKind, FrameHeader, FrameSource};
pub use error::{IndexError, Result};
pub use extract::{extract, extract_to};
pub use index::{Completion, FrameIndex, FrameRecord, IndexSummary};
pub use scan::{scan_file, FrameScanner, LogObserver, NullObserver, ScanEvent, ScanObserver};
pub use seek::{frame_at_offset, seekable_offset, seekable_offset_at_seconds};
