//! The frame index: byte offset, byte length and a rough gain for every
//! encoded frame, plus stream-wide summary values.

pub mod table;

use serde::Serialize;

use crate::audio::header::{self, MpegVersion};

/// One row of the index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FrameRecord {
    pub offset: u32,
    pub length: u32,
    pub gain: u8,
}

/// How the scan that produced an index ended.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Completion {
    #[default]
    EndOfStream,
    /// The progress callback asked to stop.
    Cancelled,
    /// A malformed or undecodable frame ended the scan early.
    StreamError { message: String },
}

/// Read-only result of a completed scan.
#[derive(Clone, Debug, Serialize)]
pub struct FrameIndex {
    pub(crate) offsets: Vec<u32>,
    pub(crate) lengths: Vec<u32>,
    pub(crate) gains: Vec<u8>,
    pub(crate) file_size_bytes: u32,
    pub(crate) avg_bitrate_kbps: u32,
    pub(crate) sample_rate: u32,
    pub(crate) channels: u16,
    pub(crate) samples_per_frame: u32,
    pub(crate) version: Option<MpegVersion>,
    pub(crate) layer: u8,
    pub(crate) min_gain: u8,
    pub(crate) max_gain: u8,
    pub(crate) completion: Completion,
}

/// Stream-wide values of an index without the per-frame columns.
#[derive(Clone, Debug, Serialize)]
pub struct IndexSummary {
    pub file_type: &'static str,
    pub num_frames: usize,
    pub file_size_bytes: u32,
    pub avg_bitrate_kbps: u32,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples_per_frame: u32,
    pub layer: u8,
    pub duration_seconds: f64,
    pub min_gain: u8,
    pub max_gain: u8,
    pub completion: Completion,
}

impl FrameIndex {
    /// Index of a file with no frames.
    pub fn empty(file_size_bytes: u32) -> Self {
        Self {
            offsets: Vec::new(),
            lengths: Vec::new(),
            gains: Vec::new(),
            file_size_bytes,
            avg_bitrate_kbps: 0,
            sample_rate: 0,
            channels: 0,
            samples_per_frame: header::samples_per_frame(MpegVersion::Mpeg1, 3),
            version: None,
            layer: 0,
            min_gain: 0,
            max_gain: 0,
            completion: Completion::EndOfStream,
        }
    }

    pub fn file_type(&self) -> &'static str {
        "MP3"
    }

    pub fn num_frames(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub fn lengths(&self) -> &[u32] {
        &self.lengths
    }

    pub fn gains(&self) -> &[u8] {
        &self.gains
    }

    pub fn record(&self, frame: usize) -> Option<FrameRecord> {
        Some(FrameRecord {
            offset: *self.offsets.get(frame)?,
            length: self.lengths[frame],
            gain: self.gains[frame],
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = FrameRecord> + '_ {
        self.offsets
            .iter()
            .zip(&self.lengths)
            .zip(&self.gains)
            .map(|((&offset, &length), &gain)| FrameRecord { offset, length, gain })
    }

    pub fn file_size_bytes(&self) -> u32 {
        self.file_size_bytes
    }

    /// Integer mean of per-frame bitrates, 0 for an empty index.
    pub fn avg_bitrate_kbps(&self) -> u32 {
        self.avg_bitrate_kbps
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn samples_per_frame(&self) -> u32 {
        self.samples_per_frame
    }

    pub fn version(&self) -> Option<MpegVersion> {
        self.version
    }

    pub fn layer(&self) -> u8 {
        self.layer
    }

    pub fn min_gain(&self) -> u8 {
        self.min_gain
    }

    pub fn max_gain(&self) -> u8 {
        self.max_gain
    }

    pub fn completion(&self) -> &Completion {
        &self.completion
    }

    pub fn frames_to_seconds(&self, frames: usize) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        frames as f64 * self.samples_per_frame as f64 / self.sample_rate as f64
    }

    /// Nearest frame number for a time position.
    pub fn seconds_to_frames(&self, seconds: f64) -> i64 {
        if self.samples_per_frame == 0 {
            return 0;
        }
        (seconds * self.sample_rate as f64 / self.samples_per_frame as f64 + 0.5).floor() as i64
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames_to_seconds(self.num_frames())
    }

    pub fn summary(&self) -> IndexSummary {
        IndexSummary {
            file_type: self.file_type(),
            num_frames: self.num_frames(),
            file_size_bytes: self.file_size_bytes,
            avg_bitrate_kbps: self.avg_bitrate_kbps,
            sample_rate: self.sample_rate,
            channels: self.channels,
            samples_per_frame: self.samples_per_frame,
            layer: self.layer,
            duration_seconds: self.duration_seconds(),
            min_gain: self.min_gain,
            max_gain: self.max_gain,
            completion: self.completion.clone(),
        }
    }

    /// Contiguous index over frames of the given lengths, starting at byte 0.
    #[cfg(test)]
    pub(crate) fn from_lengths(lengths: &[u32], file_size_bytes: u32) -> Self {
        let mut index = Self::empty(file_size_bytes);
        let mut pos = 0;
        for &len in lengths {
            index.offsets.push(pos);
            index.lengths.push(len);
            index.gains.push(0);
            pos += len;
        }
        index.sample_rate = 44_100;
        index.channels = 1;
        index.layer = 3;
        index.version = Some(MpegVersion::Mpeg1);
        index.avg_bitrate_kbps = if lengths.is_empty() { 0 } else { 128 };
        index
    }
}
