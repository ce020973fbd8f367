use crate::error::{IndexError, Result};

/// Size of the fixed MPEG audio frame header in bytes.
pub const HEADER_LEN: usize = 4;

/// MPEG audio version carried in the frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    /// Unofficial low-sample-rate extension of MPEG 2.
    Mpeg25,
}

impl MpegVersion {
    /// MPEG 2 and 2.5 are the lower sampling frequency ("LSF") variants.
    pub fn is_lsf(self) -> bool {
        !matches!(self, MpegVersion::Mpeg1)
    }
}

/// Metadata of a single encoded frame, as read from its 4-byte header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    /// 1, 2 or 3.
    pub layer: u8,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub channels: u16,
    pub padding: bool,
    /// Whole frame length including the header itself.
    pub byte_length: u32,
}

// Indexed by bitrate index 1..=14; 0 (free format) and 15 are invalid.
const BITRATES_V1_L1: [u32; 15] = [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448];
const BITRATES_V1_L2: [u32; 15] = [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384];
const BITRATES_V1_L3: [u32; 15] = [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320];
const BITRATES_V2_L1: [u32; 15] = [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256];
const BITRATES_V2_L23: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

const SAMPLE_RATES_V1: [u32; 3] = [44_100, 48_000, 32_000];
const SAMPLE_RATES_V2: [u32; 3] = [22_050, 24_000, 16_000];
const SAMPLE_RATES_V25: [u32; 3] = [11_025, 12_000, 8_000];

impl FrameHeader {
    /// Parse the header at the start of `bytes`.
    ///
    /// No resynchronisation is attempted: if the first bytes are not a valid
    /// frame header this is a stream error.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(IndexError::stream(format!(
                "short frame header ({} bytes)",
                bytes.len()
            )));
        }
        let (b0, b1, b2, b3) = (bytes[0], bytes[1], bytes[2], bytes[3]);

        if b0 != 0xFF || b1 & 0xE0 != 0xE0 {
            return Err(IndexError::stream(format!(
                "no frame sync, found {:02X} {:02X}",
                b0, b1
            )));
        }

        let version = match (b1 >> 3) & 0b11 {
            0b00 => MpegVersion::Mpeg25,
            0b10 => MpegVersion::Mpeg2,
            0b11 => MpegVersion::Mpeg1,
            _ => return Err(IndexError::stream("reserved MPEG version")),
        };

        let layer = match (b1 >> 1) & 0b11 {
            0b01 => 3,
            0b10 => 2,
            0b11 => 1,
            _ => return Err(IndexError::stream("reserved layer")),
        };

        let bitrate_index = (b2 >> 4) as usize;
        if bitrate_index == 0 {
            return Err(IndexError::stream("free-format bitrate is not supported"));
        }
        if bitrate_index == 15 {
            return Err(IndexError::stream("invalid bitrate index"));
        }
        let table = match (version, layer) {
            (MpegVersion::Mpeg1, 1) => &BITRATES_V1_L1,
            (MpegVersion::Mpeg1, 2) => &BITRATES_V1_L2,
            (MpegVersion::Mpeg1, _) => &BITRATES_V1_L3,
            (_, 1) => &BITRATES_V2_L1,
            _ => &BITRATES_V2_L23,
        };
        let bitrate_kbps = table[bitrate_index];

        let rate_index = ((b2 >> 2) & 0b11) as usize;
        if rate_index == 3 {
            return Err(IndexError::stream("reserved sample rate"));
        }
        let sample_rate = match version {
            MpegVersion::Mpeg1 => SAMPLE_RATES_V1[rate_index],
            MpegVersion::Mpeg2 => SAMPLE_RATES_V2[rate_index],
            MpegVersion::Mpeg25 => SAMPLE_RATES_V25[rate_index],
        };

        let padding = (b2 >> 1) & 1 == 1;
        let channels = if b3 >> 6 == 0b11 { 1 } else { 2 };

        let byte_length = frame_length(version, layer, bitrate_kbps, sample_rate, padding);

        Ok(Self {
            version,
            layer,
            bitrate_kbps,
            sample_rate,
            channels,
            padding,
            byte_length,
        })
    }

    /// Decoded samples per channel this frame yields.
    pub fn samples_per_frame(&self) -> u32 {
        samples_per_frame(self.version, self.layer)
    }
}

/// 384 for Layer I, 1152 for Layer II and MPEG 1 Layer III, 576 for LSF Layer III.
pub fn samples_per_frame(version: MpegVersion, layer: u8) -> u32 {
    match layer {
        1 => 384,
        3 if version.is_lsf() => 576,
        _ => 1152,
    }
}

fn frame_length(version: MpegVersion, layer: u8, bitrate_kbps: u32, sample_rate: u32, padding: bool) -> u32 {
    let bitrate = bitrate_kbps * 1000;
    let pad = padding as u32;
    match layer {
        1 => (12 * bitrate / sample_rate + pad) * 4,
        3 if version.is_lsf() => 72 * bitrate / sample_rate + pad,
        _ => 144 * bitrate / sample_rate + pad,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mpeg1_layer3_mono() {
        let h = FrameHeader::parse(&[0xFF, 0xFB, 0x90, 0xC0]).unwrap();
        assert_eq!(h.version, MpegVersion::Mpeg1);
        assert_eq!(h.layer, 3);
        assert_eq!(h.bitrate_kbps, 128);
        assert_eq!(h.sample_rate, 44_100);
        assert_eq!(h.channels, 1);
        assert!(!h.padding);
        assert_eq!(h.byte_length, 417);
        assert_eq!(h.samples_per_frame(), 1152);
    }

    #[test]
    fn padding_adds_one_byte() {
        let h = FrameHeader::parse(&[0xFF, 0xFB, 0x92, 0x44]).unwrap();
        assert!(h.padding);
        assert_eq!(h.channels, 2);
        assert_eq!(h.byte_length, 418);
    }

    #[test]
    fn lsf_layer3_uses_576_samples() {
        // MPEG 2, Layer III, 64 kbps, 22050 Hz
        let h = FrameHeader::parse(&[0xFF, 0xF3, 0x80, 0xC0]).unwrap();
        assert_eq!(h.version, MpegVersion::Mpeg2);
        assert_eq!(h.bitrate_kbps, 64);
        assert_eq!(h.sample_rate, 22_050);
        assert_eq!(h.samples_per_frame(), 576);
        assert_eq!(h.byte_length, 72 * 64_000 / 22_050);
    }

    #[test]
    fn layer1_frame_length_in_slots() {
        // MPEG 1, Layer I, 384 kbps, 48 kHz
        let h = FrameHeader::parse(&[0xFF, 0xFF, 0xC4, 0x00]).unwrap();
        assert_eq!(h.layer, 1);
        assert_eq!(h.bitrate_kbps, 384);
        assert_eq!(h.sample_rate, 48_000);
        assert_eq!(h.samples_per_frame(), 384);
        assert_eq!(h.byte_length, 384);
    }

    #[test]
    fn rejects_garbage() {
        assert!(FrameHeader::parse(&[0x49, 0x44, 0x33, 0x04]).is_err());
        assert!(FrameHeader::parse(&[0xFF, 0xFB]).is_err());
        // free format
        assert!(FrameHeader::parse(&[0xFF, 0xFB, 0x00, 0xC0]).is_err());
        // reserved sample rate
        assert!(FrameHeader::parse(&[0xFF, 0xFB, 0x9C, 0xC0]).is_err());
        // reserved version
        assert!(FrameHeader::parse(&[0xFF, 0xEB, 0x90, 0xC0]).is_err());
    }
}
