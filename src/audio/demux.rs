use std::path::Path;

use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::header::FrameHeader;
use super::{is_recoverable, FrameSource, PcmScratch};
use crate::error::{IndexError, Result};

/// Backend driven by symphonia's probe and MPEG audio demuxer.
///
/// Each packet is one frame. Samples-per-frame is only settled once the
/// stream has been read to the end.
pub struct DemuxSource {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    packet: Option<Packet>,
    pcm: PcmScratch,
    max_decoded: usize,
    finished: bool,
}

impl DemuxSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|source| IndexError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let backend_err = |message: String| IndexError::OpenBackend {
            path: path.to_path_buf(),
            message,
        };

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| backend_err(format!("failed to probe audio format: {}", e)))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| backend_err("no audio tracks found".into()))?;

        let track_id = track.id;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| backend_err(format!("failed to create audio decoder: {}", e)))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            packet: None,
            pcm: PcmScratch::default(),
            max_decoded: 0,
            finished: false,
        })
    }
}

impl FrameSource for DemuxSource {
    fn next_header(&mut self) -> Result<Option<FrameHeader>> {
        self.packet = None;

        let packet = loop {
            match self.format.next_packet() {
                Ok(packet) if packet.track_id() == self.track_id => break packet,
                Ok(_) => continue,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.finished = true;
                    return Ok(None);
                }
                Err(e) => return Err(IndexError::stream(e.to_string())),
            }
        };

        let mut header = FrameHeader::parse(packet.buf())?;
        // The packet is the authoritative frame extent.
        header.byte_length = u32::try_from(packet.buf().len())
            .map_err(|_| IndexError::stream("oversized packet"))?;

        self.packet = Some(packet);
        Ok(Some(header))
    }

    fn decode_frame(&mut self) -> Result<&[i16]> {
        let packet = self
            .packet
            .as_ref()
            .ok_or_else(|| IndexError::stream("decode requested before a frame header"))?;

        match self.decoder.decode(packet) {
            Ok(decoded) => {
                self.max_decoded = self.max_decoded.max(decoded.frames());
                Ok(self.pcm.fill(decoded))
            }
            Err(e) if is_recoverable(&e) => {
                log::debug!("Packet at ts {} did not decode: {}", packet.ts(), e);
                Ok(&[])
            }
            Err(e) => Err(IndexError::stream(e.to_string())),
        }
    }

    fn samples_per_frame(&self) -> Option<u32> {
        if self.finished && self.max_decoded > 0 {
            u32::try_from(self.max_decoded).ok()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_file_is_open_error() {
        let err = DemuxSource::open(Path::new("/definitely/not/here.mp3")).err();
        assert!(matches!(err, Some(IndexError::Open { .. })));
    }

    #[test]
    fn unrecognised_content_is_backend_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.mp3");
        std::fs::write(&path, vec![0x5Au8; 4096]).unwrap();
        let err = DemuxSource::open(&path).err();
        assert!(matches!(err, Some(IndexError::OpenBackend { .. })));
    }
}
