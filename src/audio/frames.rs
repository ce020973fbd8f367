use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use symphonia::core::audio::Channels;
use symphonia::core::codecs::{
    CodecParameters, CodecType, Decoder, DecoderOptions, CODEC_TYPE_MP1, CODEC_TYPE_MP2,
    CODEC_TYPE_MP3,
};
use symphonia::core::formats::Packet;

use super::header::{FrameHeader, HEADER_LEN};
use super::{is_recoverable, FrameSource, PcmScratch};
use crate::error::{IndexError, Result};

/// Walks MPEG audio frames back to back from the start of the file.
///
/// The header of each frame is expected exactly where the previous frame
/// ended; the frame bytes are then handed to symphonia's codec for PCM.
/// Samples-per-frame is known as soon as the first header is read.
pub struct FrameReader<R: Read = BufReader<File>> {
    reader: R,
    frame: Vec<u8>,
    current: Option<FrameHeader>,
    decoder: Option<Box<dyn Decoder>>,
    pcm: PcmScratch,
    samples_per_frame: Option<u32>,
    ts: u64,
}

impl FrameReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| IndexError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            frame: Vec::new(),
            current: None,
            decoder: None,
            pcm: PcmScratch::default(),
            samples_per_frame: None,
            ts: 0,
        }
    }

    fn make_decoder(header: &FrameHeader) -> Result<Box<dyn Decoder>> {
        let codec: CodecType = match header.layer {
            1 => CODEC_TYPE_MP1,
            2 => CODEC_TYPE_MP2,
            _ => CODEC_TYPE_MP3,
        };
        let channels = if header.channels == 1 {
            Channels::FRONT_LEFT
        } else {
            Channels::FRONT_LEFT | Channels::FRONT_RIGHT
        };

        let mut params = CodecParameters::new();
        params
            .for_codec(codec)
            .with_sample_rate(header.sample_rate)
            .with_channels(channels);

        symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| IndexError::stream(format!("no decoder for layer {}: {}", header.layer, e)))
    }
}

impl<R: Read> FrameSource for FrameReader<R> {
    fn next_header(&mut self) -> Result<Option<FrameHeader>> {
        self.current = None;

        let mut head = [0u8; HEADER_LEN];
        let got = read_up_to(&mut self.reader, &mut head)?;
        if got == 0 {
            return Ok(None);
        }
        // A trailing ID3v1 tag ends the audio.
        if got >= 3 && &head[..3] == b"TAG" {
            log::debug!("ID3v1 tag after last frame");
            return Ok(None);
        }

        let header = FrameHeader::parse(&head[..got])?;

        self.frame.clear();
        self.frame.extend_from_slice(&head);
        self.frame.resize(header.byte_length as usize, 0);
        if let Err(e) = self.reader.read_exact(&mut self.frame[HEADER_LEN..]) {
            return Err(if e.kind() == ErrorKind::UnexpectedEof {
                IndexError::stream(format!(
                    "truncated frame, expected {} bytes",
                    header.byte_length
                ))
            } else {
                IndexError::stream(e.to_string())
            });
        }

        if self.samples_per_frame.is_none() {
            self.samples_per_frame = Some(header.samples_per_frame());
        }
        self.current = Some(header);
        Ok(Some(header))
    }

    fn decode_frame(&mut self) -> Result<&[i16]> {
        let header = self
            .current
            .ok_or_else(|| IndexError::stream("decode requested before a frame header"))?;

        if self.decoder.is_none() {
            self.decoder = Some(Self::make_decoder(&header)?);
        }
        let decoder = match self.decoder.as_mut() {
            Some(d) => d,
            None => return Ok(&[]),
        };

        let duration = header.samples_per_frame() as u64;
        let packet = Packet::new_from_slice(0, self.ts, duration, &self.frame);
        self.ts += duration;

        match decoder.decode(&packet) {
            Ok(decoded) => Ok(self.pcm.fill(decoded)),
            Err(e) if is_recoverable(&e) => {
                log::debug!("Frame at ts {} did not decode: {}", packet.ts(), e);
                Ok(&[])
            }
            Err(e) => Err(IndexError::stream(e.to_string())),
        }
    }

    fn samples_per_frame(&self) -> Option<u32> {
        self.samples_per_frame
    }
}

/// Like `read_exact`, but a clean end of input yields a short count.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(IndexError::stream(e.to_string())),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const MONO_128K: [u8; 4] = [0xFF, 0xFB, 0x90, 0xC0];

    fn stream(frames: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        for _ in 0..frames {
            bytes.extend_from_slice(&MONO_128K);
            bytes.resize(bytes.len() + 413, 0);
        }
        bytes
    }

    #[test]
    fn walks_contiguous_frames() {
        let mut reader = FrameReader::new(Cursor::new(stream(5)));
        assert_eq!(reader.samples_per_frame(), None);

        let mut lengths = Vec::new();
        while let Some(h) = reader.next_header().unwrap() {
            lengths.push(h.byte_length);
        }
        assert_eq!(lengths, vec![417; 5]);
        assert_eq!(reader.samples_per_frame(), Some(1152));
    }

    #[test]
    fn stops_at_id3v1_tag() {
        let mut bytes = stream(2);
        bytes.extend_from_slice(b"TAG");
        bytes.resize(bytes.len() + 125, b' ');
        let mut reader = FrameReader::new(Cursor::new(bytes));
        assert!(reader.next_header().unwrap().is_some());
        assert!(reader.next_header().unwrap().is_some());
        assert!(reader.next_header().unwrap().is_none());
    }

    #[test]
    fn truncated_frame_is_a_stream_error() {
        let mut bytes = stream(2);
        bytes.truncate(417 + 100);
        let mut reader = FrameReader::new(Cursor::new(bytes));
        assert!(reader.next_header().unwrap().is_some());
        assert!(matches!(reader.next_header(), Err(IndexError::Stream(_))));
    }

    #[test]
    fn leading_junk_is_a_stream_error() {
        let mut bytes = b"ID3".to_vec();
        bytes.extend(stream(1));
        let mut reader = FrameReader::new(Cursor::new(bytes));
        assert!(matches!(reader.next_header(), Err(IndexError::Stream(_))));
    }

    #[test]
    fn decode_without_header_fails() {
        let mut reader = FrameReader::new(Cursor::new(stream(1)));
        assert!(reader.decode_frame().is_err());
    }

    #[test]
    fn open_missing_file_is_open_error() {
        let err = FrameReader::open(Path::new("/definitely/not/here.mp3")).err();
        assert!(matches!(err, Some(IndexError::Open { .. })));
    }
}
