//! Single-pass frame scanner.
//!
//! Drives a [`FrameSource`] frame by frame, records offset, length and gain
//! for each frame and returns the finished [`FrameIndex`]. The whole scan is
//! one blocking call; the progress callback is the only way to stop it early.

use std::path::Path;

use crate::audio::{self, BackendKind, FrameHeader, FrameSource};
use crate::error::{IndexError, Result};
use crate::index::table::{
    EstimatingGrowth, FrameTable, GrowthInput, GrowthPolicy, DEFAULT_INITIAL_CAPACITY,
};
use crate::index::{Completion, FrameIndex, FrameRecord};

/// Things that happen during a scan, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum ScanEvent {
    FrameRecorded { frame: usize, record: FrameRecord },
    Grown { from: usize, to: usize },
    StreamError { frame: usize, message: String },
    Finished { frames: usize, completion: Completion },
}

pub trait ScanObserver {
    fn on_event(&mut self, event: &ScanEvent);
}

/// Forwards scan events to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl ScanObserver for LogObserver {
    fn on_event(&mut self, event: &ScanEvent) {
        match event {
            ScanEvent::FrameRecorded { frame, record } => log::trace!(
                "Frame {}: offset={} len={} gain={}",
                frame,
                record.offset,
                record.length,
                record.gain
            ),
            ScanEvent::Grown { from, to } => {
                log::debug!("Frame table grown from {} to {} slots", from, to)
            }
            ScanEvent::StreamError { frame, message } => {
                log::warn!("Stream error at frame {}, keeping earlier frames: {}", frame, message)
            }
            ScanEvent::Finished { frames, completion } => {
                log::info!("Scan finished with {} frames ({:?})", frames, completion)
            }
        }
    }
}

/// Ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl ScanObserver for NullObserver {
    fn on_event(&mut self, _event: &ScanEvent) {}
}

/// Configured scanner; cheap to share between threads, each scan opens
/// its own backend.
pub struct FrameScanner {
    backend: BackendKind,
    initial_capacity: usize,
    growth: Box<dyn GrowthPolicy>,
}

impl FrameScanner {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            growth: Box::new(EstimatingGrowth),
        }
    }

    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity.max(1);
        self
    }

    pub fn with_growth_policy(mut self, growth: Box<dyn GrowthPolicy>) -> Self {
        self.growth = growth;
        self
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Scan the file at `path`.
    ///
    /// Only failing to open the file is an error. Stream problems and
    /// cancellation end the scan early with the frames gathered so far.
    pub fn scan<P>(&self, path: &Path, progress: P, observer: &mut dyn ScanObserver) -> Result<FrameIndex>
    where
        P: FnMut(f64) -> bool,
    {
        let metadata = std::fs::metadata(path).map_err(|source| IndexError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let size = metadata.len();
        let file_size = u32::try_from(size).map_err(|_| IndexError::TooLarge {
            path: path.to_path_buf(),
            size,
        })?;

        if file_size == 0 {
            log::info!("{} is empty, nothing to index", path.display());
            let index = FrameIndex::empty(0);
            observer.on_event(&ScanEvent::Finished {
                frames: 0,
                completion: Completion::EndOfStream,
            });
            return Ok(index);
        }

        let mut source = audio::open(self.backend, path)?;
        Ok(self.scan_source(source.as_mut(), file_size, progress, observer))
    }

    /// Run the scan loop over an already opened source.
    pub fn scan_source<P>(
        &self,
        source: &mut dyn FrameSource,
        file_size: u32,
        mut progress: P,
        observer: &mut dyn ScanObserver,
    ) -> FrameIndex
    where
        P: FnMut(f64) -> bool,
    {
        let mut session = ScanSession::new(self.initial_capacity, file_size);

        let completion = loop {
            if !progress(session.fraction()) {
                break Completion::Cancelled;
            }

            let stream_error = |message: String| ScanEvent::StreamError {
                frame: session.table.len(),
                message,
            };

            let header = match source.next_header() {
                Ok(Some(header)) => header,
                Ok(None) => break Completion::EndOfStream,
                Err(e) => {
                    let message = e.to_string();
                    observer.on_event(&stream_error(message.clone()));
                    break Completion::StreamError { message };
                }
            };

            if let Err(message) = session.check_bounds(&header) {
                observer.on_event(&stream_error(message.clone()));
                break Completion::StreamError { message };
            }

            let gain = match source.decode_frame() {
                Ok(samples) => frame_gain(samples, header.channels),
                Err(e) => {
                    let message = e.to_string();
                    observer.on_event(&stream_error(message.clone()));
                    break Completion::StreamError { message };
                }
            };

            let record = session.record(&header, gain);
            observer.on_event(&ScanEvent::FrameRecorded {
                frame: session.table.len() - 1,
                record,
            });

            if session.table.is_full() {
                let from = session.table.capacity();
                let to = self.growth.next_capacity(&session.growth_input());
                session.table.grow_to(to);
                observer.on_event(&ScanEvent::Grown {
                    from,
                    to: session.table.capacity(),
                });
            }
        };

        let index = session.finish(source.samples_per_frame(), completion);
        observer.on_event(&ScanEvent::Finished {
            frames: index.num_frames(),
            completion: index.completion().clone(),
        });
        index
    }
}

/// Scan with the given backend, no cancellation, events to the log.
pub fn scan_file(path: &Path, backend: BackendKind) -> Result<FrameIndex> {
    FrameScanner::new(backend).scan(path, |_| true, &mut LogObserver)
}

/// Mean of `|sample| / 32767` over the first channel, scaled to 0..=255.
pub fn frame_gain(samples: &[i16], channels: u16) -> u8 {
    let stride = channels.max(1) as usize;
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for &sample in samples.iter().step_by(stride) {
        sum += (sample as f64).abs() / i16::MAX as f64;
        count += 1;
    }
    if count == 0 {
        return 0;
    }
    (sum / count as f64 * 255.0).min(255.0) as u8
}

/// Mutable state of one scan; becomes the index when the scan ends.
struct ScanSession {
    table: FrameTable,
    file_size: u32,
    running_pos: u32,
    bitrate_sum: u64,
    min_gain: u8,
    max_gain: u8,
    last: Option<FrameHeader>,
}

impl ScanSession {
    fn new(initial_capacity: usize, file_size: u32) -> Self {
        Self {
            table: FrameTable::with_capacity(initial_capacity),
            file_size,
            running_pos: 0,
            bitrate_sum: 0,
            min_gain: u8::MAX,
            max_gain: 0,
            last: None,
        }
    }

    fn fraction(&self) -> f64 {
        if self.file_size == 0 {
            0.0
        } else {
            self.running_pos as f64 / self.file_size as f64
        }
    }

    fn check_bounds(&self, header: &FrameHeader) -> std::result::Result<(), String> {
        let end = self.running_pos as u64 + header.byte_length as u64;
        if end > self.file_size as u64 {
            return Err(format!(
                "frame at {} of {} bytes runs past end of file ({} bytes)",
                self.running_pos, header.byte_length, self.file_size
            ));
        }
        Ok(())
    }

    fn record(&mut self, header: &FrameHeader, gain: u8) -> FrameRecord {
        let record = FrameRecord {
            offset: self.running_pos,
            length: header.byte_length,
            gain,
        };
        self.table.push(record);
        self.bitrate_sum += header.bitrate_kbps as u64;
        self.min_gain = self.min_gain.min(gain);
        self.max_gain = self.max_gain.max(gain);
        // check_bounds keeps this within the u32 file size
        self.running_pos += header.byte_length;
        self.last = Some(*header);
        record
    }

    fn growth_input(&self) -> GrowthInput {
        GrowthInput {
            capacity: self.table.capacity(),
            frames: self.table.len(),
            bitrate_sum: self.bitrate_sum,
            file_size: self.file_size as u64,
            sample_rate: self.last.map_or(0, |h| h.sample_rate),
        }
    }

    fn finish(self, backend_spf: Option<u32>, completion: Completion) -> FrameIndex {
        let frames = self.table.len();
        let mut index = FrameIndex::empty(self.file_size);
        index.completion = completion;

        if let Some(last) = self.last {
            index.sample_rate = last.sample_rate;
            index.channels = last.channels;
            index.layer = last.layer;
            index.version = Some(last.version);
            index.samples_per_frame = last.samples_per_frame();
        }
        if let Some(spf) = backend_spf {
            index.samples_per_frame = spf;
        }
        if frames > 0 {
            index.avg_bitrate_kbps = (self.bitrate_sum / frames as u64) as u32;
            index.min_gain = self.min_gain;
            index.max_gain = self.max_gain;
        }

        let (offsets, lengths, gains) = self.table.into_columns();
        index.offsets = offsets;
        index.lengths = lengths;
        index.gains = gains;
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MpegVersion;
    use crate::index::table::DoublingGrowth;

    /// Replays a fixed list of frames, optionally failing at one of them.
    struct ScriptedSource {
        lengths: Vec<u32>,
        bitrate_kbps: u32,
        channels: u16,
        pcm: Vec<i16>,
        fail_at: Option<usize>,
        next: usize,
    }

    impl ScriptedSource {
        fn constant(frames: usize) -> Self {
            Self {
                lengths: vec![417; frames],
                bitrate_kbps: 128,
                channels: 1,
                pcm: vec![8192; 1152],
                fail_at: None,
                next: 0,
            }
        }

        fn total_len(&self) -> u32 {
            self.lengths.iter().sum()
        }
    }

    impl FrameSource for ScriptedSource {
        fn next_header(&mut self) -> Result<Option<FrameHeader>> {
            if self.fail_at == Some(self.next) {
                return Err(IndexError::stream("injected"));
            }
            let Some(&byte_length) = self.lengths.get(self.next) else {
                return Ok(None);
            };
            self.next += 1;
            Ok(Some(FrameHeader {
                version: MpegVersion::Mpeg1,
                layer: 3,
                bitrate_kbps: self.bitrate_kbps,
                sample_rate: 44_100,
                channels: self.channels,
                padding: false,
                byte_length,
            }))
        }

        fn decode_frame(&mut self) -> Result<&[i16]> {
            Ok(&self.pcm)
        }

        fn samples_per_frame(&self) -> Option<u32> {
            Some(1152)
        }
    }

    #[derive(Default)]
    struct Recorder(Vec<ScanEvent>);

    impl ScanObserver for Recorder {
        fn on_event(&mut self, event: &ScanEvent) {
            self.0.push(event.clone());
        }
    }

    impl Recorder {
        fn growths(&self) -> usize {
            self.0
                .iter()
                .filter(|e| matches!(e, ScanEvent::Grown { .. }))
                .count()
        }
    }

    fn scan_scripted(scanner: &FrameScanner, mut source: ScriptedSource) -> (FrameIndex, Recorder) {
        let size = source.total_len();
        let mut recorder = Recorder::default();
        let index = scanner.scan_source(&mut source, size, |_| true, &mut recorder);
        (index, recorder)
    }

    #[test]
    fn records_contiguous_frames() {
        let (index, _) = scan_scripted(&FrameScanner::new(BackendKind::Frames), ScriptedSource::constant(5));
        assert_eq!(index.offsets(), &[0, 417, 834, 1251, 1668]);
        assert_eq!(index.lengths(), &[417; 5]);
        assert_eq!(index.avg_bitrate_kbps(), 128);
        assert_eq!(index.sample_rate(), 44_100);
        assert_eq!(index.channels(), 1);
        assert_eq!(index.samples_per_frame(), 1152);
        assert_eq!(index.completion(), &Completion::EndOfStream);

        for w in index.offsets().windows(2) {
            assert!(w[0] < w[1]);
        }
        for i in 0..index.num_frames() - 1 {
            assert_eq!(index.offsets()[i] + index.lengths()[i], index.offsets()[i + 1]);
        }
        let last = index.num_frames() - 1;
        assert!(index.offsets()[last] + index.lengths()[last] <= index.file_size_bytes());
    }

    #[test]
    fn gain_is_quarter_scale() {
        let (index, _) = scan_scripted(&FrameScanner::new(BackendKind::Frames), ScriptedSource::constant(2));
        // 8192 / 32767 * 255
        assert_eq!(index.gains(), &[63, 63]);
        assert_eq!(index.min_gain(), 63);
        assert_eq!(index.max_gain(), 63);
    }

    #[test]
    fn gain_samples_only_first_channel() {
        let pcm: Vec<i16> = [i16::MAX, 0].repeat(576);
        assert_eq!(frame_gain(&pcm, 2), 255);
        assert_eq!(frame_gain(&pcm, 1), 127);
        assert_eq!(frame_gain(&[], 2), 0);
        assert_eq!(frame_gain(&[i16::MIN; 4], 1), 255);
    }

    #[test]
    fn stream_error_keeps_earlier_frames() {
        let mut source = ScriptedSource::constant(10);
        source.fail_at = Some(3);
        let (index, recorder) = scan_scripted(&FrameScanner::new(BackendKind::Frames), source);
        assert_eq!(index.num_frames(), 3);
        assert!(matches!(index.completion(), Completion::StreamError { .. }));
        assert!(recorder
            .0
            .iter()
            .any(|e| matches!(e, ScanEvent::StreamError { frame: 3, .. })));
    }

    #[test]
    fn stream_error_on_first_frame_gives_empty_index() {
        let mut source = ScriptedSource::constant(4);
        source.fail_at = Some(0);
        let (index, _) = scan_scripted(&FrameScanner::new(BackendKind::Frames), source);
        assert!(index.is_empty());
        assert_eq!(index.avg_bitrate_kbps(), 0);
    }

    #[test]
    fn cancellation_stops_before_frame_k() {
        let scanner = FrameScanner::new(BackendKind::Frames);
        let mut source = ScriptedSource::constant(10);
        let size = source.total_len();
        let mut calls = 0;
        let mut fractions = Vec::new();
        let index = scanner.scan_source(
            &mut source,
            size,
            |f| {
                fractions.push(f);
                calls += 1;
                calls <= 4
            },
            &mut NullObserver,
        );
        assert_eq!(index.num_frames(), 4);
        assert_eq!(index.completion(), &Completion::Cancelled);
        assert_eq!(fractions[0], 0.0);
        assert!((fractions[4] - 4.0 / 10.0).abs() < 1e-9);
    }

    #[test]
    fn growth_does_not_change_records() {
        let reference = scan_scripted(&FrameScanner::new(BackendKind::Frames), ScriptedSource::constant(300)).0;
        for capacity in [1, 7, 64, 1000] {
            let scanner = FrameScanner::new(BackendKind::Frames).with_initial_capacity(capacity);
            let (index, _) = scan_scripted(&scanner, ScriptedSource::constant(300));
            assert_eq!(index.offsets(), reference.offsets());
            assert_eq!(index.lengths(), reference.lengths());
            assert_eq!(index.gains(), reference.gains());
        }
    }

    #[test]
    fn constant_bitrate_grows_once() {
        // Real 128 kbps frames are 417 or 418 bytes, so the estimate
        // (file_size / 128 * 44100 / 144000) sits close to the true count.
        let frames = 2000;
        let (index, recorder) = scan_scripted(&FrameScanner::new(BackendKind::Frames), ScriptedSource::constant(frames));
        assert_eq!(index.num_frames(), frames);
        assert_eq!(recorder.growths(), 1);

        let scanner = FrameScanner::new(BackendKind::Frames).with_growth_policy(Box::new(DoublingGrowth));
        let (_, recorder) = scan_scripted(&scanner, ScriptedSource::constant(frames));
        // 64 -> 128 -> ... -> 2048
        assert_eq!(recorder.growths(), 5);
    }

    #[test]
    fn frame_past_end_of_file_is_rejected() {
        let scanner = FrameScanner::new(BackendKind::Frames);
        let mut source = ScriptedSource::constant(3);
        let index = scanner.scan_source(&mut source, 1000, |_| true, &mut NullObserver);
        assert_eq!(index.num_frames(), 2);
        assert!(matches!(index.completion(), Completion::StreamError { .. }));
    }

    #[test]
    fn empty_file_scans_to_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.mp3");
        std::fs::write(&path, b"").unwrap();
        let index = scan_file(&path, BackendKind::Symphonia).unwrap();
        assert_eq!(index.num_frames(), 0);
        assert_eq!(index.avg_bitrate_kbps(), 0);
        assert_eq!(index.file_size_bytes(), 0);
    }

    #[test]
    fn missing_file_is_open_error() {
        let err = scan_file(Path::new("/no/such/file.mp3"), BackendKind::Frames).err();
        assert!(matches!(err, Some(IndexError::Open { .. })));
    }

    #[test]
    fn corrupt_file_gives_empty_index_with_frames_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.mp3");
        std::fs::write(&path, vec![0x12u8; 2048]).unwrap();
        let index = scan_file(&path, BackendKind::Frames).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.avg_bitrate_kbps(), 0);
        assert!(matches!(index.completion(), Completion::StreamError { .. }));
    }

    #[test]
    fn scans_and_cuts_real_frames_with_both_backends() {
        // MPEG1 Layer III, 128 kbps, 44100 Hz, mono: 417 bytes per frame.
        let mut bytes = Vec::new();
        for _ in 0..5 {
            bytes.extend_from_slice(&[0xFF, 0xFB, 0x90, 0xC0]);
            bytes.extend_from_slice(&[0u8; 413]);
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("five.mp3");
        std::fs::write(&path, &bytes).unwrap();

        for kind in [BackendKind::Frames, BackendKind::Symphonia] {
            let index = FrameScanner::new(kind)
                .scan(&path, |_| true, &mut NullObserver)
                .unwrap();
            assert_eq!(index.offsets(), &[0, 417, 834, 1251, 1668], "{:?}", kind);
            assert_eq!(index.lengths(), &[417; 5], "{:?}", kind);
            assert_eq!(index.samples_per_frame(), 1152, "{:?}", kind);
            assert_eq!(index.avg_bitrate_kbps(), 128, "{:?}", kind);
            assert_eq!(index.file_size_bytes(), bytes.len() as u32);

            let cut = dir.path().join(format!("cut-{:?}.mp3", kind));
            let written = crate::extract::extract(&path, &index, 1, 2, &cut).unwrap();
            assert_eq!(written, 834);
            assert_eq!(std::fs::read(&cut).unwrap(), &bytes[417..1251]);
        }
    }
}
