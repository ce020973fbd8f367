use super::FrameRecord;

/// Initial number of frame slots a scan allocates.
pub const DEFAULT_INITIAL_CAPACITY: usize = 64;

/// What a growth policy knows when the table fills up.
#[derive(Clone, Copy, Debug)]
pub struct GrowthInput {
    pub capacity: usize,
    pub frames: usize,
    pub bitrate_sum: u64,
    pub file_size: u64,
    pub sample_rate: u32,
}

/// Decides the next capacity of a full [`FrameTable`].
pub trait GrowthPolicy: Send + Sync {
    fn next_capacity(&self, input: &GrowthInput) -> usize;
}

/// Estimates the total frame count from the running average bitrate and
/// pads it by 10%, never growing by less than a doubling.
///
/// With a roughly constant bitrate a single growth covers the whole file.
#[derive(Clone, Copy, Debug, Default)]
pub struct EstimatingGrowth;

impl GrowthPolicy for EstimatingGrowth {
    fn next_capacity(&self, input: &GrowthInput) -> usize {
        let doubled = input.capacity.saturating_mul(2).max(1);
        if input.frames == 0 {
            return doubled;
        }
        let avg_bitrate = input.bitrate_sum / input.frames as u64;
        if avg_bitrate == 0 {
            return doubled;
        }
        let guess = (input.file_size / avg_bitrate) * input.sample_rate as u64 / 144_000;
        let padded = usize::try_from(guess * 11 / 10).unwrap_or(usize::MAX);
        padded.max(doubled)
    }
}

/// Plain doubling, mostly useful to compare growth counts against.
#[derive(Clone, Copy, Debug, Default)]
pub struct DoublingGrowth;

impl GrowthPolicy for DoublingGrowth {
    fn next_capacity(&self, input: &GrowthInput) -> usize {
        input.capacity.saturating_mul(2).max(1)
    }
}

/// Growable storage for the three parallel frame columns.
///
/// `capacity` is the logical slot count the growth policy manages; it is
/// tracked separately from whatever the allocator hands out.
#[derive(Debug)]
pub struct FrameTable {
    offsets: Vec<u32>,
    lengths: Vec<u32>,
    gains: Vec<u8>,
    capacity: usize,
}

impl FrameTable {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            offsets: Vec::with_capacity(capacity),
            lengths: Vec::with_capacity(capacity),
            gains: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Append one record. A full table doubles first.
    pub fn push(&mut self, record: FrameRecord) {
        if self.is_full() {
            self.grow_to(self.capacity.saturating_mul(2));
        }
        self.offsets.push(record.offset);
        self.lengths.push(record.length);
        self.gains.push(record.gain);
    }

    /// Move to storage of exactly `new_capacity` slots, keeping every record.
    /// Shrinking is ignored.
    pub fn grow_to(&mut self, new_capacity: usize) {
        if new_capacity <= self.capacity {
            return;
        }
        let extra = new_capacity - self.len();
        self.offsets.reserve_exact(extra);
        self.lengths.reserve_exact(extra);
        self.gains.reserve_exact(extra);
        self.capacity = new_capacity;
    }

    /// Make room for `estimated_total` frames up front.
    pub fn reserve(&mut self, estimated_total: usize) {
        self.grow_to(estimated_total);
    }

    /// Truncate to the recorded frames and hand out the columns.
    pub fn into_columns(mut self) -> (Vec<u32>, Vec<u32>, Vec<u8>) {
        self.offsets.shrink_to_fit();
        self.lengths.shrink_to_fit();
        self.gains.shrink_to_fit();
        (self.offsets, self.lengths, self.gains)
    }
}
