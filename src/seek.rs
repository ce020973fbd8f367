use crate::index::FrameIndex;

/// Byte offset to start playback or a cut at `frame`.
///
/// Negative frames clamp to the start of the file, frames at or past the
/// end clamp to the file size.
pub fn seekable_offset(index: &FrameIndex, frame: i64) -> u32 {
    if frame <= 0 {
        0
    } else if frame as u64 >= index.num_frames() as u64 {
        index.file_size_bytes()
    } else {
        index.offsets()[frame as usize]
    }
}

/// [`seekable_offset`] for the frame nearest a time position.
pub fn seekable_offset_at_seconds(index: &FrameIndex, seconds: f64) -> u32 {
    seekable_offset(index, index.seconds_to_frames(seconds))
}

/// Frame containing byte `offset`, or `num_frames` when the offset lies
/// past the last indexed frame.
pub fn frame_at_offset(index: &FrameIndex, offset: u32) -> usize {
    let offsets = index.offsets();
    let after = offsets.partition_point(|&o| o <= offset);
    if after == 0 {
        return 0;
    }
    let frame = after - 1;
    let end = offsets[frame] as u64 + index.lengths()[frame] as u64;
    if (offset as u64) < end {
        frame
    } else {
        index.num_frames()
    }
}
