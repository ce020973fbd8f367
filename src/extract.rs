//! Byte-exact extraction of a contiguous frame span.
//!
//! Frames are copied as they are in the source, without decoding or header
//! rewriting. Layer III frames may borrow bits from earlier frames (the bit
//! reservoir), so the first frames of a cut can decode incompletely.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{IndexError, Result};
use crate::index::FrameIndex;

fn check_range(index: &FrameIndex, start: usize, count: usize) -> Result<()> {
    let in_range = start
        .checked_add(count)
        .map_or(false, |end| end <= index.num_frames());
    if !in_range {
        return Err(IndexError::Range {
            start,
            count,
            num_frames: index.num_frames(),
        });
    }
    Ok(())
}

/// Copy frames `start..start + count` of `source` into a new file at `dest`,
/// replacing it if present. Returns the number of bytes written.
///
/// `dest` must not be the source file itself.
pub fn extract(source: &Path, index: &FrameIndex, start: usize, count: usize, dest: &Path) -> Result<u64> {
    check_range(index, start, count)?;

    let dest_err = |e: std::io::Error| IndexError::Io {
        path: dest.to_path_buf(),
        source: e,
    };

    let input = File::open(source).map_err(|source_err| IndexError::Open {
        path: source.to_path_buf(),
        source: source_err,
    })?;
    if same_file(source, dest) {
        return Err(dest_err(std::io::Error::new(
            ErrorKind::InvalidInput,
            "destination is the source file",
        )));
    }
    let output = File::create(dest).map_err(dest_err)?;

    let mut writer = BufWriter::new(output);
    let written = copy_frames(&mut BufReader::new(input), index, start, count, &mut writer)
        .map_err(|e| match e {
            CopyError::Read(e) => IndexError::Transfer(e),
            CopyError::Write(e) => dest_err(e),
        })?;
    writer.flush().map_err(dest_err)?;

    log::info!(
        "Extracted frames {}..{} ({} bytes) to {}",
        start,
        start + count,
        written,
        dest.display()
    );
    Ok(written)
}

/// Copy frames `start..start + count` from a reader positioned at byte 0 of
/// the indexed stream into `writer`.
///
/// Read and write failures both surface as [`IndexError::Transfer`]; only
/// [`extract`] knows the destination path.
pub fn extract_to<R, W>(reader: &mut R, index: &FrameIndex, start: usize, count: usize, writer: &mut W) -> Result<u64>
where
    R: Read + Seek,
    W: Write,
{
    check_range(index, start, count)?;
    copy_frames(reader, index, start, count, writer).map_err(|e| match e {
        CopyError::Read(e) | CopyError::Write(e) => IndexError::Transfer(e),
    })
}

enum CopyError {
    Read(std::io::Error),
    Write(std::io::Error),
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn copy_frames<R, W>(
    reader: &mut R,
    index: &FrameIndex,
    start: usize,
    count: usize,
    writer: &mut W,
) -> std::result::Result<u64, CopyError>
where
    R: Read + Seek,
    W: Write,
{
    let frames = start..start + count;
    if index.layer() == 3 && start > 0 && count > 0 {
        log::debug!("Cut starts at layer III frame {}; bit reservoir is not repaired", start);
    }

    let max_len = index.lengths()[frames.clone()].iter().copied().max().unwrap_or(0);
    let mut buffer = vec![0u8; max_len as usize];

    let mut pos: u64 = 0;
    let mut written: u64 = 0;
    for frame in frames {
        let offset = index.offsets()[frame] as u64;
        let len = index.lengths()[frame] as usize;

        if offset > pos {
            reader
                .seek(SeekFrom::Current((offset - pos) as i64))
                .map_err(CopyError::Read)?;
        } else if offset < pos {
            reader.seek(SeekFrom::Start(offset)).map_err(CopyError::Read)?;
        }
        pos = offset;

        reader.read_exact(&mut buffer[..len]).map_err(CopyError::Read)?;
        writer.write_all(&buffer[..len]).map_err(CopyError::Write)?;
        pos += len as u64;
        written += len as u64;
    }

    Ok(written)
}
