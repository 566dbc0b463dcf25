use std::io::{self, Read};

use zstd::zstd_safe;

use crate::{Result, error::ReadError};

/// Compresses `src` into `dst` with a reusable compression context.
pub(crate) fn sized_compress(
    dst: &mut Vec<u8>,
    src: &[u8],
    level: i32,
    cctx: &mut zstd_safe::CCtx,
) -> Result<()> {
    // determine the maximum compressed size
    let max_z_size = zstd_safe::compress_bound(src.len());

    // resize the destination vector to the maximum compressed size
    dst.clear();
    dst.resize(max_z_size, 0);

    // Compress the data using the provided compression context
    let true_size = cctx
        .compress(dst, src, level)
        .map_err(|e| io::Error::other(zstd_safe::get_error_name(e)))?;

    // resize to the true size - clipping the unused tail
    dst.truncate(true_size);

    Ok(())
}

/// Reads until `buf` is full or the reader is exhausted, returning the bytes read.
///
/// Unlike `read_exact` this tells a clean end of input (0 bytes) apart from a partial read.
pub(crate) fn read_fully<R: io::Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Reads exactly `size` bytes into `dst`, reporting a short read as a truncated stream.
///
/// The buffer grows with the bytes actually read, so a corrupt `size` cannot force a large
/// allocation up front.
pub(crate) fn extension_read<R: io::Read>(
    reader: &mut R,
    dst: &mut Vec<u8>,
    size: usize,
    offset: u64,
) -> Result<()> {
    dst.clear();
    reader.take(size as u64).read_to_end(dst)?;
    if dst.len() < size {
        return Err(ReadError::TruncatedStream {
            offset,
            reason: "container body ends early",
        }
        .into());
    }
    Ok(())
}

/// Returns `bytes[*offset..*offset + len]` and advances the offset, or `None` when out of range.
pub(crate) fn slice_and_increment<'a>(
    offset: &mut usize,
    len: usize,
    bytes: &'a [u8],
) -> Option<&'a [u8]> {
    let slice = bytes.get(*offset..offset.checked_add(len)?)?;
    *offset += len;
    Some(slice)
}

/// Reads a little-endian `u64` table of `count` entries
pub(crate) fn read_u64_table(bytes: &[u8], count: usize) -> Option<Vec<u64>> {
    let table = bytes.get(..count.checked_mul(8)?)?;
    Some(
        table
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect(),
    )
}
