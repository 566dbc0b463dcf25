//! Legacy-compatible index layout.
//!
//! One fixed-width little-endian tuple per slice, in write order, compressed as a single
//! zstd stream:
//!
//! ```text
//! reference_index:i32 alignment_start:i32 alignment_span:i32
//! container_offset:i64 slice_offset:i32 slice_size:i32
//! ```

use std::io::{self, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use zstd::stream::write::Encoder;

use super::{ContainerPlacement, IndexEntry, Indexer};
use crate::{DEFAULT_COMPRESSION_LEVEL, Result, error::IndexError};

/// Size of one uncompressed entry
pub const LEGACY_ENTRY_SIZE: usize = 28;

fn narrow(field: &'static str, value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| IndexError::FieldOverflow { field, value }.into())
}

fn narrow_u64(field: &'static str, value: u64) -> Result<i32> {
    let wide = i64::try_from(value).map_err(|_| IndexError::FieldOverflow {
        field,
        value: i64::MAX,
    })?;
    narrow(field, wide)
}

/// Writes the legacy-compatible index as containers are reported
pub struct LegacyIndexWriter<W: Write> {
    encoder: Option<Encoder<'static, W>>,
    inner: Option<W>,
    buffer: Vec<u8>,
    entries_written: usize,
}
impl<W: Write> LegacyIndexWriter<W> {
    pub fn new(inner: W) -> Result<Self> {
        Self::with_level(inner, DEFAULT_COMPRESSION_LEVEL)
    }

    pub fn with_level(inner: W, level: i32) -> Result<Self> {
        Ok(Self {
            encoder: Some(Encoder::new(inner, level)?),
            inner: None,
            buffer: Vec::with_capacity(LEGACY_ENTRY_SIZE),
            entries_written: 0,
        })
    }

    #[must_use]
    pub fn entries_written(&self) -> usize {
        self.entries_written
    }

    /// Returns the index sink, finishing the compressed stream if needed
    pub fn into_inner(mut self) -> Result<W> {
        if self.inner.is_none() {
            self.finish()?;
        }
        self.inner
            .take()
            .ok_or_else(|| IndexError::AlreadyFinished.into())
    }

    fn encode_entry(&mut self, entry: &IndexEntry) -> Result<()> {
        self.buffer.clear();
        self.buffer
            .write_i32::<LittleEndian>(entry.reference_index)?;
        self.buffer
            .write_i32::<LittleEndian>(narrow("alignment_start", entry.alignment_start)?)?;
        self.buffer
            .write_i32::<LittleEndian>(narrow("alignment_span", entry.alignment_span)?)?;
        let container_offset = i64::try_from(entry.container_offset).map_err(|_| {
            IndexError::FieldOverflow {
                field: "container_offset",
                value: i64::MAX,
            }
        })?;
        self.buffer.write_i64::<LittleEndian>(container_offset)?;
        self.buffer
            .write_i32::<LittleEndian>(narrow_u64("slice_offset", entry.slice_offset)?)?;
        self.buffer
            .write_i32::<LittleEndian>(narrow_u64("slice_size", entry.slice_size)?)?;
        Ok(())
    }
}
impl<W: Write> Indexer for LegacyIndexWriter<W> {
    fn on_container_written(&mut self, placement: &ContainerPlacement) -> Result<()> {
        if self.encoder.is_none() {
            return Err(IndexError::AlreadyFinished.into());
        }
        for entry in placement.entries() {
            self.encode_entry(&entry)?;
            if let Some(encoder) = self.encoder.as_mut() {
                encoder.write_all(&self.buffer)?;
            }
            self.entries_written += 1;
            log::trace!(
                "Legacy index entry: reference {} start {} at {}+{}",
                entry.reference_index,
                entry.alignment_start,
                entry.container_offset,
                entry.slice_offset
            );
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let Some(encoder) = self.encoder.take() else {
            return Err(IndexError::AlreadyFinished.into());
        };
        let mut inner = encoder.finish()?;
        inner.flush()?;
        self.inner = Some(inner);
        log::debug!("Finished legacy index with {} entries", self.entries_written);
        Ok(())
    }
}

/// Decodes every entry of a legacy index
pub(crate) fn read_entries(bytes: &[u8]) -> Result<Vec<IndexEntry>> {
    let raw = zstd::stream::decode_all(bytes)
        .map_err(|e| IndexError::InvalidFraming(format!("legacy index stream: {e}")))?;
    if raw.len() % LEGACY_ENTRY_SIZE != 0 {
        return Err(IndexError::InvalidFraming(format!(
            "{} bytes is not a whole number of {LEGACY_ENTRY_SIZE}-byte entries",
            raw.len()
        ))
        .into());
    }
    raw.chunks_exact(LEGACY_ENTRY_SIZE)
        .map(|mut chunk| parse_entry(&mut chunk))
        .collect()
}

fn parse_entry<R: io::Read>(reader: &mut R) -> Result<IndexEntry> {
    let reference_index = reader.read_i32::<LittleEndian>()?;
    let alignment_start = i64::from(reader.read_i32::<LittleEndian>()?);
    let alignment_span = i64::from(reader.read_i32::<LittleEndian>()?);
    let container_offset = reader.read_i64::<LittleEndian>()?;
    let slice_offset = reader.read_i32::<LittleEndian>()?;
    let slice_size = reader.read_i32::<LittleEndian>()?;
    let (Ok(container_offset), Ok(slice_offset), Ok(slice_size)) = (
        u64::try_from(container_offset),
        u64::try_from(slice_offset),
        u64::try_from(slice_size),
    ) else {
        return Err(IndexError::IndexCorrupt(format!(
            "negative byte range {container_offset}+{slice_offset} ({slice_size} bytes)"
        ))
        .into());
    };
    Ok(IndexEntry {
        reference_index,
        alignment_start,
        alignment_span,
        record_count: None,
        container_offset,
        container_size: None,
        slice_offset,
        slice_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexFormat, SliceIndex, SlicePlacement};

    fn placement(byte_offset: u64, spans: &[(i32, i64, i64)]) -> ContainerPlacement {
        let mut slice_offset = 72;
        let slices = spans
            .iter()
            .map(|&(reference_index, alignment_start, alignment_span)| {
                let slice = SlicePlacement {
                    reference_index,
                    alignment_start,
                    alignment_span,
                    record_count: 10,
                    byte_offset_in_container: slice_offset,
                    byte_size: 500,
                };
                slice_offset += 500;
                slice
            })
            .collect();
        ContainerPlacement {
            container_id: 0,
            byte_offset,
            byte_size: slice_offset,
            reference_index: spans[0].0,
            alignment_start: spans[0].1,
            alignment_span: spans[0].2,
            record_count: 10 * spans.len() as u32,
            slices,
        }
    }

    #[test]
    fn test_write_and_read() -> Result<()> {
        let mut writer = LegacyIndexWriter::new(Vec::new())?;
        writer.on_container_written(&placement(100, &[(0, 1, 50), (0, 40, 80)]))?;
        writer.on_container_written(&placement(1200, &[(1, 5, 10)]))?;
        assert_eq!(writer.entries_written(), 3);
        let bytes = writer.into_inner()?;

        assert_eq!(IndexFormat::detect(&bytes)?, IndexFormat::Legacy);
        let index = SliceIndex::from_bytes(&bytes)?;
        let entries = index.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].container_offset, 100);
        assert_eq!(entries[1].slice_offset, 572);
        assert_eq!(entries[1].alignment_start, 40);
        assert_eq!(entries[2].reference_index, 1);
        assert_eq!(entries[2].record_count, None);
        Ok(())
    }

    #[test]
    fn test_empty_index() -> Result<()> {
        let mut writer = LegacyIndexWriter::new(Vec::new())?;
        writer.finish()?;
        let bytes = writer.into_inner()?;
        assert!(SliceIndex::from_bytes(&bytes)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_finish_twice() -> Result<()> {
        let mut writer = LegacyIndexWriter::new(Vec::new())?;
        writer.finish()?;
        assert!(matches!(
            writer.finish(),
            Err(crate::Error::IndexError(IndexError::AlreadyFinished))
        ));
        assert!(writer.on_container_written(&placement(0, &[(0, 1, 1)])).is_err());
        Ok(())
    }

    #[test]
    fn test_field_overflow() -> Result<()> {
        let mut writer = LegacyIndexWriter::new(Vec::new())?;
        let mut oversized = placement(0, &[(0, 1, 1)]);
        oversized.slices[0].byte_size = 1 << 40;
        assert!(matches!(
            writer.on_container_written(&oversized),
            Err(crate::Error::IndexError(IndexError::FieldOverflow {
                field: "slice_size",
                ..
            }))
        ));
        Ok(())
    }

    #[test]
    fn test_partial_entry() -> Result<()> {
        let bytes = zstd::stream::encode_all(&[0u8; LEGACY_ENTRY_SIZE + 3][..], 3)?;
        assert!(matches!(
            SliceIndex::from_bytes(&bytes),
            Err(crate::Error::IndexError(IndexError::InvalidFraming(_)))
        ));
        Ok(())
    }
}
