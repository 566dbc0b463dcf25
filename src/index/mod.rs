//! # Stream Indexes
//!
//! Writers report every DATA container they emit to an [`Indexer`] as a
//! [`ContainerPlacement`]: the container's stream offset and size plus the span and
//! container-relative byte range of each of its slices. Two indexers serialize these events:
//!
//! - [`LegacyIndexWriter`]: fixed-width tuples, one per slice, as a zstd-compressed stream.
//! - [`NativeIndexWriter`]: uncompressed, framed per container with a header and footer.
//!
//! [`SliceIndex`] loads either format (detected from its leading bytes) and answers the
//! slice lookups behind region queries.

mod legacy;
mod native;

use std::{fs::File, io, path::Path};

use auto_impl::auto_impl;

pub use legacy::{LEGACY_ENTRY_SIZE, LegacyIndexWriter};
pub use native::{NativeEntry, NativeFooter, NativeFrameHeader, NativeIndexHeader, NativeIndexWriter};

use crate::{
    NATIVE_INDEX_MAGIC, Result, UNMAPPED_REFERENCE,
    core::{AlignmentSpan, ContainerKind, ContainerReader},
    error::IndexError,
    region::QueryInterval,
};

/// Leading bytes of a zstd frame
pub const ZSTD_FRAME_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Where a slice landed within its container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlicePlacement {
    pub reference_index: i32,
    pub alignment_start: i64,
    pub alignment_span: i64,
    pub record_count: u32,
    /// Offset of the slice from the first byte of its container
    pub byte_offset_in_container: u64,
    pub byte_size: u64,
}

/// Where a DATA container landed in the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerPlacement {
    pub container_id: u64,
    pub byte_offset: u64,
    pub byte_size: u64,
    pub reference_index: i32,
    pub alignment_start: i64,
    pub alignment_span: i64,
    pub record_count: u32,
    pub slices: Vec<SlicePlacement>,
}
impl ContainerPlacement {
    /// Shifts the placement by `offset` bytes, e.g. when a partition is appended to a stream
    #[must_use]
    pub fn shifted(mut self, offset: u64) -> Self {
        self.byte_offset += offset;
        self
    }

    /// Index entries for each slice of the container
    pub fn entries(&self) -> impl Iterator<Item = IndexEntry> + '_ {
        self.slices.iter().map(|slice| IndexEntry {
            reference_index: slice.reference_index,
            alignment_start: slice.alignment_start,
            alignment_span: slice.alignment_span,
            record_count: Some(slice.record_count),
            container_offset: self.byte_offset,
            container_size: Some(self.byte_size),
            slice_offset: slice.byte_offset_in_container,
            slice_size: slice.byte_size,
        })
    }
}

/// Receives DATA container placements as they are written
#[auto_impl(&mut, Box)]
pub trait Indexer {
    /// Called once per DATA container, before the next container's bytes are written
    fn on_container_written(&mut self, placement: &ContainerPlacement) -> Result<()>;

    /// Flushes the index; called once after the writer finishes
    fn finish(&mut self) -> Result<()>;
}

/// An indexer that discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIndexer;
impl Indexer for NoIndexer {
    fn on_container_written(&mut self, _placement: &ContainerPlacement) -> Result<()> {
        Ok(())
    }
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// On-disk index layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Legacy,
    Native,
}
impl IndexFormat {
    /// Detects the format from the leading bytes of an index
    pub fn detect(bytes: &[u8]) -> Result<Self> {
        if bytes.starts_with(NATIVE_INDEX_MAGIC) {
            Ok(Self::Native)
        } else if bytes.starts_with(&ZSTD_FRAME_MAGIC) {
            Ok(Self::Legacy)
        } else {
            Err(IndexError::UnknownFormat.into())
        }
    }

    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Legacy => "lai",
            Self::Native => "nai",
        }
    }
}

/// One indexed slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexEntry {
    pub reference_index: i32,
    pub alignment_start: i64,
    pub alignment_span: i64,
    /// Only recorded by the native format
    pub record_count: Option<u32>,
    pub container_offset: u64,
    /// Only recorded by the native format
    pub container_size: Option<u64>,
    pub slice_offset: u64,
    pub slice_size: u64,
}
impl IndexEntry {
    #[must_use]
    pub fn span(&self) -> AlignmentSpan {
        AlignmentSpan::new(
            self.reference_index,
            self.alignment_start,
            self.alignment_span,
        )
    }

    /// Stream offset of the slice
    #[must_use]
    pub fn slice_stream_offset(&self) -> u64 {
        self.container_offset.saturating_add(self.slice_offset)
    }

    /// Stream offset one past the last byte of the slice
    #[must_use]
    pub fn slice_stream_end(&self) -> u64 {
        self.slice_stream_offset().saturating_add(self.slice_size)
    }

    /// Coordinate order key: by reference with unplaced slices last, then by start
    fn sort_key(&self) -> (bool, i32, i64) {
        (
            self.reference_index == UNMAPPED_REFERENCE,
            self.reference_index,
            self.alignment_start,
        )
    }
}

/// The slice entries of an index, in the order they were written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceIndex {
    format: IndexFormat,
    entries: Vec<IndexEntry>,
}
impl SliceIndex {
    #[must_use]
    pub fn new(format: IndexFormat, entries: Vec<IndexEntry>) -> Self {
        Self { format, entries }
    }

    /// Parses an index in either format
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let format = IndexFormat::detect(bytes)?;
        let entries = match format {
            IndexFormat::Legacy => legacy::read_entries(bytes)?,
            IndexFormat::Native => native::read_entries(bytes)?,
        };
        log::debug!("Loaded {format:?} index with {} entries", entries.len());
        Ok(Self { format, entries })
    }

    pub fn from_reader<R: io::Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_reader(File::open(path)?)
    }

    #[must_use]
    pub fn format(&self) -> IndexFormat {
        self.format
    }

    #[must_use]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks the entries are in coordinate order and every slice is single-reference
    pub fn validate_sorted(&self) -> Result<()> {
        if let Some(idx) = self.entries.iter().position(|e| e.span().is_multi()) {
            return Err(IndexError::UnsortedIndex(idx).into());
        }
        if let Some(idx) = self
            .entries
            .windows(2)
            .position(|pair| pair[0].sort_key() > pair[1].sort_key())
        {
            return Err(IndexError::UnsortedIndex(idx + 1).into());
        }
        Ok(())
    }

    /// Returns the entries whose spans overlap any of the intervals, in stream order.
    ///
    /// The index must be coordinate sorted (see [`SliceIndex::validate_sorted`]).
    #[must_use]
    pub fn lookup(&self, intervals: &[QueryInterval]) -> Vec<IndexEntry> {
        let mut hits: Vec<IndexEntry> = Vec::new();
        for interval in intervals {
            let key = (
                interval.is_unmapped(),
                interval.reference_index(),
                i64::MIN,
            );
            let first = self.entries.partition_point(|e| e.sort_key() < key);
            hits.extend(
                self.entries[first..]
                    .iter()
                    .take_while(|e| {
                        e.reference_index == interval.reference_index()
                            && (interval.is_unmapped() || e.alignment_start <= interval.end())
                    })
                    .filter(|e| interval.overlaps_span(&e.span())),
            );
        }
        hits.sort_unstable_by_key(|e| (e.container_offset, e.slice_offset));
        hits.dedup_by_key(|e| (e.container_offset, e.slice_offset));
        hits
    }
}

/// Scans an existing stream and reports each of its DATA containers to `indexer`.
///
/// Scanning stops at the EOF container. The indexer is finished before returning
/// the number of containers indexed.
pub fn build_index<R: io::Read, I: Indexer>(reader: R, mut indexer: I) -> Result<usize> {
    let mut containers = ContainerReader::new(reader);
    let mut indexed = 0;
    while let Some((offset, container)) = containers.next_container()? {
        match container.kind() {
            ContainerKind::Data => {
                indexer.on_container_written(&container.placement(offset)?)?;
                indexed += 1;
            }
            ContainerKind::Header => {}
            ContainerKind::Eof => break,
        }
    }
    indexer.finish()?;
    log::debug!("Indexed {indexed} containers");
    Ok(indexed)
}
