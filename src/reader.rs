//! Container stream reader
//!
//! [`ContainerStreamReader`] decodes a stream sequentially with [`iterate`], or, given a
//! [`SliceIndex`], decodes only the slices overlapping a set of [`QueryInterval`]s with
//! [`query`]. Both paths share the slice decoding routine and apply the reader's
//! [`ValidationStringency`] to recoverable problems.
//!
//! [`iterate`]: ContainerStreamReader::iterate
//! [`query`]: ContainerStreamReader::query

use std::{
    collections::VecDeque,
    fs::File,
    io::{Cursor, Read, Seek, SeekFrom},
    path::Path,
    sync::Arc,
};

use memmap2::Mmap;

use crate::{
    AlignmentHeader, AlignmentRecord, DEFAULT_COMPRESSION_LEVEL, FileDefinition, Result,
    codec::{ColumnarCodec, RecordCodec},
    core::{
        CONTAINER_HEADER_SIZE, Container, ContainerHeader, ContainerKind, ContainerReader, Slice,
        utils::read_fully,
    },
    error::{IndexError, ReadError},
    index::{IndexEntry, SliceIndex},
    reference::{NoReference, ReferenceSource},
    region::{QueryInterval, optimize_intervals},
    validation::{ValidationStringency, validate_record},
};

/// Builder for creating [`ContainerStreamReader`] instances
#[derive(Clone, Default)]
pub struct ReaderBuilder {
    reference: Option<Arc<dyn ReferenceSource + Send + Sync>>,
    stringency: ValidationStringency,
    index: Option<SliceIndex>,
}
impl ReaderBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reference used to restore reference-diffed sequences
    #[must_use]
    pub fn reference(mut self, reference: Arc<dyn ReferenceSource + Send + Sync>) -> Self {
        self.reference = Some(reference);
        self
    }

    #[must_use]
    pub fn stringency(mut self, stringency: ValidationStringency) -> Self {
        self.stringency = stringency;
        self
    }

    /// Attach a parsed index
    #[must_use]
    pub fn index(mut self, index: SliceIndex) -> Self {
        self.index = Some(index);
        self
    }

    /// Attach an index from its bytes (either format)
    pub fn index_bytes(self, bytes: &[u8]) -> Result<Self> {
        Ok(self.index(SliceIndex::from_bytes(bytes)?))
    }

    /// Attach an index from a file (either format)
    pub fn index_path<P: AsRef<Path>>(self, path: P) -> Result<Self> {
        Ok(self.index(SliceIndex::from_path(path)?))
    }

    pub fn build<R: Read + Seek>(self, inner: R) -> Result<ContainerStreamReader<R>> {
        let reference = self
            .reference
            .clone()
            .unwrap_or_else(|| Arc::new(NoReference));
        let codec = ColumnarCodec::new(reference, DEFAULT_COMPRESSION_LEVEL);
        self.build_with_codec(inner, codec)
    }

    /// Memory-maps a stream file
    pub fn build_from_path<P: AsRef<Path>>(
        self,
        path: P,
    ) -> Result<ContainerStreamReader<Cursor<Mmap>>> {
        let file = File::open(path)?;

        // Load the mmap
        let inner = unsafe { Mmap::map(&file) }?;
        self.build(Cursor::new(inner))
    }

    pub fn build_with_codec<R: Read + Seek, C: RecordCodec>(
        self,
        mut inner: R,
        codec: C,
    ) -> Result<ContainerStreamReader<R, C>> {
        let stream_len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;

        let mut header = None;
        let mut data_start = 0;
        match Container::read_from(&mut inner, 0) {
            Ok(Some(container)) if container.kind() == ContainerKind::Header => {
                let (definition, dialect) = container.dialect_header()?;
                log::debug!(
                    "Opened stream written by {:?} (format {}.{}) with {} references",
                    definition.label(),
                    definition.major,
                    definition.minor,
                    dialect.num_references()
                );
                header = Some((definition, dialect));
                data_start = container.serialized_len();
            }
            Ok(_) => log::debug!("Opened stream without a header container"),
            // left for iteration to report under the reader's stringency
            Err(e) if e.is_truncation() => {}
            Err(e) => return Err(e),
        }

        Ok(ContainerStreamReader {
            inner,
            codec,
            stringency: self.stringency,
            index: self.index,
            header,
            data_start,
            stream_len,
        })
    }
}

/// Reads records from a container stream
pub struct ContainerStreamReader<R: Read + Seek, C: RecordCodec = ColumnarCodec> {
    inner: R,
    codec: C,
    stringency: ValidationStringency,
    index: Option<SliceIndex>,
    header: Option<(FileDefinition, AlignmentHeader)>,
    data_start: u64,
    stream_len: u64,
}
impl<R: Read + Seek> ContainerStreamReader<R> {
    /// Opens a stream with default settings and no index
    pub fn new(inner: R) -> Result<Self> {
        ReaderBuilder::new().build(inner)
    }
}
impl ContainerStreamReader<Cursor<Mmap>> {
    /// Memory-maps a stream file with default settings and no index
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        ReaderBuilder::new().build_from_path(path)
    }
}
impl<R: Read + Seek, C: RecordCodec> ContainerStreamReader<R, C> {
    /// The dialect header of the stream, if it starts with a header container
    #[must_use]
    pub fn header(&self) -> Option<&AlignmentHeader> {
        self.header.as_ref().map(|(_, header)| header)
    }

    #[must_use]
    pub fn file_definition(&self) -> Option<&FileDefinition> {
        self.header.as_ref().map(|(definition, _)| definition)
    }

    #[must_use]
    pub fn stringency(&self) -> ValidationStringency {
        self.stringency
    }

    #[must_use]
    pub fn index(&self) -> Option<&SliceIndex> {
        self.index.as_ref()
    }

    pub fn set_index(&mut self, index: Option<SliceIndex>) {
        self.index = index;
    }

    /// Total length of the stream in bytes
    #[must_use]
    pub fn stream_len(&self) -> u64 {
        self.stream_len
    }

    /// Offset of the first container after the header container
    #[must_use]
    pub fn data_start(&self) -> u64 {
        self.data_start
    }

    /// Iterates every record of the stream in write order
    pub fn iterate(&mut self) -> Result<RecordIter<'_, R, C>> {
        self.inner.seek(SeekFrom::Start(self.data_start))?;
        Ok(RecordIter {
            containers: ContainerReader::with_offset(&mut self.inner, self.data_start),
            decoder: SliceDecoder {
                codec: &mut self.codec,
                header: self.header.as_ref().map(|(_, header)| header),
                stringency: self.stringency,
            },
            has_header: self.header.is_some(),
            buffer: VecDeque::new(),
            done: false,
        })
    }

    /// Iterates the records overlapping (or, with `contained`, lying within) any interval.
    ///
    /// Intervals on references the header does not declare are skipped and reported by
    /// [`QueryIter::skipped_intervals`]. The index must be coordinate sorted, and every
    /// selected slice must lie within the stream.
    pub fn query(
        &mut self,
        intervals: &[QueryInterval],
        contained: bool,
    ) -> Result<QueryIter<'_, R, C>> {
        let Some(index) = self.index.as_ref() else {
            return Err(IndexError::IndexMissing.into());
        };

        let num_references = self.header.as_ref().map(|(_, h)| h.num_references());
        let (valid, skipped): (Vec<QueryInterval>, Vec<QueryInterval>) =
            intervals.iter().partition(|interval| {
                interval.is_unmapped()
                    || (interval.reference_index() >= 0
                        && num_references
                            .is_none_or(|n| (interval.reference_index() as usize) < n))
            });
        for interval in &skipped {
            let error = IndexError::RegionOutOfRange {
                reference_index: interval.reference_index(),
                num_references: num_references.unwrap_or_default(),
            };
            log::warn!("Skipping query interval {interval}: {error}");
        }

        index.validate_sorted()?;
        let entries = index.lookup(&optimize_intervals(&valid));
        for entry in &entries {
            check_bounds(entry, self.stream_len)?;
        }
        log::debug!(
            "Query over {} intervals selected {} slices",
            valid.len(),
            entries.len()
        );

        Ok(QueryIter {
            inner: &mut self.inner,
            decoder: SliceDecoder {
                codec: &mut self.codec,
                header: self.header.as_ref().map(|(_, header)| header),
                stringency: self.stringency,
            },
            entries: entries.into(),
            intervals: valid,
            skipped,
            contained,
            buffer: VecDeque::new(),
            done: false,
        })
    }

    /// Iterates the unplaced records
    pub fn query_unmapped(&mut self) -> Result<QueryIter<'_, R, C>> {
        self.query(&[QueryInterval::unmapped()], false)
    }
}

fn corrupt(entry: &IndexEntry, reason: &str) -> crate::Error {
    IndexError::IndexCorrupt(format!(
        "slice at {}+{} ({} bytes): {reason}",
        entry.container_offset, entry.slice_offset, entry.slice_size
    ))
    .into()
}

/// Checks an entry's byte range against the stream it is used with
fn check_bounds(entry: &IndexEntry, stream_len: u64) -> Result<()> {
    if entry.slice_stream_end() > stream_len {
        return Err(corrupt(entry, &format!("beyond the stream length {stream_len}")));
    }
    if entry.slice_offset < CONTAINER_HEADER_SIZE as u64 {
        return Err(corrupt(entry, "overlaps the container header"));
    }
    if let Some(container_size) = entry.container_size
        && entry.slice_offset.saturating_add(entry.slice_size) > container_size
    {
        return Err(corrupt(entry, &format!("beyond the container size {container_size}")));
    }
    Ok(())
}

/// Decodes slices into records and applies record validation
struct SliceDecoder<'a, C: RecordCodec> {
    codec: &'a mut C,
    header: Option<&'a AlignmentHeader>,
    stringency: ValidationStringency,
}
impl<C: RecordCodec> SliceDecoder<'_, C> {
    fn decode_into(
        &mut self,
        slice: &Slice,
        out: &mut VecDeque<AlignmentRecord>,
        keep: impl Fn(&AlignmentRecord) -> bool,
    ) -> Result<()> {
        let mut records = Vec::with_capacity(slice.record_count());
        self.codec.decode(slice, &mut records)?;
        for record in records {
            if let Some(header) = self.header
                && let Err(e) = validate_record(&record, header)
            {
                self.stringency.handle(e.into())?;
                continue;
            }
            if keep(&record) {
                out.push_back(record);
            }
        }
        Ok(())
    }
}

/// Sequential iterator over the records of a stream
pub struct RecordIter<'a, R: Read + Seek, C: RecordCodec> {
    containers: ContainerReader<&'a mut R>,
    decoder: SliceDecoder<'a, C>,
    has_header: bool,
    buffer: VecDeque<AlignmentRecord>,
    done: bool,
}
impl<R: Read + Seek, C: RecordCodec> RecordIter<'_, R, C> {
    /// Decodes the next container into the buffer; returns false once the stream is over
    fn advance(&mut self) -> Result<bool> {
        let stringency = self.decoder.stringency;
        let (offset, container) = match self.containers.next_container() {
            Ok(Some(next)) => next,
            Ok(None) => {
                stringency.handle(
                    ReadError::TruncatedStream {
                        offset: self.containers.offset(),
                        reason: "stream ends without an EOF container",
                    }
                    .into(),
                )?;
                return Ok(false);
            }
            Err(e) if e.is_truncation() => {
                stringency.handle(e)?;
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        match container.kind() {
            ContainerKind::Data => {
                for slice in container.slices()? {
                    self.decoder.decode_into(&slice, &mut self.buffer, |_| true)?;
                }
                Ok(true)
            }
            ContainerKind::Header => {
                let error = if self.has_header {
                    ReadError::DuplicateHeader(offset)
                } else {
                    ReadError::HeaderAfterData(offset)
                };
                stringency.handle(error.into())?;
                Ok(true)
            }
            // bytes after the EOF container are never decoded
            ContainerKind::Eof => {
                if let Ok(Some((next, trailing))) = self.containers.next_container()
                    && trailing.kind() != ContainerKind::Eof
                {
                    stringency.handle(ReadError::DataAfterEof(next).into())?;
                }
                Ok(false)
            }
        }
    }
}
impl<R: Read + Seek, C: RecordCodec> Iterator for RecordIter<'_, R, C> {
    type Item = Result<AlignmentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Some(Ok(record));
            }
            if self.done {
                return None;
            }
            match self.advance() {
                Ok(true) => {}
                Ok(false) => self.done = true,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Iterator over the records selected by an indexed query
pub struct QueryIter<'a, R: Read + Seek, C: RecordCodec> {
    inner: &'a mut R,
    decoder: SliceDecoder<'a, C>,
    entries: VecDeque<IndexEntry>,
    intervals: Vec<QueryInterval>,
    skipped: Vec<QueryInterval>,
    contained: bool,
    buffer: VecDeque<AlignmentRecord>,
    done: bool,
}
impl<R: Read + Seek, C: RecordCodec> QueryIter<'_, R, C> {
    /// Intervals dropped because their reference is not declared by the header
    #[must_use]
    pub fn skipped_intervals(&self) -> &[QueryInterval] {
        &self.skipped
    }

    /// Number of slices still to be decoded
    #[must_use]
    pub fn remaining_slices(&self) -> usize {
        self.entries.len()
    }

    fn read_slice(&mut self, entry: &IndexEntry) -> Result<Slice> {
        self.inner.seek(SeekFrom::Start(entry.container_offset))?;
        let mut buf = [0u8; CONTAINER_HEADER_SIZE];
        if read_fully(self.inner, &mut buf)? < CONTAINER_HEADER_SIZE {
            return Err(corrupt(entry, "container header is cut short"));
        }
        let header = ContainerHeader::from_bytes(&buf, entry.container_offset)
            .map_err(|e| corrupt(entry, &e.to_string()))?;
        if header.kind() != ContainerKind::Data {
            return Err(corrupt(entry, "not a data container"));
        }
        if entry.slice_offset.saturating_add(entry.slice_size) > header.total_len() {
            return Err(corrupt(entry, "beyond the end of its container"));
        }

        self.inner.seek(SeekFrom::Start(entry.slice_stream_offset()))?;
        let mut bytes = vec![0u8; entry.slice_size as usize];
        if read_fully(self.inner, &mut bytes)? < bytes.len() {
            return Err(corrupt(entry, "slice is cut short"));
        }
        let slice = Slice::from_bytes(&bytes).map_err(|e| corrupt(entry, &e.to_string()))?;
        if slice.serialized_len() != bytes.len() {
            return Err(corrupt(entry, "slice size disagrees with the slice header"));
        }
        Ok(slice)
    }

    fn advance(&mut self) -> Result<bool> {
        let Some(entry) = self.entries.pop_front() else {
            return Ok(false);
        };
        let slice = self.read_slice(&entry)?;
        let intervals = &self.intervals;
        let contained = self.contained;
        self.decoder.decode_into(&slice, &mut self.buffer, |record| {
            intervals.iter().any(|interval| {
                if contained {
                    interval.contains_record(record)
                } else {
                    interval.overlaps_record(record)
                }
            })
        })?;
        Ok(true)
    }
}
impl<R: Read + Seek, C: RecordCodec> Iterator for QueryIter<'_, R, C> {
    type Item = Result<AlignmentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Some(Ok(record));
            }
            if self.done {
                return None;
            }
            match self.advance() {
                Ok(true) => {}
                Ok(false) => self.done = true,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
