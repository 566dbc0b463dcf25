//! Container stream writer
//!
//! [`ContainerStreamWriter`] batches records into slices and containers, drives an
//! optional [`Indexer`], and manages the header and EOF lifecycle of a stream.
//!
//! # Example
//!
//! ```rust
//! use alnstream::{AlignmentHeader, AlignmentRecordBuilder, SortOrder, WriterBuilder};
//!
//! let mut header = AlignmentHeader::new(SortOrder::Coordinate);
//! header.add_reference("chr1", 1000).unwrap();
//!
//! let mut writer = WriterBuilder::new(header).label("example").build(Vec::new()).unwrap();
//! writer.write_header().unwrap();
//!
//! let record = AlignmentRecordBuilder::default()
//!     .name(b"read1")
//!     .reference_index(0)
//!     .alignment_start(10)
//!     .sequence(b"ACGTACGT")
//!     .build()
//!     .unwrap();
//! writer.write_alignment(record).unwrap();
//! writer.finish(true).unwrap();
//! ```
//!
//! # Partitions
//!
//! Workers can write independent partitions by skipping `write_header` and finishing with
//! `finish(false)`. A final writer then writes the header once, [`ingest`]s each partition in
//! order and writes the single EOF container:
//!
//! ```rust
//! use alnstream::{AlignmentHeader, SortOrder, WriterBuilder};
//!
//! let header = AlignmentHeader::new(SortOrder::Coordinate);
//! let builder = WriterBuilder::new(header);
//!
//! let mut partition = builder.clone().build(Vec::new()).unwrap();
//! // ... write records ...
//! partition.finish(false).unwrap();
//! let (bytes, _) = partition.into_parts();
//!
//! let mut aggregate = builder.build(Vec::new()).unwrap();
//! aggregate.write_header().unwrap();
//! aggregate.ingest(&bytes).unwrap();
//! aggregate.finish(true).unwrap();
//! ```
//!
//! [`ingest`]: ContainerStreamWriter::ingest

use std::{io::Cursor, io::Write, ops::Range, sync::Arc};

use crate::{
    AlignmentHeader, AlignmentRecord, DEFAULT_COMPRESSION_LEVEL, DEFAULT_MAX_SLICE_REFERENCES,
    DEFAULT_RECORDS_PER_SLICE, DEFAULT_SLICES_PER_CONTAINER, Error, FileDefinition, Result,
    codec::{ColumnarCodec, RecordCodec},
    core::{AlignmentSpan, Container, ContainerKind, ContainerReader, Slice},
    error::WriteError,
    index::{Indexer, NoIndexer},
    reference::{NoReference, ReferenceSource},
    validation::validate_record,
};

/// Builder for creating [`ContainerStreamWriter`] instances
#[derive(Clone)]
pub struct WriterBuilder {
    header: AlignmentHeader,
    reference: Option<Arc<dyn ReferenceSource + Send + Sync>>,
    label: String,
    records_per_slice: usize,
    slices_per_container: usize,
    max_slice_references: usize,
    compression_level: i32,
}
impl WriterBuilder {
    /// Creates a builder for streams described by `header`
    #[must_use]
    pub fn new(header: AlignmentHeader) -> Self {
        Self {
            header,
            reference: None,
            label: String::new(),
            records_per_slice: DEFAULT_RECORDS_PER_SLICE,
            slices_per_container: DEFAULT_SLICES_PER_CONTAINER,
            max_slice_references: DEFAULT_MAX_SLICE_REFERENCES,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// Set the reference used to diff placed sequences
    #[must_use]
    pub fn reference(mut self, reference: Arc<dyn ReferenceSource + Send + Sync>) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Set the free-text label stored in the file definition
    #[must_use]
    pub fn label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    /// Set the maximum number of records in a slice
    #[must_use]
    pub fn records_per_slice(mut self, records_per_slice: usize) -> Self {
        self.records_per_slice = records_per_slice;
        self
    }

    /// Set the maximum number of slices in a container
    #[must_use]
    pub fn slices_per_container(mut self, slices_per_container: usize) -> Self {
        self.slices_per_container = slices_per_container;
        self
    }

    /// Set the maximum number of distinct references a slice may mix (unsorted streams only)
    #[must_use]
    pub fn max_slice_references(mut self, max_slice_references: usize) -> Self {
        self.max_slice_references = max_slice_references;
        self
    }

    /// Set the zstd compression level of the blocks
    #[must_use]
    pub fn compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    #[must_use]
    pub fn header(&self) -> &AlignmentHeader {
        &self.header
    }

    /// Build a writer without an index
    pub fn build<W: Write>(self, inner: W) -> Result<ContainerStreamWriter<W>> {
        self.build_with_indexer(inner, NoIndexer)
    }

    /// Build a writer reporting every DATA container to `indexer`
    pub fn build_with_indexer<W: Write, I: Indexer>(
        self,
        inner: W,
        indexer: I,
    ) -> Result<ContainerStreamWriter<W, I>> {
        let reference = self
            .reference
            .clone()
            .unwrap_or_else(|| Arc::new(NoReference));
        let codec = ColumnarCodec::new(reference, self.compression_level);
        self.build_with_codec(inner, indexer, codec)
    }

    /// Build a writer with a custom record codec
    pub fn build_with_codec<W: Write, I: Indexer, C: RecordCodec>(
        self,
        inner: W,
        indexer: I,
        codec: C,
    ) -> Result<ContainerStreamWriter<W, I, C>> {
        if self.records_per_slice == 0 {
            return Err(WriteError::InvalidConfiguration("records_per_slice must be positive").into());
        }
        if self.slices_per_container == 0 {
            return Err(
                WriteError::InvalidConfiguration("slices_per_container must be positive").into(),
            );
        }
        if self.max_slice_references == 0 {
            return Err(
                WriteError::InvalidConfiguration("max_slice_references must be positive").into(),
            );
        }
        Ok(ContainerStreamWriter {
            inner,
            indexer,
            codec,
            definition: FileDefinition::new(&self.label),
            coordinate_sorted: self.header.is_coordinate_sorted(),
            header: self.header,
            records_per_slice: self.records_per_slice,
            container_capacity: self
                .records_per_slice
                .saturating_mul(self.slices_per_container),
            max_slice_references: self.max_slice_references,
            pending: PendingRecords::default(),
            state: WriterState::Open,
            header_written: false,
            data_written: false,
            next_container_id: 0,
            bytes_written: 0,
            records_written: 0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    Finished,
    Aborted,
}

/// Records accepted but not yet flushed into a container
#[derive(Default)]
struct PendingRecords(Vec<AlignmentRecord>);
impl Drop for PendingRecords {
    fn drop(&mut self) {
        if !self.0.is_empty() {
            log::warn!(
                "Writer dropped with {} unflushed records; call finish to write them",
                self.0.len()
            );
        }
    }
}

/// Reference context a record contributes to a slice (`None` for unplaced records)
fn record_context(record: &AlignmentRecord) -> Option<usize> {
    if record.is_placed() {
        record.reference_index()
    } else {
        None
    }
}

/// Writes alignment records as a container stream
pub struct ContainerStreamWriter<W: Write, I: Indexer = NoIndexer, C: RecordCodec = ColumnarCodec>
{
    inner: W,
    indexer: I,
    codec: C,
    header: AlignmentHeader,
    definition: FileDefinition,
    coordinate_sorted: bool,

    records_per_slice: usize,
    container_capacity: usize,
    max_slice_references: usize,

    pending: PendingRecords,
    state: WriterState,
    header_written: bool,
    data_written: bool,

    next_container_id: u64,
    bytes_written: u64,
    records_written: u64,
}
impl<W: Write, I: Indexer, C: RecordCodec> ContainerStreamWriter<W, I, C> {
    #[must_use]
    pub fn header(&self) -> &AlignmentHeader {
        &self.header
    }

    /// Bytes written to the sink so far
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Records flushed into DATA containers so far
    #[must_use]
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Number of DATA containers written by this writer
    #[must_use]
    pub fn containers_written(&self) -> u64 {
        self.next_container_id
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state == WriterState::Finished
    }

    #[must_use]
    pub fn indexer(&self) -> &I {
        &self.indexer
    }

    #[must_use]
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Returns the sink and the indexer
    pub fn into_parts(self) -> (W, I) {
        (self.inner, self.indexer)
    }

    fn check_open(&self) -> Result<()> {
        match self.state {
            WriterState::Open => Ok(()),
            WriterState::Finished => Err(WriteError::WriteAfterFinish.into()),
            WriterState::Aborted => Err(WriteError::WriterAborted.into()),
        }
    }

    /// Marks the writer aborted and passes the error through
    fn abort(&mut self, error: Error) -> Error {
        if self.state == WriterState::Open {
            log::error!("Aborting writer: {error}");
            self.state = WriterState::Aborted;
        }
        error
    }

    /// Writes the HEADER container.
    ///
    /// Optional, at most once, and only before any record is accepted.
    /// The header container is never reported to the indexer.
    pub fn write_header(&mut self) -> Result<()> {
        self.check_open()?;
        if self.header_written {
            return Err(WriteError::HeaderAlreadyWritten.into());
        }
        if self.data_written || !self.pending.0.is_empty() {
            return Err(WriteError::HeaderAfterData.into());
        }
        let container = Container::file_header(&self.definition, &self.header);
        if let Err(e) = container.write(&mut self.inner) {
            return Err(self.abort(e));
        }
        self.bytes_written += container.serialized_len();
        self.header_written = true;
        log::debug!("Wrote header container ({} bytes)", container.serialized_len());
        Ok(())
    }

    /// Accepts one record; records are written in batches.
    ///
    /// A record inconsistent with the header cannot be encoded and aborts the writer.
    pub fn write_alignment(&mut self, record: AlignmentRecord) -> Result<()> {
        self.check_open()?;
        if let Err(e) = validate_record(&record, &self.header) {
            return Err(self.abort(WriteError::EncodingFailure(e.to_string()).into()));
        }
        if self.coordinate_sorted
            && let Some(last) = self.pending.0.last()
            && record_context(last) != record_context(&record)
        {
            self.flush_container()?;
        }
        self.pending.0.push(record);
        if self.pending.0.len() >= self.container_capacity {
            self.flush_container()?;
        }
        Ok(())
    }

    /// Splits the pending records into slices
    fn slice_ranges(&self) -> Vec<Range<usize>> {
        let records = &self.pending.0;
        let mut ranges = Vec::new();
        let mut start = 0;
        let mut contexts: Vec<Option<usize>> = Vec::new();
        for (idx, record) in records.iter().enumerate() {
            let context = record_context(record);
            let full = idx - start >= self.records_per_slice;
            let crowded =
                !contexts.contains(&context) && contexts.len() >= self.max_slice_references;
            if idx > start && (full || crowded) {
                ranges.push(start..idx);
                start = idx;
                contexts.clear();
            }
            if !contexts.contains(&context) {
                contexts.push(context);
            }
        }
        if start < records.len() {
            ranges.push(start..records.len());
        }
        ranges
    }

    fn encode_slices(&mut self) -> Result<Vec<Slice>> {
        let ranges = self.slice_ranges();
        let mut slices = Vec::with_capacity(ranges.len());
        for range in ranges {
            let records = &self.pending.0[range];
            let mut blocks = Vec::new();
            self.codec.encode(records, &mut blocks).map_err(|e| match e {
                Error::WriteError(WriteError::EncodingFailure(_)) => e,
                other => WriteError::EncodingFailure(other.to_string()).into(),
            })?;
            slices.push(Slice::new(
                AlignmentSpan::from_records(records),
                records.len(),
                blocks,
            ));
        }
        Ok(slices)
    }

    /// Writes the pending records as one DATA container and reports it to the indexer
    fn flush_container(&mut self) -> Result<()> {
        if self.pending.0.is_empty() {
            return Ok(());
        }
        let container = match self
            .encode_slices()
            .and_then(|slices| Container::data(self.next_container_id, &slices))
        {
            Ok(container) => container,
            Err(e) => return Err(self.abort(e)),
        };
        let offset = self.bytes_written;
        if let Err(e) = container.write(&mut self.inner) {
            return Err(self.abort(e));
        }
        self.bytes_written += container.serialized_len();
        self.records_written += self.pending.0.len() as u64;
        self.next_container_id += 1;
        self.data_written = true;
        self.pending.0.clear();

        log::debug!(
            "Flushed container {} with {} records in {} slices at byte {offset}",
            container.header().container_id,
            container.header().record_count,
            container.header().slice_count,
        );
        let reported = container
            .placement(offset)
            .and_then(|placement| self.indexer.on_container_written(&placement));
        reported.map_err(|e| self.abort(e))
    }

    /// Appends a headerless, EOF-less partition produced by another writer.
    ///
    /// Pending records are flushed first so stream order follows call order. Every DATA
    /// container of the partition is reported to the indexer at its offset in this stream.
    /// Returns the number of containers ingested.
    pub fn ingest(&mut self, partition: &[u8]) -> Result<usize> {
        self.check_open()?;
        self.flush_container()?;

        // validate the whole partition before writing any of it
        let mut containers = Vec::new();
        let mut reader = ContainerReader::new(Cursor::new(partition));
        loop {
            let next = reader
                .next_container()
                .map_err(|e| WriteError::InvalidPartition(e.to_string()))?;
            let Some((offset, container)) = next else {
                break;
            };
            if container.kind() != ContainerKind::Data {
                return Err(WriteError::InvalidPartition(format!(
                    "{:?} container at byte {offset}",
                    container.kind()
                ))
                .into());
            }
            let placement = container
                .placement(offset)
                .map_err(|e| WriteError::InvalidPartition(e.to_string()))?;
            containers.push((offset as usize, placement));
        }

        let base = self.bytes_written;
        for (offset, placement) in &containers {
            let end = offset + placement.byte_size as usize;
            if let Err(e) = self.inner.write_all(&partition[*offset..end]) {
                return Err(self.abort(e.into()));
            }
            self.bytes_written += placement.byte_size;
            self.records_written += u64::from(placement.record_count);
            self.data_written = true;
            let shifted = placement.clone().shifted(base);
            if let Err(e) = self.indexer.on_container_written(&shifted) {
                return Err(self.abort(e));
            }
        }
        log::debug!(
            "Ingested partition of {} bytes with {} containers",
            partition.len(),
            containers.len()
        );
        Ok(containers.len())
    }

    /// Flushes pending records, optionally writes the EOF container, and finishes the indexer.
    ///
    /// The writer is terminal afterwards.
    pub fn finish(&mut self, emit_eof: bool) -> Result<()> {
        self.check_open()?;
        self.flush_container()?;
        if emit_eof {
            let eof = Container::eof();
            if let Err(e) = eof.write(&mut self.inner) {
                return Err(self.abort(e));
            }
            self.bytes_written += eof.serialized_len();
        }
        if let Err(e) = self.inner.flush() {
            return Err(self.abort(e.into()));
        }
        if let Err(e) = self.indexer.finish() {
            return Err(self.abort(e));
        }
        self.state = WriterState::Finished;
        log::debug!(
            "Finished stream: {} records in {} containers, {} bytes",
            self.records_written,
            self.next_container_id,
            self.bytes_written
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{
        AlignmentRecordBuilder, ReaderBuilder, SortOrder,
        core::ContainerHeader,
        index::{ContainerPlacement, LegacyIndexWriter, NativeIndexWriter, SliceIndex},
        testing::{create_records, poly_a_reference, two_reference_header},
    };

    fn builder() -> WriterBuilder {
        WriterBuilder::new(two_reference_header(SortOrder::Coordinate))
            .reference(poly_a_reference())
            .label("test")
    }

    fn containers(bytes: &[u8]) -> Result<Vec<(u64, Container)>> {
        let mut reader = ContainerReader::new(Cursor::new(bytes));
        let mut out = Vec::new();
        while let Some(next) = reader.next_container()? {
            out.push(next);
        }
        Ok(out)
    }

    #[derive(Default)]
    struct Recorder {
        placements: Vec<ContainerPlacement>,
        finished: usize,
    }
    impl Indexer for Recorder {
        fn on_container_written(&mut self, placement: &ContainerPlacement) -> Result<()> {
            self.placements.push(placement.clone());
            Ok(())
        }
        fn finish(&mut self) -> Result<()> {
            self.finished += 1;
            Ok(())
        }
    }

    #[test]
    fn test_lifecycle_layout() -> Result<()> {
        let mut writer = builder().build(Vec::new())?;
        writer.write_header()?;
        for record in create_records(100)? {
            writer.write_alignment(record)?;
        }
        writer.finish(true)?;
        assert_eq!(writer.records_written(), 100);
        let (bytes, _) = writer.into_parts();

        let containers = containers(&bytes)?;
        let kinds: Vec<_> = containers.iter().map(|(_, c)| c.kind()).collect();
        // coordinate sorted: one container per reference
        assert_eq!(
            kinds,
            [ContainerKind::Header, ContainerKind::Data, ContainerKind::Data, ContainerKind::Eof]
        );
        assert_eq!(containers[1].1.header().reference_index, 0);
        assert_eq!(containers[2].1.header().reference_index, 1);
        assert_eq!(containers[2].1.header().container_id, 1);
        assert_eq!(containers[1].1.header().record_count, 50);
        Ok(())
    }

    #[test]
    fn test_slices_and_containers_are_bounded() -> Result<()> {
        let mut writer = builder()
            .records_per_slice(10)
            .slices_per_container(2)
            .build_with_indexer(Vec::new(), Recorder::default())?;
        for record in create_records(100)? {
            writer.write_alignment(record)?;
        }
        writer.finish(false)?;
        let (bytes, recorder) = writer.into_parts();

        // 50 records per reference in containers of at most 20
        assert_eq!(recorder.placements.len(), 6);
        assert_eq!(recorder.finished, 1);
        for placement in &recorder.placements {
            assert!(placement.record_count <= 20);
            assert!(placement.slices.iter().all(|s| s.record_count <= 10));
            assert!(placement.slices.iter().all(|s| s.alignment_span >= 0));
        }
        // no EOF: the stream ends right after the last data container
        let last = recorder.placements.last().unwrap();
        assert_eq!(last.byte_offset + last.byte_size, bytes.len() as u64);
        Ok(())
    }

    #[test]
    fn test_indexer_sees_every_slice_within_bounds() -> Result<()> {
        let mut writer = builder()
            .records_per_slice(7)
            .slices_per_container(3)
            .build_with_indexer(Vec::new(), Recorder::default())?;
        writer.write_header()?;
        for record in create_records(100)? {
            writer.write_alignment(record)?;
        }
        writer.finish(true)?;
        let (bytes, recorder) = writer.into_parts();

        let data: Vec<_> = containers(&bytes)?
            .into_iter()
            .filter(|(_, c)| c.kind() == ContainerKind::Data)
            .collect();
        let total_slices: usize = data.iter().map(|(_, c)| c.header().slice_count as usize).sum();
        let entries: Vec<_> = recorder.placements.iter().flat_map(|p| p.entries()).collect();
        assert_eq!(entries.len(), total_slices);
        for entry in &entries {
            assert!(entry.slice_stream_end() <= bytes.len() as u64);
        }
        for ((offset, container), placement) in data.iter().zip(&recorder.placements) {
            assert_eq!(*offset, placement.byte_offset);
            assert_eq!(container.serialized_len(), placement.byte_size);
        }
        Ok(())
    }

    #[test]
    fn test_empty_finish() -> Result<()> {
        let mut writer = builder().build(Vec::new())?;
        writer.write_header()?;
        writer.finish(true)?;
        let (bytes, _) = writer.into_parts();
        let containers = containers(&bytes)?;
        assert_eq!(containers.len(), 2);
        assert!(containers[1].1.header().is_eof());

        // a bare EOF when no header was written
        let mut writer = builder().build(Vec::new())?;
        writer.finish(true)?;
        let (bytes, _) = writer.into_parts();
        assert_eq!(bytes, ContainerHeader::eof().as_bytes());
        Ok(())
    }

    #[test]
    fn test_write_after_finish() -> Result<()> {
        let mut writer = builder().build(Vec::new())?;
        writer.finish(true)?;
        assert!(writer.is_finished());

        let record = create_records(2)?.remove(0);
        let err = writer.write_alignment(record).unwrap_err();
        assert!(matches!(err, Error::WriteError(WriteError::WriteAfterFinish)));
        assert!(err.is_fatal_write());
        assert!(writer.write_header().is_err());
        assert!(writer.finish(true).is_err());
        assert!(writer.ingest(&[]).is_err());
        Ok(())
    }

    #[test]
    fn test_header_misuse() -> Result<()> {
        let mut writer = builder().build(Vec::new())?;
        writer.write_header()?;
        assert!(matches!(
            writer.write_header(),
            Err(Error::WriteError(WriteError::HeaderAlreadyWritten))
        ));

        let mut writer = builder().build(Vec::new())?;
        writer.write_alignment(create_records(2)?.remove(0))?;
        assert!(matches!(
            writer.write_header(),
            Err(Error::WriteError(WriteError::HeaderAfterData))
        ));
        Ok(())
    }

    #[test]
    fn test_encoding_failure_aborts() -> Result<()> {
        let mut writer = builder().build(Vec::new())?;
        let off_reference = AlignmentRecordBuilder::default()
            .name(b"bad")
            .reference_index(5)
            .alignment_start(1)
            .sequence(b"ACGT")
            .build()?;
        assert!(matches!(
            writer.write_alignment(off_reference),
            Err(Error::WriteError(WriteError::EncodingFailure(_)))
        ));
        assert!(matches!(
            writer.write_alignment(create_records(2)?.remove(0)),
            Err(Error::WriteError(WriteError::WriterAborted))
        ));
        Ok(())
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(builder().records_per_slice(0).build(Vec::new()).is_err());
        assert!(builder().slices_per_container(0).build(Vec::new()).is_err());
        assert!(builder().max_slice_references(0).build(Vec::new()).is_err());
    }

    #[test]
    fn test_unsorted_slices_mix_references() -> Result<()> {
        let mut records = create_records(40)?;
        records.reverse();
        let mut writer = WriterBuilder::new(two_reference_header(SortOrder::Unsorted))
            .max_slice_references(1)
            .build_with_indexer(Vec::new(), Recorder::default())?;
        for record in records.iter().cloned() {
            writer.write_alignment(record)?;
        }
        writer.finish(true)?;
        let (_, recorder) = writer.into_parts();
        // a single container whose two slices each hold one reference
        assert_eq!(recorder.placements.len(), 1);
        let slices = &recorder.placements[0].slices;
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].reference_index, 1);
        assert_eq!(slices[1].reference_index, 0);
        assert_eq!(recorder.placements[0].reference_index, crate::MULTI_REFERENCE);

        let mut writer = WriterBuilder::new(two_reference_header(SortOrder::Unsorted))
            .build_with_indexer(Vec::new(), Recorder::default())?;
        for record in records {
            writer.write_alignment(record)?;
        }
        writer.finish(true)?;
        let (_, recorder) = writer.into_parts();
        assert_eq!(recorder.placements[0].slices.len(), 1);
        assert_eq!(recorder.placements[0].slices[0].reference_index, crate::MULTI_REFERENCE);
        Ok(())
    }

    #[test]
    fn test_ingest_reindexes_partitions() -> Result<()> {
        let records = create_records(100)?;
        let mut partitions = Vec::new();
        for chunk in records.chunks(20) {
            let mut writer = builder().build(Vec::new())?;
            for record in chunk {
                writer.write_alignment(record.clone())?;
            }
            writer.finish(false)?;
            partitions.push(writer.into_parts().0);
        }

        let mut aggregate = builder().build_with_indexer(Vec::new(), Recorder::default())?;
        aggregate.write_header()?;
        let header_len = aggregate.bytes_written();
        for partition in &partitions {
            aggregate.ingest(partition)?;
        }
        aggregate.finish(true)?;
        assert_eq!(aggregate.records_written(), 100);
        let (bytes, recorder) = aggregate.into_parts();

        // byte-for-byte concatenation between one header and one EOF
        let concatenated: Vec<u8> = partitions.concat();
        assert_eq!(&bytes[header_len as usize..bytes.len() - 56], concatenated.as_slice());

        let data: Vec<_> = containers(&bytes)?
            .into_iter()
            .filter(|(_, c)| c.kind() == ContainerKind::Data)
            .map(|(offset, _)| offset)
            .collect();
        let indexed: Vec<_> = recorder.placements.iter().map(|p| p.byte_offset).collect();
        assert_eq!(indexed, data);

        let mut reader = ReaderBuilder::new()
            .reference(poly_a_reference())
            .build(Cursor::new(bytes.as_slice()))?;
        let decoded = reader.iterate()?.collect::<Result<Vec<_>>>()?;
        assert_eq!(decoded, records);
        Ok(())
    }

    #[test]
    fn test_ingest_rejects_framing() -> Result<()> {
        let mut with_header = builder().build(Vec::new())?;
        with_header.write_header()?;
        with_header.finish(false)?;
        let (header_bytes, _) = with_header.into_parts();

        let mut with_eof = builder().build(Vec::new())?;
        with_eof.write_alignment(create_records(2)?.remove(0))?;
        with_eof.finish(true)?;
        let (eof_bytes, _) = with_eof.into_parts();

        let mut aggregate = builder().build(Vec::new())?;
        for bad in [&header_bytes[..], &eof_bytes[..], &eof_bytes[..10]] {
            assert!(matches!(
                aggregate.ingest(bad),
                Err(Error::WriteError(WriteError::InvalidPartition(_)))
            ));
        }
        // nothing was written by the failed attempts
        assert_eq!(aggregate.bytes_written(), 0);
        Ok(())
    }

    #[test]
    fn test_index_writers_attach() -> Result<()> {
        let mut legacy = builder().build_with_indexer(Vec::new(), LegacyIndexWriter::new(Vec::new())?)?;
        let mut native = builder().build_with_indexer(Vec::new(), NativeIndexWriter::new(Vec::new()))?;
        for record in create_records(100)? {
            legacy.write_alignment(record.clone())?;
            native.write_alignment(record)?;
        }
        legacy.finish(true)?;
        native.finish(true)?;

        let (_, legacy_indexer) = legacy.into_parts();
        let (_, native_indexer) = native.into_parts();
        let legacy_index = SliceIndex::from_bytes(&legacy_indexer.into_inner()?)?;
        let native_index = SliceIndex::from_bytes(&native_indexer.into_inner())?;
        assert_eq!(legacy_index.len(), 2);
        assert_eq!(native_index.len(), 2);
        for (a, b) in legacy_index.entries().iter().zip(native_index.entries()) {
            assert_eq!(a.container_offset, b.container_offset);
            assert_eq!(a.slice_offset, b.slice_offset);
            assert_eq!(a.slice_size, b.slice_size);
            assert_eq!(a.span(), b.span());
        }
        Ok(())
    }
}
