//! # alnstream
//!
//! A block-structured container format for genomic alignments with reference compression
//! and positional indexes.
//!
//! A stream is a sequence of containers: an optional HEADER container carrying the
//! [`FileDefinition`] and the textual [`AlignmentHeader`], DATA containers holding slices of
//! compressed record columns, and an optional EOF container. Partitions written without a
//! header or EOF container can be concatenated byte for byte into one valid stream.
//!
//! Streams are written with a [`ContainerStreamWriter`] and read sequentially or through an
//! index with a [`ContainerStreamReader`]. Two index layouts are supported: a
//! legacy-compatible fixed-width index ([`LegacyIndexWriter`]) and a native framed index
//! ([`NativeIndexWriter`]).
//!
//! ```rust
//! use std::io::Cursor;
//! use alnstream::{
//!     AlignmentHeader, AlignmentRecordBuilder, LegacyIndexWriter, QueryInterval,
//!     ReaderBuilder, SortOrder, WriterBuilder,
//! };
//!
//! let mut header = AlignmentHeader::new(SortOrder::Coordinate);
//! header.add_reference("chr1", 10_000).unwrap();
//!
//! let indexer = LegacyIndexWriter::new(Vec::new()).unwrap();
//! let mut writer = WriterBuilder::new(header).build_with_indexer(Vec::new(), indexer).unwrap();
//! writer.write_header().unwrap();
//! for start in [100, 200, 300] {
//!     let record = AlignmentRecordBuilder::default()
//!         .name(b"read")
//!         .reference_index(0)
//!         .alignment_start(start)
//!         .sequence(b"ACGTACGTAC")
//!         .build()
//!         .unwrap();
//!     writer.write_alignment(record).unwrap();
//! }
//! writer.finish(true).unwrap();
//!
//! let (stream, indexer) = writer.into_parts();
//! let index = indexer.into_inner().unwrap();
//!
//! let mut reader = ReaderBuilder::new()
//!     .index_bytes(&index)
//!     .unwrap()
//!     .build(Cursor::new(stream))
//!     .unwrap();
//! let hits = reader.query(&[QueryInterval::new(0, 195, 205)], false).unwrap().count();
//! assert_eq!(hits, 1);
//! ```

pub mod codec;
pub mod core;
pub mod error;
pub mod header;
pub mod index;
pub mod parallel;
pub mod reader;
pub mod record;
pub mod reference;
pub mod region;
pub mod validation;
pub mod writer;

#[cfg(test)]
mod testing;

pub use error::{Error, IntoAlnstreamError, Result};
pub use header::{AlignmentHeader, FileDefinition, ReferenceSequence, SortOrder};
pub use index::{Indexer, LegacyIndexWriter, NativeIndexWriter, NoIndexer, SliceIndex};
pub use reader::{ContainerStreamReader, QueryIter, ReaderBuilder, RecordIter};
pub use record::{AlignmentRecord, AlignmentRecordBuilder};
pub use reference::{InMemoryReferenceSource, NoReference, ReferenceSource};
pub use region::QueryInterval;
pub use validation::ValidationStringency;
pub use writer::{ContainerStreamWriter, WriterBuilder};

/// Magic number of the file definition
pub const FILE_MAGIC: &[u8; 4] = b"ALNS";

/// Format version written by this library
pub const FORMAT_MAJOR: u8 = 1;
pub const FORMAT_MINOR: u8 = 0;

pub const CONTAINER_MAGIC: &[u8; 4] = b"CNTR";
pub const CONTAINER_VERSION: u8 = 1;

pub const SLICE_MAGIC: &[u8; 3] = b"SLC";
pub const SLICE_VERSION: u8 = 1;

pub const NATIVE_INDEX_MAGIC: &[u8; 8] = b"ALNSNIDX";
pub const NATIVE_INDEX_VERSION: u32 = 1;

/// Reference index of slices and containers holding unplaced records
pub const UNMAPPED_REFERENCE: i32 = -1;

/// Reference index of slices and containers mixing several references
pub const MULTI_REFERENCE: i32 = -2;

/// Alignment start stored in the EOF container
pub const EOF_SENTINEL_START: i64 = 4_542_278;

pub const DEFAULT_RECORDS_PER_SLICE: usize = 10_000;
pub const DEFAULT_SLICES_PER_CONTAINER: usize = 1;
pub const DEFAULT_MAX_SLICE_REFERENCES: usize = 8;
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;
