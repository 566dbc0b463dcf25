//! # Container Layout
//!
//! A stream is a run of containers. Each container starts with a fixed [`ContainerHeader`]
//! and is one of three kinds: a single optional HEADER container carrying the
//! [`FileDefinition`](crate::FileDefinition) and dialect header, any number of DATA containers,
//! and a terminal EOF sentinel.
//!
//! ```text
//! ┌───────────────────┐
//! │ Container Header  │ 56 bytes
//! ├───────────────────┤
//! │     Landmarks     │ 8 bytes per slice
//! ├───────────────────┤
//! │   Slice Header    │ 40 bytes
//! │   Block Offsets   │ 8 bytes per block
//! │  Block │ Block │… │ 24 byte header + payload each
//! ├───────────────────┤
//! │       ...         │ More slices
//! └───────────────────┘
//! ```
//!
//! Landmarks are byte offsets of each slice measured from the first byte of the container,
//! which is what index entries record alongside the container's stream offset.

mod block;
mod container;
mod slice;
pub(crate) mod utils;

pub use block::{Block, BlockHeader, CompressionMethod};
pub use container::{
    CONTAINER_HEADER_SIZE, Container, ContainerHeader, ContainerKind, ContainerReader,
};
pub use slice::{AlignmentSpan, Slice, SliceHeader};
