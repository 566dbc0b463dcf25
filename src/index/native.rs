//! Native index layout.
//!
//! Uncompressed and self-describing: a header, one frame per DATA container, and a footer
//! carrying totals that let a reader verify it saw every frame.
//!
//! ```text
//! ┌───────────────────┐
//! │   Index Header    │ 16 bytes
//! ├───────────────────┤
//! │   Frame Header    │ 32 bytes (container offset, size, id, entry count)
//! │   Entry │ Entry … │ 40 bytes each
//! ├───────────────────┤
//! │       ...         │ More frames
//! ├───────────────────┤
//! │   Index Footer    │ 24 bytes
//! └───────────────────┘
//! ```

use std::io::Write;

use bytemuck::{Pod, Zeroable};

use super::{ContainerPlacement, IndexEntry, Indexer};
use crate::{NATIVE_INDEX_MAGIC, NATIVE_INDEX_VERSION, Result, error::IndexError};

/// The header of a native index.
///
/// This is stored identically in memory and on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
pub struct NativeIndexHeader {
    magic: [u8; 8],
    pub version: u32,
    reserved: u32,
}
impl Default for NativeIndexHeader {
    fn default() -> Self {
        Self {
            magic: *NATIVE_INDEX_MAGIC,
            version: NATIVE_INDEX_VERSION,
            reserved: 0,
        }
    }
}

/// Describes the container a run of entries belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
pub struct NativeFrameHeader {
    pub container_offset: u64,
    pub container_size: u64,
    pub container_id: u64,
    pub entry_count: u32,
    /// Bytes of entries following the frame header
    pub frame_len: u32,
}

/// One slice of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
pub struct NativeEntry {
    pub reference_index: i32,
    pub record_count: u32,
    pub alignment_start: i64,
    pub alignment_span: i64,
    pub slice_offset: u64,
    pub slice_size: u64,
}

/// Totals written after the last frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
pub struct NativeFooter {
    pub total_frames: u64,
    pub total_entries: u64,
    magic: [u8; 8],
}

/// Writes the native index as containers are reported
pub struct NativeIndexWriter<W: Write> {
    inner: W,
    header_written: bool,
    finished: bool,
    total_frames: u64,
    total_entries: u64,
    buffer: Vec<u8>,
}
impl<W: Write> NativeIndexWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            header_written: false,
            finished: false,
            total_frames: 0,
            total_entries: 0,
            buffer: Vec::new(),
        }
    }

    #[must_use]
    pub fn entries_written(&self) -> u64 {
        self.total_entries
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn ensure_header(&mut self) -> Result<()> {
        if !self.header_written {
            self.inner
                .write_all(bytemuck::bytes_of(&NativeIndexHeader::default()))?;
            self.header_written = true;
        }
        Ok(())
    }
}
impl<W: Write> Indexer for NativeIndexWriter<W> {
    fn on_container_written(&mut self, placement: &ContainerPlacement) -> Result<()> {
        if self.finished {
            return Err(IndexError::AlreadyFinished.into());
        }
        self.ensure_header()?;

        self.buffer.clear();
        for slice in &placement.slices {
            let entry = NativeEntry {
                reference_index: slice.reference_index,
                record_count: slice.record_count,
                alignment_start: slice.alignment_start,
                alignment_span: slice.alignment_span,
                slice_offset: slice.byte_offset_in_container,
                slice_size: slice.byte_size,
            };
            self.buffer.extend_from_slice(bytemuck::bytes_of(&entry));
        }
        let frame = NativeFrameHeader {
            container_offset: placement.byte_offset,
            container_size: placement.byte_size,
            container_id: placement.container_id,
            entry_count: placement.slices.len() as u32,
            frame_len: u32::try_from(self.buffer.len()).map_err(|_| {
                IndexError::InvalidFraming(format!(
                    "container {} has too many slices",
                    placement.container_id
                ))
            })?,
        };
        self.inner.write_all(bytemuck::bytes_of(&frame))?;
        self.inner.write_all(&self.buffer)?;

        self.total_frames += 1;
        self.total_entries += placement.slices.len() as u64;
        log::trace!(
            "Native index frame for container {} at {} with {} entries",
            placement.container_id,
            placement.byte_offset,
            placement.slices.len()
        );
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Err(IndexError::AlreadyFinished.into());
        }
        self.ensure_header()?;
        let footer = NativeFooter {
            total_frames: self.total_frames,
            total_entries: self.total_entries,
            magic: *NATIVE_INDEX_MAGIC,
        };
        self.inner.write_all(bytemuck::bytes_of(&footer))?;
        self.inner.flush()?;
        self.finished = true;
        log::debug!(
            "Finished native index with {} frames and {} entries",
            self.total_frames,
            self.total_entries
        );
        Ok(())
    }
}

fn framing(reason: String) -> crate::Error {
    IndexError::InvalidFraming(reason).into()
}

/// Decodes every entry of a native index, verifying the framing
pub(crate) fn read_entries(bytes: &[u8]) -> Result<Vec<IndexEntry>> {
    const HEADER: usize = size_of::<NativeIndexHeader>();
    const FRAME: usize = size_of::<NativeFrameHeader>();
    const ENTRY: usize = size_of::<NativeEntry>();
    const FOOTER: usize = size_of::<NativeFooter>();

    if bytes.len() < HEADER + FOOTER {
        return Err(framing(format!("{} bytes is too short", bytes.len())));
    }
    let header: NativeIndexHeader = bytemuck::pod_read_unaligned(&bytes[..HEADER]);
    if header.magic != *NATIVE_INDEX_MAGIC {
        return Err(IndexError::UnknownFormat.into());
    }
    if header.version != NATIVE_INDEX_VERSION {
        return Err(framing(format!("unsupported version {}", header.version)));
    }
    let footer_start = bytes.len() - FOOTER;
    let footer: NativeFooter = bytemuck::pod_read_unaligned(&bytes[footer_start..]);
    if footer.magic != *NATIVE_INDEX_MAGIC {
        return Err(framing("missing footer".to_string()));
    }

    let mut entries = Vec::with_capacity(footer.total_entries.min(1 << 20) as usize);
    let mut frames = 0u64;
    let mut pos = HEADER;
    while pos < footer_start {
        let Some(frame_bytes) = bytes.get(pos..pos + FRAME).filter(|_| pos + FRAME <= footer_start)
        else {
            return Err(framing(format!("frame header at {pos} runs into the footer")));
        };
        let frame: NativeFrameHeader = bytemuck::pod_read_unaligned(frame_bytes);
        pos += FRAME;
        if frame.frame_len as usize != frame.entry_count as usize * ENTRY {
            return Err(framing(format!(
                "frame of container {} declares {} entries in {} bytes",
                frame.container_id, frame.entry_count, frame.frame_len
            )));
        }
        let end = pos + frame.frame_len as usize;
        if end > footer_start {
            return Err(framing(format!(
                "frame of container {} runs into the footer",
                frame.container_id
            )));
        }
        for chunk in bytes[pos..end].chunks_exact(ENTRY) {
            let entry: NativeEntry = bytemuck::pod_read_unaligned(chunk);
            entries.push(IndexEntry {
                reference_index: entry.reference_index,
                alignment_start: entry.alignment_start,
                alignment_span: entry.alignment_span,
                record_count: Some(entry.record_count),
                container_offset: frame.container_offset,
                container_size: Some(frame.container_size),
                slice_offset: entry.slice_offset,
                slice_size: entry.slice_size,
            });
        }
        pos = end;
        frames += 1;
    }

    if frames != footer.total_frames || entries.len() as u64 != footer.total_entries {
        return Err(framing(format!(
            "footer declares {} frames and {} entries but found {frames} and {}",
            footer.total_frames,
            footer.total_entries,
            entries.len()
        )));
    }
    Ok(entries)
}
