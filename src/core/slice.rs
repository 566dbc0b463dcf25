use bytemuck::{Pod, Zeroable};

use super::{Block, utils::read_u64_table};
use crate::{
    AlignmentRecord, MULTI_REFERENCE, Result, SLICE_MAGIC, SLICE_VERSION, UNMAPPED_REFERENCE,
    error::ReadError,
};

/// The reference interval covered by a slice or container.
///
/// Placed spans are 1-based and closed. The sentinel reference indices
/// [`UNMAPPED_REFERENCE`] and [`MULTI_REFERENCE`] carry a zero start and span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlignmentSpan {
    pub reference_index: i32,
    pub alignment_start: i64,
    pub alignment_span: i64,
}
impl AlignmentSpan {
    #[must_use]
    pub const fn new(reference_index: i32, alignment_start: i64, alignment_span: i64) -> Self {
        Self {
            reference_index,
            alignment_start,
            alignment_span,
        }
    }

    #[must_use]
    pub const fn unmapped() -> Self {
        Self::new(UNMAPPED_REFERENCE, 0, 0)
    }

    #[must_use]
    pub const fn multi() -> Self {
        Self::new(MULTI_REFERENCE, 0, 0)
    }

    #[must_use]
    pub fn is_unmapped(&self) -> bool {
        self.reference_index == UNMAPPED_REFERENCE
    }

    #[must_use]
    pub fn is_multi(&self) -> bool {
        self.reference_index == MULTI_REFERENCE
    }

    /// Inclusive end of a placed span
    #[must_use]
    pub fn alignment_end(&self) -> i64 {
        self.alignment_start + self.alignment_span - 1
    }

    /// Derives the span of a run of records
    #[must_use]
    pub fn from_records(records: &[AlignmentRecord]) -> Self {
        Self::merge(records.iter().map(|record| {
            match (record.is_placed(), record.reference_index()) {
                (true, Some(reference_index)) => Self::new(
                    reference_index as i32,
                    record.alignment_start(),
                    record.alignment_span(),
                ),
                _ => Self::unmapped(),
            }
        }))
    }

    /// Unions spans on a shared reference; mixing references yields a multi-reference span
    pub fn merge(spans: impl IntoIterator<Item = Self>) -> Self {
        let mut merged: Option<Self> = None;
        for span in spans {
            merged = Some(match merged {
                None => span,
                Some(acc) if acc.is_multi() || span.is_multi() => Self::multi(),
                Some(acc) if acc.reference_index != span.reference_index => Self::multi(),
                Some(acc) if acc.is_unmapped() => acc,
                Some(acc) => {
                    let start = acc.alignment_start.min(span.alignment_start);
                    let end = acc.alignment_end().max(span.alignment_end());
                    Self::new(acc.reference_index, start, end - start + 1)
                }
            });
        }
        merged.unwrap_or_else(Self::unmapped)
    }
}

#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct SliceHeader {
    magic: [u8; 3],
    version: u8,

    pub reference_index: i32,
    pub alignment_start: i64,
    pub alignment_span: i64,

    pub record_count: u32,
    pub block_count: u32,

    /// Bytes following the header (block offset table and blocks)
    pub length: u64,
}
impl SliceHeader {
    #[must_use]
    pub fn span(&self) -> AlignmentSpan {
        AlignmentSpan::new(
            self.reference_index,
            self.alignment_start,
            self.alignment_span,
        )
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Some(bytes) = bytes.get(..size_of::<Self>()) else {
            return Err(ReadError::Malformed {
                what: "slice",
                reason: format!("{} bytes cannot hold a slice header", bytes.len()),
            }
            .into());
        };
        let header: Self = bytemuck::pod_read_unaligned(bytes);
        if header.magic != *SLICE_MAGIC {
            return Err(ReadError::InvalidSliceMagic(header.magic).into());
        }
        if header.alignment_span < 0 {
            return Err(ReadError::Malformed {
                what: "slice",
                reason: format!("negative alignment span {}", header.alignment_span),
            }
            .into());
        }
        Ok(header)
    }
}

/// A bounded run of records stored as one block per column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    header: SliceHeader,
    blocks: Vec<Block>,
}
impl Slice {
    #[must_use]
    pub fn new(span: AlignmentSpan, record_count: usize, blocks: Vec<Block>) -> Self {
        let length = (blocks.len() * size_of::<u64>()
            + blocks.iter().map(Block::serialized_len).sum::<usize>()) as u64;
        Self {
            header: SliceHeader {
                magic: *SLICE_MAGIC,
                version: SLICE_VERSION,
                reference_index: span.reference_index,
                alignment_start: span.alignment_start,
                alignment_span: span.alignment_span,
                record_count: record_count as u32,
                block_count: blocks.len() as u32,
                length,
            },
            blocks,
        }
    }

    #[must_use]
    pub fn header(&self) -> &SliceHeader {
        &self.header
    }

    #[must_use]
    pub fn span(&self) -> AlignmentSpan {
        self.header.span()
    }

    #[must_use]
    pub fn record_count(&self) -> usize {
        self.header.record_count as usize
    }

    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Looks up a block by its content id
    #[must_use]
    pub fn block(&self, content_id: u8) -> Option<&Block> {
        self.blocks.iter().find(|b| b.content_id() == content_id)
    }

    /// Size of the slice on disk
    #[must_use]
    pub fn serialized_len(&self) -> usize {
        usize::try_from(self.header.length)
            .map_or(usize::MAX, |length| size_of::<SliceHeader>().saturating_add(length))
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(self.header.as_bytes());
        let mut offset = 0u64;
        for block in &self.blocks {
            out.extend_from_slice(&offset.to_le_bytes());
            offset += block.serialized_len() as u64;
        }
        for block in &self.blocks {
            block.write(out)?;
        }
        Ok(())
    }

    /// Parses a slice occupying the front of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = SliceHeader::from_bytes(bytes)?;
        let malformed = |reason: String| ReadError::Malformed {
            what: "slice",
            reason,
        };
        let body_start = size_of::<SliceHeader>();
        let body = usize::try_from(header.length)
            .ok()
            .and_then(|len| body_start.checked_add(len))
            .and_then(|end| bytes.get(body_start..end));
        let Some(body) = body else {
            return Err(malformed(format!(
                "declared length {} exceeds the {} available bytes",
                header.length,
                bytes.len() - body_start
            ))
            .into());
        };
        let block_count = header.block_count as usize;
        let Some(offsets) = read_u64_table(body, block_count) else {
            return Err(malformed(format!("missing offset table for {block_count} blocks")).into());
        };
        let blocks_start = block_count * size_of::<u64>();
        let mut blocks = Vec::with_capacity(block_count);
        for offset in offsets {
            let block_bytes = usize::try_from(offset)
                .ok()
                .and_then(|offset| blocks_start.checked_add(offset))
                .and_then(|start| body.get(start..));
            let Some(block_bytes) = block_bytes else {
                return Err(malformed(format!("block offset {offset} out of range")).into());
            };
            let (block, _) = Block::from_bytes(block_bytes)?;
            blocks.push(block);
        }
        log::trace!(
            "Parsed slice on reference {} with {} records in {} blocks",
            header.reference_index,
            header.record_count,
            blocks.len()
        );
        Ok(Self { header, blocks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AlignmentRecordBuilder;

    fn placed(reference_index: usize, start: i64, sequence: &[u8]) -> AlignmentRecord {
        AlignmentRecordBuilder::default()
            .reference_index(reference_index)
            .alignment_start(start)
            .sequence(sequence)
            .build()
            .unwrap()
    }

    fn unplaced() -> AlignmentRecord {
        AlignmentRecordBuilder::default()
            .sequence(b"ACGT")
            .build()
            .unwrap()
    }

    #[test]
    fn test_slice_header_size() {
        assert_eq!(size_of::<SliceHeader>(), 40);
    }

    #[test]
    fn test_span_single_reference() {
        let records = vec![placed(1, 10, b"ACGT"), placed(1, 4, b"AC"), placed(1, 12, b"A")];
        let span = AlignmentSpan::from_records(&records);
        assert_eq!(span, AlignmentSpan::new(1, 4, 10));
        assert_eq!(span.alignment_end(), 13);
    }

    #[test]
    fn test_span_sentinels() {
        assert_eq!(AlignmentSpan::from_records(&[]), AlignmentSpan::unmapped());
        assert_eq!(
            AlignmentSpan::from_records(&[unplaced(), unplaced()]),
            AlignmentSpan::unmapped()
        );
        assert!(AlignmentSpan::from_records(&[placed(0, 1, b"A"), placed(1, 1, b"A")]).is_multi());
        assert!(AlignmentSpan::from_records(&[placed(0, 1, b"A"), unplaced()]).is_multi());
    }

    #[test]
    fn test_merge_container_spans() {
        let merged = AlignmentSpan::merge([
            AlignmentSpan::new(0, 100, 50),
            AlignmentSpan::new(0, 120, 100),
        ]);
        assert_eq!(merged, AlignmentSpan::new(0, 100, 120));
        assert!(AlignmentSpan::merge([AlignmentSpan::new(0, 1, 1), AlignmentSpan::multi()]).is_multi());
    }

    #[test]
    fn test_slice_round_trip() -> Result<()> {
        let blocks = vec![
            Block::raw(1, b"first".to_vec()),
            Block::raw(4, b"second column".to_vec()),
        ];
        let slice = Slice::new(AlignmentSpan::new(0, 5, 20), 3, blocks);
        let mut bytes = Vec::new();
        slice.write_to(&mut bytes)?;
        assert_eq!(bytes.len(), slice.serialized_len());

        let parsed = Slice::from_bytes(&bytes)?;
        assert_eq!(parsed, slice);
        assert_eq!(parsed.record_count(), 3);
        assert_eq!(
            parsed.block(4).map(|b| b.decode().unwrap().to_vec()),
            Some(b"second column".to_vec())
        );
        assert!(parsed.block(9).is_none());
        Ok(())
    }

    #[test]
    fn test_slice_rejects_bad_input() -> Result<()> {
        let slice = Slice::new(AlignmentSpan::unmapped(), 1, vec![Block::raw(1, b"x".to_vec())]);
        let mut bytes = Vec::new();
        slice.write_to(&mut bytes)?;

        assert!(Slice::from_bytes(&bytes[..bytes.len() - 1]).is_err());

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(matches!(
            Slice::from_bytes(&bad_magic),
            Err(crate::Error::ReadError(ReadError::InvalidSliceMagic(_)))
        ));
        Ok(())
    }
}
