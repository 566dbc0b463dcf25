use std::io;

use bytemuck::{Pod, Zeroable};

use super::{
    AlignmentSpan, Slice, SliceHeader,
    utils::{extension_read, read_fully, read_u64_table},
};
use crate::{
    AlignmentHeader, CONTAINER_MAGIC, CONTAINER_VERSION, EOF_SENTINEL_START, FileDefinition,
    Result, UNMAPPED_REFERENCE,
    error::ReadError,
    index::{ContainerPlacement, SlicePlacement},
};

/// Size of a container header on disk
pub const CONTAINER_HEADER_SIZE: usize = size_of::<ContainerHeader>();

/// The role a container plays in the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContainerKind {
    Data = 0,
    Header = 1,
    Eof = 2,
}

#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct ContainerHeader {
    magic: [u8; 4],
    kind: u8,
    version: u8,
    reserved: [u8; 2],

    pub reference_index: i32,
    pub record_count: u32,
    pub alignment_start: i64,
    pub alignment_span: i64,

    /// Sequential id local to the writer that produced the container
    pub container_id: u64,

    /// Number of body bytes following the header
    pub length: u64,

    pub slice_count: u32,
    pub block_count: u32,
}
impl ContainerHeader {
    fn with_kind(kind: ContainerKind, span: AlignmentSpan) -> Self {
        Self {
            magic: *CONTAINER_MAGIC,
            kind: kind as u8,
            version: CONTAINER_VERSION,
            reserved: [0; 2],
            reference_index: span.reference_index,
            record_count: 0,
            alignment_start: span.alignment_start,
            alignment_span: span.alignment_span,
            container_id: 0,
            length: 0,
            slice_count: 0,
            block_count: 0,
        }
    }

    /// The fixed end-of-stream sentinel
    #[must_use]
    pub fn eof() -> Self {
        Self::with_kind(
            ContainerKind::Eof,
            AlignmentSpan::new(UNMAPPED_REFERENCE, EOF_SENTINEL_START, 0),
        )
    }

    #[must_use]
    pub fn kind(&self) -> ContainerKind {
        match self.kind {
            1 => ContainerKind::Header,
            2 => ContainerKind::Eof,
            _ => ContainerKind::Data,
        }
    }

    #[must_use]
    pub fn is_eof(&self) -> bool {
        *self == Self::eof()
    }

    #[must_use]
    pub fn span(&self) -> AlignmentSpan {
        AlignmentSpan::new(
            self.reference_index,
            self.alignment_start,
            self.alignment_span,
        )
    }

    /// Size of the container on disk, header included
    #[must_use]
    pub fn total_len(&self) -> u64 {
        (CONTAINER_HEADER_SIZE as u64).saturating_add(self.length)
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Parses and validates a container header found at stream offset `offset`
    pub fn from_bytes(bytes: &[u8], offset: u64) -> Result<Self> {
        let Some(bytes) = bytes.get(..CONTAINER_HEADER_SIZE) else {
            return Err(ReadError::TruncatedStream {
                offset,
                reason: "container header ends early",
            }
            .into());
        };
        let header: Self = bytemuck::pod_read_unaligned(bytes);
        if header.magic != *CONTAINER_MAGIC {
            return Err(ReadError::InvalidContainerMagic(header.magic, offset).into());
        }
        if header.kind > ContainerKind::Eof as u8 {
            return Err(ReadError::UnknownContainerKind(header.kind, offset).into());
        }
        if header.kind() == ContainerKind::Eof && !header.is_eof() {
            return Err(ReadError::Malformed {
                what: "container",
                reason: format!("EOF container at byte {offset} does not match the sentinel"),
            }
            .into());
        }
        Ok(header)
    }
}

/// A serialized container: its header and raw body bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    header: ContainerHeader,
    body: Vec<u8>,
}
impl Container {
    /// Builds a DATA container from encoded slices
    pub fn data(container_id: u64, slices: &[Slice]) -> Result<Self> {
        let span = AlignmentSpan::merge(slices.iter().map(Slice::span));
        let table_len = slices.len() * size_of::<u64>();
        let mut body = Vec::with_capacity(
            table_len + slices.iter().map(Slice::serialized_len).sum::<usize>(),
        );

        let mut landmark = (CONTAINER_HEADER_SIZE + table_len) as u64;
        for slice in slices {
            body.extend_from_slice(&landmark.to_le_bytes());
            landmark += slice.serialized_len() as u64;
        }
        for slice in slices {
            slice.write_to(&mut body)?;
        }

        let mut header = ContainerHeader::with_kind(ContainerKind::Data, span);
        header.container_id = container_id;
        header.record_count = slices.iter().map(|s| s.header().record_count).sum();
        header.slice_count = slices.len() as u32;
        header.block_count = slices.iter().map(|s| s.header().block_count).sum();
        header.length = body.len() as u64;
        Ok(Self { header, body })
    }

    /// Builds the HEADER container carrying the file definition and the dialect header
    #[must_use]
    pub fn file_header(definition: &FileDefinition, header: &AlignmentHeader) -> Self {
        let mut body = definition.as_bytes().to_vec();
        body.extend_from_slice(header.to_text().as_bytes());
        let mut container_header =
            ContainerHeader::with_kind(ContainerKind::Header, AlignmentSpan::unmapped());
        container_header.length = body.len() as u64;
        Self {
            header: container_header,
            body,
        }
    }

    #[must_use]
    pub fn eof() -> Self {
        Self {
            header: ContainerHeader::eof(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    #[must_use]
    pub fn kind(&self) -> ContainerKind {
        self.header.kind()
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    #[must_use]
    pub fn serialized_len(&self) -> u64 {
        self.header.total_len()
    }

    pub fn write<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(self.header.as_bytes())?;
        writer.write_all(&self.body)?;
        Ok(())
    }

    /// Reads the next container starting at stream offset `offset`.
    ///
    /// Returns `None` when the reader is exhausted exactly at a container boundary.
    pub fn read_from<R: io::Read>(reader: &mut R, offset: u64) -> Result<Option<Self>> {
        let mut buf = [0u8; CONTAINER_HEADER_SIZE];
        match read_fully(reader, &mut buf)? {
            0 => return Ok(None),
            n if n < CONTAINER_HEADER_SIZE => {
                return Err(ReadError::TruncatedStream {
                    offset,
                    reason: "container header ends early",
                }
                .into());
            }
            _ => {}
        }
        let header = ContainerHeader::from_bytes(&buf, offset)?;
        let Ok(length) = usize::try_from(header.length) else {
            return Err(ReadError::Malformed {
                what: "container",
                reason: format!("body length {} at byte {offset}", header.length),
            }
            .into());
        };
        let mut body = Vec::new();
        extension_read(reader, &mut body, length, offset)?;
        Ok(Some(Self { header, body }))
    }

    /// Slice offsets relative to the first byte of the container
    pub fn landmarks(&self) -> Result<Vec<u64>> {
        read_u64_table(&self.body, self.header.slice_count as usize).ok_or_else(|| {
            ReadError::Malformed {
                what: "container",
                reason: format!("missing landmarks for {} slices", self.header.slice_count),
            }
            .into()
        })
    }

    /// Returns the (container-relative offset, size) of every slice
    pub fn slice_ranges(&self) -> Result<Vec<(u64, u64)>> {
        if self.kind() != ContainerKind::Data {
            return Ok(Vec::new());
        }
        self.landmarks()?
            .into_iter()
            .map(|landmark| {
                let header = self.slice_header_at(landmark)?;
                let size = (size_of::<SliceHeader>() as u64).checked_add(header.length);
                match size {
                    Some(size)
                        if landmark
                            .checked_add(size)
                            .is_some_and(|end| end <= self.serialized_len()) =>
                    {
                        Ok((landmark, size))
                    }
                    _ => Err(ReadError::Malformed {
                        what: "container",
                        reason: format!(
                            "slice at {landmark} of length {} overruns the container",
                            header.length
                        ),
                    }
                    .into()),
                }
            })
            .collect()
    }

    fn body_at(&self, landmark: u64) -> Result<&[u8]> {
        landmark
            .checked_sub(CONTAINER_HEADER_SIZE as u64)
            .and_then(|start| self.body.get(start as usize..))
            .ok_or_else(|| {
                ReadError::Malformed {
                    what: "container",
                    reason: format!("landmark {landmark} is outside the container body"),
                }
                .into()
            })
    }

    fn slice_header_at(&self, landmark: u64) -> Result<SliceHeader> {
        SliceHeader::from_bytes(self.body_at(landmark)?)
    }

    /// Decodes the slice stored at a landmark
    pub fn slice_at(&self, landmark: u64) -> Result<Slice> {
        Slice::from_bytes(self.body_at(landmark)?)
    }

    /// Parses every slice in landmark order
    pub fn slices(&self) -> Result<Vec<Slice>> {
        self.slice_ranges()?
            .into_iter()
            .map(|(landmark, _)| self.slice_at(landmark))
            .collect()
    }

    /// Describes where this DATA container and its slices sit in the stream
    pub fn placement(&self, byte_offset: u64) -> Result<ContainerPlacement> {
        let slices = self
            .slice_ranges()?
            .into_iter()
            .map(|(landmark, size)| {
                let header = self.slice_header_at(landmark)?;
                Ok(SlicePlacement {
                    reference_index: header.reference_index,
                    alignment_start: header.alignment_start,
                    alignment_span: header.alignment_span,
                    record_count: header.record_count,
                    byte_offset_in_container: landmark,
                    byte_size: size,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ContainerPlacement {
            container_id: self.header.container_id,
            byte_offset,
            byte_size: self.serialized_len(),
            reference_index: self.header.reference_index,
            alignment_start: self.header.alignment_start,
            alignment_span: self.header.alignment_span,
            record_count: self.header.record_count,
            slices,
        })
    }

    /// Parses the body of a HEADER container
    pub fn dialect_header(&self) -> Result<(FileDefinition, AlignmentHeader)> {
        let definition = FileDefinition::from_bytes(&self.body)?;
        let text = std::str::from_utf8(&self.body[size_of::<FileDefinition>()..])?;
        Ok((definition, AlignmentHeader::from_text(text)?))
    }
}

/// Walks the containers of a stream in order, tracking byte offsets
pub struct ContainerReader<R: io::Read> {
    inner: R,
    offset: u64,
}
impl<R: io::Read> ContainerReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_offset(inner, 0)
    }

    /// Starts at a known stream offset
    pub fn with_offset(inner: R, offset: u64) -> Self {
        Self { inner, offset }
    }

    /// Offset of the next container
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the next container and the offset it starts at
    pub fn next_container(&mut self) -> Result<Option<(u64, Container)>> {
        let offset = self.offset;
        let Some(container) = Container::read_from(&mut self.inner, offset)? else {
            return Ok(None);
        };
        self.offset += container.serialized_len();
        Ok(Some((offset, container)))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{SortOrder, core::Block};

    fn sample_slices() -> Vec<Slice> {
        vec![
            Slice::new(
                AlignmentSpan::new(0, 10, 40),
                2,
                vec![Block::raw(1, b"abc".to_vec()), Block::raw(2, b"defg".to_vec())],
            ),
            Slice::new(
                AlignmentSpan::new(0, 30, 100),
                1,
                vec![Block::raw(1, b"h".to_vec())],
            ),
        ]
    }

    #[test]
    fn test_container_header_size() {
        assert_eq!(CONTAINER_HEADER_SIZE, 56);
    }

    #[test]
    fn test_data_container_layout() -> Result<()> {
        let slices = sample_slices();
        let container = Container::data(4, &slices)?;
        let header = container.header();
        assert_eq!(header.container_id, 4);
        assert_eq!(header.record_count, 3);
        assert_eq!(header.slice_count, 2);
        assert_eq!(header.block_count, 3);
        assert_eq!(header.span(), AlignmentSpan::new(0, 10, 120));

        let ranges = container.slice_ranges()?;
        assert_eq!(ranges[0].0, (CONTAINER_HEADER_SIZE + 16) as u64);
        assert_eq!(ranges[1].0, ranges[0].0 + ranges[0].1);
        assert_eq!(ranges[1].0 + ranges[1].1, container.serialized_len());
        assert_eq!(container.slices()?, slices);
        Ok(())
    }

    #[test]
    fn test_placement() -> Result<()> {
        let container = Container::data(0, &sample_slices())?;
        let placement = container.placement(1000)?;
        assert_eq!(placement.byte_offset, 1000);
        assert_eq!(placement.byte_size, container.serialized_len());
        assert_eq!(placement.slices.len(), 2);
        assert_eq!(placement.slices[1].alignment_start, 30);
        assert_eq!(placement.slices[0].record_count, 2);
        Ok(())
    }

    #[test]
    fn test_eof_sentinel() -> Result<()> {
        let eof = Container::eof();
        let mut bytes = Vec::new();
        eof.write(&mut bytes)?;
        assert_eq!(bytes.len(), CONTAINER_HEADER_SIZE);

        let parsed = Container::read_from(&mut Cursor::new(&bytes), 0)?.unwrap();
        assert!(parsed.header().is_eof());
        assert_eq!(parsed.kind(), ContainerKind::Eof);

        // an EOF kind with any other field set is not the sentinel
        let mut forged = ContainerHeader::eof();
        forged.record_count = 1;
        assert!(ContainerHeader::from_bytes(forged.as_bytes(), 0).is_err());
        Ok(())
    }

    #[test]
    fn test_header_container() -> Result<()> {
        let mut header = AlignmentHeader::new(SortOrder::Coordinate);
        header.add_reference("chr1", 500)?;
        let container = Container::file_header(&FileDefinition::new("unit"), &header);
        assert_eq!(container.kind(), ContainerKind::Header);
        assert!(container.slice_ranges()?.is_empty());

        let (definition, parsed) = container.dialect_header()?;
        assert_eq!(definition.label(), "unit");
        assert_eq!(parsed, header);
        Ok(())
    }

    #[test]
    fn test_container_reader() -> Result<()> {
        let mut bytes = Vec::new();
        let first = Container::data(0, &sample_slices())?;
        let second = Container::data(1, &sample_slices()[1..])?;
        first.write(&mut bytes)?;
        second.write(&mut bytes)?;
        Container::eof().write(&mut bytes)?;

        let mut reader = ContainerReader::new(Cursor::new(&bytes));
        let (offset, container) = reader.next_container()?.unwrap();
        assert_eq!((offset, container), (0, first.clone()));
        let (offset, _) = reader.next_container()?.unwrap();
        assert_eq!(offset, first.serialized_len());
        let (_, eof) = reader.next_container()?.unwrap();
        assert!(eof.header().is_eof());
        assert!(reader.next_container()?.is_none());
        assert_eq!(reader.offset(), bytes.len() as u64);
        Ok(())
    }

    #[test]
    fn test_truncation_and_bad_magic() -> Result<()> {
        let mut bytes = Vec::new();
        Container::data(0, &sample_slices())?.write(&mut bytes)?;

        let short_body = Container::read_from(&mut Cursor::new(&bytes[..bytes.len() - 3]), 0);
        assert!(short_body.is_err_and(|e| e.is_truncation()));

        let short_header = Container::read_from(&mut Cursor::new(&bytes[..20]), 0);
        assert!(short_header.is_err_and(|e| e.is_truncation()));

        let mut bad = bytes.clone();
        bad[..4].copy_from_slice(b"JUNK");
        assert!(matches!(
            Container::read_from(&mut Cursor::new(&bad), 0),
            Err(crate::Error::ReadError(ReadError::InvalidContainerMagic(_, 0)))
        ));

        let mut bad_kind = bytes;
        bad_kind[4] = 9;
        assert!(matches!(
            Container::read_from(&mut Cursor::new(&bad_kind), 0),
            Err(crate::Error::ReadError(ReadError::UnknownContainerKind(9, 0)))
        ));
        Ok(())
    }

    #[test]
    fn test_oversized_slice_length() -> Result<()> {
        let mut bytes = Vec::new();
        Container::data(0, &sample_slices()[1..])?.write(&mut bytes)?;

        // slice header follows the single landmark; its length field sits at bytes 32..40
        let length_at = CONTAINER_HEADER_SIZE + size_of::<u64>() + 32;
        bytes[length_at..length_at + 8].copy_from_slice(&u64::MAX.to_le_bytes());

        let container = Container::read_from(&mut Cursor::new(&bytes), 0)?.unwrap();
        assert!(matches!(
            container.slice_ranges(),
            Err(crate::Error::ReadError(ReadError::Malformed { .. }))
        ));
        assert!(container.slices().is_err());
        assert!(container.placement(0).is_err());
        Ok(())
    }

    #[test]
    fn test_oversized_body_length_is_truncation() {
        let mut header =
            ContainerHeader::with_kind(ContainerKind::Data, AlignmentSpan::new(0, 1, 1));
        header.length = 1 << 46;
        let result = Container::read_from(&mut Cursor::new(header.as_bytes()), 0);
        assert!(result.is_err_and(|e| e.is_truncation()));
    }
}
