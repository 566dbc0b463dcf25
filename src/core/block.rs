use std::{borrow::Cow, io};

use bytemuck::{Pod, Zeroable};
use zstd::zstd_safe;

use super::utils::sized_compress;
use crate::{Result, error::ReadError};

/// How the payload of a block is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionMethod {
    Raw = 0,
    Zstd = 1,
}
impl TryFrom<u8> for CompressionMethod {
    type Error = crate::Error;
    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Raw),
            1 => Ok(Self::Zstd),
            _ => Err(ReadError::UnknownBlockMethod(value).into()),
        }
    }
}

#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct BlockHeader {
    /// Column tag of the payload
    pub content_id: u8,
    method: u8,
    reserved: [u8; 6],

    /// Decoded payload length
    pub raw_len: u64,

    /// Stored payload length
    pub len: u64,
}
impl BlockHeader {
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Some(bytes) = bytes.get(..size_of::<Self>()) else {
            return Err(ReadError::Malformed {
                what: "block",
                reason: format!("{} bytes cannot hold a block header", bytes.len()),
            }
            .into());
        };
        let header: Self = bytemuck::pod_read_unaligned(bytes);
        CompressionMethod::try_from(header.method)?;
        Ok(header)
    }
}

/// A single column of a slice, optionally zstd compressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    content_id: u8,
    method: CompressionMethod,
    raw_len: u64,
    data: Vec<u8>,
}
impl Block {
    /// Stores `data` uncompressed
    pub fn raw(content_id: u8, data: Vec<u8>) -> Self {
        Self {
            content_id,
            method: CompressionMethod::Raw,
            raw_len: data.len() as u64,
            data,
        }
    }

    /// Compresses `raw` with zstd, keeping it uncompressed when that is not smaller
    pub fn compressed(
        content_id: u8,
        raw: &[u8],
        level: i32,
        cctx: &mut zstd_safe::CCtx,
    ) -> Result<Self> {
        if raw.is_empty() {
            return Ok(Self::raw(content_id, Vec::new()));
        }
        let mut z = Vec::new();
        sized_compress(&mut z, raw, level, cctx)?;
        if z.len() >= raw.len() {
            return Ok(Self::raw(content_id, raw.to_vec()));
        }
        Ok(Self {
            content_id,
            method: CompressionMethod::Zstd,
            raw_len: raw.len() as u64,
            data: z,
        })
    }

    pub fn content_id(&self) -> u8 {
        self.content_id
    }

    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            content_id: self.content_id,
            method: self.method as u8,
            reserved: [0; 6],
            raw_len: self.raw_len,
            len: self.data.len() as u64,
        }
    }

    /// Size of the block on disk, header included
    pub fn serialized_len(&self) -> usize {
        size_of::<BlockHeader>() + self.data.len()
    }

    /// Returns the decoded payload
    pub fn decode(&self) -> Result<Cow<'_, [u8]>> {
        match self.method {
            CompressionMethod::Raw => Ok(Cow::Borrowed(&self.data)),
            CompressionMethod::Zstd => {
                let mut out = Vec::with_capacity(self.raw_len as usize);
                zstd::stream::copy_decode(self.data.as_slice(), &mut out)?;
                if out.len() as u64 != self.raw_len {
                    return Err(ReadError::Malformed {
                        what: "block",
                        reason: format!(
                            "column {} decoded to {} bytes, expected {}",
                            self.content_id,
                            out.len(),
                            self.raw_len
                        ),
                    }
                    .into());
                }
                Ok(Cow::Owned(out))
            }
        }
    }

    pub fn write<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(self.header().as_bytes())?;
        writer.write_all(&self.data)?;
        Ok(())
    }

    /// Parses a block from the front of `bytes`, returning it and the bytes consumed
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize)> {
        let header = BlockHeader::from_bytes(bytes)?;
        let start = size_of::<BlockHeader>();
        let end = usize::try_from(header.len)
            .ok()
            .and_then(|len| start.checked_add(len))
            .unwrap_or(usize::MAX);
        let Some(data) = bytes.get(start..end) else {
            return Err(ReadError::Malformed {
                what: "block",
                reason: format!(
                    "column {} claims {} bytes but only {} remain",
                    header.content_id,
                    header.len,
                    bytes.len() - start
                ),
            }
            .into());
        };
        let method = CompressionMethod::try_from(header.method)?;
        if method == CompressionMethod::Raw && header.raw_len != header.len {
            return Err(ReadError::Malformed {
                what: "block",
                reason: format!("raw column {} has mismatched lengths", header.content_id),
            }
            .into());
        }
        Ok((
            Self {
                content_id: header.content_id,
                method,
                raw_len: header.raw_len,
                data: data.to_vec(),
            },
            end,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_header_size() {
        assert_eq!(size_of::<BlockHeader>(), 24);
    }

    #[test]
    fn test_compressible_column() -> Result<()> {
        let mut cctx = zstd_safe::CCtx::create();
        let raw = b"ACGTTGCA".repeat(512);
        let block = Block::compressed(7, &raw, 3, &mut cctx)?;
        assert_eq!(block.method(), CompressionMethod::Zstd);
        assert!(block.serialized_len() < raw.len());

        let mut bytes = Vec::new();
        block.write(&mut bytes)?;
        let (parsed, consumed) = Block::from_bytes(&bytes)?;
        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed.content_id(), 7);
        assert_eq!(parsed.decode()?.as_ref(), raw.as_slice());
        Ok(())
    }

    #[test]
    fn test_incompressible_column_stays_raw() -> Result<()> {
        let mut cctx = zstd_safe::CCtx::create();
        let block = Block::compressed(1, b"xy", 3, &mut cctx)?;
        assert_eq!(block.method(), CompressionMethod::Raw);
        assert_eq!(block.decode()?.as_ref(), b"xy");

        let empty = Block::compressed(2, b"", 3, &mut cctx)?;
        assert_eq!(empty.serialized_len(), size_of::<BlockHeader>());
        Ok(())
    }

    #[test]
    fn test_truncated_block() -> Result<()> {
        let mut bytes = Vec::new();
        Block::raw(3, b"ACGT".to_vec()).write(&mut bytes)?;
        assert!(Block::from_bytes(&bytes[..bytes.len() - 1]).is_err());
        assert!(Block::from_bytes(&bytes[..10]).is_err());
        Ok(())
    }

    #[test]
    fn test_unknown_method() -> Result<()> {
        let mut bytes = Vec::new();
        Block::raw(3, b"ACGT".to_vec()).write(&mut bytes)?;
        bytes[1] = 9;
        assert!(matches!(
            Block::from_bytes(&bytes),
            Err(crate::Error::ReadError(ReadError::UnknownBlockMethod(9)))
        ));
        Ok(())
    }
}
