//! Reference sequence sources used for record validation and reference compression.

use std::io::BufRead;

use auto_impl::auto_impl;

use crate::{AlignmentHeader, Result, error::HeaderError};

/// Provides reference bases by header reference index.
#[auto_impl(&, Box, Arc)]
pub trait ReferenceSource {
    /// Returns the full sequence of a reference, or `None` when it is not available
    fn sequence(&self, reference_index: usize) -> Option<&[u8]>;

    /// Returns the 1-based inclusive range `[start, end]` of a reference, clipped to its length
    fn bases(&self, reference_index: usize, start: i64, end: i64) -> Option<&[u8]> {
        let sequence = self.sequence(reference_index)?;
        if start < 1 || end < start {
            return None;
        }
        let lo = (start - 1) as usize;
        let hi = (end as usize).min(sequence.len());
        sequence.get(lo..hi)
    }
}

/// A source without any reference sequences
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReference;
impl ReferenceSource for NoReference {
    fn sequence(&self, _reference_index: usize) -> Option<&[u8]> {
        None
    }
}

/// Reference sequences held in memory, indexed in header order
#[derive(Debug, Clone, Default)]
pub struct InMemoryReferenceSource {
    sequences: Vec<Option<Vec<u8>>>,
}
impl InMemoryReferenceSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the next reference sequence
    pub fn add(&mut self, sequence: impl Into<Vec<u8>>) {
        self.sequences.push(Some(sequence.into()));
    }

    /// Sets the sequence at a specific index
    pub fn insert(&mut self, reference_index: usize, sequence: impl Into<Vec<u8>>) {
        if self.sequences.len() <= reference_index {
            self.sequences.resize(reference_index + 1, None);
        }
        self.sequences[reference_index] = Some(sequence.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Loads sequences from FASTA, placing each at the header index of its name.
    ///
    /// Sequences whose names are not declared by the header are skipped.
    pub fn from_fasta<R: BufRead>(reader: R, header: &AlignmentHeader) -> Result<Self> {
        let mut source = Self::new();
        let mut current: Option<(usize, Vec<u8>)> = None;
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if let Some(defline) = line.strip_prefix('>') {
                if let Some((reference_index, bases)) = current.take() {
                    source.insert(reference_index, bases);
                }
                let name = defline.split_whitespace().next().unwrap_or_default();
                match header.reference_index(name) {
                    Some(reference_index) => current = Some((reference_index, Vec::new())),
                    None => log::debug!("Skipping FASTA sequence {name} absent from header"),
                }
            } else if let Some((_, bases)) = current.as_mut() {
                bases.extend(line.trim_end().bytes().map(|b| b.to_ascii_uppercase()));
            } else if !line.trim().is_empty() && idx == 0 {
                return Err(HeaderError::InvalidLine {
                    line: 1,
                    reason: "FASTA must start with '>'".to_string(),
                }
                .into());
            }
        }
        if let Some((reference_index, bases)) = current {
            source.insert(reference_index, bases);
        }
        Ok(source)
    }
}
impl ReferenceSource for InMemoryReferenceSource {
    fn sequence(&self, reference_index: usize) -> Option<&[u8]> {
        self.sequences
            .get(reference_index)
            .and_then(|s| s.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::SortOrder;

    #[test]
    fn test_bases_are_one_based_and_clipped() {
        let mut source = InMemoryReferenceSource::new();
        source.add(b"ACGTACGT".to_vec());
        assert_eq!(source.bases(0, 1, 4), Some(&b"ACGT"[..]));
        assert_eq!(source.bases(0, 7, 20), Some(&b"GT"[..]));
        assert_eq!(source.bases(0, 0, 4), None);
        assert_eq!(source.bases(1, 1, 4), None);
    }

    #[test]
    fn test_insert_leaves_gaps() {
        let mut source = InMemoryReferenceSource::new();
        source.insert(2, b"AAAA".to_vec());
        assert_eq!(source.len(), 3);
        assert!(source.sequence(0).is_none());
        assert_eq!(source.sequence(2), Some(&b"AAAA"[..]));
    }

    #[test]
    fn test_shared_source() {
        let mut source = InMemoryReferenceSource::new();
        source.add(b"CCCC".to_vec());
        let shared = Arc::new(source);
        assert_eq!(shared.sequence(0), Some(&b"CCCC"[..]));
        assert!(NoReference.sequence(0).is_none());
    }

    #[test]
    fn test_from_fasta() -> Result<()> {
        let mut header = AlignmentHeader::new(SortOrder::Coordinate);
        header.add_reference("chr1", 8)?;
        header.add_reference("chr2", 4)?;

        let fasta = b">chr2 second\nacgt\n>chrX\nTTTT\n>chr1\nAAAA\nCCCC\n";
        let source = InMemoryReferenceSource::from_fasta(&fasta[..], &header)?;
        assert_eq!(source.sequence(0), Some(&b"AAAACCCC"[..]));
        assert_eq!(source.sequence(1), Some(&b"ACGT"[..]));
        Ok(())
    }

    #[test]
    fn test_from_fasta_rejects_garbage() -> Result<()> {
        let header = AlignmentHeader::new(SortOrder::Coordinate);
        assert!(InMemoryReferenceSource::from_fasta(&b"ACGT\n"[..], &header).is_err());
        Ok(())
    }
}
