use std::cmp::Ordering;

use crate::{Result, error::WriteError};

/// Template has multiple segments
pub const FLAG_PAIRED: u16 = 0x1;

/// Segment is unmapped
pub const FLAG_UNMAPPED: u16 = 0x4;

/// Next segment in the template is unmapped
pub const FLAG_MATE_UNMAPPED: u16 = 0x8;

/// Sequence is reverse complemented
pub const FLAG_REVERSE: u16 = 0x10;

/// First segment in the template
pub const FLAG_FIRST_SEGMENT: u16 = 0x40;

/// Last segment in the template
pub const FLAG_LAST_SEGMENT: u16 = 0x80;

/// A single alignment record.
///
/// Alignments are ungapped: a placed record covers `max(len(sequence), 1)` reference bases
/// starting at its 1-based `alignment_start`. Unplaced records carry no reference and an
/// alignment start of 0.
///
/// # Example
///
/// ```
/// use alnstream::AlignmentRecordBuilder;
///
/// let record = AlignmentRecordBuilder::default()
///     .name(b"read_001")
///     .reference_index(0)
///     .alignment_start(100)
///     .sequence(b"ACGTACGT")
///     .qualities(b"IIIIFFFF")
///     .build()
///     .unwrap();
/// assert_eq!(record.alignment_end(), 107);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AlignmentRecord {
    pub(crate) name: Vec<u8>,
    pub(crate) flags: u16,
    pub(crate) reference_index: Option<usize>,
    pub(crate) alignment_start: i64,
    pub(crate) mapping_quality: u8,
    pub(crate) mate_reference_index: Option<usize>,
    pub(crate) mate_alignment_start: i64,
    pub(crate) sequence: Vec<u8>,
    pub(crate) qualities: Vec<u8>,
}

impl AlignmentRecord {
    #[inline]
    #[must_use]
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Returns the reference index, `None` for unplaced records
    #[inline]
    #[must_use]
    pub fn reference_index(&self) -> Option<usize> {
        self.reference_index
    }

    /// Returns the 1-based alignment start (0 for unplaced records)
    #[inline]
    #[must_use]
    pub fn alignment_start(&self) -> i64 {
        self.alignment_start
    }

    #[inline]
    #[must_use]
    pub fn mapping_quality(&self) -> u8 {
        self.mapping_quality
    }

    #[inline]
    #[must_use]
    pub fn mate_reference_index(&self) -> Option<usize> {
        self.mate_reference_index
    }

    #[inline]
    #[must_use]
    pub fn mate_alignment_start(&self) -> i64 {
        self.mate_alignment_start
    }

    #[inline]
    #[must_use]
    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    #[inline]
    #[must_use]
    pub fn qualities(&self) -> &[u8] {
        &self.qualities
    }

    /// A record is placed when it carries both a reference and a positive start
    #[inline]
    #[must_use]
    pub fn is_placed(&self) -> bool {
        self.reference_index.is_some() && self.alignment_start > 0
    }

    #[inline]
    #[must_use]
    pub fn is_reverse(&self) -> bool {
        self.flags & FLAG_REVERSE != 0
    }

    /// Number of reference bases covered by the alignment
    #[inline]
    #[must_use]
    pub fn alignment_span(&self) -> i64 {
        if self.is_placed() {
            (self.sequence.len() as i64).max(1)
        } else {
            0
        }
    }

    /// Inclusive 1-based end of the alignment (0 for unplaced records)
    #[inline]
    #[must_use]
    pub fn alignment_end(&self) -> i64 {
        if self.is_placed() {
            self.alignment_start + self.alignment_span() - 1
        } else {
            0
        }
    }

    /// Compares two records in coordinate order.
    ///
    /// Placed records sort by reference index then start, unplaced records sort last.
    /// Ties are broken on strand and name so the order is total.
    #[must_use]
    pub fn coordinate_cmp(&self, other: &Self) -> Ordering {
        let key = |r: &Self| {
            if r.is_placed() {
                (0u8, r.reference_index.unwrap_or(0), r.alignment_start)
            } else {
                (1u8, 0, 0)
            }
        };
        key(self)
            .cmp(&key(other))
            .then_with(|| self.is_reverse().cmp(&other.is_reverse()))
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.flags.cmp(&other.flags))
    }

    /// Approximate in-memory footprint of the record payload
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.name.len() + self.sequence.len() + self.qualities.len() + 32
    }
}

/// A convenience builder struct for creating an [`AlignmentRecord`]
///
/// # Example
///
/// ```
/// use alnstream::AlignmentRecordBuilder;
///
/// // An unplaced read
/// let unplaced = AlignmentRecordBuilder::default()
///     .name(b"orphan")
///     .flags(alnstream::record::FLAG_UNMAPPED)
///     .sequence(b"ACGT")
///     .build()
///     .unwrap();
/// assert!(!unplaced.is_placed());
/// ```
#[derive(Default)]
pub struct AlignmentRecordBuilder<'a> {
    name: Option<&'a [u8]>,
    flags: u16,
    reference_index: Option<usize>,
    alignment_start: i64,
    mapping_quality: u8,
    mate_reference_index: Option<usize>,
    mate_alignment_start: i64,
    sequence: Option<&'a [u8]>,
    qualities: Option<&'a [u8]>,
}

impl<'a> AlignmentRecordBuilder<'a> {
    #[must_use]
    pub fn name(mut self, name: &'a [u8]) -> Self {
        self.name = Some(name);
        self
    }

    #[must_use]
    pub fn flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn reference_index(mut self, reference_index: usize) -> Self {
        self.reference_index = Some(reference_index);
        self
    }

    /// Sets the reference index from an Option
    #[must_use]
    pub fn opt_reference_index(mut self, reference_index: Option<usize>) -> Self {
        self.reference_index = reference_index;
        self
    }

    /// Sets the 1-based alignment start
    #[must_use]
    pub fn alignment_start(mut self, alignment_start: i64) -> Self {
        self.alignment_start = alignment_start;
        self
    }

    #[must_use]
    pub fn mapping_quality(mut self, mapping_quality: u8) -> Self {
        self.mapping_quality = mapping_quality;
        self
    }

    /// Sets the mate position
    #[must_use]
    pub fn mate(mut self, reference_index: Option<usize>, alignment_start: i64) -> Self {
        self.mate_reference_index = reference_index;
        self.mate_alignment_start = alignment_start;
        self
    }

    /// Sets the sequence (required)
    #[must_use]
    pub fn sequence(mut self, sequence: &'a [u8]) -> Self {
        self.sequence = Some(sequence);
        self
    }

    #[must_use]
    pub fn qualities(mut self, qualities: &'a [u8]) -> Self {
        self.qualities = Some(qualities);
        self
    }

    /// Builds the `AlignmentRecord`
    ///
    /// # Errors
    ///
    /// Returns an error if the sequence is not set.
    pub fn build(self) -> Result<AlignmentRecord> {
        let Some(sequence) = self.sequence else {
            return Err(WriteError::MissingSequence.into());
        };
        Ok(AlignmentRecord {
            name: self.name.unwrap_or_default().to_vec(),
            flags: self.flags,
            reference_index: self.reference_index,
            alignment_start: self.alignment_start,
            mapping_quality: self.mapping_quality,
            mate_reference_index: self.mate_reference_index,
            mate_alignment_start: self.mate_alignment_start,
            sequence: sequence.to_vec(),
            qualities: self.qualities.unwrap_or_default().to_vec(),
        })
    }
}
