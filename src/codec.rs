//! Record codecs turn a run of records into the blocks of a slice and back.
//!
//! [`ColumnarCodec`] stores every record attribute in its own zstd-compressed column.
//! Placed sequences are diffed against the reference: bases matching the reference are
//! stored as `=`, which compresses to almost nothing for well-aligned reads.

use std::{borrow::Cow, sync::Arc};

use auto_impl::auto_impl;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use zstd::zstd_safe;

use crate::{
    AlignmentRecord, DEFAULT_COMPRESSION_LEVEL, Result,
    core::{Block, Slice, utils::slice_and_increment},
    error::{ReadError, WriteError},
    reference::{NoReference, ReferenceSource},
};

/// Content ids of the columns written by [`ColumnarCodec`]
pub mod content_id {
    pub const NAMES: u8 = 1;
    pub const NAME_LENGTHS: u8 = 2;
    pub const FLAGS: u8 = 3;
    pub const REFERENCE_IDS: u8 = 4;
    pub const STARTS: u8 = 5;
    pub const MAPPING_QUALITIES: u8 = 6;
    pub const MATE_REFERENCE_IDS: u8 = 7;
    pub const MATE_STARTS: u8 = 8;
    pub const SEQUENCE_LENGTHS: u8 = 9;
    pub const REFERENCE_DIFFS: u8 = 10;
    pub const SEQUENCES: u8 = 11;
    pub const QUALITY_LENGTHS: u8 = 12;
    pub const QUALITIES: u8 = 13;
}

/// Placeholder for a base identical to the reference
pub const MATCH_BASE: u8 = b'=';

/// Encodes records into blocks and decodes slices back into records
#[auto_impl(&mut, Box)]
pub trait RecordCodec {
    /// Appends the blocks encoding `records` to `blocks`
    fn encode(&mut self, records: &[AlignmentRecord], blocks: &mut Vec<Block>) -> Result<()>;

    /// Appends the records stored in `slice` to `records`, in write order
    fn decode(&mut self, slice: &Slice, records: &mut Vec<AlignmentRecord>) -> Result<()>;
}

#[derive(Default)]
struct Columns {
    names: Vec<u8>,
    name_lengths: Vec<u8>,
    flags: Vec<u8>,
    reference_ids: Vec<u8>,
    starts: Vec<u8>,
    mapping_qualities: Vec<u8>,
    mate_reference_ids: Vec<u8>,
    mate_starts: Vec<u8>,
    sequence_lengths: Vec<u8>,
    reference_diffs: Vec<u8>,
    sequences: Vec<u8>,
    quality_lengths: Vec<u8>,
    qualities: Vec<u8>,
}
impl Columns {
    fn clear(&mut self) {
        for column in self.iter_mut() {
            column.1.clear();
        }
    }

    fn iter_mut(&mut self) -> [(u8, &mut Vec<u8>); 13] {
        [
            (content_id::NAMES, &mut self.names),
            (content_id::NAME_LENGTHS, &mut self.name_lengths),
            (content_id::FLAGS, &mut self.flags),
            (content_id::REFERENCE_IDS, &mut self.reference_ids),
            (content_id::STARTS, &mut self.starts),
            (content_id::MAPPING_QUALITIES, &mut self.mapping_qualities),
            (content_id::MATE_REFERENCE_IDS, &mut self.mate_reference_ids),
            (content_id::MATE_STARTS, &mut self.mate_starts),
            (content_id::SEQUENCE_LENGTHS, &mut self.sequence_lengths),
            (content_id::REFERENCE_DIFFS, &mut self.reference_diffs),
            (content_id::SEQUENCES, &mut self.sequences),
            (content_id::QUALITY_LENGTHS, &mut self.quality_lengths),
            (content_id::QUALITIES, &mut self.qualities),
        ]
    }
}

/// Column-oriented codec with reference-based sequence compression
pub struct ColumnarCodec {
    reference: Arc<dyn ReferenceSource + Send + Sync>,
    level: i32,
    cctx: zstd_safe::CCtx<'static>,
    columns: Columns,
}
impl Default for ColumnarCodec {
    fn default() -> Self {
        Self::new(Arc::new(NoReference), DEFAULT_COMPRESSION_LEVEL)
    }
}
impl ColumnarCodec {
    pub fn new(reference: Arc<dyn ReferenceSource + Send + Sync>, level: i32) -> Self {
        Self {
            reference,
            level,
            cctx: zstd_safe::CCtx::create(),
            columns: Columns::default(),
        }
    }

    fn push_record(&mut self, record: &AlignmentRecord, previous_start: i64) -> Result<()> {
        let encoding = |what: &str, value: usize| {
            WriteError::EncodingFailure(format!(
                "{what} of {value} does not fit record {}",
                String::from_utf8_lossy(record.name())
            ))
        };
        let name_len = u32::try_from(record.name().len())
            .map_err(|_| encoding("name length", record.name().len()))?;
        let seq_len = u32::try_from(record.sequence().len())
            .map_err(|_| encoding("sequence length", record.sequence().len()))?;
        let qual_len = u32::try_from(record.qualities().len())
            .map_err(|_| encoding("quality length", record.qualities().len()))?;
        let reference_id = opt_index(record.reference_index())
            .map_err(|value| encoding("reference index", value))?;
        let mate_reference_id = opt_index(record.mate_reference_index())
            .map_err(|value| encoding("mate reference index", value))?;

        let columns = &mut self.columns;
        let diffed = match reference_bases(&*self.reference, record) {
            Some(bases) => {
                let diffed = record.sequence().iter().zip(bases).map(|(&base, &reference)| {
                    if base == reference { MATCH_BASE } else { base }
                });
                columns.sequences.extend(diffed);
                true
            }
            None => {
                columns.sequences.extend_from_slice(record.sequence());
                false
            }
        };

        columns.names.extend_from_slice(record.name());
        columns.name_lengths.write_u32::<LittleEndian>(name_len)?;
        columns.flags.write_u16::<LittleEndian>(record.flags())?;
        columns.reference_ids.write_i32::<LittleEndian>(reference_id)?;
        columns
            .starts
            .write_i64::<LittleEndian>(record.alignment_start() - previous_start)?;
        columns.mapping_qualities.push(record.mapping_quality());
        columns
            .mate_reference_ids
            .write_i32::<LittleEndian>(mate_reference_id)?;
        columns
            .mate_starts
            .write_i64::<LittleEndian>(record.mate_alignment_start())?;
        columns.sequence_lengths.write_u32::<LittleEndian>(seq_len)?;
        columns.reference_diffs.push(u8::from(diffed));
        columns.quality_lengths.write_u32::<LittleEndian>(qual_len)?;
        columns.qualities.extend_from_slice(record.qualities());
        Ok(())
    }
}

/// Returns the reference bases under a placed record when they cover its full span
fn reference_bases<'a>(
    reference: &'a (dyn ReferenceSource + Send + Sync),
    record: &AlignmentRecord,
) -> Option<&'a [u8]> {
    let reference_index = record.reference_index()?;
    if !record.is_placed() || record.sequence().is_empty() || record.sequence().contains(&MATCH_BASE)
    {
        return None;
    }
    reference
        .bases(
            reference_index,
            record.alignment_start(),
            record.alignment_end(),
        )
        .filter(|bases| bases.len() == record.sequence().len())
}

fn opt_index(index: Option<usize>) -> std::result::Result<i32, usize> {
    match index {
        None => Ok(-1),
        Some(index) => i32::try_from(index).map_err(|_| index),
    }
}

fn column(slice: &Slice, content_id: u8) -> Result<Cow<'_, [u8]>> {
    let Some(block) = slice.block(content_id) else {
        return Err(ReadError::Malformed {
            what: "slice",
            reason: format!("missing column {content_id}"),
        }
        .into());
    };
    block.decode()
}

fn short_column(content_id: u8) -> crate::Error {
    ReadError::Malformed {
        what: "slice",
        reason: format!("column {content_id} ends early"),
    }
    .into()
}

impl RecordCodec for ColumnarCodec {
    fn encode(&mut self, records: &[AlignmentRecord], blocks: &mut Vec<Block>) -> Result<()> {
        self.columns.clear();
        let mut previous_start = 0;
        for record in records {
            self.push_record(record, previous_start)?;
            previous_start = record.alignment_start();
        }
        let level = self.level;
        let cctx = &mut self.cctx;
        for (content_id, data) in self.columns.iter_mut() {
            blocks.push(Block::compressed(content_id, data.as_slice(), level, cctx)?);
        }
        Ok(())
    }

    fn decode(&mut self, slice: &Slice, records: &mut Vec<AlignmentRecord>) -> Result<()> {
        let names = column(slice, content_id::NAMES)?;
        let name_lengths = column(slice, content_id::NAME_LENGTHS)?;
        let flags = column(slice, content_id::FLAGS)?;
        let reference_ids = column(slice, content_id::REFERENCE_IDS)?;
        let starts = column(slice, content_id::STARTS)?;
        let mapping_qualities = column(slice, content_id::MAPPING_QUALITIES)?;
        let mate_reference_ids = column(slice, content_id::MATE_REFERENCE_IDS)?;
        let mate_starts = column(slice, content_id::MATE_STARTS)?;
        let sequence_lengths = column(slice, content_id::SEQUENCE_LENGTHS)?;
        let reference_diffs = column(slice, content_id::REFERENCE_DIFFS)?;
        let sequences = column(slice, content_id::SEQUENCES)?;
        let quality_lengths = column(slice, content_id::QUALITY_LENGTHS)?;
        let qualities = column(slice, content_id::QUALITIES)?;

        // fixed-width columns are consumed front to back
        let mut name_lengths = name_lengths.as_ref();
        let mut flags = flags.as_ref();
        let mut reference_ids = reference_ids.as_ref();
        let mut starts = starts.as_ref();
        let mut mapping_qualities = mapping_qualities.as_ref();
        let mut mate_reference_ids = mate_reference_ids.as_ref();
        let mut mate_starts = mate_starts.as_ref();
        let mut sequence_lengths = sequence_lengths.as_ref();
        let mut reference_diffs = reference_diffs.as_ref();
        let mut quality_lengths = quality_lengths.as_ref();

        let (mut name_pos, mut seq_pos, mut qual_pos) = (0, 0, 0);
        let mut alignment_start = 0;
        records.reserve(slice.record_count());
        for _ in 0..slice.record_count() {
            let name_len = name_lengths
                .read_u32::<LittleEndian>()
                .map_err(|_| short_column(content_id::NAME_LENGTHS))?;
            let name = slice_and_increment(&mut name_pos, name_len as usize, &names)
                .ok_or_else(|| short_column(content_id::NAMES))?;
            let flag = flags
                .read_u16::<LittleEndian>()
                .map_err(|_| short_column(content_id::FLAGS))?;
            let reference_id = reference_ids
                .read_i32::<LittleEndian>()
                .map_err(|_| short_column(content_id::REFERENCE_IDS))?;
            alignment_start += starts
                .read_i64::<LittleEndian>()
                .map_err(|_| short_column(content_id::STARTS))?;
            let mapq = mapping_qualities
                .read_u8()
                .map_err(|_| short_column(content_id::MAPPING_QUALITIES))?;
            let mate_reference_id = mate_reference_ids
                .read_i32::<LittleEndian>()
                .map_err(|_| short_column(content_id::MATE_REFERENCE_IDS))?;
            let mate_start = mate_starts
                .read_i64::<LittleEndian>()
                .map_err(|_| short_column(content_id::MATE_STARTS))?;
            let seq_len = sequence_lengths
                .read_u32::<LittleEndian>()
                .map_err(|_| short_column(content_id::SEQUENCE_LENGTHS))?;
            let diffed = reference_diffs
                .read_u8()
                .map_err(|_| short_column(content_id::REFERENCE_DIFFS))?
                != 0;
            let stored = slice_and_increment(&mut seq_pos, seq_len as usize, &sequences)
                .ok_or_else(|| short_column(content_id::SEQUENCES))?;
            let qual_len = quality_lengths
                .read_u32::<LittleEndian>()
                .map_err(|_| short_column(content_id::QUALITY_LENGTHS))?;
            let quality = slice_and_increment(&mut qual_pos, qual_len as usize, &qualities)
                .ok_or_else(|| short_column(content_id::QUALITIES))?;

            let reference_index = usize::try_from(reference_id).ok();
            let sequence = if diffed {
                let end = alignment_start + i64::from(seq_len) - 1;
                let bases = reference_index
                    .and_then(|idx| self.reference.bases(idx, alignment_start, end))
                    .filter(|bases| bases.len() == stored.len())
                    .ok_or(ReadError::MissingReference(reference_index.unwrap_or_default()))?;
                stored
                    .iter()
                    .zip(bases)
                    .map(|(&base, &reference)| if base == MATCH_BASE { reference } else { base })
                    .collect()
            } else {
                stored.to_vec()
            };

            records.push(AlignmentRecord {
                name: name.to_vec(),
                flags: flag,
                reference_index,
                alignment_start,
                mapping_quality: mapq,
                mate_reference_index: usize::try_from(mate_reference_id).ok(),
                mate_alignment_start: mate_start,
                sequence,
                qualities: quality.to_vec(),
            });
        }
        Ok(())
    }
}
