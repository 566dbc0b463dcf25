//! Shared fixtures for unit tests

use std::sync::Arc;

use crate::{
    AlignmentHeader, AlignmentRecord, AlignmentRecordBuilder, InMemoryReferenceSource, Result,
    SortOrder,
    record::{FLAG_FIRST_SEGMENT, FLAG_LAST_SEGMENT, FLAG_PAIRED, FLAG_REVERSE},
};

pub const SEQUENCE_LENGTH: usize = 1024 * 1024;
pub const READ_LENGTH: usize = 36;

/// A header with two references of [`SEQUENCE_LENGTH`] bases and one read group
pub fn two_reference_header(sort_order: SortOrder) -> AlignmentHeader {
    let mut header = AlignmentHeader::new(sort_order);
    header
        .add_reference("chr1", SEQUENCE_LENGTH)
        .and_then(|_| header.add_reference("chr2", SEQUENCE_LENGTH))
        .expect("distinct reference names");
    header.add_read_group("1");
    header
}

/// Poly-A references matching [`two_reference_header`]
pub fn poly_a_reference() -> Arc<InMemoryReferenceSource> {
    let mut source = InMemoryReferenceSource::new();
    source.add(vec![b'A'; SEQUENCE_LENGTH]);
    source.add(vec![b'A'; SEQUENCE_LENGTH]);
    Arc::new(source)
}

/// Creates `count` records as `count / 2` pairs in coordinate order.
///
/// Pair `i` lands on reference `i % 2` with mates starting at `4i + 2` and `4i + 5`.
pub fn create_records(count: usize) -> Result<Vec<AlignmentRecord>> {
    let mut records = Vec::with_capacity(count);
    let mut position = 1i64;
    for i in 0..count / 2 {
        let name = i.to_string();
        let reference_index = i % 2;
        position += 1;
        let first_start = position;
        position += 3;
        let second_start = position;

        // mostly reference bases with one mismatch per read
        let mut sequence = vec![b'A'; READ_LENGTH];
        sequence[i % READ_LENGTH] = b"CGT"[i % 3];
        let qualities = vec![b'I'; READ_LENGTH];

        for (start, mate_start, flags) in [
            (first_start, second_start, FLAG_PAIRED | FLAG_FIRST_SEGMENT),
            (
                second_start,
                first_start,
                FLAG_PAIRED | FLAG_LAST_SEGMENT | FLAG_REVERSE,
            ),
        ] {
            records.push(
                AlignmentRecordBuilder::default()
                    .name(name.as_bytes())
                    .flags(flags)
                    .reference_index(reference_index)
                    .alignment_start(start)
                    .mapping_quality(60)
                    .mate(Some(reference_index), mate_start)
                    .sequence(&sequence)
                    .qualities(&qualities)
                    .build()?,
            );
        }
    }
    records.sort_by(AlignmentRecord::coordinate_cmp);
    Ok(records)
}
