//! Partitioned parallel writing
//!
//! Independent [`ContainerStreamWriter`]s write contiguous chunks of records on their own
//! threads as headless, EOF-less partitions. The partitions are then ingested in order into
//! an aggregate writer, which produces the same stream layout a single writer would have
//! produced for the chunk boundaries and drives its indexer over every partition.

use std::{io::Write, thread};

use crate::{
    AlignmentRecord, Result, WriterBuilder,
    codec::RecordCodec,
    index::Indexer,
    writer::ContainerStreamWriter,
};

/// Resolves the number of worker threads, where 0 means one per available CPU
fn resolve_threads(num_threads: usize) -> usize {
    if num_threads == 0 {
        num_cpus::get()
    } else {
        num_threads.min(num_cpus::get())
    }
}

/// Writes a single headless partition
fn write_partition(builder: WriterBuilder, records: &[AlignmentRecord]) -> Result<Vec<u8>> {
    let mut writer = builder.build(Vec::new())?;
    for record in records {
        writer.write_alignment(record.clone())?;
    }
    writer.finish(false)?;
    let (bytes, _) = writer.into_parts();
    Ok(bytes)
}

/// Writes `records` across `num_threads` partition writers and ingests them into `writer`.
///
/// The caller writes the aggregate header beforehand and finishes the aggregate writer
/// afterwards. Records keep their input order. Returns the number of partitions ingested.
///
/// # Arguments
///
/// * `builder` - Configuration shared by every partition writer
/// * `records` - Records in the order they should appear in the stream
/// * `num_threads` - The number of threads to spawn (0 for one per CPU)
/// * `writer` - The aggregate writer receiving each partition
pub fn write_parallel<W: Write, I: Indexer, C: RecordCodec>(
    builder: &WriterBuilder,
    records: &[AlignmentRecord],
    num_threads: usize,
    writer: &mut ContainerStreamWriter<W, I, C>,
) -> Result<usize> {
    if records.is_empty() {
        return Ok(0);
    }
    let num_threads = resolve_threads(num_threads);
    let records_per_thread = records.len().div_ceil(num_threads);

    let partitions = thread::scope(|scope| {
        let handles: Vec<_> = records
            .chunks(records_per_thread)
            .map(|chunk| {
                let builder = builder.clone();
                scope.spawn(move || write_partition(builder, chunk))
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| -> Result<Vec<u8>> {
                handle
                    .join()
                    .map_err(|_| std::io::Error::other("partition writer panicked"))?
            })
            .collect::<Result<Vec<_>>>()
    })?;

    for (tid, partition) in partitions.iter().enumerate() {
        let containers = writer.ingest(partition)?;
        log::debug!(
            "Ingested partition {tid}: {containers} containers, {} bytes",
            partition.len()
        );
    }
    Ok(partitions.len())
}
