use std::{
    borrow::Cow,
    collections::BTreeMap,
    fs::{self, File},
    io::{self, BufReader, BufWriter, Cursor, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use alnstream::{
    AlignmentHeader, AlignmentRecord, ContainerStreamReader, InMemoryReferenceSource,
    LegacyIndexWriter, NativeIndexWriter, QueryInterval, ReaderBuilder, SortOrder,
    ValidationStringency, WriterBuilder,
    core::{ContainerKind, ContainerReader},
    index::{IndexFormat, build_index},
};
use anyhow::{Context, Result, bail};
use clap::Parser;

mod cli;

use cli::{Cli, Commands, IndexLayout};

/// Initializes the logger with the verbosity given on the command line
fn init_log(verbose: u8) -> Result<()> {
    stderrlog::new()
        .module(module_path!())
        .quiet(false)
        .verbosity(usize::from(verbose) + 1)
        .timestamp(stderrlog::Timestamp::Off)
        .init()?;
    Ok(())
}

/// Parses `REF`, `REF:START` or `REF:START-END` against the header's reference names
fn parse_region(region: &str, header: &AlignmentHeader) -> Result<QueryInterval> {
    let (name, range) = match region.rsplit_once(':') {
        Some((name, range)) if header.reference_index(name).is_some() => (name, Some(range)),
        _ => (region, None),
    };
    let Some(reference_index) = header.reference_index(name) else {
        bail!("Unknown reference in region {region}");
    };
    let Some(range) = range else {
        return Ok(QueryInterval::new(reference_index, 1, 0));
    };
    let parse = |s: &str| -> Result<i64> {
        s.replace(',', "")
            .parse()
            .with_context(|| format!("Invalid position in region {region}"))
    };
    match range.split_once('-') {
        Some((start, "")) => Ok(QueryInterval::new(reference_index, parse(start)?, 0)),
        Some((start, end)) => Ok(QueryInterval::new(
            reference_index,
            parse(start)?,
            parse(end)?,
        )),
        None => Ok(QueryInterval::new(reference_index, parse(range)?, 0)),
    }
}

fn reference_name(header: Option<&AlignmentHeader>, index: Option<usize>) -> String {
    match (header, index) {
        (_, None) => "*".to_string(),
        (Some(header), Some(index)) => header
            .reference(index)
            .map_or_else(|| index.to_string(), |r| r.name.clone()),
        (None, Some(index)) => index.to_string(),
    }
}

fn write_record<W: Write>(
    writer: &mut W,
    header: Option<&AlignmentHeader>,
    record: &AlignmentRecord,
) -> Result<()> {
    let mate_name = if record.mate_reference_index().is_some()
        && record.mate_reference_index() == record.reference_index()
    {
        "=".to_string()
    } else {
        reference_name(header, record.mate_reference_index())
    };
    let qualities = if record.qualities().is_empty() {
        Cow::Borrowed("*")
    } else {
        String::from_utf8_lossy(record.qualities())
    };
    writeln!(
        writer,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        String::from_utf8_lossy(record.name()),
        record.flags(),
        reference_name(header, record.reference_index()),
        record.alignment_start(),
        record.mapping_quality(),
        mate_name,
        record.mate_alignment_start(),
        String::from_utf8_lossy(record.sequence()),
        qualities,
    )?;
    Ok(())
}

fn view(
    input: &Path,
    index: Option<&Path>,
    regions: &[String],
    unmapped: bool,
    contained: bool,
    reference: Option<&Path>,
    stringency: ValidationStringency,
) -> Result<()> {
    let header = ContainerStreamReader::from_path(input)?.header().cloned();

    let mut builder = ReaderBuilder::new().stringency(stringency);
    if let Some(path) = reference {
        let Some(header) = header.as_ref() else {
            bail!("A reference requires a stream with a header container");
        };
        let fasta = BufReader::new(File::open(path)?);
        let source = InMemoryReferenceSource::from_fasta(fasta, header)?;
        builder = builder.reference(Arc::new(source));
    }
    if let Some(path) = index {
        builder = builder.index_path(path)?;
    }
    let mut reader = builder.build_from_path(input)?;

    let mut out = BufWriter::new(io::stdout().lock());
    if let Some(header) = header.as_ref() {
        write!(out, "{header}")?;
    }

    if regions.is_empty() && !unmapped {
        for record in reader.iterate()? {
            write_record(&mut out, header.as_ref(), &record?)?;
        }
    } else {
        let Some(dialect) = header.as_ref() else {
            bail!("Region queries require a stream with a header container");
        };
        let mut intervals = regions
            .iter()
            .map(|region| parse_region(region, dialect))
            .collect::<Result<Vec<_>>>()?;
        if unmapped {
            intervals.push(QueryInterval::unmapped());
        }
        for record in reader.query(&intervals, contained)? {
            write_record(&mut out, header.as_ref(), &record?)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn index(input: &Path, layout: IndexLayout, output: Option<PathBuf>) -> Result<()> {
    let format = match layout {
        IndexLayout::Legacy => IndexFormat::Legacy,
        IndexLayout::Native => IndexFormat::Native,
    };
    let output = output.unwrap_or_else(|| {
        let mut path = input.as_os_str().to_owned();
        path.push(".");
        path.push(format.extension());
        PathBuf::from(path)
    });

    let stream = BufReader::new(File::open(input)?);
    let sink = BufWriter::new(File::create(&output)?);
    let containers = match format {
        IndexFormat::Legacy => build_index(stream, LegacyIndexWriter::new(sink)?)?,
        IndexFormat::Native => build_index(stream, NativeIndexWriter::new(sink))?,
    };
    log::info!(
        "Indexed {containers} containers of {} into {}",
        input.display(),
        output.display()
    );
    Ok(())
}

fn cat(inputs: &[PathBuf], output: &Path) -> Result<()> {
    let mut header = None;
    let mut partitions = Vec::with_capacity(inputs.len());
    for input in inputs {
        let bytes = fs::read(input).with_context(|| format!("Reading {}", input.display()))?;
        let mut partition = Vec::new();
        let mut containers = ContainerReader::new(Cursor::new(bytes.as_slice()));
        while let Some((offset, container)) = containers.next_container()? {
            match container.kind() {
                ContainerKind::Header if header.is_none() => {
                    header = Some(container.dialect_header()?);
                }
                ContainerKind::Header => {
                    log::warn!("Dropping header container of {}", input.display());
                }
                ContainerKind::Data => {
                    let start = offset as usize;
                    let end = start + container.serialized_len() as usize;
                    partition.extend_from_slice(&bytes[start..end]);
                }
                ContainerKind::Eof => break,
            }
        }
        partitions.push(partition);
    }

    let sink = BufWriter::new(File::create(output)?);
    let mut writer = match &header {
        Some((definition, dialect)) => {
            let mut writer = WriterBuilder::new(dialect.clone())
                .label(&definition.label())
                .build(sink)?;
            writer.write_header()?;
            writer
        }
        None => WriterBuilder::new(AlignmentHeader::new(SortOrder::Unknown)).build(sink)?,
    };
    for partition in &partitions {
        writer.ingest(partition)?;
    }
    writer.finish(true)?;
    log::info!(
        "Wrote {} records from {} streams into {}",
        writer.records_written(),
        inputs.len(),
        output.display()
    );
    Ok(())
}

#[derive(Default)]
struct ReferenceStats {
    containers: usize,
    slices: usize,
    records: u64,
}

fn stats(input: &Path) -> Result<()> {
    let reader = BufReader::new(File::open(input)?);
    let mut containers = ContainerReader::new(reader);

    let mut header = None;
    let mut per_reference: BTreeMap<i32, ReferenceStats> = BTreeMap::new();
    let mut has_eof = false;
    while let Some((_, container)) = containers.next_container()? {
        match container.kind() {
            ContainerKind::Header => header = Some(container.dialect_header()?.1),
            ContainerKind::Data => {
                per_reference
                    .entry(container.header().reference_index)
                    .or_default()
                    .containers += 1;
                for slice in container.slices()? {
                    let entry = per_reference
                        .entry(slice.header().reference_index)
                        .or_default();
                    entry.slices += 1;
                    entry.records += u64::from(slice.header().record_count);
                }
            }
            ContainerKind::Eof => {
                has_eof = true;
                break;
            }
        }
    }

    let mut out = BufWriter::new(io::stdout().lock());
    writeln!(out, "reference\tcontainers\tslices\trecords")?;
    for (reference_index, stats) in &per_reference {
        let name = match *reference_index {
            alnstream::UNMAPPED_REFERENCE => "*".to_string(),
            alnstream::MULTI_REFERENCE => "(multiple)".to_string(),
            index => reference_name(header.as_ref(), usize::try_from(index).ok()),
        };
        writeln!(
            out,
            "{name}\t{}\t{}\t{}",
            stats.containers, stats.slices, stats.records
        )?;
    }
    if !has_eof {
        log::warn!("{} ends without an EOF container", input.display());
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_log(cli.verbose)?;

    match cli.command {
        Commands::View {
            input,
            index,
            regions,
            unmapped,
            contained,
            reference,
            stringency,
        } => view(
            &input,
            index.as_deref(),
            &regions,
            unmapped,
            contained,
            reference.as_deref(),
            stringency,
        ),
        Commands::Index {
            input,
            format,
            output,
        } => index(&input, format, output),
        Commands::Cat { inputs, output } => cat(&inputs, &output),
        Commands::Stats { input } => stats(&input),
    }
}
