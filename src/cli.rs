use std::path::PathBuf;

use alnstream::ValidationStringency;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(version, about = "Inspect, index and concatenate alignment container streams")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print records as tab-separated text
    View {
        #[arg(help = "Input stream")]
        input: PathBuf,

        /// Index of the stream (legacy or native), required for region queries
        #[arg(short, long)]
        index: Option<PathBuf>,

        /// Query region as REF, REF:START or REF:START-END (repeatable)
        #[arg(short, long = "region")]
        regions: Vec<String>,

        /// Query the unplaced records
        #[arg(short, long, default_value_t = false)]
        unmapped: bool,

        /// Only report records lying fully inside a region
        #[arg(short, long, default_value_t = false)]
        contained: bool,

        /// FASTA reference used to restore reference-compressed sequences
        #[arg(short = 'R', long)]
        reference: Option<PathBuf>,

        /// Treatment of recoverable problems: strict, lenient or silent
        #[arg(short, long, default_value_t = ValidationStringency::Strict)]
        stringency: ValidationStringency,
    },

    /// Build an index for an existing stream
    Index {
        #[arg(help = "Input stream")]
        input: PathBuf,

        #[arg(short, long, value_enum, default_value_t = IndexLayout::Legacy)]
        format: IndexLayout,

        /// Output path (defaults to the input path with the format extension appended)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Concatenate streams into one, keeping the first header
    Cat {
        #[arg(required = true, help = "Input streams")]
        inputs: Vec<PathBuf>,

        #[arg(short, long, required = true)]
        output: PathBuf,
    },

    /// Print container, slice and record counts per reference
    Stats {
        #[arg(help = "Input stream")]
        input: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum IndexLayout {
    Legacy,
    Native,
}
