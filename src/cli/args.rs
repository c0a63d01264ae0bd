use std::fmt;
use std::path::PathBuf;

use clap::builder::RangedU64ValueParser;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::defs::{DEFAULT_OUTPUT_BAM, DEFAULT_PLOT_PNG};

/// Sequencing platforms a read file can originate from.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Platform {
    #[value(name = "MiSeq")]
    MiSeq,
    #[value(name = "Sanger")]
    Sanger,
    #[value(name = "Roche454")]
    Roche454,
    #[value(name = "IonTorrent")]
    IonTorrent,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::MiSeq,
        Platform::Sanger,
        Platform::Roche454,
        Platform::IonTorrent,
    ];
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::MiSeq => "MiSeq",
            Platform::Sanger => "Sanger",
            Platform::Roche454 => "Roche454",
            Platform::IonTorrent => "IonTorrent",
        };
        write!(f, "{}", name)
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "ngs-mapper", version, about = "Maps platform read sets against a reference and summarises FASTQ files")]
pub struct Arguments {

    #[arg(short = 'v', long = "verbose", global = true, action)]
    pub verbose: bool,

    #[command(subcommand)]
    pub module: Module,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Module {
    /// Map every selected read set with bwa mem and produce one sorted, indexed BAM
    #[command(name = "run-bwa")]
    RunBwa(RunBwaArgs),

    /// Plot read length and average quality distributions of FASTQ files
    #[command(name = "fqstats")]
    Fqstats(FqstatsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunBwaArgs {
    #[arg(help = "Directory containing the read files")]
    pub reads: PathBuf,

    #[arg(help = "Reference FASTA file, or a directory of FASTA files to concatenate")]
    pub reference: PathBuf,

    #[arg(
        long,
        value_enum,
        num_args = 1..,
        default_values_t = Platform::ALL.to_vec(),
        help = "Only map reads from these platforms"
    )]
    pub platforms: Vec<Platform>,

    #[arg(short = 'o', long = "output", default_value = DEFAULT_OUTPUT_BAM, help = "Output BAM path. Temporary files go into a 'bwa' directory next to it.")]
    pub output: PathBuf,

    #[arg(long = "keep-temp", action)]
    pub keep_temp: bool,

    #[arg(short = 't', long = "threads", default_value_t = 1, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    pub threads: usize,
}

#[derive(Args, Debug, Clone)]
pub struct FqstatsArgs {
    #[arg(required = true, num_args = 1.., help = "FASTQ files to get stats for")]
    pub fastqs: Vec<PathBuf>,

    #[arg(short = 'o', long = "output", default_value = DEFAULT_PLOT_PNG)]
    pub output: PathBuf,
}
