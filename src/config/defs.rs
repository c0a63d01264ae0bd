use std::collections::HashMap;
use std::path::PathBuf;

use lazy_static::lazy_static;
use thiserror::Error;

use crate::cli::Arguments;

// External software
pub const BWA_TAG: &str = "bwa";
pub const SAMTOOLS_TAG: &str = "samtools";


lazy_static! {
    // Minimum (major, minor) versions
    pub static ref TOOL_VERSIONS: HashMap<&'static str, (u32, u32)> = {
        let mut m = HashMap::new();
        m.insert(BWA_TAG, (0, 7));
        m.insert(SAMTOOLS_TAG, (1, 10));

        m
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BwaSubcommand {
    Index,
    Mem,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamtoolsSubcommand {
    View,
    Sort,
    Merge,
    Index,
}

// Static Filenames
pub const DEFAULT_OUTPUT_BAM: &str = "bwa_mem.bam";
pub const DEFAULT_PLOT_PNG: &str = "out.png";
pub const WORK_DIR_NAME: &str = "bwa";
pub const READS_DIR_NAME: &str = "reads";
pub const COMPILED_REFERENCE: &str = "reference.fa";
pub const FORWARD_READS: &str = "F.fq";
pub const REVERSE_READS: &str = "R.fq";
pub const NONPAIRED_READS: &str = "NP.fq";
pub const PAIRED_SAM: &str = "paired.sam";
pub const NONPAIRED_SAM: &str = "nonpaired.sam";
pub const BAM_INDEX_EXT: &str = "bai";
pub const BWA_INDEX_EXTS: &[&'static str] = &["amb", "ann", "bwt", "pac", "sa"];


// Static Parameters
pub const FASTA_TAG : &str = "fasta";
pub const FASTQ_TAG : &str = "fastq";
pub const SFF_TAG : &str = "sff";
pub const ABIF_TAG : &str = "ab1";
pub const FASTA_EXTS: &[&'static str] = &["fasta", "fa", "fna", "faa", "ffn", "frn"];
pub const FASTQ_EXTS: &[&'static str] = &["fastq", "fq"];
pub const PHRED_OFFSET: u8 = 33;

// fqstats figure geometry, pixels
pub const PLOT_WIDTH: u32 = 1600;
pub const PLOT_ROW_HEIGHT: u32 = 200;
pub const PLOT_X_MIN: f64 = -10.0;


#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("No reads found for the selected platforms in {0}")]
    NoReads(String),

    #[error("bwa mem exited with status {code:?}: {stderr}")]
    AlignerFailed { code: Option<i32>, stderr: String },

    #[error("Tool '{tool}' failed: {error}")]
    ToolExecution { tool: String, error: String },

    #[error("IO error: {0}")]
    IOError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}


pub struct RunConfig  {
    pub cwd: PathBuf,
    pub args: Arguments,
    pub threads: usize,
}
