// samtools wrappers: SAM -> BAM, sort, merge, index
use std::path::{Path, PathBuf};

use log::info;

use crate::config::defs::{PipelineError, SamtoolsSubcommand, BAM_INDEX_EXT};
use crate::utils::command::samtools::SamtoolsConfig;
use crate::utils::command::{command_for, run_checked, CommandRunner};
use crate::utils::file::file_path_manipulator;


fn path_str(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

fn flag(f: &str, value: Option<String>) -> (String, Option<String>) {
    (f.to_string(), value)
}


/// Converts a SAM file to BAM.
///
/// # Arguments
///
/// * `runner` - Runs samtools.
/// * `sam` - Input SAM.
/// * `bam` - Output BAM.
///
/// # Returns
/// Path to `bam`.
pub async fn sam_to_bam<R: CommandRunner>(runner: &R, sam: &Path, bam: &Path) -> Result<PathBuf, PipelineError> {
    let config = SamtoolsConfig {
        subcommand: SamtoolsSubcommand::View,
        subcommand_fields: vec![flag("-b", None), flag("-o", Some(path_str(bam)))],
        inputs: vec![sam.to_path_buf()],
    };
    run_checked(runner, command_for(&config)).await?;
    Ok(bam.to_path_buf())
}

/// Coordinate-sorts a BAM file.
pub async fn sort_bam<R: CommandRunner>(
    runner: &R,
    bam: &Path,
    sorted: &Path,
    threads: usize,
) -> Result<PathBuf, PipelineError> {
    let config = SamtoolsConfig {
        subcommand: SamtoolsSubcommand::Sort,
        subcommand_fields: vec![
            flag("-@", Some(threads.max(1).to_string())),
            flag("-o", Some(path_str(sorted))),
        ],
        inputs: vec![bam.to_path_buf()],
    };
    run_checked(runner, command_for(&config)).await?;
    Ok(sorted.to_path_buf())
}

/// Merges sorted BAMs into `merged`, overwriting it if present.
pub async fn merge_bams<R: CommandRunner>(
    runner: &R,
    bams: &[PathBuf],
    merged: &Path,
    threads: usize,
) -> Result<PathBuf, PipelineError> {
    if bams.len() < 2 {
        return Err(PipelineError::InvalidConfig(format!(
            "Merging needs at least two BAM files, got {}",
            bams.len()
        )));
    }
    let config = SamtoolsConfig {
        subcommand: SamtoolsSubcommand::Merge,
        subcommand_fields: vec![
            flag("-f", None),
            flag("-@", Some(threads.max(1).to_string())),
            flag("-o", Some(path_str(merged))),
        ],
        inputs: bams.to_vec(),
    };
    run_checked(runner, command_for(&config)).await?;
    info!("Merged {} BAM files into {}", bams.len(), merged.display());
    Ok(merged.to_path_buf())
}

/// Indexes a sorted BAM.
///
/// # Returns
/// The `<bam>.bai` path samtools writes.
pub async fn index_bam<R: CommandRunner>(runner: &R, bam: &Path) -> Result<PathBuf, PipelineError> {
    let config = SamtoolsConfig {
        subcommand: SamtoolsSubcommand::Index,
        subcommand_fields: Vec::new(),
        inputs: vec![bam.to_path_buf()],
    };
    run_checked(runner, command_for(&config)).await?;
    Ok(file_path_manipulator(bam, None, None, Some(BAM_INDEX_EXT), "."))
}
