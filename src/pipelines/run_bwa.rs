use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use futures::future::try_join_all;
use log::{debug, info};
use tokio::task;

use crate::cli::{Module, RunBwaArgs};
use crate::config::defs::{
    PipelineError, RunConfig, BWA_INDEX_EXTS, BWA_TAG, NONPAIRED_SAM, PAIRED_SAM, READS_DIR_NAME, SAMTOOLS_TAG,
    WORK_DIR_NAME,
};
use crate::utils::command::bwa::BwaConfig;
use crate::utils::command::{check_versions, command_for, CommandRunner};
use crate::utils::file::{file_path_manipulator, move_file, parent_dir, resolve_path, TempWorkspace};
use crate::utils::platform::{reads_by_platform, select_platforms};
use crate::utils::reads::{compile_reads, prepare_reference, CompiledReads};
use crate::utils::sambam::{index_bam, merge_bams, sam_to_bam, sort_bam};


/// The five files `bwa index` writes next to a reference.
pub fn index_files(reference: &Path) -> Vec<PathBuf> {
    BWA_INDEX_EXTS
        .iter()
        .map(|ext| file_path_manipulator(reference, None, None, Some(ext), "."))
        .collect()
}

/// Indexes the reference unless a complete index is already present.
///
/// # Arguments
///
/// * `runner` - Runs bwa.
/// * `reference` - FASTA to index.
///
/// # Returns
/// true when `bwa index` was run, false when the existing index was reused.
pub async fn index_reference<R: CommandRunner>(runner: &R, reference: &Path) -> Result<bool, PipelineError> {
    if index_files(reference).iter().all(|p| p.exists()) {
        debug!("Reusing existing bwa index for {}", reference.display());
        return Ok(false);
    }

    info!("Indexing reference {}", reference.display());
    let spec = command_for(&BwaConfig::index(reference.to_path_buf()));
    let output = runner
        .run(spec)
        .await
        .map_err(|e| PipelineError::InvalidReference(format!("{}: {}", reference.display(), e)))?;
    if !output.success {
        return Err(PipelineError::InvalidReference(format!(
            "bwa index failed for {}: {}",
            reference.display(),
            output.stderr_lossy().trim()
        )));
    }
    Ok(true)
}


/// Aligns one read set with `bwa mem`, writing SAM to `output`.
///
/// # Arguments
///
/// * `read1` - Forward or non-paired reads.
/// * `mate` - Reverse reads for a paired run.
/// * `threads` - Passed as `-t`.
///
/// # Returns
/// Path to the SAM file.
pub async fn bwa_mem<R: CommandRunner>(
    runner: &R,
    read1: &Path,
    mate: Option<&Path>,
    reference: &Path,
    output: &Path,
    threads: usize,
) -> Result<PathBuf, PipelineError> {
    index_reference(runner, reference).await?;

    let config = BwaConfig::mem(
        reference.to_path_buf(),
        read1.to_path_buf(),
        mate.map(Path::to_path_buf),
        threads,
    );
    let spec = command_for(&config).stdout_to(output);
    match mate {
        Some(m) => info!("Aligning pairs {} + {} into {}", read1.display(), m.display(), output.display()),
        None => info!("Aligning {} into {}", read1.display(), output.display()),
    }

    let result = runner.run(spec).await.map_err(|e| PipelineError::ToolExecution {
        tool: BWA_TAG.to_string(),
        error: e.to_string(),
    })?;
    if !result.success {
        return Err(PipelineError::AlignerFailed {
            code: result.code,
            stderr: result.stderr_lossy().trim().to_string(),
        });
    }
    Ok(output.to_path_buf())
}


/// Converts a SAM into a sorted BAM next to it.
async fn sam_to_sorted_bam<R: CommandRunner>(runner: &R, sam: &Path, threads: usize) -> Result<PathBuf, PipelineError> {
    let bam = sam.with_extension("bam");
    let sorted = sam.with_extension("sorted.bam");
    sam_to_bam(runner, sam, &bam).await?;
    sort_bam(runner, &bam, &sorted, threads).await
}


fn run_bwa_args(config: &RunConfig) -> Result<&RunBwaArgs, PipelineError> {
    match &config.args.module {
        Module::RunBwa(args) => Ok(args),
        other => Err(PipelineError::InvalidConfig(format!("run-bwa called with {:?}", other))),
    }
}

async fn blocking<T, F>(f: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Other(anyhow!("Blocking task panicked: {}", e)))?
        .map_err(PipelineError::Other)
}


/// Maps every selected read set and produces one sorted, indexed BAM.
///
/// Temporary files live in a `bwa` directory next to the output, which is
/// removed on the way out (also on failure) unless `--keep-temp` is given.
///
/// # Arguments
///
/// * `config` - Run configuration holding `run-bwa` arguments.
/// * `runner` - Runs bwa and samtools.
///
/// # Returns
/// Path to the output BAM.
pub async fn run<R>(config: Arc<RunConfig>, runner: &R) -> Result<PathBuf, PipelineError>
where
    R: CommandRunner + Sync,
{
    let args = run_bwa_args(&config)?;
    let threads = config.threads;

    check_versions(runner, &[BWA_TAG, SAMTOOLS_TAG])
        .await
        .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;

    let reads_dir = resolve_path(&args.reads, &config.cwd);
    let reference = resolve_path(&args.reference, &config.cwd);
    let output = resolve_path(&args.output, &config.cwd);

    if !reads_dir.is_dir() {
        return Err(PipelineError::InvalidConfig(format!(
            "Read directory {} does not exist",
            reads_dir.display()
        )));
    }
    if !reference.exists() {
        return Err(PipelineError::InvalidReference(format!("{} does not exist", reference.display())));
    }

    let workspace = TempWorkspace::create(&parent_dir(&output).join(WORK_DIR_NAME), args.keep_temp)
        .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
    info!("Working directory: {}", workspace.path().display());

    // Inputs
    let platforms = args.platforms.clone();
    let compile_from = reads_dir.clone();
    let compile_into = workspace.join(READS_DIR_NAME);
    let compiled: CompiledReads = blocking(move || {
        let by_platform = reads_by_platform(&compile_from)?;
        let selected = select_platforms(&by_platform, &platforms);
        compile_reads(&selected, &compile_into)
    })
    .await?;

    if compiled.is_empty() {
        return Err(PipelineError::NoReads(reads_dir.display().to_string()));
    }

    let work_path = workspace.path().to_path_buf();
    let reference = blocking(move || prepare_reference(&reference, &work_path))
        .await
        .map_err(|e| PipelineError::InvalidReference(e.to_string()))?;

    // Alignment, paired first
    let mut sams: Vec<PathBuf> = Vec::new();
    if let Some((forward, reverse)) = compiled.paired() {
        sams.push(bwa_mem(runner, forward, Some(reverse), &reference, &workspace.join(PAIRED_SAM), threads).await?);
    }
    if let Some(nonpaired) = &compiled.nonpaired {
        sams.push(bwa_mem(runner, nonpaired, None, &reference, &workspace.join(NONPAIRED_SAM), threads).await?);
    }
    if sams.is_empty() {
        // Forward reads without a reverse file cannot be aligned as pairs
        return Err(PipelineError::NoReads(reads_dir.display().to_string()));
    }

    // SAM -> sorted BAM
    let sorted_bams = try_join_all(sams.iter().map(|sam| sam_to_sorted_bam(runner, sam, threads))).await?;

    match sorted_bams.as_slice() {
        [single] => {
            move_file(single, &output)?;
            info!("Moved {} to {}", single.display(), output.display());
        }
        _ => {
            merge_bams(runner, &sorted_bams, &output, threads).await?;
        }
    }

    let bai = index_bam(runner, &output).await?;
    info!("Wrote {} and {}", output.display(), bai.display());

    if workspace.is_kept() {
        info!("Keeping temporary files in {}", workspace.path().display());
    }
    Ok(output)
}
