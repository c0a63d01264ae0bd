use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::info;
use rayon::prelude::*;
use tokio::task;

use crate::cli::Module;
use crate::config::defs::{PipelineError, RunConfig};
use crate::utils::file::resolve_path;
use crate::utils::plotting::plot_fqs;
use crate::utils::stats::{fqstats, FqStats};


/// Row label for a file: its name with ".fastq" removed.
pub fn plot_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().replace(".fastq", ""))
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Computes statistics for every file in parallel, keeping the input order.
pub fn collect_stats(paths: &[PathBuf]) -> Result<Vec<(String, FqStats)>> {
    paths
        .par_iter()
        .map(|p| -> Result<(String, FqStats)> {
            let stats = fqstats(p)?;
            info!("{}: {} distinct read lengths, max {}", p.display(), stats.length_bins.len(), stats.max_length);
            Ok((plot_name(p), stats))
        })
        .collect()
}


pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let args = match &config.args.module {
        Module::Fqstats(args) => args,
        other => return Err(PipelineError::InvalidConfig(format!("fqstats called with {:?}", other))),
    };

    let fastqs: Vec<PathBuf> = args.fastqs.iter().map(|p| resolve_path(p, &config.cwd)).collect();
    if let Some(missing) = fastqs.iter().find(|p| !p.is_file()) {
        return Err(PipelineError::InvalidConfig(format!("{} does not exist", missing.display())));
    }
    let output = resolve_path(&args.output, &config.cwd);

    let rows = task::spawn_blocking(move || -> Result<usize> {
        let named_stats = collect_stats(&fastqs)?;
        plot_fqs(&named_stats, &output)
    })
    .await
    .map_err(|e| PipelineError::Other(anyhow!("Stats task panicked: {}", e)))??;

    info!("Plotted {} of {} file(s)", rows, args.fastqs.len());
    Ok(())
}
