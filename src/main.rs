use std::env;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use env_logger::Builder;
use log::{self, LevelFilter, error, info};

use ngs_mapper::cli::{parse, Module};
use ngs_mapper::config::defs::{PipelineError, RunConfig};
use ngs_mapper::pipelines::{fqstats, run_bwa};
use ngs_mapper::utils::command::ProcessRunner;
use ngs_mapper::utils::system::detect_cores;


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n ngs_mapper\n-------------\n");

    let dir = env::current_dir()?;
    info!("The current directory is {:?}", dir);

    let requested_threads = match &args.module {
        Module::RunBwa(a) => a.threads,
        Module::Fqstats(_) => 1,
    };
    let threads = detect_cores(requested_threads);

    let run_config = Arc::new(RunConfig {
        cwd: dir,
        args,
        threads,
    });

    let result = match &run_config.args.module {
        Module::RunBwa(_) => run_bwa_run(run_config.clone()).await,
        Module::Fqstats(_) => fqstats_run(run_config.clone()).await,
    };

    if let Err(e) = result {
        error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
        std::process::exit(1);
    }

    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}


async fn run_bwa_run(run_config: Arc<RunConfig>) -> Result<(), PipelineError> {
    run_bwa::run(run_config, &ProcessRunner).await.map(|_| ())
}

async fn fqstats_run(run_config: Arc<RunConfig>) -> Result<(), PipelineError> {
    fqstats::run(run_config).await
}
