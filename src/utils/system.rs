// src/utils/system.rs: System functions

use log::{debug, warn};
use sysinfo::System;


/// Caps the requested thread count to the physical cores of the machine.
///
/// # Arguments
///
/// * `args_threads` - Threads asked for on the command line.
///
/// # Returns
///
/// usize threads to hand to the aligner and samtools
pub fn detect_cores(args_threads: usize) -> usize {
    let physical_cores = System::physical_core_count().unwrap_or(1);
    let threads = cap_threads(args_threads, physical_cores);
    if threads < args_threads {
        warn!(
            "Requested {} threads but only {} physical cores found; using {}",
            args_threads, physical_cores, threads
        );
    }
    debug!("Detected {} physical cores; using {} threads", physical_cores, threads);
    threads
}

fn cap_threads(requested: usize, physical_cores: usize) -> usize {
    requested.min(physical_cores.max(1)).max(1)
}
