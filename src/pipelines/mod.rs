pub mod fqstats;
pub mod run_bwa;
