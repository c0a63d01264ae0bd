/// Per-file FASTQ statistics: read length and average quality distributions
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Result};
use seq_io::fastq::{Reader as FastqReader, Record};

use crate::config::defs::PHRED_OFFSET;
use crate::utils::file::open_reader;


#[derive(Debug, Clone, Default, PartialEq)]
pub struct FqStats {
    /// read length -> number of reads
    pub length_bins: BTreeMap<u32, u64>,
    /// rounded average quality -> number of reads
    pub qual_bins: BTreeMap<u32, u64>,
    pub max_length: u32,
    pub max_avg_qual: u32,
    pub max_length_count: u64,
    pub max_qual_count: u64,
}

impl FqStats {
    /// Builds the distributions from (length, average quality) pairs.
    pub fn from_measurements<I>(measurements: I) -> Self
    where
        I: IntoIterator<Item = (u32, u32)>,
    {
        let (lengths, quals): (Vec<u32>, Vec<u32>) = measurements.into_iter().unzip();
        let (length_bins, max_length_count) = bin_values(lengths);
        let (qual_bins, max_qual_count) = bin_values(quals);
        FqStats {
            max_length: length_bins.keys().next_back().copied().unwrap_or(0),
            max_avg_qual: qual_bins.keys().next_back().copied().unwrap_or(0),
            length_bins,
            qual_bins,
            max_length_count,
            max_qual_count,
        }
    }

    /// A file can only be drawn when every axis has a non-zero extent.
    pub fn is_plottable(&self) -> bool {
        self.max_length > 0
            && self.max_avg_qual > 0
            && self.max_length_count > 0
            && self.max_qual_count > 0
    }
}


/// Mean Phred+33 quality of one read, rounded half away from zero.
///
/// # Arguments
///
/// * `qual` - Raw quality string.
///
/// # Returns
/// 0 for an empty quality string.
pub fn read_avg_qual(qual: &[u8]) -> u32 {
    if qual.is_empty() {
        return 0;
    }
    let total: u64 = qual
        .iter()
        .map(|&q| q.saturating_sub(PHRED_OFFSET) as u64)
        .sum();
    (total as f64 / qual.len() as f64).round() as u32
}

/// Counts occurrences of each value.
///
/// # Returns
/// The bins and the largest count (0 when `values` is empty).
pub fn bin_values<I>(values: I) -> (BTreeMap<u32, u64>, u64)
where
    I: IntoIterator<Item = u32>,
{
    let mut bins: BTreeMap<u32, u64> = BTreeMap::new();
    for v in values {
        *bins.entry(v).or_insert(0) += 1;
    }
    let max_count = bins.values().copied().max().unwrap_or(0);
    (bins, max_count)
}


/// Reads a FASTQ file (optionally gzipped) and computes its statistics.
pub fn fqstats(path: &Path) -> Result<FqStats> {
    let reader = open_reader(path)
        .map_err(|e| anyhow!("Failed to open {}: {}", path.display(), e))?;
    let mut fastq = FastqReader::new(reader);

    let mut measurements: Vec<(u32, u32)> = Vec::new();
    while let Some(result) = fastq.next() {
        let record = result.map_err(|e| anyhow!("Invalid FASTQ in {}: {}", path.display(), e))?;
        measurements.push((record.seq().len() as u32, read_avg_qual(record.qual())));
    }
    Ok(FqStats::from_measurements(measurements))
}
