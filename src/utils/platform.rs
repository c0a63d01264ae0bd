// Groups the files of a read directory by sequencing platform.
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::cli::Platform;

lazy_static! {
    // 1090-01_S1_L001_R1_001.fastq, optionally with a date suffix
    static ref MISEQ_RE: Regex = Regex::new(
        r"^(?P<sample>.+?)_S\d+_L\d{3}_R(?P<read>[12])_\d{3}.*\.f(?:ast)?q(?:\.gz)?$"
    ).unwrap();
    // IX001_R_2013_01_01_..._0000.IonXpress_001_2013_01_01.fastq
    static ref ION_RE: Regex = Regex::new(
        r"^IX\d+_.*IonXpress_\d+.*\.f(?:ast)?q(?:\.gz)?$"
    ).unwrap();
    static ref ROCHE_RE: Regex = Regex::new(r"(?i)\.sff$").unwrap();
    static ref SANGER_TRACE_RE: Regex = Regex::new(r"(?i)\.ab1$").unwrap();
    static ref FASTQ_RE: Regex = Regex::new(r"(?i)\.f(?:ast)?q(?:\.gz)?$").unwrap();
}

/// One unit of input for the aligner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadSet {
    Paired(PathBuf, PathBuf),
    NonPaired(PathBuf),
}

/// Classification of a single file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub platform: Platform,
    /// For MiSeq: the name without read number or extension, and the read number.
    pub mate: Option<(String, u8)>,
}

/// Works out which platform produced a file from its name alone.
///
/// # Arguments
///
/// * `file_name` - bare file name, no directory.
///
/// # Returns
/// None for files that are not reads.
pub fn classify(file_name: &str) -> Option<Classified> {
    if file_name.starts_with('.') {
        return None;
    }

    if let Some(caps) = MISEQ_RE.captures(file_name) {
        let read = caps.name("read")?;
        // mates may differ in compression, so the extension is not part of the key
        let ext_start = FASTQ_RE.find(file_name).map(|m| m.start()).unwrap_or(file_name.len());
        let key = format!("{}{}", &file_name[..read.start()], &file_name[read.end()..ext_start]);
        let num: u8 = read.as_str().parse().ok()?;
        return Some(Classified { platform: Platform::MiSeq, mate: Some((key, num)) });
    }
    if ION_RE.is_match(file_name) {
        return Some(Classified { platform: Platform::IonTorrent, mate: None });
    }
    if ROCHE_RE.is_match(file_name) {
        return Some(Classified { platform: Platform::Roche454, mate: None });
    }
    if SANGER_TRACE_RE.is_match(file_name) || FASTQ_RE.is_match(file_name) {
        return Some(Classified { platform: Platform::Sanger, mate: None });
    }
    None
}


/// Lists a read directory and groups the files by platform.
/// MiSeq R1/R2 files that share everything but the read number become pairs;
/// a mate-less MiSeq file is treated as non-paired.
///
/// # Arguments
///
/// * `dir` - Directory of read files. Not searched recursively.
///
/// # Returns
/// Map of platform to its read sets, each list sorted by path.
pub fn reads_by_platform(dir: &Path) -> Result<BTreeMap<Platform, Vec<ReadSet>>> {
    if !dir.is_dir() {
        return Err(anyhow!("Read directory {} does not exist or is not a directory", dir.display()));
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    let mut by_platform: BTreeMap<Platform, Vec<ReadSet>> = BTreeMap::new();
    let mut mates: BTreeMap<String, [Option<PathBuf>; 2]> = BTreeMap::new();

    for path in files {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };
        let Some(classified) = classify(&name) else {
            debug!("Ignoring {} in read directory", name);
            continue;
        };
        match classified.mate {
            Some((key, num)) => {
                let slot = &mut mates.entry(key).or_default()[(num - 1) as usize];
                *slot = Some(path);
            }
            None => by_platform
                .entry(classified.platform)
                .or_default()
                .push(ReadSet::NonPaired(path)),
        }
    }

    for (_, pair) in mates {
        let set = match pair {
            [Some(r1), Some(r2)] => ReadSet::Paired(r1, r2),
            [Some(r), None] | [None, Some(r)] => ReadSet::NonPaired(r),
            [None, None] => continue,
        };
        by_platform.entry(Platform::MiSeq).or_default().push(set);
    }

    for sets in by_platform.values_mut() {
        sets.sort_by(|a, b| first_path(a).cmp(first_path(b)));
    }

    for (platform, sets) in &by_platform {
        debug!("{}: {} read set(s)", platform, sets.len());
    }
    Ok(by_platform)
}

fn first_path(set: &ReadSet) -> &Path {
    match set {
        ReadSet::Paired(r1, _) => r1,
        ReadSet::NonPaired(p) => p,
    }
}

/// Flattens the read sets of the requested platforms, in request order.
pub fn select_platforms(
    by_platform: &BTreeMap<Platform, Vec<ReadSet>>,
    platforms: &[Platform],
) -> Vec<ReadSet> {
    let mut seen: HashSet<Platform> = HashSet::new();
    let mut selected = Vec::new();
    for platform in platforms {
        if !seen.insert(*platform) {
            continue;
        }
        if let Some(sets) = by_platform.get(platform) {
            selected.extend(sets.iter().cloned());
        }
    }
    selected
}
