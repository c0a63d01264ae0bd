// Input preparation: read sets are concatenated into at most three FASTQ
// files (forward, reverse, non-paired) and reference directories into one FASTA.
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use log::{debug, info};

use crate::config::defs::{
    ABIF_TAG, COMPILED_REFERENCE, FASTA_TAG, FASTQ_TAG, FORWARD_READS, NONPAIRED_READS, REVERSE_READS, SFF_TAG,
};
use crate::utils::abif::abif_to_fastq;
use crate::utils::fastx::{fastx_filetype, record_counter};
use crate::utils::file::append_decompressed;
use crate::utils::platform::ReadSet;
use crate::utils::sff::sff_to_fastq;


#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledReads {
    pub forward: Option<PathBuf>,
    pub reverse: Option<PathBuf>,
    pub nonpaired: Option<PathBuf>,
}

impl CompiledReads {
    pub fn is_empty(&self) -> bool {
        self.forward.is_none() && self.reverse.is_none() && self.nonpaired.is_none()
    }

    /// Forward and reverse files, when both exist.
    pub fn paired(&self) -> Option<(&Path, &Path)> {
        match (&self.forward, &self.reverse) {
            (Some(f), Some(r)) => Some((f.as_path(), r.as_path())),
            _ => None,
        }
    }
}

/// Writer that remembers the last byte so concatenated files can be
/// newline-separated.
struct TrackingWriter<W: Write> {
    inner: W,
    last: Option<u8>,
}

impl<W: Write> TrackingWriter<W> {
    fn new(inner: W) -> Self {
        TrackingWriter { inner, last: None }
    }

    fn ensure_newline(&mut self) -> io::Result<()> {
        match self.last {
            Some(b) if b != b'\n' => self.write_all(b"\n"),
            _ => Ok(()),
        }
    }

    fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for TrackingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        if n > 0 {
            self.last = Some(buf[n - 1]);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Lazily created output file.
struct Sink {
    path: PathBuf,
    writer: Option<TrackingWriter<BufWriter<File>>>,
}

impl Sink {
    fn new(path: PathBuf) -> Self {
        Sink { path, writer: None }
    }

    fn writer(&mut self) -> io::Result<&mut TrackingWriter<BufWriter<File>>> {
        if self.writer.is_none() {
            let file = File::create(&self.path)?;
            self.writer = Some(TrackingWriter::new(BufWriter::new(file)));
        }
        // just created above when missing
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "writer not initialised"))
    }

    /// Closes the file. A file that never received a byte is removed.
    fn finish(self) -> io::Result<Option<PathBuf>> {
        match self.writer {
            Some(w) if w.last.is_some() => {
                w.into_inner().into_inner().map_err(|e| e.into_error())?.sync_all()?;
                Ok(Some(self.path))
            }
            Some(w) => {
                drop(w);
                fs::remove_file(&self.path)?;
                debug!("No reads for {}, removed it", self.path.display());
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

/// Appends one read file to a FASTQ sink, converting SFF and AB1 on the way.
fn append_reads<W: Write>(path: &Path, writer: &mut TrackingWriter<W>) -> Result<()> {
    let kind = fastx_filetype(path)?;
    match kind {
        FASTQ_TAG => {
            writer.ensure_newline()?;
            let bytes = append_decompressed(path, writer)?;
            debug!("Appended {} bytes from {}", bytes, path.display());
        }
        SFF_TAG => {
            writer.ensure_newline()?;
            let n = sff_to_fastq(path, writer)?;
            debug!("Converted {} reads from {}", n, path.display());
        }
        ABIF_TAG => {
            writer.ensure_newline()?;
            abif_to_fastq(path, writer)?;
            debug!("Converted trace {}", path.display());
        }
        other => {
            return Err(anyhow!("{} is {} and cannot be used as reads", path.display(), other));
        }
    }
    Ok(())
}


/// Concatenates read sets into F.fq / R.fq / NP.fq inside `out_dir`.
///
/// # Arguments
///
/// * `read_sets` - Paired and non-paired inputs, in the order they are appended.
/// * `out_dir` - Created if missing.
///
/// # Returns
/// CompiledReads with None for every kind of read that was not given.
pub fn compile_reads(read_sets: &[ReadSet], out_dir: &Path) -> Result<CompiledReads> {
    fs::create_dir_all(out_dir)
        .map_err(|e| anyhow!("Failed to create {}: {}", out_dir.display(), e))?;

    let mut forward = Sink::new(out_dir.join(FORWARD_READS));
    let mut reverse = Sink::new(out_dir.join(REVERSE_READS));
    let mut nonpaired = Sink::new(out_dir.join(NONPAIRED_READS));

    for set in read_sets {
        match set {
            ReadSet::Paired(r1, r2) => {
                append_reads(r1, forward.writer()?)?;
                append_reads(r2, reverse.writer()?)?;
            }
            ReadSet::NonPaired(p) => {
                append_reads(p, nonpaired.writer()?)?;
            }
        }
    }

    let compiled = CompiledReads {
        forward: forward.finish()?,
        reverse: reverse.finish()?,
        nonpaired: nonpaired.finish()?,
    };

    for path in [&compiled.forward, &compiled.reverse, &compiled.nonpaired].into_iter().flatten() {
        info!("Compiled {} reads into {}", record_counter(path)?, path.display());
    }
    Ok(compiled)
}


/// Concatenates every FASTA file of a directory, sorted by name.
/// A newline is inserted between files when one lacks a trailing newline,
/// so the output is one byte longer per such file (the last excepted).
///
/// # Arguments
///
/// * `ref_dir` - Directory holding FASTA files, optionally gzipped.
/// * `out_path` - Concatenated reference to write.
///
/// # Returns
/// `out_path` on success.
pub fn compile_refs(ref_dir: &Path, out_path: &Path) -> Result<PathBuf> {
    let mut refs: Vec<PathBuf> = fs::read_dir(ref_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p != out_path)
        .filter(|p| matches!(fastx_filetype(p), Ok(FASTA_TAG)))
        .collect();
    refs.sort();

    if refs.is_empty() {
        return Err(anyhow!("No FASTA files found in reference directory {}", ref_dir.display()));
    }

    let mut writer = TrackingWriter::new(BufWriter::new(File::create(out_path)?));
    for r in &refs {
        writer.ensure_newline()?;
        append_decompressed(r, &mut writer)?;
    }
    writer.flush()?;
    info!("Compiled {} reference file(s) into {}", refs.len(), out_path.display());
    Ok(out_path.to_path_buf())
}

/// Returns the reference FASTA to align against, compiling a directory of
/// references into `work_dir` when needed.
pub fn prepare_reference(reference: &Path, work_dir: &Path) -> Result<PathBuf> {
    if reference.is_dir() {
        compile_refs(reference, &work_dir.join(COMPILED_REFERENCE))
    } else if reference.is_file() {
        Ok(reference.to_path_buf())
    } else {
        Err(anyhow!("Reference {} does not exist", reference.display()))
    }
}
