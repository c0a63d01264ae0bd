use seq_io::fastq::Reader as FastqReader;
use std::io::{self, Write};
use std::path::Path;
use crate::config::defs::{ABIF_TAG, FASTA_EXTS, FASTA_TAG, FASTQ_EXTS, FASTQ_TAG, PHRED_OFFSET, SFF_TAG};
use crate::utils::file::{extension_remover, open_reader, WriteToFile};


/// A read decoded from a binary format (SFF, ABIF), ready to be appended to
/// a compiled FASTQ file. `qual` is already Phred+33 encoded.
#[derive(Clone, Debug, PartialEq)]
pub struct FastqRecord {
    pub id: String,
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
}

impl FastqRecord {
    /// Builds a record from raw Phred scores.
    pub fn from_phred(id: String, seq: Vec<u8>, phred: &[u8]) -> Self {
        FastqRecord {
            id,
            seq,
            qual: phred.iter().map(|q| q.saturating_add(PHRED_OFFSET)).collect(),
        }
    }
}

impl WriteToFile for FastqRecord {
    fn write_to_file<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_fastq_record(writer, &self.id, &self.seq, &self.qual)
    }
}

pub fn write_fastq_record<W: Write>(
    writer: &mut W,
    id: &str,
    seq: &[u8],
    qual: &[u8],
) -> io::Result<()> {
    if seq.len() != qual.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Read {} has {} bases but {} qualities", id, seq.len(), qual.len()),
        ));
    }
    writer.write_all(b"@")?;
    writer.write_all(id.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.write_all(seq)?;
    writer.write_all(b"\n+\n")?;
    writer.write_all(qual)?;
    writer.write_all(b"\n")?;
    Ok(())
}


/// Determines the read format of a path from its extensions.
/// Checks extensions, not the body. A trailing gz is skipped.
///
/// # Arguments
///
/// * `path` - Path to a sequence file.
///
/// # Returns
/// io::Result<&str>: one of fasta, fastq, sff or ab1.
///
pub fn fastx_filetype(path: &Path) -> io::Result<&'static str> {
    let (_, extensions) = extension_remover(path);

    for ext in extensions.iter().rev() {
        if FASTA_EXTS.iter().any(|&e| e.eq_ignore_ascii_case(ext)) {
            return Ok(FASTA_TAG);
        }
        if FASTQ_EXTS.iter().any(|&e| e.eq_ignore_ascii_case(ext)) {
            return Ok(FASTQ_TAG);
        }
        if ext.eq_ignore_ascii_case(SFF_TAG) {
            return Ok(SFF_TAG);
        }
        if ext.eq_ignore_ascii_case(ABIF_TAG) {
            return Ok(ABIF_TAG);
        }
    }

    Err(io::Error::new(
        io::ErrorKind::InvalidData,
        format!(
            "File '{}' has invalid extension(s) '{:?}'. Expected FASTA ({:?}), FASTQ ({:?}), {} or {}.",
            path.display(),
            extensions,
            FASTA_EXTS,
            FASTQ_EXTS,
            SFF_TAG,
            ABIF_TAG,
        ),
    ))
}


/// Counts the records of a FASTQ file, optionally gzipped.
///
/// # Arguments
///
/// * `path` - Valid path to a FASTQ file.
///
/// # Returns
/// u64: Number of records.
///
pub fn record_counter(path: &Path) -> io::Result<u64> {
    if fastx_filetype(path)? != FASTQ_TAG {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a FASTQ file", path.display()),
        ));
    }
    let mut counter = 0;
    for record in FastqReader::new(open_reader(path)?).into_records() {
        record.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        counter += 1;
    }
    Ok(counter)
}
