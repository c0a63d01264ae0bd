// Roche/454 Standard Flowgram Format reader.
// All integers are big-endian; every section is padded to 8 bytes.
use std::io::{self, Read, Write};
use std::path::Path;

use log::debug;

use crate::utils::fastx::FastqRecord;
use crate::utils::file::{open_reader, WriteToFile};

const SFF_MAGIC: u32 = 0x2E73_6666; // ".sff"
const SFF_VERSION: [u8; 4] = [0, 0, 0, 1];
const COMMON_HEADER_FIXED: u64 = 31;
const READ_HEADER_FIXED: u64 = 16;

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn padded(len: u64) -> u64 {
    (len + 7) / 8 * 8
}

#[derive(Debug, Clone)]
pub struct SffHeader {
    pub index_offset: u64,
    pub index_length: u32,
    pub number_of_reads: u32,
    pub header_length: u16,
    pub flows_per_read: u16,
    pub flow_chars: Vec<u8>,
    pub key_sequence: Vec<u8>,
}

/// A single read after clipping.
#[derive(Debug, Clone, PartialEq)]
pub struct SffRead {
    pub name: String,
    pub bases: Vec<u8>,
    pub quals: Vec<u8>,
}

impl SffRead {
    pub fn into_fastq(self) -> FastqRecord {
        FastqRecord::from_phred(self.name, self.bases, &self.quals)
    }
}

/// Streams reads out of an SFF file, tracking the byte offset so that an
/// index block found between reads can be skipped.
pub struct SffReader<R: Read> {
    inner: R,
    offset: u64,
    header: SffHeader,
    reads_left: u32,
}

impl<R: Read> SffReader<R> {
    pub fn new(mut inner: R) -> io::Result<Self> {
        let mut offset = 0u64;
        let magic = u32::from_be_bytes(read_array(&mut inner, &mut offset)?);
        if magic != SFF_MAGIC {
            return Err(invalid(format!("Not an SFF file (magic {:#010x})", magic)));
        }
        let version: [u8; 4] = read_array(&mut inner, &mut offset)?;
        if version != SFF_VERSION {
            return Err(invalid(format!("Unsupported SFF version {:?}", version)));
        }
        let index_offset = u64::from_be_bytes(read_array(&mut inner, &mut offset)?);
        let index_length = u32::from_be_bytes(read_array(&mut inner, &mut offset)?);
        let number_of_reads = u32::from_be_bytes(read_array(&mut inner, &mut offset)?);
        let header_length = u16::from_be_bytes(read_array(&mut inner, &mut offset)?);
        let key_length = u16::from_be_bytes(read_array(&mut inner, &mut offset)?);
        let flows_per_read = u16::from_be_bytes(read_array(&mut inner, &mut offset)?);
        let [format_code] = read_array::<_, 1>(&mut inner, &mut offset)?;
        if format_code != 1 {
            return Err(invalid(format!("Unsupported flowgram format code {}", format_code)));
        }
        let flow_chars = read_vec(&mut inner, &mut offset, flows_per_read as usize)?;
        let key_sequence = read_vec(&mut inner, &mut offset, key_length as usize)?;

        let expected = padded(COMMON_HEADER_FIXED + flows_per_read as u64 + key_length as u64);
        if header_length as u64 != expected {
            return Err(invalid(format!(
                "SFF header length {} does not match computed {}",
                header_length, expected
            )));
        }
        let header_padding = header_length as u64 - offset;
        skip(&mut inner, &mut offset, header_padding)?;

        Ok(SffReader {
            inner,
            offset,
            header: SffHeader {
                index_offset,
                index_length,
                number_of_reads,
                header_length,
                flows_per_read,
                flow_chars,
                key_sequence,
            },
            reads_left: number_of_reads,
        })
    }

    pub fn header(&self) -> &SffHeader {
        &self.header
    }

    fn read_one(&mut self) -> io::Result<SffRead> {
        if self.header.index_length > 0 && self.offset == self.header.index_offset {
            let len = padded(self.header.index_length as u64);
            debug!("Skipping SFF index block of {} bytes at offset {}", len, self.offset);
            skip(&mut self.inner, &mut self.offset, len)?;
        }

        let start = self.offset;
        let read_header_length = u16::from_be_bytes(read_array(&mut self.inner, &mut self.offset)?);
        let name_length = u16::from_be_bytes(read_array(&mut self.inner, &mut self.offset)?);
        let number_of_bases = u32::from_be_bytes(read_array(&mut self.inner, &mut self.offset)?);
        let clip_qual_left = u16::from_be_bytes(read_array(&mut self.inner, &mut self.offset)?);
        let clip_qual_right = u16::from_be_bytes(read_array(&mut self.inner, &mut self.offset)?);
        let clip_adapter_left = u16::from_be_bytes(read_array(&mut self.inner, &mut self.offset)?);
        let clip_adapter_right = u16::from_be_bytes(read_array(&mut self.inner, &mut self.offset)?);
        let name = read_vec(&mut self.inner, &mut self.offset, name_length as usize)?;

        let expected = padded(READ_HEADER_FIXED + name_length as u64);
        if read_header_length as u64 != expected {
            return Err(invalid(format!(
                "Read header at offset {} has length {}, expected {}",
                start, read_header_length, expected
            )));
        }
        let name_padding = start + read_header_length as u64 - self.offset;
        skip(&mut self.inner, &mut self.offset, name_padding)?;

        let data_start = self.offset;
        let nbases = number_of_bases as usize;
        let flowgram_len = 2 * self.header.flows_per_read as u64;
        skip(&mut self.inner, &mut self.offset, flowgram_len)?; // flowgram values
        skip(&mut self.inner, &mut self.offset, nbases as u64)?; // flow index per base
        let bases = read_vec(&mut self.inner, &mut self.offset, nbases)?;
        let quals = read_vec(&mut self.inner, &mut self.offset, nbases)?;
        let data_padding = data_start + padded(self.offset - data_start) - self.offset;
        skip(&mut self.inner, &mut self.offset, data_padding)?;

        let (left, right) = clip_window(
            nbases,
            clip_qual_left,
            clip_qual_right,
            clip_adapter_left,
            clip_adapter_right,
        );

        Ok(SffRead {
            name: String::from_utf8_lossy(&name).into_owned(),
            bases: bases[left..right].to_vec(),
            quals: quals[left..right].to_vec(),
        })
    }
}

impl<R: Read> Iterator for SffReader<R> {
    type Item = io::Result<SffRead>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reads_left == 0 {
            return None;
        }
        self.reads_left -= 1;
        let result = self.read_one();
        if result.is_err() {
            self.reads_left = 0;
        }
        Some(result)
    }
}

/// 0-based half-open clip window. Clip points are 1-based with 0 meaning unset.
fn clip_window(
    nbases: usize,
    qual_left: u16,
    qual_right: u16,
    adapter_left: u16,
    adapter_right: u16,
) -> (usize, usize) {
    let left = (qual_left.saturating_sub(1)).max(adapter_left.saturating_sub(1)) as usize;
    let right = match (qual_right, adapter_right) {
        (0, 0) => nbases,
        (0, r) | (r, 0) => r as usize,
        (q, a) => q.min(a) as usize,
    };
    let right = right.min(nbases);
    if left >= right {
        (0, 0)
    } else {
        (left, right)
    }
}

fn read_array<R: Read, const N: usize>(reader: &mut R, offset: &mut u64) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(|e| truncated(e, *offset))?;
    *offset += N as u64;
    Ok(buf)
}

fn read_vec<R: Read>(reader: &mut R, offset: &mut u64, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).map_err(|e| truncated(e, *offset))?;
    *offset += len as u64;
    Ok(buf)
}

fn skip<R: Read>(reader: &mut R, offset: &mut u64, len: u64) -> io::Result<()> {
    let copied = io::copy(&mut reader.by_ref().take(len), &mut io::sink())?;
    if copied != len {
        return Err(invalid(format!("SFF truncated at offset {}", *offset + copied)));
    }
    *offset += len;
    Ok(())
}

fn truncated(e: io::Error, offset: u64) -> io::Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        invalid(format!("SFF truncated at offset {}", offset))
    } else {
        e
    }
}

/// Converts an SFF file to FASTQ records written into `writer`.
/// Reads clipped down to nothing are dropped.
///
/// # Returns
/// Number of records written.
pub fn sff_to_fastq<W: Write>(path: &Path, writer: &mut W) -> io::Result<u64> {
    let reader = SffReader::new(open_reader(path)?)?;
    let mut written = 0u64;
    let mut dropped = 0u64;
    for read in reader {
        let read = read?;
        if read.bases.is_empty() {
            dropped += 1;
            continue;
        }
        read.into_fastq().write_to_file(writer)?;
        written += 1;
    }
    debug!("{}: {} reads converted, {} empty after clipping", path.display(), written, dropped);
    Ok(written)
}
