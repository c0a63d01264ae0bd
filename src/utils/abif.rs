// Applied Biosystems trace (ABIF / .ab1) reader.
// Only the base calls, per-base qualities and sample name are needed.
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::utils::fastx::FastqRecord;
use crate::utils::file::{extension_remover, WriteToFile};

const ABIF_MAGIC: &[u8; 4] = b"ABIF";
const DIR_ENTRY_SIZE: usize = 28;
const ROOT_ENTRY_OFFSET: usize = 6;

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

#[derive(Debug, Clone, Copy)]
struct DirEntry {
    element_type: i16,
    num_elements: i32,
    data_size: i32,
    data_offset: i32,
    entry_offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AbifTrace {
    pub sample_name: Option<String>,
    pub bases: Vec<u8>,
    pub quals: Vec<u8>,
}

fn be_i16(data: &[u8], at: usize) -> io::Result<i16> {
    data.get(at..at + 2)
        .map(|b| i16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| invalid(format!("ABIF truncated at offset {}", at)))
}

fn be_i32(data: &[u8], at: usize) -> io::Result<i32> {
    data.get(at..at + 4)
        .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| invalid(format!("ABIF truncated at offset {}", at)))
}

fn parse_entry(data: &[u8], at: usize) -> io::Result<([u8; 4], i32, DirEntry)> {
    let name_bytes = data
        .get(at..at + 4)
        .ok_or_else(|| invalid(format!("ABIF truncated at offset {}", at)))?;
    let name = [name_bytes[0], name_bytes[1], name_bytes[2], name_bytes[3]];
    let number = be_i32(data, at + 4)?;
    let entry = DirEntry {
        element_type: be_i16(data, at + 8)?,
        num_elements: be_i32(data, at + 12)?,
        data_size: be_i32(data, at + 16)?,
        data_offset: be_i32(data, at + 20)?,
        entry_offset: at,
    };
    Ok((name, number, entry))
}

/// Raw data of a directory item. Items of 4 bytes or less live inside the
/// entry's offset field.
fn entry_data<'a>(data: &'a [u8], entry: &DirEntry) -> io::Result<&'a [u8]> {
    if entry.data_size < 0 || entry.data_offset < 0 {
        return Err(invalid(format!("Negative size or offset in ABIF entry at {}", entry.entry_offset)));
    }
    let size = entry.data_size as usize;
    let start = if size <= 4 { entry.entry_offset + 20 } else { entry.data_offset as usize };
    data.get(start..start + size)
        .ok_or_else(|| invalid(format!("ABIF item at {} runs past end of file", start)))
}

/// Parses an in-memory ABIF file.
pub fn parse_abif(data: &[u8]) -> io::Result<AbifTrace> {
    if data.len() < ROOT_ENTRY_OFFSET + DIR_ENTRY_SIZE || &data[..4] != ABIF_MAGIC {
        return Err(invalid("Not an ABIF file".to_string()));
    }

    let (_, _, root) = parse_entry(data, ROOT_ENTRY_OFFSET)?;
    if root.num_elements < 0 || root.data_offset < 0 {
        return Err(invalid("Corrupt ABIF root directory".to_string()));
    }

    let mut entries: HashMap<([u8; 4], i32), DirEntry> = HashMap::new();
    for i in 0..root.num_elements as usize {
        let at = root.data_offset as usize + i * DIR_ENTRY_SIZE;
        let (name, number, entry) = parse_entry(data, at)?;
        entries.insert((name, number), entry);
    }

    let lookup = |name: &[u8; 4], numbers: &[i32]| {
        numbers.iter().find_map(|n| entries.get(&(*name, *n)).copied())
    };

    let pbas = lookup(b"PBAS", &[2, 1]).ok_or_else(|| invalid("ABIF file has no base calls (PBAS)".to_string()))?;
    let bases = entry_data(data, &pbas)?.to_vec();

    let quals = match lookup(b"PCON", &[2, 1]) {
        Some(pcon) => {
            let q = entry_data(data, &pcon)?.to_vec();
            if q.len() != bases.len() {
                return Err(invalid(format!(
                    "ABIF has {} base calls but {} quality values",
                    bases.len(),
                    q.len()
                )));
            }
            q
        }
        None => vec![0; bases.len()],
    };

    // SMPL is a pString: one length byte followed by the characters
    let sample_name = match lookup(b"SMPL", &[1]) {
        Some(smpl) if smpl.element_type == 18 => {
            let raw = entry_data(data, &smpl)?;
            raw.split_first().map(|(len, rest)| {
                let n = (*len as usize).min(rest.len());
                String::from_utf8_lossy(&rest[..n]).trim().to_string()
            })
        }
        Some(smpl) => Some(String::from_utf8_lossy(entry_data(data, &smpl)?).trim().to_string()),
        None => None,
    }
    .filter(|s| !s.is_empty());

    Ok(AbifTrace { sample_name, bases, quals })
}

/// Converts a single .ab1 trace into one FASTQ record.
///
/// # Returns
/// Number of records written (always 1).
pub fn abif_to_fastq<W: Write>(path: &Path, writer: &mut W) -> io::Result<u64> {
    let data = fs::read(path)?;
    let trace = parse_abif(&data)
        .map_err(|e| invalid(format!("{}: {}", path.display(), e)))?;

    let id = match trace.sample_name {
        Some(name) => name,
        None => {
            let (stem, _) = extension_remover(path);
            stem.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
        }
    };

    FastqRecord::from_phred(id, trace.bases, &trace.quals).write_to_file(writer)?;
    Ok(1)
}
