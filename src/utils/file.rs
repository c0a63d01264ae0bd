use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use flate2::read::MultiGzDecoder;
use log::{debug, warn};


pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1F, 0x8B]), // Gzip magic bytes
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Enum to hold either an uncompressed or gzipped file reader
pub enum FileReader {
    Uncompressed(BufReader<File>),
    Gzipped(MultiGzDecoder<BufReader<File>>),
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FileReader::Uncompressed(r) => r.read(buf),
            FileReader::Gzipped(r) => r.read(buf),
        }
    }
}

/// Opens a file, transparently decompressing gzip content.
pub fn open_reader(path: &Path) -> io::Result<FileReader> {
    let gz = is_gzipped(path)?;
    let file = BufReader::new(File::open(path)?);
    if gz {
        Ok(FileReader::Gzipped(MultiGzDecoder::new(file)))
    } else {
        Ok(FileReader::Uncompressed(file))
    }
}

/// Anything that knows how to serialise itself into a writer.
pub trait WriteToFile {
    fn write_to_file<W: Write>(&self, writer: &mut W) -> io::Result<()>;
}


/// Splits a path into its bare stem path and the list of its extensions.
/// `reads/sample_R1.fastq.gz` -> (`reads/sample_R1`, ["fastq", "gz"])
///
/// # Arguments
///
/// * `path` - Any file path.
///
/// # Returns
/// Tuple of (stem path, extensions in order of appearance).
pub fn extension_remover(path: &Path) -> (PathBuf, Vec<String>) {
    let file_name = match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => return (path.to_path_buf(), Vec::new()),
    };

    let mut parts = file_name.split('.');
    let stem = parts.next().unwrap_or_default().to_string();
    let extensions: Vec<String> = parts.filter(|p| !p.is_empty()).map(String::from).collect();

    // Hidden files: ".bashrc" has no stem, keep the name whole
    if stem.is_empty() {
        return (path.to_path_buf(), Vec::new());
    }

    (path.with_file_name(stem), extensions)
}


/// Builds a new path from a base name.
///
/// # Arguments
///
/// * `base` - Path whose file name is used as the base.
/// * `dir` - Optional directory to place the result in. Defaults to the base's parent.
/// * `prefix` - Optional prefix joined before the base name.
/// * `suffix` - Optional suffix joined after the base name.
/// * `delimiter` - Joins prefix, base and suffix.
///
/// # Returns
/// PathBuf of the manipulated path.
pub fn file_path_manipulator(
    base: &Path,
    dir: Option<&Path>,
    prefix: Option<&str>,
    suffix: Option<&str>,
    delimiter: &str,
) -> PathBuf {
    let name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut new_name = String::new();
    if let Some(p) = prefix {
        new_name.push_str(p);
        new_name.push_str(delimiter);
    }
    new_name.push_str(&name);
    if let Some(s) = suffix {
        new_name.push_str(delimiter);
        new_name.push_str(s);
    }

    match dir {
        Some(d) => d.join(new_name),
        None => base.with_file_name(new_name),
    }
}

/// Makes a path absolute against `cwd` if needed.
pub fn resolve_path(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// Directory a file will be written into; "" means the current directory.
pub fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Appends the (decompressed) contents of `path` to `writer`.
///
/// # Returns
/// Number of bytes written.
pub fn append_decompressed<W: Write>(path: &Path, writer: &mut W) -> io::Result<u64> {
    let mut reader = open_reader(path)?;
    io::copy(&mut reader, writer)
}

/// Moves a file, falling back to copy + delete across filesystems.
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)
                .map_err(|e| anyhow!("Failed to move {} to {}: {}", from.display(), to.display(), e))?;
            fs::remove_file(from)?;
            Ok(())
        }
    }
}


/// A working directory that is removed when dropped, unless kept.
///
/// The directory is created fresh; an existing path is refused so that
/// nothing the user owns can be removed on cleanup.
#[derive(Debug)]
pub struct TempWorkspace {
    path: PathBuf,
    keep: bool,
}

impl TempWorkspace {
    pub fn create(path: &Path, keep: bool) -> Result<Self> {
        if path.exists() {
            return Err(anyhow!(
                "Working directory {} already exists; remove it or choose another output location",
                path.display()
            ));
        }
        fs::create_dir_all(path)
            .map_err(|e| anyhow!("Failed to create working directory {}: {}", path.display(), e))?;
        debug!("Created working directory {}", path.display());
        Ok(TempWorkspace { path: path.to_path_buf(), keep })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join<P: AsRef<Path>>(&self, p: P) -> PathBuf {
        self.path.join(p)
    }

    pub fn is_kept(&self) -> bool {
        self.keep
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        if self.keep {
            debug!("Keeping working directory {}", self.path.display());
            return;
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed working directory {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove working directory {}: {}", self.path.display(), e),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::tempdir;

    #[test]
    fn test_extension_remover() {
        let (stem, exts) = extension_remover(Path::new("reads/sample_R1.fastq.gz"));
        assert_eq!(stem, PathBuf::from("reads/sample_R1"));
        assert_eq!(exts, vec!["fastq".to_string(), "gz".to_string()]);

        let (stem, exts) = extension_remover(Path::new(".hidden"));
        assert_eq!(stem, PathBuf::from(".hidden"));
        assert!(exts.is_empty());
    }

    #[test]
    fn test_file_path_manipulator() {
        let p = file_path_manipulator(Path::new("/a/paired.bam"), None, None, Some("sorted.bam"), ".");
        assert_eq!(p, PathBuf::from("/a/paired.bam.sorted.bam"));

        let p = file_path_manipulator(Path::new("x.bam"), Some(Path::new("/out")), Some("tmp"), None, "_");
        assert_eq!(p, PathBuf::from("/out/tmp_x.bam"));
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir(Path::new("out.bam")), PathBuf::from("."));
        assert_eq!(parent_dir(Path::new("sampledir/out.bam")), PathBuf::from("sampledir"));
    }

    #[test]
    fn test_append_decompressed_handles_gzip() -> Result<()> {
        let dir = tempdir()?;
        let plain = dir.path().join("a.fq");
        fs::write(&plain, b"@r1\nACGT\n+\nIIII\n")?;

        let gz = dir.path().join("b.fq.gz");
        let mut enc = GzEncoder::new(File::create(&gz)?, Compression::default());
        enc.write_all(b"@r2\nTTTT\n+\nIIII\n")?;
        enc.finish()?;

        let mut out = Vec::new();
        append_decompressed(&plain, &mut out)?;
        append_decompressed(&gz, &mut out)?;
        assert_eq!(out, b"@r1\nACGT\n+\nIIII\n@r2\nTTTT\n+\nIIII\n".to_vec());
        assert!(is_gzipped(&gz)?);
        assert!(!is_gzipped(&plain)?);
        Ok(())
    }

    #[test]
    fn test_is_gzipped_short_file() -> Result<()> {
        let dir = tempdir()?;
        let f = dir.path().join("tiny");
        fs::write(&f, b"x")?;
        assert!(!is_gzipped(&f)?);
        Ok(())
    }

    #[test]
    fn test_temp_workspace_removed_on_drop() -> Result<()> {
        let dir = tempdir()?;
        let work = dir.path().join("bwa");
        {
            let ws = TempWorkspace::create(&work, false)?;
            fs::write(ws.join("file.txt"), b"data")?;
            assert!(work.exists());
        }
        assert!(!work.exists());
        Ok(())
    }

    #[test]
    fn test_temp_workspace_kept() -> Result<()> {
        let dir = tempdir()?;
        let work = dir.path().join("bwa");
        {
            let ws = TempWorkspace::create(&work, true)?;
            assert!(ws.is_kept());
        }
        assert!(work.exists());
        Ok(())
    }

    #[test]
    fn test_temp_workspace_refuses_existing() -> Result<()> {
        let dir = tempdir()?;
        let work = dir.path().join("bwa");
        fs::create_dir(&work)?;
        fs::write(work.join("precious"), b"keep me")?;
        assert!(TempWorkspace::create(&work, false).is_err());
        assert!(work.join("precious").exists());
        Ok(())
    }
}
