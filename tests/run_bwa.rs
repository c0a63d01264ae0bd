use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tempfile::{tempdir, TempDir};

use ngs_mapper::cli::{Arguments, Module, Platform, RunBwaArgs};
use ngs_mapper::config::defs::{PipelineError, RunConfig};
use ngs_mapper::pipelines::run_bwa;
use ngs_mapper::utils::command::{CommandRunner, CommandSpec, ToolOutput};

const R1: &[u8] = b"@p1/1\nACGTACGT\n+\nIIIIIIII\n";
const R2: &[u8] = b"@p1/2\nTTGGCCAA\n+\nIIIIIIII\n";
const SANGER: &[u8] = b"@s1\nGATTACA\n+\nIIIIIII\n";

/// Pretends to be bwa and samtools: records every call and creates the
/// files each command would have written.
struct RecordingRunner {
    calls: Mutex<Vec<CommandSpec>>,
    fail_mem: bool,
    samtools_version: &'static str,
}

impl RecordingRunner {
    fn new() -> Self {
        RecordingRunner { calls: Mutex::new(Vec::new()), fail_mem: false, samtools_version: "1.20" }
    }

    fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, tool: &str, sub: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.tool == tool && c.args.first().map(String::as_str) == Some(sub))
            .count()
    }

    fn find(&self, tool: &str, sub: &str) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|c| c.tool == tool && c.args.first().map(String::as_str) == Some(sub))
            .collect()
    }
}

fn ok(stdout: &[u8], stderr: &[u8]) -> ToolOutput {
    ToolOutput { code: Some(0), success: true, stdout: stdout.to_vec(), stderr: stderr.to_vec() }
}

impl CommandRunner for RecordingRunner {
    async fn run(&self, spec: CommandSpec) -> Result<ToolOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        let sub = spec.args.first().cloned().unwrap_or_default();

        let output = match (spec.tool.as_str(), sub.as_str()) {
            ("bwa", "") => ToolOutput {
                code: Some(1),
                success: false,
                stdout: Vec::new(),
                stderr: b"\nProgram: bwa\nVersion: 0.7.17-r1188\n".to_vec(),
            },
            ("bwa", "index") => {
                let reference = &spec.args[1];
                for ext in ["amb", "ann", "bwt", "pac", "sa"] {
                    fs::write(format!("{}.{}", reference, ext), b"")?;
                }
                ok(b"", b"")
            }
            ("bwa", "mem") => {
                if self.fail_mem {
                    ToolOutput {
                        code: Some(1),
                        success: false,
                        stdout: Vec::new(),
                        stderr: b"[mem_sam_pe] paired reads have different names".to_vec(),
                    }
                } else {
                    if let Some(out) = &spec.stdout_path {
                        fs::write(out, b"@HD\tVN:1.6\n")?;
                    }
                    ok(b"", b"")
                }
            }
            ("samtools", "--version") => ok(format!("samtools {}\n", self.samtools_version).as_bytes(), b""),
            ("samtools", "index") => {
                let bam = spec.args.last().cloned().unwrap_or_default();
                fs::write(format!("{}.bai", bam), b"")?;
                ok(b"", b"")
            }
            ("samtools", _) => {
                if let Some(i) = spec.args.iter().position(|a| a == "-o") {
                    fs::write(&spec.args[i + 1], b"BAM\x01")?;
                }
                ok(b"", b"")
            }
            _ => anyhow::bail!("unexpected command {}", spec.command_line()),
        };
        Ok(output)
    }
}


struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Result<Self> {
        let dir = tempdir()?;
        fs::create_dir(dir.path().join("reads"))?;
        fs::write(dir.path().join("ref.fa"), b">chr1\nACGTACGTTTGGCCAAGATTACA\n")?;
        Ok(Fixture { dir })
    }

    fn read(&self, name: &str, content: &[u8]) -> Result<()> {
        fs::write(self.dir.path().join("reads").join(name), content)?;
        Ok(())
    }

    fn paired(&self) -> Result<()> {
        self.read("s1_S1_L001_R1_001.fastq", R1)?;
        self.read("s1_S1_L001_R2_001.fastq", R2)
    }

    fn sanger(&self) -> Result<()> {
        self.read("trace_A01.fastq", SANGER)
    }

    fn path(&self, p: &str) -> PathBuf {
        self.dir.path().join(p)
    }

    fn work_dir(&self) -> PathBuf {
        self.path("out/bwa")
    }

    fn config(&self, platforms: Vec<Platform>, keep_temp: bool, threads: usize) -> Arc<RunConfig> {
        self.config_with_reference("ref.fa", platforms, keep_temp, threads)
    }

    fn config_with_reference(
        &self,
        reference: &str,
        platforms: Vec<Platform>,
        keep_temp: bool,
        threads: usize,
    ) -> Arc<RunConfig> {
        Arc::new(RunConfig {
            cwd: self.dir.path().to_path_buf(),
            args: Arguments {
                verbose: false,
                module: Module::RunBwa(RunBwaArgs {
                    reads: PathBuf::from("reads"),
                    reference: PathBuf::from(reference),
                    platforms,
                    output: PathBuf::from("out/sample.bam"),
                    keep_temp,
                    threads,
                }),
            },
            threads,
        })
    }
}

fn has_arg_ending(spec: &CommandSpec, suffix: &str) -> bool {
    spec.args.iter().any(|a| a.ends_with(suffix))
}

fn stdout_name(spec: &CommandSpec) -> String {
    spec.stdout_path
        .as_deref()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}


#[tokio::test]
async fn test_paired_only() -> Result<()> {
    let fx = Fixture::new()?;
    fx.paired()?;
    let runner = RecordingRunner::new();

    let output = run_bwa::run(fx.config(Platform::ALL.to_vec(), false, 1), &runner).await?;

    assert_eq!(output, fx.path("out/sample.bam"));
    assert!(output.exists());
    assert!(fx.path("out/sample.bam.bai").exists());
    assert!(!fx.work_dir().exists());

    let mem = runner.find("bwa", "mem");
    assert_eq!(mem.len(), 1);
    assert!(has_arg_ending(&mem[0], "F.fq"));
    assert!(has_arg_ending(&mem[0], "R.fq"));
    assert_eq!(stdout_name(&mem[0]), "paired.sam");

    assert_eq!(runner.count("bwa", "index"), 1);
    assert_eq!(runner.count("samtools", "view"), 1);
    assert_eq!(runner.count("samtools", "sort"), 1);
    assert_eq!(runner.count("samtools", "merge"), 0);
    assert_eq!(runner.count("samtools", "index"), 1);
    Ok(())
}

#[tokio::test]
async fn test_nonpaired_only() -> Result<()> {
    let fx = Fixture::new()?;
    fx.sanger()?;
    let runner = RecordingRunner::new();

    run_bwa::run(fx.config(Platform::ALL.to_vec(), false, 1), &runner).await?;

    let mem = runner.find("bwa", "mem");
    assert_eq!(mem.len(), 1);
    assert!(has_arg_ending(&mem[0], "NP.fq"));
    assert!(!has_arg_ending(&mem[0], "R.fq"));
    assert_eq!(stdout_name(&mem[0]), "nonpaired.sam");
    assert_eq!(runner.count("samtools", "merge"), 0);
    assert!(fx.path("out/sample.bam").exists());
    assert!(!fx.work_dir().exists());
    Ok(())
}

#[tokio::test]
async fn test_mixed_aligns_paired_first_and_merges() -> Result<()> {
    let fx = Fixture::new()?;
    fx.paired()?;
    fx.sanger()?;
    let runner = RecordingRunner::new();

    run_bwa::run(fx.config(Platform::ALL.to_vec(), false, 1), &runner).await?;

    let mem = runner.find("bwa", "mem");
    assert_eq!(mem.len(), 2);
    assert_eq!(stdout_name(&mem[0]), "paired.sam");
    assert_eq!(stdout_name(&mem[1]), "nonpaired.sam");

    assert_eq!(runner.count("samtools", "view"), 2);
    assert_eq!(runner.count("samtools", "sort"), 2);
    let merge = runner.find("samtools", "merge");
    assert_eq!(merge.len(), 1);
    assert!(has_arg_ending(&merge[0], "paired.sorted.bam"));
    assert!(has_arg_ending(&merge[0], "nonpaired.sorted.bam"));
    assert_eq!(runner.count("samtools", "index"), 1);

    // index runs last, on the final output
    let last = runner.calls().pop().unwrap();
    assert_eq!(last.command_line(), format!("samtools index {}", fx.path("out/sample.bam").display()));
    assert!(!fx.work_dir().exists());
    Ok(())
}

#[tokio::test]
async fn test_platform_selection() -> Result<()> {
    let fx = Fixture::new()?;
    fx.paired()?;
    fx.sanger()?;
    let runner = RecordingRunner::new();

    run_bwa::run(fx.config(vec![Platform::Sanger], false, 1), &runner).await?;

    let mem = runner.find("bwa", "mem");
    assert_eq!(mem.len(), 1);
    assert_eq!(stdout_name(&mem[0]), "nonpaired.sam");
    Ok(())
}

#[tokio::test]
async fn test_keep_temp() -> Result<()> {
    let fx = Fixture::new()?;
    fx.paired()?;
    let runner = RecordingRunner::new();

    run_bwa::run(fx.config(Platform::ALL.to_vec(), true, 1), &runner).await?;

    assert!(fx.work_dir().join("reads").join("F.fq").exists());
    assert!(fx.work_dir().join("reads").join("R.fq").exists());
    assert!(fx.work_dir().join("paired.sam").exists());
    assert!(fx.path("out/sample.bam").exists());
    Ok(())
}

#[tokio::test]
async fn test_threads_are_passed_through() -> Result<()> {
    let fx = Fixture::new()?;
    fx.paired()?;
    fx.sanger()?;
    let runner = RecordingRunner::new();

    run_bwa::run(fx.config(Platform::ALL.to_vec(), false, 4), &runner).await?;

    for mem in runner.find("bwa", "mem") {
        assert_eq!(&mem.args[1..3], &["-t".to_string(), "4".to_string()]);
    }
    for sub in ["sort", "merge"] {
        for call in runner.find("samtools", sub) {
            let at = call.args.iter().position(|a| a == "-@").unwrap();
            assert_eq!(call.args[at + 1], "4");
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_aligner_failure_cleans_up() -> Result<()> {
    let fx = Fixture::new()?;
    fx.paired()?;
    let runner = RecordingRunner { fail_mem: true, ..RecordingRunner::new() };

    let err = run_bwa::run(fx.config(Platform::ALL.to_vec(), false, 1), &runner).await.unwrap_err();

    match err {
        PipelineError::AlignerFailed { code, stderr } => {
            assert_eq!(code, Some(1));
            assert!(stderr.contains("different names"));
        }
        other => panic!("Unexpected error {:?}", other),
    }
    assert!(!fx.work_dir().exists());
    assert!(!fx.path("out/sample.bam").exists());
    assert_eq!(runner.count("samtools", "view"), 0);
    Ok(())
}

#[tokio::test]
async fn test_no_reads() -> Result<()> {
    let fx = Fixture::new()?;
    fx.read("readme.txt", b"nothing to see")?;
    let runner = RecordingRunner::new();

    let err = run_bwa::run(fx.config(Platform::ALL.to_vec(), false, 1), &runner).await.unwrap_err();

    assert!(matches!(err, PipelineError::NoReads(_)));
    assert_eq!(runner.count("bwa", "mem"), 0);
    assert!(!fx.work_dir().exists());
    Ok(())
}

#[tokio::test]
async fn test_empty_read_files_are_no_reads() -> Result<()> {
    let fx = Fixture::new()?;
    fx.read("s1_S1_L001_R1_001.fastq", b"")?;
    fx.read("s1_S1_L001_R2_001.fastq", b"")?;
    fx.read("trace_A01.fastq", b"")?;
    let runner = RecordingRunner::new();

    let err = run_bwa::run(fx.config(Platform::ALL.to_vec(), true, 1), &runner).await.unwrap_err();

    assert!(matches!(err, PipelineError::NoReads(_)));
    assert_eq!(runner.count("bwa", "mem"), 0);
    assert_eq!(runner.count("bwa", "index"), 0);
    // Kept on request, but holds no zero-byte read files
    for name in ["F.fq", "R.fq", "NP.fq"] {
        assert!(!fx.work_dir().join("reads").join(name).exists());
        assert!(!fx.work_dir().join(name).exists());
    }
    assert!(!fx.path("out/sample.bam").exists());
    Ok(())
}

#[tokio::test]
async fn test_no_reads_for_selected_platform() -> Result<()> {
    let fx = Fixture::new()?;
    fx.sanger()?;
    let runner = RecordingRunner::new();

    let err = run_bwa::run(fx.config(vec![Platform::IonTorrent], false, 1), &runner).await.unwrap_err();
    assert!(matches!(err, PipelineError::NoReads(_)));
    Ok(())
}

#[tokio::test]
async fn test_existing_work_dir_is_refused() -> Result<()> {
    let fx = Fixture::new()?;
    fx.paired()?;
    fs::create_dir_all(fx.work_dir())?;
    fs::write(fx.work_dir().join("precious.txt"), b"keep me")?;
    let runner = RecordingRunner::new();

    let err = run_bwa::run(fx.config(Platform::ALL.to_vec(), false, 1), &runner).await.unwrap_err();

    assert!(matches!(err, PipelineError::InvalidConfig(_)));
    assert!(fx.work_dir().join("precious.txt").exists());
    assert_eq!(runner.count("bwa", "mem"), 0);
    Ok(())
}

#[tokio::test]
async fn test_reference_directory_is_compiled() -> Result<()> {
    let fx = Fixture::new()?;
    fx.sanger()?;
    fs::create_dir(fx.path("refs"))?;
    fs::write(fx.path("refs/a.fasta"), b">a\nACGT\n")?;
    fs::write(fx.path("refs/b.fasta"), b">b\nTTTT\n")?;
    let runner = RecordingRunner::new();

    run_bwa::run(fx.config_with_reference("refs", Platform::ALL.to_vec(), false, 1), &runner).await?;

    let index = runner.find("bwa", "index");
    assert_eq!(index.len(), 1);
    assert!(has_arg_ending(&index[0], "bwa/reference.fa"));
    // the compiled reference and its index went away with the working directory
    assert!(!fx.work_dir().exists());
    Ok(())
}

#[tokio::test]
async fn test_existing_index_is_reused() -> Result<()> {
    let fx = Fixture::new()?;
    fx.sanger()?;
    for ext in ["amb", "ann", "bwt", "pac", "sa"] {
        fs::write(fx.path(&format!("ref.fa.{}", ext)), b"")?;
    }
    let runner = RecordingRunner::new();

    run_bwa::run(fx.config(Platform::ALL.to_vec(), false, 1), &runner).await?;
    assert_eq!(runner.count("bwa", "index"), 0);
    assert_eq!(runner.count("bwa", "mem"), 1);
    Ok(())
}

#[tokio::test]
async fn test_old_samtools_is_rejected() -> Result<()> {
    let fx = Fixture::new()?;
    fx.sanger()?;
    let runner = RecordingRunner { samtools_version: "1.9", ..RecordingRunner::new() };

    let err = run_bwa::run(fx.config(Platform::ALL.to_vec(), false, 1), &runner).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidConfig(_)));
    assert!(!fx.work_dir().exists());
    Ok(())
}
