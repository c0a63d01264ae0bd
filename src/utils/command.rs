/// Functions and structs for building and running external tool command lines

use std::fs::File;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{anyhow, Result};
use log::{debug, info};
use tokio::process::Command;

use crate::config::defs::{PipelineError, BWA_TAG, SAMTOOLS_TAG, TOOL_VERSIONS};


/// One invocation of an external tool.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub tool: String,
    pub args: Vec<String>,
    /// When set, the tool's stdout is written to this file instead of captured.
    pub stdout_path: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(tool: &str, args: Vec<String>) -> Self {
        CommandSpec { tool: tool.to_string(), args, stdout_path: None }
    }

    pub fn stdout_to(mut self, path: &Path) -> Self {
        self.stdout_path = Some(path.to_path_buf());
        self
    }

    pub fn command_line(&self) -> String {
        let mut line = self.tool.clone();
        for a in &self.args {
            line.push(' ');
            line.push_str(a);
        }
        if let Some(p) = &self.stdout_path {
            line.push_str(" > ");
            line.push_str(&p.to_string_lossy());
        }
        line
    }
}

/// Exit status and captured output of a finished tool.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub code: Option<i32>,
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Runs external tools. The pipelines only talk to tools through this seam.
pub trait CommandRunner {
    fn run(&self, spec: CommandSpec) -> impl Future<Output = Result<ToolOutput>> + Send;
}

/// Runs tools as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: CommandSpec) -> Result<ToolOutput> {
        debug!("Running: {}", spec.command_line());

        let mut cmd = Command::new(&spec.tool);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stderr(Stdio::piped());

        match &spec.stdout_path {
            Some(path) => {
                let file = File::create(path)
                    .map_err(|e| anyhow!("Failed to create {} for {} output: {}", path.display(), spec.tool, e))?;
                cmd.stdout(Stdio::from(file));
            }
            None => {
                cmd.stdout(Stdio::piped());
            }
        }

        // output() would replace the stdout file with a pipe
        let child = cmd
            .spawn()
            .map_err(|e| anyhow!("Failed to spawn {}: {}. Is {} installed?", spec.tool, e, spec.tool))?;
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| anyhow!("Failed to wait on {}: {}", spec.tool, e))?;

        Ok(ToolOutput {
            code: output.status.code(),
            success: output.status.success(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}


/// Runs a tool and turns a spawn failure or a non-zero exit into a
/// `PipelineError::ToolExecution`.
pub async fn run_checked<R: CommandRunner>(runner: &R, spec: CommandSpec) -> Result<ToolOutput, PipelineError> {
    let tool = spec.tool.clone();
    let line = spec.command_line();
    let output = runner.run(spec).await.map_err(|e| PipelineError::ToolExecution {
        tool: tool.clone(),
        error: e.to_string(),
    })?;
    if !output.success {
        return Err(PipelineError::ToolExecution {
            tool,
            error: format!("'{}' exited with {:?}: {}", line, output.code, output.stderr_lossy().trim()),
        });
    }
    Ok(output)
}


/// Anything that can render itself into a tool's argument list.
pub trait ArgGenerator {
    fn tool(&self) -> &'static str;
    fn generate_args(&self) -> Vec<String>;
}

fn path_arg(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}


pub mod bwa {
    use std::path::PathBuf;

    use anyhow::Result;

    use crate::config::defs::{BwaSubcommand, BWA_TAG};
    use super::{path_arg, ArgGenerator, CommandRunner, CommandSpec};

    #[derive(Debug, Clone)]
    pub struct BwaConfig {
        pub subcommand: BwaSubcommand,
        pub reference: PathBuf,
        pub reads: Vec<PathBuf>,
        pub threads: usize,
    }

    impl BwaConfig {
        pub fn index(reference: PathBuf) -> Self {
            BwaConfig { subcommand: BwaSubcommand::Index, reference, reads: Vec::new(), threads: 1 }
        }

        pub fn mem(reference: PathBuf, read1: PathBuf, mate: Option<PathBuf>, threads: usize) -> Self {
            let mut reads = vec![read1];
            reads.extend(mate);
            BwaConfig { subcommand: BwaSubcommand::Mem, reference, reads, threads }
        }
    }

    impl ArgGenerator for BwaConfig {
        fn tool(&self) -> &'static str {
            BWA_TAG
        }

        fn generate_args(&self) -> Vec<String> {
            let mut args_vec: Vec<String> = Vec::new();
            match self.subcommand {
                BwaSubcommand::Index => {
                    args_vec.push("index".to_string());
                    args_vec.push(path_arg(&self.reference));
                }
                BwaSubcommand::Mem => {
                    args_vec.push("mem".to_string());
                    args_vec.push("-t".to_string());
                    args_vec.push(self.threads.max(1).to_string());
                    args_vec.push(path_arg(&self.reference));
                    for r in &self.reads {
                        args_vec.push(path_arg(r));
                    }
                }
            }
            args_vec
        }
    }

    /// bwa prints its usage, including "Version: 0.7.17-r1188", to stderr
    /// when run bare and exits 1, so the exit status is not checked.
    pub async fn query_version<R: CommandRunner>(runner: &R) -> Result<Option<String>> {
        let output = runner.run(CommandSpec::new(BWA_TAG, Vec::new())).await?;
        Ok(parse_version(&format!("{}\n{}", output.stdout_lossy(), output.stderr_lossy())))
    }

    pub fn parse_version(text: &str) -> Option<String> {
        text.lines()
            .find_map(|l| l.trim().strip_prefix("Version:"))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}


pub mod samtools {
    use std::path::PathBuf;

    use anyhow::Result;

    use crate::config::defs::{SamtoolsSubcommand, SAMTOOLS_TAG};
    use super::{path_arg, ArgGenerator, CommandRunner, CommandSpec};

    #[derive(Debug, Clone)]
    pub struct SamtoolsConfig {
        pub subcommand: SamtoolsSubcommand,
        /// Flags in order, with an optional value each.
        pub subcommand_fields: Vec<(String, Option<String>)>,
        pub inputs: Vec<PathBuf>,
    }

    impl ArgGenerator for SamtoolsConfig {
        fn tool(&self) -> &'static str {
            SAMTOOLS_TAG
        }

        fn generate_args(&self) -> Vec<String> {
            let mut args_vec: Vec<String> = Vec::new();
            let sub = match self.subcommand {
                SamtoolsSubcommand::View => "view",
                SamtoolsSubcommand::Sort => "sort",
                SamtoolsSubcommand::Merge => "merge",
                SamtoolsSubcommand::Index => "index",
            };
            args_vec.push(sub.to_string());
            for (flag, value) in &self.subcommand_fields {
                args_vec.push(flag.clone());
                if let Some(v) = value {
                    args_vec.push(v.clone());
                }
            }
            for input in &self.inputs {
                args_vec.push(path_arg(input));
            }
            args_vec
        }
    }

    pub async fn query_version<R: CommandRunner>(runner: &R) -> Result<Option<String>> {
        let output = runner.run(CommandSpec::new(SAMTOOLS_TAG, vec!["--version".to_string()])).await?;
        Ok(parse_version(output.stdout_lossy().trim_start()))
    }

    /// First line of `samtools --version` is "samtools 1.20".
    pub fn parse_version(text: &str) -> Option<String> {
        text.lines()
            .next()
            .and_then(|l| l.split_whitespace().nth(1))
            .map(|v| v.to_string())
    }
}


/// Builds the CommandSpec for a tool config.
pub fn command_for(config: &dyn ArgGenerator) -> CommandSpec {
    CommandSpec::new(config.tool(), config.generate_args())
}


/// Parses the leading "major.minor" of a version string like "0.7.17-r1188".
pub fn parse_major_minor(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.split(|c: char| !c.is_ascii_digit());
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().and_then(|m| m.parse().ok()).unwrap_or(0);
    Some((major, minor))
}


/// Runs a tool's version query and returns the reported version.
pub async fn check_version<R: CommandRunner>(runner: &R, tool: &str) -> Result<String> {
    let version = match tool {
        BWA_TAG => bwa::query_version(runner).await?,
        SAMTOOLS_TAG => samtools::query_version(runner).await?,
        _ => return Err(anyhow!("Unknown tool: {}", tool)),
    };
    version.ok_or_else(|| anyhow!("Could not find a version number in {} output", tool))
}

/// Checks every tool is installed and at least the minimum version.
pub async fn check_versions<R: CommandRunner>(runner: &R, tools: &[&str]) -> Result<()> {
    for &tool in tools {
        let version = check_version(runner, tool).await?;
        let found = parse_major_minor(&version)
            .ok_or_else(|| anyhow!("Unparseable {} version '{}'", tool, version))?;
        if let Some(&min) = TOOL_VERSIONS.get(tool) {
            if found < min {
                return Err(anyhow!(
                    "{} version {} is too old; need at least {}.{}",
                    tool, version, min.0, min.1
                ));
            }
        }
        info!("Found {} {}", tool, version);
    }
    Ok(())
}
