//! Compiler invocation.
//!
//! Each compile target is a set of source globs producing one output
//! artifact. The configured external compiler is resolved on the PATH once,
//! at construction, so a missing tool surfaces before any step runs. Source
//! globs resolving to an empty file list are a successful no-op: compiling
//! nothing is legal.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;

use regex::Regex;
use tokio::process::Command;

use crate::config::{CompileConfig, CompileTarget};
use crate::util::resolve_globs;
use crate::{nlog, nlog_debug, Error, Result};

/// Outcome of one successful compile invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutcome {
    /// Target name that was compiled.
    pub target: String,
    /// Number of source files fed to the compiler. Zero means the target
    /// was an empty no-op.
    pub files: usize,
    /// The output artifact path.
    pub out: PathBuf,
}

/// Invokes the external compiler for the configured targets.
pub struct Compiler {
    command: PathBuf,
    config: CompileConfig,
    project_root: PathBuf,
}

impl Compiler {
    /// Create a compiler invoker, resolving the executable up front.
    pub fn new(config: &CompileConfig, project_root: &Path) -> Result<Self> {
        let command = which::which(&config.command)
            .map_err(|_| Error::ToolNotFound(config.command.clone()))?;
        Ok(Self {
            command,
            config: config.clone(),
            project_root: project_root.to_path_buf(),
        })
    }

    /// Resolved compiler executable path.
    pub fn command(&self) -> &Path {
        &self.command
    }

    /// Compile one named target.
    ///
    /// Fails with [`Error::Compile`] carrying file/line/message parsed from
    /// the compiler's diagnostics when the tool exits non-zero.
    pub async fn compile(&self, target_name: &str) -> Result<CompileOutcome> {
        let target = self.config.targets.get(target_name).ok_or_else(|| {
            Error::Config(format!("unknown compile target '{}'", target_name))
        })?;

        let sources = resolve_globs(&self.project_root, &target.src)?;
        if sources.is_empty() {
            nlog!("compile:{}: no sources matched, skipping", target_name);
            return Ok(CompileOutcome {
                target: target_name.to_string(),
                files: 0,
                out: self.project_root.join(&target.out),
            });
        }

        let out = self.project_root.join(&target.out);
        if let Some(parent) = out.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        nlog!(
            "compile:{}: {} file(s) -> {}",
            target_name,
            sources.len(),
            target.out.display()
        );

        let output = Command::new(&self.command)
            .args(&sources)
            .arg("--out")
            .arg(&out)
            .args(option_flags(target))
            .current_dir(&self.project_root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if output.status.success() {
            return Ok(CompileOutcome {
                target: target_name.to_string(),
                files: sources.len(),
                out,
            });
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        nlog_debug!("compile:{} failed: {}", target_name, stderr.trim());
        Err(parse_diagnostic(&stderr)
            .or_else(|| parse_diagnostic(&stdout))
            .unwrap_or_else(|| Error::Compile {
                file: target_name.to_string(),
                line: 0,
                message: first_nonempty_line(&stderr, &stdout),
            }))
    }
}

/// Flags derived from the target's options.
fn option_flags(target: &CompileTarget) -> Vec<&'static str> {
    let mut flags = Vec::new();
    if target.declaration {
        flags.push("--declaration");
    }
    if target.source_map {
        flags.push("--source-map");
    }
    flags
}

/// Parse the first `file(line,col): error CODE: message` diagnostic.
fn parse_diagnostic(output: &str) -> Option<Error> {
    static DIAGNOSTIC: OnceLock<Regex> = OnceLock::new();
    let re = DIAGNOSTIC.get_or_init(|| {
        Regex::new(r"(?m)^(?P<file>[^\s(][^(]*)\((?P<line>\d+),\d+\):\s*error\s*(?:[A-Z]+\d+)?:?\s*(?P<msg>.+)$")
            .expect("diagnostic regex is valid")
    });
    let caps = re.captures(output)?;
    Some(Error::Compile {
        file: caps["file"].to_string(),
        line: caps["line"].parse().unwrap_or(0),
        message: caps["msg"].trim().to_string(),
    })
}

fn first_nonempty_line(stderr: &str, stdout: &str) -> String {
    stderr
        .lines()
        .chain(stdout.lines())
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("compiler exited with an error")
        .to_string()
}
