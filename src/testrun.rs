//! Browser test runner invocation.
//!
//! Loads the generated HTML harness in the configured headless runner and
//! executes the embedded suite, bounded by a hard deadline. A timeout is a
//! fatal error, never a silent pass; so is runner output with no parsable
//! test summary, which would otherwise hide a harness that failed to load.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;

use crate::config::TestConfig;
use crate::{nlog, nlog_debug, Error, Result};

/// Aggregate result of one harness execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestSummary {
    pub passed: u32,
    pub failed: u32,
}

impl TestSummary {
    pub fn total(&self) -> u32 {
        self.passed + self.failed
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Invokes the headless runner on the harness document.
pub struct TestRunner {
    command: PathBuf,
    harness: PathBuf,
    run: bool,
    timeout: Duration,
}

impl TestRunner {
    /// Create a runner, resolving the executable up front.
    pub fn new(config: &TestConfig, project_root: &Path) -> Result<Self> {
        let command = which::which(&config.command)
            .map_err(|_| Error::ToolNotFound(config.command.clone()))?;
        Ok(Self {
            command,
            harness: project_root.join(&config.harness),
            run: config.run,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Resolved runner executable path.
    pub fn command(&self) -> &Path {
        &self.command
    }

    /// Execute the harness and return the summary.
    ///
    /// Fails if the harness is missing, any test fails, the output carries
    /// no summary, or the deadline expires.
    pub async fn run(&self) -> Result<TestSummary> {
        if !self.harness.exists() {
            return Err(Error::TestRunner(format!(
                "harness not found: {}",
                self.harness.display()
            )));
        }

        let mut cmd = Command::new(&self.command);
        cmd.arg(&self.harness);
        if self.run {
            cmd.arg("--run");
        }
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        nlog!("test: running harness {}", self.harness.display());
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| Error::Timeout(self.timeout))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        nlog_debug!("test: runner exited {:?}", output.status.code());

        let summary = parse_summary(&stdout).or_else(|| parse_summary(&stderr));
        match summary {
            Some(summary) if summary.failed > 0 => Err(Error::TestRunner(format!(
                "{} of {} test(s) failed",
                summary.failed,
                summary.total()
            ))),
            Some(summary) if !output.status.success() => Err(Error::TestRunner(format!(
                "runner exited with {:?} after {} passing test(s)",
                output.status.code(),
                summary.passed
            ))),
            Some(summary) => Ok(summary),
            None => Err(Error::TestRunner(format!(
                "no test summary in runner output: {}",
                first_line(&stderr, &stdout)
            ))),
        }
    }
}

/// Parse the mocha reporter summary (`N passing`, optionally `M failing`).
fn parse_summary(output: &str) -> Option<TestSummary> {
    static PASSING: OnceLock<Regex> = OnceLock::new();
    static FAILING: OnceLock<Regex> = OnceLock::new();
    let passing = PASSING
        .get_or_init(|| Regex::new(r"(\d+)\s+passing").expect("passing regex is valid"));
    let failing = FAILING
        .get_or_init(|| Regex::new(r"(\d+)\s+failing").expect("failing regex is valid"));

    let passed = passing.captures(output)?[1].parse().ok()?;
    let failed = failing
        .captures(output)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0);
    Some(TestSummary { passed, failed })
}

fn first_line(stderr: &str, stdout: &str) -> String {
    stderr
        .lines()
        .chain(stdout.lines())
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("(empty)")
        .to_string()
}
