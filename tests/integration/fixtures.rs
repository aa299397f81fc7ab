//! Test fixtures for integration tests.
//!
//! Provides a temporary project with fake external tools. Each tool appends
//! its name to `steps.log` when invoked, so tests can assert on what ran
//! and in which order.

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use nacre::config::{CompileTarget, Config};
use nacre::Orchestrator;

/// A temporary project wired to fake compiler and test-runner scripts.
pub struct TestProject {
    /// The temporary directory holding the project.
    pub temp_dir: TempDir,
    /// The project configuration, ready for `Orchestrator::new`.
    pub config: Config,
}

impl TestProject {
    /// Create a project with a well-behaved compiler and an all-passing
    /// test runner.
    pub fn new() -> Self {
        Self::with_tools("exit 0", "echo '2 passing (5ms)'")
    }

    /// Create a project with custom tool bodies (sh syntax).
    pub fn with_tools(compiler_body: &str, runner_body: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().to_path_buf();

        fs::create_dir_all(root.join("src")).expect("Failed to create src");
        fs::create_dir_all(root.join("test")).expect("Failed to create test");
        fs::write(root.join("src/app.ts"), "let board = [];\n").expect("Failed to write source");
        fs::write(root.join("test/test.html"), "<html></html>").expect("Failed to write harness");
        fs::write(
            root.join("lint.toml"),
            "[rules]\nno-trailing-whitespace = \"error\"\nno-tabs = \"error\"\n",
        )
        .expect("Failed to write rules");

        let compiler = write_tool(&root, "fake-tsc", "compile", compiler_body);
        let runner = write_tool(&root, "fake-runner", "test", runner_body);

        let mut config = Config::default();
        config.project_root = root;
        config.compile.command = compiler.to_string_lossy().into_owned();
        config.test.command = runner.to_string_lossy().into_owned();

        let mut targets = BTreeMap::new();
        targets.insert(
            "dev".to_string(),
            CompileTarget {
                src: vec!["src/*.ts".to_string()],
                out: PathBuf::from("build/app.js"),
                declaration: false,
                source_map: false,
            },
        );
        config.compile.targets = targets;
        config.lint.files = vec!["src/*.ts".to_string()];
        config.aliases.insert(
            "buildtest".to_string(),
            vec![
                "compile:dev".to_string(),
                "clean".to_string(),
                "lint".to_string(),
                "test".to_string(),
            ],
        );

        Self { temp_dir, config }
    }

    /// The project root path.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Overwrite the main source file.
    pub fn write_source(&self, content: &str) {
        fs::write(self.path().join("src/app.ts"), content).expect("Failed to write source");
    }

    /// Build an orchestrator over this project.
    pub fn orchestrator(&self, shutdown: CancellationToken) -> Orchestrator {
        Orchestrator::new(self.config.clone(), shutdown).expect("Failed to build orchestrator")
    }

    /// The recorded tool invocations, one name per line.
    pub fn steps_log(&self) -> String {
        fs::read_to_string(self.path().join("steps.log")).unwrap_or_default()
    }

    /// How many times a tool ran.
    pub fn step_count(&self, name: &str) -> usize {
        self.steps_log().lines().filter(|l| *l == name).count()
    }
}

fn write_tool(root: &Path, file: &str, log_name: &str, body: &str) -> PathBuf {
    let path = root.join(file);
    fs::write(
        &path,
        format!(
            "#!/bin/sh\necho {} >> {}/steps.log\n{}\n",
            log_name,
            root.display(),
            body
        ),
    )
    .expect("Failed to write tool script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .expect("Failed to chmod tool script");
    path
}

/// Find a free loopback port by binding port 0 and releasing it.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    listener.local_addr().expect("Failed to read addr").port()
}
