//! Project configuration loaded from `nacre.toml`.
//!
//! The whole configuration is read exactly once at startup into an immutable
//! [`Config`] value, then handed by reference to each component. Nothing in
//! here mutates after load; the watcher's change-detection state is the only
//! runtime-mutable piece of the system and it lives with the watcher.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{nlog_debug, Error, Result};

/// Default name of the configuration file.
pub const CONFIG_FILE: &str = "nacre.toml";

/// A single compile target: a set of source globs producing one output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileTarget {
    /// Source file globs, resolved relative to the project root.
    pub src: Vec<String>,
    /// Output artifact path.
    pub out: PathBuf,
    /// Emit declaration files alongside the output.
    #[serde(default)]
    pub declaration: bool,
    /// Emit source maps alongside the output.
    #[serde(default)]
    pub source_map: bool,
}

/// Compiler section: the external compiler command and its targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Compiler executable name or path, resolved via PATH at startup.
    #[serde(default = "default_compiler")]
    pub command: String,
    /// Named targets. The stock project defines `dev` and `test`.
    pub targets: BTreeMap<String, CompileTarget>,
}

fn default_compiler() -> String {
    "tsc".to_string()
}

/// Linter section: which files to check and where the rule map lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintConfig {
    /// Source file globs to lint.
    pub files: Vec<String>,
    /// Path to the rules file (TOML, rule name -> severity).
    pub rules: PathBuf,
}

/// Cleanup section: transient files to delete between compile and lint.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CleanConfig {
    /// Glob patterns of files to remove. Missing matches are not an error.
    pub patterns: Vec<String>,
}

/// Test runner section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    /// Path to the generated HTML harness document.
    pub harness: PathBuf,
    /// Headless runner executable, resolved via PATH at startup.
    #[serde(default = "default_test_runner")]
    pub command: String,
    /// Auto-run the suite embedded in the harness.
    #[serde(default = "default_true")]
    pub run: bool,
    /// Hard deadline for loading and executing the harness.
    #[serde(default = "default_test_timeout")]
    pub timeout_secs: u64,
}

fn default_test_runner() -> String {
    "mocha-headless-chrome".to_string()
}

fn default_test_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// Static file server section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to bind. Binding failure aborts the process; there is no fallback
    /// port, developers point their browsers at this one.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Served root, relative to the project root. Empty means the project
    /// root itself.
    #[serde(default)]
    pub root: String,
    /// Push reload notifications to connected clients after rebuilds.
    #[serde(default = "default_true")]
    pub livereload: bool,
}

fn default_port() -> u16 {
    9999
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            root: String::new(),
            livereload: true,
        }
    }
}

impl ServerConfig {
    /// Resolve the served root against the project root.
    pub fn root_path(&self, project_root: &Path) -> PathBuf {
        if self.root.is_empty() {
            project_root.to_path_buf()
        } else {
            project_root.join(&self.root)
        }
    }
}

/// One watch rule: a glob set re-running one alias on change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchRule {
    /// File globs that trigger this rule.
    pub files: Vec<String>,
    /// Alias to re-run when any matched file changes.
    pub alias: String,
}

/// Watcher section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce window in milliseconds: changes landing within one window
    /// coalesce into a single re-run.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Rules mapping glob sets to aliases.
    #[serde(default)]
    pub rules: Vec<WatchRule>,
}

fn default_debounce_ms() -> u64 {
    250
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            rules: Vec::new(),
        }
    }
}

/// The full, immutable project configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub compile: CompileConfig,
    pub lint: LintConfig,
    #[serde(default)]
    pub clean: CleanConfig,
    pub test: TestConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    /// Alias name -> ordered step references. A step references a task
    /// (`"compile:dev"`, `"lint"`, ...) or another alias (`"buildtest"`).
    pub aliases: BTreeMap<String, Vec<String>>,
    /// Directory containing the configuration file. Everything relative in
    /// the config resolves against this.
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Config {
    /// Load the configuration from the given file.
    ///
    /// A missing or unparsable file is a configuration error; there is no
    /// implicit default project.
    pub fn load(path: &Path) -> Result<Self> {
        nlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            return Err(Error::Config(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }
        let mut config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.project_root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.validate()?;
        nlog_debug!(
            "Config loaded: {} compile target(s), {} alias(es), {} watch rule(s)",
            config.compile.targets.len(),
            config.aliases.len(),
            config.watch.rules.len()
        );
        Ok(config)
    }

    /// Structural validation that does not depend on the task registry.
    ///
    /// Cross-references between aliases, tasks, and watch rules are checked
    /// when execution plans are built.
    fn validate(&self) -> Result<()> {
        if self.compile.targets.is_empty() {
            return Err(Error::Config("no compile targets defined".to_string()));
        }
        for (name, steps) in &self.aliases {
            if steps.is_empty() {
                return Err(Error::Config(format!("alias '{}' has no steps", name)));
            }
        }
        for rule in &self.watch.rules {
            if rule.files.is_empty() {
                return Err(Error::Config(format!(
                    "watch rule for alias '{}' has no file globs",
                    rule.alias
                )));
            }
        }
        if self.watch.debounce_ms == 0 {
            return Err(Error::Config(
                "watch.debounce_ms must be greater than zero".to_string(),
            ));
        }
        if self.test.timeout_secs == 0 {
            return Err(Error::Config(
                "test.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    /// The stock project configuration: two compile targets feeding a
    /// `buildtest` chain, a dev server on 9999, and a watch rule re-running
    /// `buildtest` on source changes.
    fn default() -> Self {
        let mut targets = BTreeMap::new();
        targets.insert(
            "dev".to_string(),
            CompileTarget {
                src: vec![
                    "src/**/*.ts".to_string(),
                    "typings/**/*.d.ts".to_string(),
                ],
                out: PathBuf::from("build/abalone.js"),
                declaration: true,
                source_map: false,
            },
        );
        targets.insert(
            "test".to_string(),
            CompileTarget {
                src: vec![
                    "test/*.ts".to_string(),
                    "typings/**/*.d.ts".to_string(),
                    "build/**/*.d.ts".to_string(),
                ],
                out: PathBuf::from("build/test.js"),
                declaration: false,
                source_map: false,
            },
        );

        let mut aliases = BTreeMap::new();
        aliases.insert(
            "buildtest".to_string(),
            vec![
                "compile:dev".to_string(),
                "compile:test".to_string(),
                "clean".to_string(),
                "lint".to_string(),
                "test".to_string(),
            ],
        );
        aliases.insert(
            "default".to_string(),
            vec![
                "serve".to_string(),
                "buildtest".to_string(),
                "watch".to_string(),
            ],
        );

        Self {
            compile: CompileConfig {
                command: default_compiler(),
                targets,
            },
            lint: LintConfig {
                files: vec!["src/**/*.ts".to_string(), "test/**/*.ts".to_string()],
                rules: PathBuf::from("lint.toml"),
            },
            clean: CleanConfig {
                patterns: vec!["tscommand*.tmp.txt".to_string()],
            },
            test: TestConfig {
                harness: PathBuf::from("test/test.html"),
                command: default_test_runner(),
                run: true,
                timeout_secs: default_test_timeout(),
            },
            server: ServerConfig::default(),
            watch: WatchConfig {
                debounce_ms: default_debounce_ms(),
                rules: vec![WatchRule {
                    files: vec!["src/**/*.ts".to_string(), "test/**/*.ts".to_string()],
                    alias: "buildtest".to_string(),
                }],
            },
            aliases,
            project_root: PathBuf::from("."),
        }
    }
}
