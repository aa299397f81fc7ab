//! Linter: rule-driven static checks over the configured source globs.
//!
//! Rules and their severities are loaded from an external TOML rules file.
//! Findings are deterministic: sorted by (file, line, rule) so repeated runs
//! over the same inputs produce identical output. Error-severity findings
//! fail the step; warnings are reported and do not.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::LintConfig;
use crate::util::{display_path, resolve_globs};
use crate::{nlog_debug, Error, Result};

/// Severity assigned to a rule in the rules file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Off,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Off => write!(f, "off"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// The closed set of shipped rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rule {
    NoTrailingWhitespace,
    NoTabs,
    MaxLineLength,
    NoConsecutiveBlankLines,
    EofNewline,
}

impl Rule {
    pub fn name(&self) -> &'static str {
        match self {
            Rule::NoTrailingWhitespace => "no-trailing-whitespace",
            Rule::NoTabs => "no-tabs",
            Rule::MaxLineLength => "max-line-length",
            Rule::NoConsecutiveBlankLines => "no-consecutive-blank-lines",
            Rule::EofNewline => "eof-newline",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "no-trailing-whitespace" => Some(Rule::NoTrailingWhitespace),
            "no-tabs" => Some(Rule::NoTabs),
            "max-line-length" => Some(Rule::MaxLineLength),
            "no-consecutive-blank-lines" => Some(Rule::NoConsecutiveBlankLines),
            "eof-newline" => Some(Rule::EofNewline),
            _ => None,
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// On-disk shape of the rules file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct RulesFile {
    #[serde(default)]
    rules: BTreeMap<String, Severity>,
    #[serde(default)]
    options: RuleOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RuleOptions {
    #[serde(default = "default_max_line_length")]
    max_line_length: usize,
}

fn default_max_line_length() -> usize {
    120
}

impl Default for RuleOptions {
    fn default() -> Self {
        Self {
            max_line_length: default_max_line_length(),
        }
    }
}

/// Parsed, validated rule configuration.
#[derive(Debug, Clone)]
pub struct RuleSet {
    severities: BTreeMap<Rule, Severity>,
    max_line_length: usize,
}

impl RuleSet {
    /// Load a rule set from a TOML rules file.
    ///
    /// Unknown rule names are a configuration error; unlisted rules are off.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "lint rules file not found: {}",
                path.display()
            )));
        }
        let parsed: RulesFile = toml::from_str(&fs::read_to_string(path)?)?;
        let mut severities = BTreeMap::new();
        for (name, severity) in parsed.rules {
            let rule = Rule::from_name(&name)
                .ok_or_else(|| Error::Config(format!("unknown lint rule '{}'", name)))?;
            severities.insert(rule, severity);
        }
        Ok(Self {
            severities,
            max_line_length: parsed.options.max_line_length,
        })
    }

    /// Severity for a rule; unlisted rules are off.
    pub fn severity(&self, rule: Rule) -> Severity {
        self.severities.get(&rule).copied().unwrap_or(Severity::Off)
    }

    #[cfg(test)]
    fn with_all(severity: Severity) -> Self {
        let rules = [
            Rule::NoTrailingWhitespace,
            Rule::NoTabs,
            Rule::MaxLineLength,
            Rule::NoConsecutiveBlankLines,
            Rule::EofNewline,
        ];
        Self {
            severities: rules.into_iter().map(|r| (r, severity)).collect(),
            max_line_length: default_max_line_length(),
        }
    }
}

/// A single lint finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// Path relative to the project root.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
    pub rule: Rule,
    pub message: String,
    pub severity: Severity,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} [{}] {}",
            self.file, self.line, self.severity, self.rule, self.message
        )
    }
}

/// All findings from one lint run, sorted by (file, line, rule).
#[derive(Debug, Clone, Default)]
pub struct LintReport {
    pub findings: Vec<Finding>,
}

impl LintReport {
    /// Number of error-severity findings.
    pub fn error_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
            .count()
    }

    /// Number of warning-severity findings.
    pub fn warning_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Warning)
            .count()
    }

    /// Convert into a step result: any error-severity finding fails.
    pub fn into_result(self) -> Result<LintReport> {
        let errors = self.error_count();
        if errors > 0 {
            Err(Error::Lint { errors })
        } else {
            Ok(self)
        }
    }
}

/// Lints the configured file globs against a rule set.
pub struct Linter {
    rules: RuleSet,
    files: Vec<String>,
    project_root: PathBuf,
}

impl Linter {
    /// Create a linter, loading the rules file referenced by the config.
    pub fn new(config: &LintConfig, project_root: &Path) -> Result<Self> {
        let rules = RuleSet::load(&project_root.join(&config.rules))?;
        Ok(Self {
            rules,
            files: config.files.clone(),
            project_root: project_root.to_path_buf(),
        })
    }

    /// Construct directly from a rule set (used by tests).
    pub fn with_rules(rules: RuleSet, files: Vec<String>, project_root: &Path) -> Self {
        Self {
            rules,
            files,
            project_root: project_root.to_path_buf(),
        }
    }

    /// Run all enabled rules over the matched files.
    pub fn run(&self) -> Result<LintReport> {
        let mut findings = Vec::new();
        for path in resolve_globs(&self.project_root, &self.files)? {
            let content = fs::read_to_string(&path)?;
            let rel = display_path(&self.project_root, &path);
            self.check_file(&rel, &content, &mut findings);
        }
        findings.sort_by(|a, b| {
            (a.file.as_str(), a.line, a.rule.name())
                .cmp(&(b.file.as_str(), b.line, b.rule.name()))
        });
        nlog_debug!("lint: {} finding(s)", findings.len());
        Ok(LintReport { findings })
    }

    fn check_file(&self, file: &str, content: &str, findings: &mut Vec<Finding>) {
        let mut blank_run = 0usize;
        let mut line_count = 0u32;

        for (idx, line) in content.lines().enumerate() {
            let line_no = idx as u32 + 1;
            line_count = line_no;
            let line = line.strip_suffix('\r').unwrap_or(line);

            self.emit(findings, file, line_no, Rule::NoTrailingWhitespace, || {
                (line != line.trim_end()).then(|| "trailing whitespace".to_string())
            });
            self.emit(findings, file, line_no, Rule::NoTabs, || {
                line.contains('\t').then(|| "tab character".to_string())
            });
            self.emit(findings, file, line_no, Rule::MaxLineLength, || {
                let len = line.chars().count();
                (len > self.rules.max_line_length).then(|| {
                    format!(
                        "line is {} characters, limit is {}",
                        len, self.rules.max_line_length
                    )
                })
            });

            if line.trim().is_empty() {
                blank_run += 1;
                if blank_run == 2 {
                    self.emit(findings, file, line_no, Rule::NoConsecutiveBlankLines, || {
                        Some("consecutive blank lines".to_string())
                    });
                }
            } else {
                blank_run = 0;
            }
        }

        if !content.is_empty() && !content.ends_with('\n') {
            self.emit(findings, file, line_count, Rule::EofNewline, || {
                Some("file does not end with a newline".to_string())
            });
        }
    }

    fn emit<F>(&self, findings: &mut Vec<Finding>, file: &str, line: u32, rule: Rule, check: F)
    where
        F: FnOnce() -> Option<String>,
    {
        let severity = self.rules.severity(rule);
        if severity == Severity::Off {
            return;
        }
        if let Some(message) = check() {
            findings.push(Finding {
                file: file.to_string(),
                line,
                rule,
                message,
                severity,
            });
        }
    }
}
