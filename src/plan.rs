//! Typed execution plans resolved from alias definitions.
//!
//! Alias definitions in the configuration are ordered lists of step
//! references. A reference names either a built-in task (`compile:dev`,
//! `clean`, `lint`, `test`, `serve`, `watch`) or another alias, which is
//! flattened in place. Every reference is resolved and validated once, at
//! startup; an unknown name or a reference cycle is a configuration error
//! before anything runs.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::Config;
use crate::{Error, Result};

/// One resolved step of an execution plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Compile one named target.
    Compile(String),
    /// Delete transient files.
    Clean,
    /// Run the lint rule set.
    Lint,
    /// Execute the browser test harness.
    Test,
    /// Start the static dev server (long-running, backgrounded).
    Serve,
    /// Enter the watch loop (long-running, blocks until shutdown).
    Watch,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Compile(target) => write!(f, "compile:{}", target),
            Step::Clean => write!(f, "clean"),
            Step::Lint => write!(f, "lint"),
            Step::Test => write!(f, "test"),
            Step::Serve => write!(f, "serve"),
            Step::Watch => write!(f, "watch"),
        }
    }
}

/// A validated, flattened, ordered sequence of steps for one alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// The alias this plan was resolved from.
    pub alias: String,
    /// Steps in execution order. Strictly sequential; the first failure
    /// aborts the remainder.
    pub steps: Vec<Step>,
}

impl ExecutionPlan {
    /// Number of steps in the plan.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no steps. Cannot happen for plans built from a
    /// validated configuration.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether the plan contains a long-running step (serve or watch).
    pub fn is_long_running(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s, Step::Serve | Step::Watch))
    }
}

/// Reserved names that an alias may not shadow.
const BUILTIN_NAMES: &[&str] = &["compile", "clean", "lint", "test", "serve", "watch"];

/// Build validated plans for every alias in the configuration.
///
/// Also cross-checks the watch rules: each rule must reference a known alias.
pub fn build_plans(config: &Config) -> Result<BTreeMap<String, ExecutionPlan>> {
    for name in config.aliases.keys() {
        if BUILTIN_NAMES.contains(&name.as_str()) || name.starts_with("compile:") {
            return Err(Error::Config(format!(
                "alias '{}' shadows a built-in task name",
                name
            )));
        }
    }

    let mut plans = BTreeMap::new();
    for name in config.aliases.keys() {
        let mut steps = Vec::new();
        let mut stack = Vec::new();
        resolve_alias(config, name, &mut steps, &mut stack)?;
        plans.insert(
            name.clone(),
            ExecutionPlan {
                alias: name.clone(),
                steps,
            },
        );
    }

    for rule in &config.watch.rules {
        if !plans.contains_key(&rule.alias) {
            return Err(Error::Config(format!(
                "watch rule references unknown alias '{}'",
                rule.alias
            )));
        }
    }

    Ok(plans)
}

/// Resolve one alias into `steps`, flattening nested aliases.
///
/// `stack` tracks the aliases currently being expanded so a reference cycle
/// is reported instead of recursing forever.
fn resolve_alias(
    config: &Config,
    name: &str,
    steps: &mut Vec<Step>,
    stack: &mut Vec<String>,
) -> Result<()> {
    if stack.iter().any(|n| n == name) {
        stack.push(name.to_string());
        return Err(Error::Config(format!(
            "alias reference cycle: {}",
            stack.join(" -> ")
        )));
    }

    let entries = config
        .aliases
        .get(name)
        .ok_or_else(|| Error::Config(format!("unknown alias '{}'", name)))?;

    stack.push(name.to_string());
    for entry in entries {
        resolve_reference(config, entry, steps, stack)?;
    }
    stack.pop();
    Ok(())
}

/// Resolve one step reference: a built-in task, a target-qualified compile
/// task, or a nested alias.
fn resolve_reference(
    config: &Config,
    reference: &str,
    steps: &mut Vec<Step>,
    stack: &mut Vec<String>,
) -> Result<()> {
    match reference {
        "clean" => steps.push(Step::Clean),
        "lint" => steps.push(Step::Lint),
        "test" => steps.push(Step::Test),
        "serve" => steps.push(Step::Serve),
        "watch" => steps.push(Step::Watch),
        // Bare "compile" expands to every target in declaration order.
        "compile" => {
            for target in config.compile.targets.keys() {
                steps.push(Step::Compile(target.clone()));
            }
        }
        other => {
            if let Some(target) = other.strip_prefix("compile:") {
                if !config.compile.targets.contains_key(target) {
                    return Err(Error::Config(format!(
                        "unknown compile target '{}' in reference '{}'",
                        target, other
                    )));
                }
                steps.push(Step::Compile(target.to_string()));
            } else if config.aliases.contains_key(other) {
                resolve_alias(config, other, steps, stack)?;
            } else {
                return Err(Error::Config(format!(
                    "unknown task or alias '{}'",
                    other
                )));
            }
        }
    }
    Ok(())
}
