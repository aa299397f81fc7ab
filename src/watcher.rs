//! File watcher: re-run an alias when watched sources change.
//!
//! A `notify` watcher feeds filesystem events through per-rule filters into
//! bounded channels. Each rule is consumed by an explicit state machine:
//!
//! ```text
//! Idle -> Debouncing -> Running -> Idle
//!                ^          |
//!                +----------+  (change arrived during the run)
//! ```
//!
//! Changes landing within one debounce window coalesce into a single alias
//! execution. Changes landing while an execution is in flight queue up and
//! trigger exactly one follow-up run after the current one completes; at
//! most one execution is ever in flight per rule. A failed rebuild does not
//! stop the loop, the watcher keeps going until shutdown.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{WatchConfig, WatchRule};
use crate::{nlog, nlog_debug, nlog_error, Result};

/// Channel capacity per rule; drained after every run, so bursts far larger
/// than any editor produces still fit.
const CHANNEL_CAPACITY: usize = 256;

/// A filesystem change relevant to some rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsChange {
    pub path: PathBuf,
}

/// Watcher state, one per rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Waiting for the first relevant change.
    Idle,
    /// A change arrived; collecting the rest of the burst.
    Debouncing,
    /// The alias execution is in flight.
    Running,
}

/// Glob filter deciding whether a changed path belongs to a rule.
#[derive(Debug, Clone)]
pub struct RuleFilter {
    patterns: Vec<glob::Pattern>,
    project_root: PathBuf,
}

impl RuleFilter {
    pub fn new(rule: &WatchRule, project_root: &Path) -> Result<Self> {
        let patterns = rule
            .files
            .iter()
            .map(|p| glob::Pattern::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            project_root: project_root.to_path_buf(),
        })
    }

    /// Whether the (absolute) path matches any of the rule's globs.
    pub fn matches(&self, path: &Path) -> bool {
        let relative = match path.strip_prefix(&self.project_root) {
            Ok(rel) => rel,
            Err(_) => return false,
        };
        self.patterns.iter().any(|p| p.matches_path(relative))
    }
}

/// The state machine consuming one rule's pre-filtered change stream.
///
/// Decoupled from `notify` so the coalescing and re-entrancy contracts are
/// testable by feeding the channel directly.
pub struct WatchRuleLoop {
    alias: String,
    debounce: Duration,
    rx: mpsc::Receiver<FsChange>,
    shutdown: CancellationToken,
}

impl WatchRuleLoop {
    pub fn new(
        alias: &str,
        debounce: Duration,
        rx: mpsc::Receiver<FsChange>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            alias: alias.to_string(),
            debounce,
            rx,
            shutdown,
        }
    }

    /// The alias this rule re-runs.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Drive the state machine until shutdown. Returns the number of alias
    /// executions performed.
    ///
    /// `execute` runs the mapped alias; its error aborts that run's
    /// remaining steps (the executor's concern) but never the loop.
    pub async fn run<F, Fut>(mut self, mut execute: F) -> u64
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut state = WatchState::Idle;
        let mut runs: u64 = 0;

        loop {
            match state {
                WatchState::Idle => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        change = self.rx.recv() => match change {
                            Some(change) => {
                                nlog_debug!(
                                    "watch[{}]: change {}",
                                    self.alias,
                                    change.path.display()
                                );
                                state = WatchState::Debouncing;
                            }
                            None => break,
                        },
                    }
                }
                WatchState::Debouncing => {
                    // Fixed window from the first change of the burst; every
                    // further change inside it is coalesced away.
                    let deadline = tokio::time::Instant::now() + self.debounce;
                    let mut closed = false;
                    loop {
                        tokio::select! {
                            _ = self.shutdown.cancelled() => return runs,
                            _ = tokio::time::sleep_until(deadline) => break,
                            change = self.rx.recv() => {
                                if change.is_none() {
                                    closed = true;
                                    break;
                                }
                            }
                        }
                    }
                    if closed {
                        // Still run what the burst asked for, then stop.
                        runs += self.execute_once(&mut execute).await;
                        break;
                    }
                    state = WatchState::Running;
                }
                WatchState::Running => {
                    runs += self.execute_once(&mut execute).await;
                    if self.shutdown.is_cancelled() {
                        break;
                    }
                    // Changes that arrived mid-run queued up in the channel;
                    // they collapse into exactly one follow-up run.
                    let mut pending = false;
                    while self.rx.try_recv().is_ok() {
                        pending = true;
                    }
                    state = if pending {
                        nlog_debug!("watch[{}]: change during run, queuing follow-up", self.alias);
                        WatchState::Debouncing
                    } else {
                        WatchState::Idle
                    };
                }
            }
        }
        runs
    }

    async fn execute_once<F, Fut>(&self, execute: &mut F) -> u64
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        nlog!("watch[{}]: re-running", self.alias);
        if let Err(e) = execute(self.alias.clone()).await {
            nlog_error!("watch[{}]: rebuild failed: {}", self.alias, e);
        }
        1
    }
}

/// Owns the `notify` watcher and the per-rule loops.
///
/// The watcher handle must stay alive for events to keep flowing; dropping
/// it releases the filesystem watches.
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
    /// One loop per configured rule, ready to be driven.
    pub loops: Vec<WatchRuleLoop>,
}

/// Build the notify watcher and one state-machine loop per rule.
///
/// Events are filtered against each rule's globs before entering that
/// rule's channel, so the loops only ever see relevant changes.
pub fn start(
    config: &WatchConfig,
    project_root: &Path,
    shutdown: CancellationToken,
) -> Result<WatcherHandle> {
    let debounce = Duration::from_millis(config.debounce_ms);
    let mut senders = Vec::new();
    let mut loops = Vec::new();

    for rule in &config.rules {
        let filter = RuleFilter::new(rule, project_root)?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        senders.push((filter, tx));
        loops.push(WatchRuleLoop::new(
            &rule.alias,
            debounce,
            rx,
            shutdown.clone(),
        ));
    }

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                match event.kind {
                    EventKind::Modify(_) | EventKind::Create(_) => {}
                    _ => return,
                }
                for path in event.paths {
                    for (filter, tx) in &senders {
                        if filter.matches(&path) {
                            let _ = tx.blocking_send(FsChange { path: path.clone() });
                        }
                    }
                }
            }
        },
        NotifyConfig::default(),
    )?;

    watcher.watch(project_root, RecursiveMode::Recursive)?;
    nlog!(
        "watch: {} rule(s), debounce {}ms",
        loops.len(),
        config.debounce_ms
    );

    Ok(WatcherHandle {
        _watcher: watcher,
        loops,
    })
}
