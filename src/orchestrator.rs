//! Task orchestrator: executes validated plans step by step.
//!
//! Steps run strictly in order; the first failure aborts the remainder of
//! the alias and propagates to the caller. Later steps assume earlier
//! steps' outputs exist (lint and test read compiled artifacts), so there
//! is deliberately no parallelism inside an alias.
//!
//! `serve` and `watch` are the two long-running steps: `serve` backgrounds
//! the dev server, `watch` blocks the alias on the watch loops until the
//! shutdown token fires. Everything else runs to completion inline.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::clean::Cleaner;
use crate::compile::Compiler;
use crate::config::Config;
use crate::lint::Linter;
use crate::plan::{build_plans, ExecutionPlan, Step};
use crate::server::{DevServer, ReloadHub};
use crate::testrun::TestRunner;
use crate::watcher;
use crate::{nlog, nlog_error, Error, Result};

/// Owns the immutable configuration, the validated plans, and the step
/// implementations. Construction fails fast: unknown alias references,
/// missing external tools, and a broken rules file all surface here,
/// before anything runs.
pub struct Orchestrator {
    config: Config,
    plans: std::collections::BTreeMap<String, ExecutionPlan>,
    compiler: Compiler,
    linter: Linter,
    cleaner: Cleaner,
    test_runner: TestRunner,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let plans = build_plans(&config)?;
        let compiler = Compiler::new(&config.compile, &config.project_root)?;
        let linter = Linter::new(&config.lint, &config.project_root)?;
        let cleaner = Cleaner::new(&config.clean, &config.project_root);
        let test_runner = TestRunner::new(&config.test, &config.project_root)?;
        Ok(Self {
            config,
            plans,
            compiler,
            linter,
            cleaner,
            test_runner,
            shutdown,
        })
    }

    /// The validated plans, keyed by alias.
    pub fn plans(&self) -> &std::collections::BTreeMap<String, ExecutionPlan> {
        &self.plans
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute one alias to completion (or to its first failure).
    ///
    /// For plans containing `serve`/`watch` this only returns once the
    /// shutdown token fires or a startup step fails.
    pub async fn run_alias(&self, name: &str) -> Result<()> {
        let plan = self
            .plans
            .get(name)
            .ok_or_else(|| Error::UnknownAlias(name.to_string()))?
            .clone();
        nlog!("alias {}: {} step(s)", name, plan.len());

        let mut reload: Option<Arc<ReloadHub>> = None;
        let mut server_task = None;
        let mut watch_requested = false;
        let mut result: Result<()> = Ok(());

        for step in &plan.steps {
            let step_result = match step {
                Step::Serve => {
                    match self.start_server().await {
                        Ok((hub, task)) => {
                            reload = hub;
                            server_task = Some(task);
                            Ok(())
                        }
                        Err(e) => Err(e),
                    }
                }
                Step::Watch => {
                    watch_requested = true;
                    Ok(())
                }
                step => self.execute_step(step).await,
            };
            if let Err(e) = step_result {
                result = Err(e);
                break;
            }
        }

        if result.is_ok() {
            if watch_requested {
                result = self.watch_until_shutdown(reload.clone()).await;
            } else if server_task.is_some() {
                // Serve without watch: keep serving until the shutdown signal.
                self.shutdown.cancelled().await;
            }
        }

        if let Some(task) = server_task {
            // Stop the server before joining it; a no-op when shutdown
            // already fired.
            self.shutdown.cancel();
            let served = task.await.map_err(|e| Error::TaskJoin(e.to_string()))?;
            result = result.and(served);
        }
        result
    }

    /// Bind and background the dev server, returning its reload hub.
    async fn start_server(
        &self,
    ) -> Result<(
        Option<Arc<ReloadHub>>,
        tokio::task::JoinHandle<Result<()>>,
    )> {
        let server = DevServer::new(&self.config.server, &self.config.project_root);
        let listener = server.bind().await?;
        let hub = self.config.server.livereload.then(|| server.hub());
        println!("Serving http://127.0.0.1:{}/", server.port());
        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(async move { server.serve(listener, shutdown).await });
        Ok((hub, task))
    }

    /// Execute one short-lived step.
    async fn execute_step(&self, step: &Step) -> Result<()> {
        match step {
            Step::Compile(target) => {
                let outcome = self.compiler.compile(target).await?;
                println!(
                    "compile:{}: {} file(s) -> {}",
                    outcome.target,
                    outcome.files,
                    outcome.out.display()
                );
            }
            Step::Clean => {
                let report = self.cleaner.run()?;
                if report.removed_count() > 0 {
                    println!("clean: removed {} file(s)", report.removed_count());
                }
                if !report.is_success() {
                    let (path, reason) = &report.failed[0];
                    return Err(Error::FileSystem(format!(
                        "could not remove {}: {}",
                        path.display(),
                        reason
                    )));
                }
            }
            Step::Lint => {
                let report = self.linter.run()?;
                for finding in &report.findings {
                    println!("{}", finding);
                }
                let warnings = report.warning_count();
                if warnings > 0 {
                    println!("lint: {} warning(s)", warnings);
                }
                report.into_result()?;
            }
            Step::Test => {
                let summary = self.test_runner.run().await?;
                println!("test: {} passing", summary.passed);
            }
            // Long-running steps are handled by run_alias.
            Step::Serve | Step::Watch => {}
        }
        Ok(())
    }

    /// Run a watch-triggered rebuild: the mapped alias's short-lived steps.
    ///
    /// `serve`/`watch` steps inside the re-run alias are skipped; the server
    /// is already up and nesting watch loops makes no sense.
    async fn rebuild(&self, alias: &str) -> Result<()> {
        let plan = self
            .plans
            .get(alias)
            .ok_or_else(|| Error::UnknownAlias(alias.to_string()))?
            .clone();
        for step in &plan.steps {
            match step {
                Step::Serve | Step::Watch => continue,
                step => self.execute_step(step).await?,
            }
        }
        Ok(())
    }

    /// Drive every watch rule's loop until shutdown.
    async fn watch_until_shutdown(&self, reload: Option<Arc<ReloadHub>>) -> Result<()> {
        let handle = watcher::start(
            &self.config.watch,
            &self.config.project_root,
            self.shutdown.clone(),
        )?;
        println!("Watching for changes... (ctrl-c to stop)");

        let loops = handle.loops.into_iter().map(|rule_loop| {
            let reload = reload.clone();
            rule_loop.run(move |alias| {
                let reload = reload.clone();
                async move {
                    let result = self.rebuild(&alias).await;
                    match &result {
                        Ok(()) => {
                            if let Some(hub) = &reload {
                                hub.notify();
                            }
                        }
                        Err(e) => nlog_error!("rebuild of '{}' failed: {}", alias, e),
                    }
                    result
                }
            })
        });
        let runs: u64 = futures::future::join_all(loops).await.into_iter().sum();
        nlog!("watch: stopped after {} re-run(s)", runs);
        Ok(())
    }
}
