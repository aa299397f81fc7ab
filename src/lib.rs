//! nacre: build task orchestrator and dev server.
//!
//! A single static configuration file (`nacre.toml`) wires together a
//! compiler, a linter, a cleanup step, a browser test runner, a static dev
//! server with live reload, and a debounced file watcher. Aliases name
//! ordered sequences of those steps; the orchestrator runs them strictly in
//! order, stopping at the first failure.

pub mod clean;
pub mod compile;
pub mod config;
pub mod error;
pub mod lint;
pub mod log;
pub mod orchestrator;
pub mod plan;
pub mod server;
pub mod testrun;
pub mod util;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
pub use orchestrator::Orchestrator;
pub use plan::{ExecutionPlan, Step};
