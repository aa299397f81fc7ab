//! Integration test suite for nacre.
//!
//! These tests exercise whole alias executions against temporary projects,
//! with `/bin/sh` scripts standing in for the external compiler and test
//! runner. They verify that the components work together correctly: step
//! ordering, first-failure abort, server startup, and the watch loop.
//!
//! # Test Categories
//!
//! - `pipeline_e2e`: buildtest chain execution and short-circuiting
//! - `server_e2e`: dev server startup and port conflicts
//! - `watch_e2e`: watch-triggered rebuilds and shutdown
//!
//! # CI Compatibility
//!
//! No real compiler, browser, or network beyond loopback is required.

mod fixtures;

mod pipeline_e2e;
mod server_e2e;
mod watch_e2e;
