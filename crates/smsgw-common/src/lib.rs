//! Shared plumbing for the SMS gateway host tools.
//!
//! This crate contains:
//! - **Subprocess execution**: the [`exec::CommandRunner`] seam and its tokio-backed runner
//! - **Configuration**: `tools.toml` loading and the PHP app's dotenv credentials
//! - **Logging**: `tracing` subscriber setup that keeps stdout free for JSON
//! - **Output**: the JSON success/error documents the PHP caller decodes
//! - **Test utilities**: a scripted runner for exercising the tools without a host

pub mod config;
pub mod exec;
pub mod logging;
pub mod output;
pub mod test_util;
