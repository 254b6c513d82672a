//! Salesync Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Process-level plumbing shared by the salesync binaries.
//!
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` environment variables
//! - **Signals**: waiting for SIGINT/SIGTERM before a graceful shutdown
//!
//! # Example
//!
//! ```no_run
//! use salesync_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     Ok(())
//! }
//! ```

pub mod logging;
pub mod signal;
