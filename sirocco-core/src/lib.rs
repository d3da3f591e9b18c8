//! # Sirocco Core
//!
//! Process-level plumbing shared by every Sirocco component:
//! - YAML configuration loading with environment-independent defaults
//! - `tracing` initialization (JSON or pretty output)
//! - shutdown coordination for graceful termination

#![warn(missing_docs)]

pub mod config;
pub mod shutdown;
pub mod telemetry;

pub use config::{AppConfig, ConfigError};
pub use shutdown::ShutdownController;
