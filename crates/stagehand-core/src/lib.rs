//! `stagehand-core` — configuration and shared error types for the staged
//! task scheduler workspace.

pub mod config;
pub mod error;

pub use config::StagehandConfig;
pub use error::{CoreError, Result};
