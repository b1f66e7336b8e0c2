//! `stagehand-worker` — the pull loop that runs on every worker process.
//!
//! A [`WorkerDriver`] repeatedly asks the shared schedule for work, runs it
//! through a [`TaskExecutor`], and reports completion on its next request.

pub mod driver;
pub mod error;
pub mod executor;

pub use driver::{DriverOptions, WorkerDriver, WorkerReport};
pub use error::{ExecutorError, Result, WorkerError};
pub use executor::{CommandExecutor, TaskExecutor};
