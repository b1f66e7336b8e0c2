use thiserror::Error;

/// Failure of a single task execution. The task is not reported complete.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{task} exited with status {code:?}")]
    Failed { task: String, code: Option<i32> },

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] stagehand_scheduler::SchedulerError),

    /// The blocking store call panicked or was cancelled.
    #[error("Store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("No schedule stored under key {key:?}; run `stagehand init` first")]
    NoSchedule { key: String },
}

pub type Result<T> = std::result::Result<T, WorkerError>;
