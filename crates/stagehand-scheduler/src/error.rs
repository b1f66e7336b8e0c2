use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A completion report named a task the schedule does not contain.
    /// Always a caller bug: workers only report tasks they were handed.
    #[error("Task not found: {task_type}#{id} rep {repetition} scenario {scenario_index:?}")]
    TaskNotFound {
        task_type: String,
        id: i64,
        repetition: u32,
        scenario_index: Option<u32>,
    },

    /// The schedule plan is malformed or ambiguous.
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// A stored snapshot could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Any other storage provider failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
