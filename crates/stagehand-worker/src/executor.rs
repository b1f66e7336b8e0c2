use async_trait::async_trait;
use stagehand_scheduler::IndividualTask;
use tokio::process::Command;
use tracing::debug;

use crate::error::ExecutorError;

/// Runs the work identified by one scheduled task.
///
/// Tasks may be executed more than once (a stalled task is re-issued to
/// another worker), so implementations must tolerate duplicates.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &IndividualTask) -> Result<(), ExecutorError>;
}

/// Runs an external program per task.
///
/// The task identity is exported as environment variables:
///
/// | Variable                | Value                             |
/// |-------------------------|-----------------------------------|
/// | `STAGEHAND_TASK_TYPE`   | repeated task name                |
/// | `STAGEHAND_TASK_ID`     | repeated task id                  |
/// | `STAGEHAND_REPETITION`  | repetition index                  |
/// | `STAGEHAND_SCENARIO`    | scenario index, empty when none   |
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl TaskExecutor for CommandExecutor {
    async fn execute(&self, task: &IndividualTask) -> Result<(), ExecutorError> {
        let scenario = task
            .scenario_index
            .map(|s| s.to_string())
            .unwrap_or_default();
        debug!(program = %self.program, task = %task, "spawning task command");

        // kill_on_drop: an abandoned execution (worker shutdown) must not
        // leave the child running.
        let status = Command::new(&self.program)
            .args(&self.args)
            .env("STAGEHAND_TASK_TYPE", &task.task_type)
            .env("STAGEHAND_TASK_ID", task.id.to_string())
            .env("STAGEHAND_REPETITION", task.repetition.to_string())
            .env("STAGEHAND_SCENARIO", scenario)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|source| ExecutorError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(ExecutorError::Failed {
                task: task.to_string(),
                code: status.code(),
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandExecutor {
        CommandExecutor::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn exports_task_identity() {
        let executor = sh(r#"test "$STAGEHAND_TASK_TYPE" = Main \
            && test "$STAGEHAND_TASK_ID" = 1 \
            && test "$STAGEHAND_REPETITION" = 2 \
            && test "$STAGEHAND_SCENARIO" = 1"#);
        executor
            .execute(&IndividualTask::new("Main", 1, 2, Some(1)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_scenario_is_empty() {
        let executor = sh(r#"test -z "$STAGEHAND_SCENARIO""#);
        executor
            .execute(&IndividualTask::new("Warmup", 0, 0, None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure() {
        let err = sh("exit 3")
            .execute(&IndividualTask::new("Warmup", 0, 1, None))
            .await
            .unwrap_err();
        match err {
            ExecutorError::Failed { task, code } => {
                assert_eq!(task, "Warmup#0 rep 1");
                assert_eq!(code, Some(3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let err = CommandExecutor::new("/nonexistent/stagehand-sim", vec![])
            .execute(&IndividualTask::new("Warmup", 0, 0, None))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Spawn { .. }));
    }
}
