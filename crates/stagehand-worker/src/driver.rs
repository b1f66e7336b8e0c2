use std::sync::Arc;
use std::time::Duration;

use stagehand_core::config::WorkerConfig;
use stagehand_scheduler::{
    shared::{load_snapshot, update_shared},
    Assignment, IndividualTask, ScheduleStore, TaskCoordinator,
};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    error::{Result, WorkerError},
    executor::TaskExecutor,
};

/// Loop tuning for a [`WorkerDriver`].
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// First sleep after the schedule had nothing to hand out.
    pub idle_backoff: Duration,
    /// Cap for the doubling backoff.
    pub max_backoff: Duration,
    /// Stop after this many executions (successful or not).
    pub max_tasks: Option<u64>,
}

impl From<&WorkerConfig> for DriverOptions {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            idle_backoff: Duration::from_millis(config.idle_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms.max(config.idle_backoff_ms)),
            max_tasks: config.max_tasks,
        }
    }
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

/// What one driver did before it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker_id: String,
    /// Tasks executed successfully and reported complete.
    pub executed: u64,
    /// Executions that failed; those tasks stay started and are re-issued.
    pub failed: u64,
    /// The driver stopped because the whole schedule is complete.
    pub all_complete: bool,
}

/// Pulls tasks from a shared schedule until it completes or shutdown is
/// requested.
pub struct WorkerDriver<E> {
    store: Arc<dyn ScheduleStore>,
    key: String,
    /// Seeds the store when no schedule exists under `key` yet.
    initial: Option<Arc<TaskCoordinator>>,
    executor: E,
    options: DriverOptions,
    worker_id: String,
}

impl<E: TaskExecutor> WorkerDriver<E> {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        key: impl Into<String>,
        executor: E,
        options: DriverOptions,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            initial: None,
            executor,
            options,
            // UUIDv7 includes a timestamp, so worker ids sort by start time in logs
            worker_id: Uuid::now_v7().to_string(),
        }
    }

    pub fn with_initial(mut self, coordinator: TaskCoordinator) -> Self {
        self.initial = Some(Arc::new(coordinator));
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Main loop. Returns once the schedule is complete, `max_tasks` is
    /// reached, or `shutdown` broadcasts `true`.
    ///
    /// A task interrupted by shutdown, or whose execution fails, is not
    /// reported complete; it stays started and another update re-issues it.
    #[instrument(skip_all, fields(worker_id = %self.worker_id, key = %self.key))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<WorkerReport> {
        if self.initial.is_none() && !self.schedule_exists().await? {
            return Err(WorkerError::NoSchedule {
                key: self.key.clone(),
            });
        }
        info!("worker started");

        let mut report = WorkerReport {
            worker_id: self.worker_id.clone(),
            executed: 0,
            failed: 0,
            all_complete: false,
        };
        let mut last_completed: Option<IndividualTask> = None;
        let mut backoff = self.options.idle_backoff;

        loop {
            if *shutdown.borrow() {
                if let Some(done) = last_completed.take() {
                    self.update(Some(done), false).await?;
                }
                info!("worker shutting down");
                break;
            }

            let at_cap = self
                .options
                .max_tasks
                .is_some_and(|max| report.executed + report.failed >= max);
            let assignment = self.update(last_completed.take(), !at_cap).await?;
            if at_cap {
                info!(executed = report.executed, "task limit reached");
                break;
            }
            if assignment.all_complete {
                report.all_complete = true;
                info!(executed = report.executed, "schedule complete");
                break;
            }

            let Some(task) = assignment.task_to_do else {
                // Another worker may be mid-task; try again later.
                debug!(?backoff, "no task available");
                self.pause(backoff, &mut shutdown).await;
                backoff = self.next_backoff(backoff);
                continue;
            };

            backoff = self.options.idle_backoff;
            info!(task = %task, "executing task");
            let outcome = tokio::select! {
                result = self.executor.execute(&task) => Some(result),
                _ = wait_for_shutdown(&mut shutdown) => None,
            };
            match outcome {
                Some(Ok(())) => {
                    report.executed += 1;
                    last_completed = Some(task);
                }
                Some(Err(e)) => {
                    report.failed += 1;
                    error!(task = %task, error = %e, "task failed; left for re-issue");
                    self.pause(backoff, &mut shutdown).await;
                    backoff = self.next_backoff(backoff);
                }
                None => {
                    warn!(task = %task, "shutdown during task; left for re-issue");
                }
            }
        }

        Ok(report)
    }

    fn next_backoff(&self, backoff: Duration) -> Duration {
        backoff.saturating_mul(2).min(self.options.max_backoff)
    }

    async fn update(
        &self,
        task_completed: Option<IndividualTask>,
        ready_for_another_task: bool,
    ) -> Result<Assignment> {
        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        let initial = self.initial.clone();
        // SQLite transactions block; keep them off the async workers.
        let assignment = tokio::task::spawn_blocking(move || {
            update_shared(
                store.as_ref(),
                &key,
                move || initial.map(|c| c.as_ref().clone()).unwrap_or_default(),
                task_completed.as_ref(),
                ready_for_another_task,
            )
        })
        .await??;
        Ok(assignment)
    }

    async fn schedule_exists(&self) -> Result<bool> {
        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        let snapshot = tokio::task::spawn_blocking(move || load_snapshot(store.as_ref(), &key))
            .await??;
        Ok(snapshot.is_some())
    }

    async fn pause(&self, delay: Duration, shutdown: &mut watch::Receiver<bool>) {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = wait_for_shutdown(shutdown) => {}
        }
    }
}

/// Resolves once shutdown is requested. A dropped sender never resolves, so
/// workers without a shutdown source run to completion.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use stagehand_scheduler::{MemoryStore, RepeatedTask, TaskStage};

    use super::*;
    use crate::error::ExecutorError;

    fn warmup_then_main() -> TaskCoordinator {
        TaskCoordinator::new(vec![
            TaskStage::new(vec![RepeatedTask::new("Warmup", 0, 2, None, false)]),
            TaskStage::new(vec![RepeatedTask::new("Main", 1, 3, Some(2), false)]),
        ])
    }

    fn fast() -> DriverOptions {
        DriverOptions {
            idle_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            max_tasks: None,
        }
    }

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<String>>,
        /// Tasks that fail on their first attempt.
        fail_once: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl TaskExecutor for Recording {
        async fn execute(&self, task: &IndividualTask) -> std::result::Result<(), ExecutorError> {
            let name = task.to_string();
            self.seen.lock().unwrap().push(name.clone());
            if self.fail_once.lock().unwrap().remove(&name) {
                return Err(ExecutorError::Other(format!("{name} crashed")));
            }
            Ok(())
        }
    }

    fn no_shutdown() -> watch::Receiver<bool> {
        let (_tx, rx) = watch::channel(false);
        rx
    }

    #[tokio::test]
    async fn drains_schedule_in_stage_order() {
        let store: Arc<dyn ScheduleStore> = Arc::new(MemoryStore::new());
        let driver = WorkerDriver::new(Arc::clone(&store), "k", Recording::default(), fast())
            .with_initial(warmup_then_main());

        let report = driver.run(no_shutdown()).await.unwrap();
        assert!(report.all_complete);
        assert_eq!(report.executed, 8);
        assert_eq!(report.failed, 0);

        let seen = driver.executor.seen.lock().unwrap().clone();
        assert_eq!(seen[0], "Warmup#0 rep 0");
        assert_eq!(seen[1], "Warmup#0 rep 1");
        assert!(seen[2..].iter().all(|s| s.starts_with("Main#1")));

        let snapshot = load_snapshot(store.as_ref(), "k").unwrap().unwrap();
        assert!(snapshot.complete());
    }

    #[tokio::test]
    async fn failed_task_is_reissued() {
        let store: Arc<dyn ScheduleStore> = Arc::new(MemoryStore::new());
        let executor = Recording::default();
        executor
            .fail_once
            .lock()
            .unwrap()
            .insert("Main#1 rep 1 scenario 0".to_string());
        let driver =
            WorkerDriver::new(store, "k", executor, fast()).with_initial(warmup_then_main());

        let report = driver.run(no_shutdown()).await.unwrap();
        assert!(report.all_complete);
        assert_eq!(report.failed, 1);
        assert_eq!(report.executed, 8);

        let seen = driver.executor.seen.lock().unwrap();
        let attempts = seen
            .iter()
            .filter(|s| s.as_str() == "Main#1 rep 1 scenario 0")
            .count();
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn stops_at_task_limit_and_reports_last_completion() {
        let store: Arc<dyn ScheduleStore> = Arc::new(MemoryStore::new());
        let options = DriverOptions {
            max_tasks: Some(3),
            ..fast()
        };
        let driver = WorkerDriver::new(Arc::clone(&store), "k", Recording::default(), options)
            .with_initial(warmup_then_main());

        let report = driver.run(no_shutdown()).await.unwrap();
        assert_eq!(report.executed, 3);
        assert!(!report.all_complete);

        let snapshot = load_snapshot(store.as_ref(), "k").unwrap().unwrap();
        assert_eq!(snapshot.individual_tasks().filter(|t| t.complete).count(), 3);
        // The limit stops the worker before it claims a fourth task.
        assert_eq!(
            snapshot.individual_tasks().filter(|t| t.started.is_some()).count(),
            3
        );
    }

    #[tokio::test]
    async fn missing_schedule_without_initial_is_an_error() {
        let store: Arc<dyn ScheduleStore> = Arc::new(MemoryStore::new());
        let driver = WorkerDriver::new(store, "absent", Recording::default(), fast());
        let err = driver.run(no_shutdown()).await.unwrap_err();
        assert!(matches!(err, WorkerError::NoSchedule { .. }));
    }

    #[tokio::test]
    async fn idles_on_guarded_task_until_shutdown() {
        let store: Arc<dyn ScheduleStore> = Arc::new(MemoryStore::new());
        let guarded = TaskCoordinator::new(vec![TaskStage::new(vec![RepeatedTask::new(
            "Final", 9, 1, None, true,
        )])]);
        // Another worker already holds the only task.
        update_shared(store.as_ref(), "k", || guarded, None, true).unwrap();
        let before = load_snapshot(store.as_ref(), "k").unwrap().unwrap();

        let driver = WorkerDriver::new(Arc::clone(&store), "k", Recording::default(), fast());
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });

        let report = driver.run(rx).await.unwrap();
        assert_eq!(report.executed, 0);
        assert!(!report.all_complete);
        assert!(driver.executor.seen.lock().unwrap().is_empty());

        let after = load_snapshot(store.as_ref(), "k").unwrap().unwrap();
        assert_eq!(after, before);
    }

    #[test]
    fn backoff_doubles_up_to_cap_without_overflow() {
        let store: Arc<dyn ScheduleStore> = Arc::new(MemoryStore::new());
        let driver = WorkerDriver::new(Arc::clone(&store), "k", Recording::default(), fast());
        assert_eq!(driver.next_backoff(Duration::from_millis(1)), Duration::from_millis(2));
        assert_eq!(driver.next_backoff(Duration::from_millis(3)), Duration::from_millis(4));

        let huge = WorkerConfig {
            idle_backoff_ms: u64::MAX,
            max_backoff_ms: u64::MAX,
            ..WorkerConfig::default()
        };
        let options = DriverOptions::from(&huge);
        let driver = WorkerDriver::new(store, "k", Recording::default(), options);
        let max = Duration::from_millis(u64::MAX);
        assert_eq!(driver.next_backoff(max), max);
    }

    #[tokio::test]
    async fn shutdown_before_start_does_nothing() {
        let store: Arc<dyn ScheduleStore> = Arc::new(MemoryStore::new());
        let driver = WorkerDriver::new(Arc::clone(&store), "k", Recording::default(), fast())
            .with_initial(warmup_then_main());
        let (_tx, rx) = watch::channel(true);

        let report = driver.run(rx).await.unwrap();
        assert_eq!(report.executed, 0);
        assert!(store.load("k").unwrap().is_none());
    }
}
