use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{Result, SchedulerError},
    stage::TaskStage,
    types::{Assignment, IndividualTask, ScheduleSummary, StageSummary},
};

/// Root of schedule state: an ordered list of stages.
///
/// [`TaskCoordinator::update`] is the only mutating operation. It is a plain
/// single-threaded transform with no locking; callers sharing a schedule
/// across processes run it inside a storage transaction (see
/// [`crate::shared::transform_shared`]).
///
/// The stage layout is fixed once built:
///
/// ```compile_fail
/// let mut coordinator = stagehand_scheduler::TaskCoordinator::default();
/// coordinator.stages.clear();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskCoordinator {
    stages: Vec<TaskStage>,
    /// A started task younger than this is never handed to another worker.
    #[serde(default)]
    pub min_reassign_delay_secs: u64,
}

impl TaskCoordinator {
    pub fn new(stages: Vec<TaskStage>) -> Self {
        Self {
            stages,
            min_reassign_delay_secs: 0,
        }
    }

    pub fn with_min_reassign_delay_secs(mut self, secs: u64) -> Self {
        self.min_reassign_delay_secs = secs;
        self
    }

    /// Stages in execution order.
    pub fn stages(&self) -> &[TaskStage] {
        &self.stages
    }

    /// Record `task_completed` (if any) and, when `ready_for_another_task`,
    /// pick the next unit of work. Uses the wall clock; see [`Self::update_at`].
    pub fn update(
        &mut self,
        task_completed: Option<&IndividualTask>,
        ready_for_another_task: bool,
    ) -> Result<Assignment> {
        self.update_at(task_completed, ready_for_another_task, Utc::now())
    }

    /// Deterministic core of [`Self::update`] with the clock supplied by the
    /// caller.
    ///
    /// When `ready_for_another_task` is false the completion is recorded but
    /// `all_complete` is reported as false even if that completion finished
    /// the schedule. Callers learn about completion on their next ready call.
    ///
    /// Returns [`SchedulerError::TaskNotFound`] without touching any state if
    /// `task_completed` names a task this schedule does not contain.
    pub fn update_at(
        &mut self,
        task_completed: Option<&IndividualTask>,
        ready_for_another_task: bool,
        now: DateTime<Utc>,
    ) -> Result<Assignment> {
        let mut touched = None;
        if let Some(done) = task_completed {
            let (stage_index, batch_index) = self.locate(done)?;
            let task = self.stages[stage_index].repeated_tasks_mut()[batch_index]
                .find_mut(done.repetition, done.scenario_index)
                .ok_or_else(|| not_found(done))?;
            task.complete = true;
            task.completed = Some(now);
            debug!(task = %task, stage = stage_index, "task completed");
            touched = Some((stage_index, batch_index));
        }

        if !ready_for_another_task {
            return Ok(Assignment::idle());
        }

        // Locality: keep the worker on the batch it just finished from.
        if let Some((stage_index, batch_index)) = touched {
            let batch = &mut self.stages[stage_index].repeated_tasks_mut()[batch_index];
            if let Some(next) = batch.first_incomplete_mut() {
                next.started = Some(now);
                debug!(task = %next, stage = stage_index, "task assigned from same batch");
                return Ok(Assignment::task(next.clone()));
            }
        }

        let Some(stage_index) = self.stages.iter().position(|s| !s.complete()) else {
            if touched.is_some() {
                info!("all stages complete");
            }
            return Ok(Assignment::finished());
        };

        let Some(batch) = self.stages[stage_index].incomplete_repeated_task_mut() else {
            return Ok(Assignment::idle());
        };
        let avoid_redundant = batch.avoid_redundant_execution;
        let Some(task) = batch.first_incomplete_mut() else {
            return Ok(Assignment::idle());
        };

        if let Some(started) = task.started {
            // Withheld while `started + delay > now`; a delay past chrono's
            // range never elapses.
            let too_recent = !i64::try_from(self.min_reassign_delay_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|delay| started.checked_add_signed(delay))
                .is_some_and(|reassign_at| reassign_at <= now);
            if too_recent || avoid_redundant {
                debug!(
                    task = %task,
                    stage = stage_index,
                    too_recent,
                    avoid_redundant,
                    "started task withheld from reassignment"
                );
                return Ok(Assignment::idle());
            }
            debug!(task = %task, %started, "reissuing stalled task");
        }

        task.started = Some(now);
        debug!(task = %task, stage = stage_index, "task assigned");
        Ok(Assignment::task(task.clone()))
    }

    /// Every individual task, stage by stage in declaration order.
    pub fn individual_tasks(&self) -> impl Iterator<Item = &IndividualTask> {
        self.stages
            .iter()
            .flat_map(|s| s.repeated_tasks().iter())
            .flat_map(|r| r.individual_tasks().iter())
    }

    pub fn complete(&self) -> bool {
        self.stages.iter().all(TaskStage::complete)
    }

    /// Fraction of individual tasks complete. An empty schedule counts as done.
    pub fn proportion_complete(&self) -> f64 {
        let (done, total) = self
            .individual_tasks()
            .fold((0usize, 0usize), |(done, total), t| {
                (done + usize::from(t.complete), total + 1)
            });
        if total == 0 {
            1.0
        } else {
            done as f64 / total as f64
        }
    }

    /// Longest `completed - started` across all completed tasks.
    pub fn longest_duration(&self) -> Duration {
        self.individual_tasks()
            .map(IndividualTask::duration_of_longest_complete)
            .max()
            .unwrap_or_else(Duration::zero)
    }

    pub fn summary(&self) -> ScheduleSummary {
        let stages = self
            .stages
            .iter()
            .map(|stage| {
                let mut summary = StageSummary::default();
                stage
                    .repeated_tasks()
                    .iter()
                    .flat_map(|r| r.individual_tasks().iter())
                    .for_each(|t| summary.record(t.state()));
                summary
            })
            .collect();
        ScheduleSummary {
            stages,
            proportion_complete: self.proportion_complete(),
            longest_duration_secs: self.longest_duration().num_milliseconds() as f64 / 1000.0,
            complete: self.complete(),
        }
    }

    /// Position of the repeated task owning `task`, as `(stage, batch)`.
    fn locate(&self, task: &IndividualTask) -> Result<(usize, usize)> {
        self.stages
            .iter()
            .enumerate()
            .find_map(|(stage_index, stage)| {
                stage
                    .repeated_tasks()
                    .iter()
                    .position(|r| r.task_type == task.task_type && r.id == task.id)
                    .map(|batch_index| (stage_index, batch_index))
            })
            .ok_or_else(|| not_found(task))
    }
}

fn not_found(task: &IndividualTask) -> SchedulerError {
    SchedulerError::TaskNotFound {
        task_type: task.task_type.clone(),
        id: task.id,
        repetition: task.repetition,
        scenario_index: task.scenario_index,
    }
}
