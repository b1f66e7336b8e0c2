use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One schedulable unit of work.
///
/// The identity tuple `(task_type, id, repetition, scenario_index)` is fixed
/// at construction; only the timestamps and the `complete` flag change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndividualTask {
    /// Name of the batch this task belongs to, e.g. "Warmup".
    pub task_type: String,
    /// Numeric id of the owning repeated task.
    pub id: i64,
    pub repetition: u32,
    /// `None` when the owning batch was built without scenarios.
    pub scenario_index: Option<u32>,
    /// When the task was most recently handed to a worker.
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    pub complete: bool,
}

impl IndividualTask {
    pub fn new(task_type: &str, id: i64, repetition: u32, scenario_index: Option<u32>) -> Self {
        Self {
            task_type: task_type.to_string(),
            id,
            repetition,
            scenario_index,
            started: None,
            completed: None,
            complete: false,
        }
    }

    /// Wall time of the attempt that finished the task, or zero while the
    /// task is incomplete.
    pub fn duration_of_longest_complete(&self) -> Duration {
        match (self.complete, self.started, self.completed) {
            (true, Some(started), Some(completed)) => completed - started,
            _ => Duration::zero(),
        }
    }

    /// True when `other` names the same unit of work, ignoring its progress.
    pub fn matches(&self, other: &IndividualTask) -> bool {
        self.task_type == other.task_type
            && self.id == other.id
            && self.repetition == other.repetition
            && self.scenario_index == other.scenario_index
    }

    pub fn state(&self) -> TaskState {
        if self.complete {
            TaskState::Completed
        } else if self.started.is_some() {
            TaskState::Started
        } else {
            TaskState::Unstarted
        }
    }
}

impl std::fmt::Display for IndividualTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{} rep {}", self.task_type, self.id, self.repetition)?;
        if let Some(scenario) = self.scenario_index {
            write!(f, " scenario {scenario}")?;
        }
        Ok(())
    }
}

/// Lifecycle of an individual task. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Unstarted,
    /// Handed to a worker, not yet reported complete.
    Started,
    Completed,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Unstarted => "unstarted",
            TaskState::Started => "started",
            TaskState::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// Answer to a single coordinator update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Copy of the schedule entry the caller should execute next.
    pub task_to_do: Option<IndividualTask>,
    /// Every task in every stage is complete.
    pub all_complete: bool,
}

impl Assignment {
    pub(crate) fn task(task: IndividualTask) -> Self {
        Self {
            task_to_do: Some(task),
            all_complete: false,
        }
    }

    /// Nothing to hand out right now; the caller should retry later.
    pub(crate) fn idle() -> Self {
        Self {
            task_to_do: None,
            all_complete: false,
        }
    }

    pub(crate) fn finished() -> Self {
        Self {
            task_to_do: None,
            all_complete: true,
        }
    }
}

/// Task counts for one stage, as reported by `stagehand status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageSummary {
    pub unstarted: usize,
    pub started: usize,
    pub completed: usize,
}

impl StageSummary {
    pub fn total(&self) -> usize {
        self.unstarted + self.started + self.completed
    }

    pub(crate) fn record(&mut self, state: TaskState) {
        match state {
            TaskState::Unstarted => self.unstarted += 1,
            TaskState::Started => self.started += 1,
            TaskState::Completed => self.completed += 1,
        }
    }
}

/// Snapshot of overall progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleSummary {
    pub stages: Vec<StageSummary>,
    pub proportion_complete: f64,
    pub longest_duration_secs: f64,
    pub complete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn duration_zero_until_complete() {
        let mut task = IndividualTask::new("Main", 1, 0, Some(0));
        task.started = Some(ts(100));
        assert_eq!(task.duration_of_longest_complete(), Duration::zero());

        task.completed = Some(ts(145));
        task.complete = true;
        assert_eq!(task.duration_of_longest_complete(), Duration::seconds(45));
    }

    #[test]
    fn matches_ignores_progress() {
        let fresh = IndividualTask::new("Main", 1, 2, Some(1));
        let mut done = fresh.clone();
        done.started = Some(ts(1));
        done.completed = Some(ts(2));
        done.complete = true;
        assert!(fresh.matches(&done));

        assert!(!fresh.matches(&IndividualTask::new("Main", 1, 2, None)));
        assert!(!fresh.matches(&IndividualTask::new("Main", 2, 2, Some(1))));
        assert!(!fresh.matches(&IndividualTask::new("Warmup", 1, 2, Some(1))));
    }

    #[test]
    fn state_follows_stamps() {
        let mut task = IndividualTask::new("Warmup", 0, 0, None);
        assert_eq!(task.state(), TaskState::Unstarted);
        task.started = Some(ts(10));
        assert_eq!(task.state(), TaskState::Started);
        task.complete = true;
        assert_eq!(task.state(), TaskState::Completed);
    }

    #[test]
    fn display_includes_scenario_only_when_present() {
        assert_eq!(
            IndividualTask::new("Warmup", 0, 1, None).to_string(),
            "Warmup#0 rep 1"
        );
        assert_eq!(
            IndividualTask::new("Main", 1, 2, Some(0)).to_string(),
            "Main#1 rep 2 scenario 0"
        );
    }
}
