use std::collections::HashSet;
use std::path::Path;

use figment::{
    providers::{Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::{
    coordinator::TaskCoordinator,
    error::{Result, SchedulerError},
    repeated::RepeatedTask,
    stage::TaskStage,
};

/// Declarative description of a schedule, loaded from TOML:
///
/// ```toml
/// [[stages]]
/// [[stages.tasks]]
/// task_type = "Warmup"
/// id = 0
/// repetitions = 2
///
/// [[stages]]
/// [[stages.tasks]]
/// task_type = "Main"
/// id = 1
/// repetitions = 3
/// scenarios = 2
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulePlan {
    pub stages: Vec<StagePlan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePlan {
    #[serde(default)]
    pub tasks: Vec<RepeatedTaskPlan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatedTaskPlan {
    pub task_type: String,
    pub id: i64,
    pub repetitions: u32,
    /// Number of scenarios; omitted means a single unnamed scenario.
    #[serde(default)]
    pub scenarios: Option<u32>,
    #[serde(default)]
    pub avoid_redundant_execution: bool,
}

impl SchedulePlan {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(SchedulerError::InvalidPlan(format!(
                "plan file not found: {}",
                path.display()
            )));
        }
        Self::extract(Figment::new().merge(Toml::file(path)))
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        Self::extract(Figment::new().merge(Toml::string(toml)))
    }

    fn extract(figment: Figment) -> Result<Self> {
        let plan: SchedulePlan = figment
            .extract()
            .map_err(|e| SchedulerError::InvalidPlan(e.to_string()))?;
        plan.validate()?;
        Ok(plan)
    }

    /// Reject plans that would build an empty or ambiguous schedule.
    ///
    /// `(task_type, id)` must be unique across the whole plan because
    /// completion reports are matched on that pair.
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(SchedulerError::InvalidPlan("plan has no stages".into()));
        }
        let mut seen = HashSet::new();
        for (stage_index, stage) in self.stages.iter().enumerate() {
            if stage.tasks.is_empty() {
                return Err(SchedulerError::InvalidPlan(format!(
                    "stage {stage_index} has no tasks"
                )));
            }
            for task in &stage.tasks {
                if task.repetitions == 0 {
                    return Err(SchedulerError::InvalidPlan(format!(
                        "{}#{}: repetitions must be at least 1",
                        task.task_type, task.id
                    )));
                }
                if task.scenarios == Some(0) {
                    return Err(SchedulerError::InvalidPlan(format!(
                        "{}#{}: scenarios must be at least 1 when set",
                        task.task_type, task.id
                    )));
                }
                if !seen.insert((task.task_type.as_str(), task.id)) {
                    return Err(SchedulerError::InvalidPlan(format!(
                        "{}#{} declared more than once",
                        task.task_type, task.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Materialize the initial, untouched schedule.
    pub fn build(&self, min_reassign_delay_secs: u64) -> Result<TaskCoordinator> {
        self.validate()?;
        let stages = self
            .stages
            .iter()
            .map(|stage| {
                TaskStage::new(
                    stage
                        .tasks
                        .iter()
                        .map(|t| {
                            RepeatedTask::new(
                                &t.task_type,
                                t.id,
                                t.repetitions,
                                t.scenarios,
                                t.avoid_redundant_execution,
                            )
                        })
                        .collect(),
                )
            })
            .collect();
        Ok(TaskCoordinator::new(stages).with_min_reassign_delay_secs(min_reassign_delay_secs))
    }
}
