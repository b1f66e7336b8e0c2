use serde::{Deserialize, Serialize};

use crate::repeated::RepeatedTask;

/// An ordered phase of work. Its repeated tasks are worked in list order.
///
/// ```compile_fail
/// let mut stage = stagehand_scheduler::TaskStage::default();
/// stage.repeated_tasks.clear();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskStage {
    repeated_tasks: Vec<RepeatedTask>,
}

impl TaskStage {
    pub fn new(repeated_tasks: Vec<RepeatedTask>) -> Self {
        Self { repeated_tasks }
    }

    pub fn repeated_tasks(&self) -> &[RepeatedTask] {
        &self.repeated_tasks
    }

    pub(crate) fn repeated_tasks_mut(&mut self) -> &mut [RepeatedTask] {
        &mut self.repeated_tasks
    }

    pub fn complete(&self) -> bool {
        self.repeated_tasks.iter().all(RepeatedTask::complete)
    }

    /// First repeated task, in declaration order, that still has work.
    pub fn incomplete_repeated_task(&self) -> Option<&RepeatedTask> {
        self.repeated_tasks.iter().find(|r| !r.complete())
    }

    pub(crate) fn incomplete_repeated_task_mut(&mut self) -> Option<&mut RepeatedTask> {
        self.repeated_tasks.iter_mut().find(|r| !r.complete())
    }
}
