use serde::{Deserialize, Serialize};

use crate::types::IndividualTask;

/// A named batch of individual tasks, one per repetition × scenario.
///
/// The task array is materialized once in [`RepeatedTask::new`] and never
/// grows or shrinks afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatedTask {
    pub task_type: String,
    pub id: i64,
    /// A started task in this batch is never handed to a second worker.
    pub avoid_redundant_execution: bool,
    individual_tasks: Vec<IndividualTask>,
}

impl RepeatedTask {
    /// Build the batch. Tasks are laid out scenario-major: every repetition of
    /// scenario 0, then every repetition of scenario 1, and so on. Without
    /// scenarios there is a single `None` scenario.
    pub fn new(
        task_type: &str,
        id: i64,
        repetitions: u32,
        scenarios: Option<u32>,
        avoid_redundant_execution: bool,
    ) -> Self {
        let scenario_indices: Vec<Option<u32>> = match scenarios {
            Some(n) => (0..n).map(Some).collect(),
            None => vec![None],
        };
        let individual_tasks = scenario_indices
            .into_iter()
            .flat_map(|scenario| {
                (0..repetitions).map(move |rep| IndividualTask::new(task_type, id, rep, scenario))
            })
            .collect();
        Self {
            task_type: task_type.to_string(),
            id,
            avoid_redundant_execution,
            individual_tasks,
        }
    }

    pub fn individual_tasks(&self) -> &[IndividualTask] {
        &self.individual_tasks
    }

    pub fn all_started(&self) -> bool {
        self.individual_tasks.iter().all(|t| t.started.is_some())
    }

    pub fn complete(&self) -> bool {
        self.individual_tasks.iter().all(|t| t.complete)
    }

    /// `(completed, total)` task counts.
    pub fn progress(&self) -> (usize, usize) {
        let done = self.individual_tasks.iter().filter(|t| t.complete).count();
        (done, self.individual_tasks.len())
    }

    /// Next task worth handing out: a never-started task if one remains,
    /// otherwise the incomplete task whose `started` is oldest. Ties keep
    /// array order. `None` once every task is complete.
    pub fn first_incomplete(&self) -> Option<&IndividualTask> {
        self.first_incomplete_index()
            .map(|i| &self.individual_tasks[i])
    }

    pub(crate) fn first_incomplete_mut(&mut self) -> Option<&mut IndividualTask> {
        self.first_incomplete_index()
            .map(move |i| &mut self.individual_tasks[i])
    }

    /// Look up a task by its position in the cross product.
    pub fn find(&self, repetition: u32, scenario_index: Option<u32>) -> Option<&IndividualTask> {
        self.individual_tasks
            .iter()
            .find(|t| t.repetition == repetition && t.scenario_index == scenario_index)
    }

    pub(crate) fn find_mut(
        &mut self,
        repetition: u32,
        scenario_index: Option<u32>,
    ) -> Option<&mut IndividualTask> {
        self.individual_tasks
            .iter_mut()
            .find(|t| t.repetition == repetition && t.scenario_index == scenario_index)
    }

    fn first_incomplete_index(&self) -> Option<usize> {
        // `None < Some(_)`, so unstarted tasks sort first and started ones
        // follow oldest-first; the index breaks ties.
        self.individual_tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.complete)
            .min_by_key(|(i, t)| (t.started, *i))
            .map(|(i, _)| i)
    }
}
