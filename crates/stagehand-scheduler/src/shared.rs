//! Load → transform → save against a [`ScheduleStore`].
//!
//! Every helper here runs as one `transact` call, so the decode, the
//! coordinator mutation and the encode happen inside the store's critical
//! section.

use tracing::{debug, info};

use crate::{
    codec,
    coordinator::TaskCoordinator,
    error::{Result, SchedulerError},
    store::ScheduleStore,
    types::{Assignment, IndividualTask},
};

/// Decode the snapshot at `key` (or build it with `initial` when absent),
/// apply `f`, and save the result. Nothing is written when `f` fails.
pub fn transform_shared<T, I, F>(
    store: &dyn ScheduleStore,
    key: &str,
    initial: I,
    f: F,
) -> Result<T>
where
    I: FnOnce() -> TaskCoordinator,
    F: FnOnce(&mut TaskCoordinator) -> Result<T>,
{
    let mut initial = Some(initial);
    let mut f = Some(f);
    let mut out = None;

    store.transact(key, &mut |current| {
        let mut coordinator = match current {
            Some(bytes) => codec::from_bytes(bytes)?,
            None => {
                debug!(%key, "no stored schedule, starting from initial");
                (initial.take().ok_or_else(rerun)?)()
            }
        };
        let transform = f.take().ok_or_else(rerun)?;
        out = Some(transform(&mut coordinator)?);
        Ok(Some(codec::to_bytes(&coordinator)?))
    })?;

    out.ok_or_else(|| SchedulerError::Storage("store skipped the transform".into()))
}

/// [`TaskCoordinator::update`] as a single shared critical section.
pub fn update_shared<I>(
    store: &dyn ScheduleStore,
    key: &str,
    initial: I,
    task_completed: Option<&IndividualTask>,
    ready_for_another_task: bool,
) -> Result<Assignment>
where
    I: FnOnce() -> TaskCoordinator,
{
    transform_shared(store, key, initial, |coordinator| {
        coordinator.update(task_completed, ready_for_another_task)
    })
}

/// Read-only snapshot, e.g. for progress reporting.
pub fn load_snapshot(store: &dyn ScheduleStore, key: &str) -> Result<Option<TaskCoordinator>> {
    store
        .load(key)?
        .map(|bytes| codec::from_bytes(&bytes))
        .transpose()
}

/// Store `coordinator` under `key`. An existing schedule is kept unless
/// `overwrite` is set. Returns whether anything was written.
pub fn initialize(
    store: &dyn ScheduleStore,
    key: &str,
    coordinator: &TaskCoordinator,
    overwrite: bool,
) -> Result<bool> {
    let mut written = false;
    store.transact(key, &mut |current| {
        if current.is_some() && !overwrite {
            return Ok(None);
        }
        written = true;
        Ok(Some(codec::to_bytes(coordinator)?))
    })?;
    if written {
        info!(%key, tasks = coordinator.individual_tasks().count(), "schedule initialized");
    }
    Ok(written)
}

fn rerun() -> SchedulerError {
    SchedulerError::Storage("store ran the transform more than once".into())
}
