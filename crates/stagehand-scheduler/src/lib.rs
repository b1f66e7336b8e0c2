//! `stagehand-scheduler` — staged, pull-based task scheduler.
//!
//! # Overview
//!
//! A [`TaskCoordinator`] owns an ordered list of [`TaskStage`]s; each stage
//! owns an ordered list of [`RepeatedTask`]s; each repeated task owns the
//! fixed cross product of repetitions × scenarios as [`IndividualTask`]s.
//!
//! Workers pull work through [`TaskCoordinator::update`], which records the
//! task they just finished and hands out the next one. Stage *k + 1* is never
//! offered while stage *k* has incomplete work, and within a stage repeated
//! tasks are worked in list order.
//!
//! The coordinator itself does no locking. Workers in separate processes
//! share it through a [`ScheduleStore`] and the helpers in [`shared`], which
//! run decode → update → encode as one store transaction.
//!
//! # Re-issue policy
//!
//! | Situation                                  | Next `update` hands out          |
//! |--------------------------------------------|----------------------------------|
//! | Unstarted tasks remain in the batch        | First unstarted, in array order  |
//! | Only started-but-incomplete tasks remain   | Oldest `started`                 |
//! | ...and the batch avoids redundant runs     | Nothing (`all_complete = false`) |
//! | Every stage complete                       | Nothing (`all_complete = true`)  |

pub mod codec;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod plan;
pub mod repeated;
pub mod shared;
pub mod stage;
pub mod store;
pub mod types;

pub use coordinator::TaskCoordinator;
pub use error::{Result, SchedulerError};
pub use plan::SchedulePlan;
pub use repeated::RepeatedTask;
pub use stage::TaskStage;
pub use store::{MemoryStore, ScheduleStore, SqliteStore};
pub use types::{Assignment, IndividualTask, ScheduleSummary, StageSummary, TaskState};
