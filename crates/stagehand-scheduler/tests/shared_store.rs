// Several worker processes sharing one SQLite schedule, modelled as threads
// with independent connections.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use stagehand_core::config::StoreConfig;
use stagehand_scheduler::{
    codec,
    shared::{initialize, load_snapshot, update_shared},
    ScheduleStore, SchedulePlan, SqliteStore, TaskCoordinator,
};

const PLAN: &str = r#"
    [[stages]]
    [[stages.tasks]]
    task_type = "Warmup"
    id = 0
    repetitions = 4

    [[stages]]
    [[stages.tasks]]
    task_type = "Main"
    id = 1
    repetitions = 5
    scenarios = 3

    [[stages]]
    [[stages.tasks]]
    task_type = "Report"
    id = 2
    repetitions = 2
    avoid_redundant_execution = true
"#;

fn plan() -> TaskCoordinator {
    SchedulePlan::from_toml_str(PLAN).unwrap().build(0).unwrap()
}

#[test]
fn concurrent_workers_drain_shared_schedule() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        path: dir.path().join("stagehand.db").to_string_lossy().into_owned(),
        ..StoreConfig::default()
    };
    let seed = SqliteStore::open(&config).unwrap();
    assert!(initialize(&seed, "sched", &plan(), false).unwrap());

    let config = Arc::new(config);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let config = Arc::clone(&config);
            thread::spawn(move || {
                let store = SqliteStore::open(&config).unwrap();
                let mut executed = Vec::new();
                let mut last = None;
                for _ in 0..10_000 {
                    let assignment =
                        update_shared(&store, "sched", plan, last.as_ref(), true).unwrap();
                    if assignment.all_complete {
                        return executed;
                    }
                    if let Some(task) = &assignment.task_to_do {
                        executed.push(task.to_string());
                    } else {
                        thread::yield_now();
                    }
                    last = assignment.task_to_do;
                }
                panic!("worker never saw the schedule complete");
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        seen.extend(handle.join().unwrap());
    }

    let finished = load_snapshot(&seed, "sched").unwrap().unwrap();
    assert!(finished.complete());
    assert_eq!(seen.len(), finished.individual_tasks().count());
    assert!(finished
        .individual_tasks()
        .all(|t| t.started.is_some() && t.completed.is_some()));
}

#[test]
fn snapshot_round_trips_through_store() {
    let store = SqliteStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap();
    let first = update_shared(&store, "k", plan, None, true)
        .unwrap()
        .task_to_do
        .unwrap();
    update_shared(&store, "k", plan, Some(&first), true).unwrap();

    let bytes = store.load("k").unwrap().unwrap();
    let decoded = codec::from_bytes(&bytes).unwrap();
    assert_eq!(codec::to_bytes(&decoded).unwrap(), bytes);
    assert_eq!(load_snapshot(&store, "k").unwrap().unwrap(), decoded);
    assert_eq!(decoded.summary().stages[0].completed, 1);
    assert_eq!(decoded.summary().stages[0].started, 1);
}
