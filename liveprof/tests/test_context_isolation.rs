mod common;

use common::init_logging;
use liveprof::{context, Profiler, TransactionSnapshot, TransactionState};
use std::time::Duration;

const STEPS: usize = 100;
const THREADS_PER_TX: usize = 10;

fn transaction_count() -> usize {
    2 * std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get)
}

fn step_name(tx: usize, step: usize) -> String {
    format!("tx{tx}-step{step}")
}

/// Transaction whose steps run as concurrent tokio tasks
async fn run_on_tasks(profiler: Profiler, tx_index: usize) -> TransactionSnapshot {
    let tx = profiler.transaction("isolation", &format!("tx{tx_index}")).unwrap();

    let children: Vec<_> = (0..STEPS)
        .map(|s| {
            let profiler = profiler.clone();
            context::spawn(async move {
                let step = profiler.step("isolation", &step_name(tx_index, s)).unwrap();
                tokio::time::sleep(Duration::from_millis((s % 3) as u64)).await;
                step.success().unwrap();
            })
        })
        .collect();
    for child in children {
        child.await.unwrap();
    }

    tx.success().unwrap();
    tx.transaction_snapshot().unwrap()
}

/// Transaction whose steps run on OS threads, several steps per thread
fn run_on_threads(profiler: &Profiler, tx_index: usize) -> TransactionSnapshot {
    let tx = profiler.transaction("isolation", &format!("tx{tx_index}")).unwrap();

    let children: Vec<_> = (0..THREADS_PER_TX)
        .map(|t| {
            let profiler = profiler.clone();
            context::spawn_thread(move || {
                for s in (t..STEPS).step_by(THREADS_PER_TX) {
                    let step = profiler.step("isolation", &step_name(tx_index, s)).unwrap();
                    std::thread::sleep(Duration::from_millis((s % 2) as u64));
                    step.success().unwrap();
                }
                // Every step restored the inherited transaction as current
                assert!(context::has_current());
            })
        })
        .collect();
    for child in children {
        child.join().unwrap();
    }

    tx.success().unwrap();
    tx.transaction_snapshot().unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transactions_stay_isolated() {
    init_logging();
    let profiler = Profiler::default();
    let count = transaction_count();

    let mut tasks = Vec::new();
    let mut threads = Vec::new();
    for i in 0..count {
        if i % 2 == 0 {
            tasks.push((i, context::spawn(run_on_tasks(profiler.clone(), i))));
        } else {
            let profiler = profiler.clone();
            threads.push((i, context::spawn_thread(move || run_on_threads(&profiler, i))));
        }
    }

    let mut snapshots = Vec::new();
    for (i, task) in tasks {
        snapshots.push((i, task.await.unwrap()));
    }
    for (i, thread) in threads {
        let snapshot = tokio::task::spawn_blocking(move || thread.join().unwrap()).await.unwrap();
        snapshots.push((i, snapshot));
    }
    assert_eq!(snapshots.len(), count);

    for (i, snapshot) in snapshots {
        assert_eq!(snapshot.name, format!("tx{i}"));
        assert_eq!(snapshot.state, TransactionState::Success);
        assert_eq!(snapshot.steps().len(), STEPS, "tx{i} has foreign or missing steps");

        let mut names: Vec<String> = snapshot.steps().iter().map(|s| s.name.clone()).collect();
        names.sort();
        let mut expected: Vec<String> = (0..STEPS).map(|s| step_name(i, s)).collect();
        expected.sort();
        assert_eq!(names, expected);
        assert!(snapshot.steps().iter().all(|s| s.steps.is_none()));
    }

    // The test's own context never saw any of it
    assert!(!context::has_current());
    assert!(profiler.recent_transactions(true).is_empty());
}

#[tokio::test]
async fn test_child_task_does_not_leak_into_parent() {
    let profiler = Profiler::default();
    let tx = profiler.transaction("isolation", "parent").unwrap();
    let parent_id = tx.id();

    let child = context::spawn({
        let profiler = profiler.clone();
        async move {
            let step = profiler.step("isolation", "child").unwrap();
            let inside = profiler.context().current_timing.map(|t| t.id);
            step.success().unwrap();
            (step.id(), inside)
        }
    });
    let (step_id, seen_inside) = child.await.unwrap();
    assert_eq!(seen_inside, step_id);

    // Parent still points at its transaction
    let current = profiler.context().current_timing.unwrap();
    assert_eq!(Some(current.id), parent_id);
    tx.success().unwrap();
}

#[test]
fn test_plain_thread_starts_without_context() {
    let profiler = Profiler::default();
    let tx = profiler.transaction("isolation", "outer").unwrap();

    let orphan = std::thread::spawn({
        let profiler = profiler.clone();
        move || profiler.step("isolation", "orphan").unwrap().is_inert()
    });
    assert!(orphan.join().unwrap());

    let adopted = context::spawn_thread({
        let profiler = profiler.clone();
        move || {
            let step = profiler.step("isolation", "adopted").unwrap();
            let inert = step.is_inert();
            step.success().unwrap();
            inert
        }
    });
    assert!(!adopted.join().unwrap());

    tx.success().unwrap();
    let names: Vec<String> = tx.transaction_snapshot().unwrap().steps().iter().map(|s| s.name.clone()).collect();
    assert_eq!(names, ["adopted"]);
}

#[test]
fn test_fork_run_on_detached_thread() {
    let profiler = Profiler::default();
    let tx = profiler.transaction("isolation", "forked").unwrap();
    let snapshot = context::fork();
    assert!(!snapshot.is_empty());

    let handle = std::thread::spawn({
        let profiler = profiler.clone();
        move || {
            snapshot.run(|| profiler.step("isolation", "inside run").unwrap().success().unwrap());
            // Outside the scope the thread has its own, empty slot again
            context::has_current()
        }
    });
    assert!(!handle.join().unwrap());

    tx.success().unwrap();
    assert_eq!(tx.transaction_snapshot().unwrap().steps().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_bare_tasks_on_one_worker_stay_isolated() {
    let profiler = Profiler::default();
    let (started_tx, started_rx) = tokio::sync::oneshot::channel();
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();

    let task_a = tokio::spawn({
        let profiler = profiler.clone();
        async move {
            let tx = profiler.transaction("isolation", "task-a").unwrap();
            started_tx.send(()).unwrap();
            // Suspended while task B runs on the same worker
            done_rx.await.unwrap();
            tx.success().unwrap();
            tx.transaction_snapshot().unwrap()
        }
    });

    let task_b = tokio::spawn({
        let profiler = profiler.clone();
        async move {
            started_rx.await.unwrap();
            let step = profiler.step("isolation", "task-b-step").unwrap();
            let step_inert = step.is_inert();
            step.success().unwrap();

            let tx = profiler.transaction("isolation", "task-b").map(|tx| tx.is_inert());
            done_tx.send(()).unwrap();
            (step_inert, tx)
        }
    });

    let (step_inert, task_b_tx) = task_b.await.unwrap();
    assert!(step_inert);
    assert!(matches!(task_b_tx, Ok(false)), "task B's transaction was rejected: {task_b_tx:?}");

    let snapshot = task_a.await.unwrap();
    assert!(snapshot.steps().is_empty());

    let mut names: Vec<String> = profiler.recent_transactions(false).iter().map(|t| t.name.clone()).collect();
    names.sort();
    assert_eq!(names, ["task-a", "task-b"]);
}
