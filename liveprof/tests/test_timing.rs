mod common;

use common::{assert_close, init_logging, Recorder};
use liveprof::{Profiler, ProfilerError, ProfilerEventType, StepOptions, TimingType, TransactionOptions, TransactionState};
use serde_json::json;
use std::time::Duration;

const TOLERANCE: Duration = Duration::from_millis(50);

#[test]
fn test_single_step_snapshot() {
    init_logging();
    let profiler = Profiler::default();

    let tx = profiler
        .transaction_with(
            "HTTP",
            "GET /users",
            TransactionOptions::new()
                .display_name("List users")
                .parameters(json!({ "page": 2 }))
                .correlation_id("req-1"),
        )
        .unwrap();
    let step = profiler.step("DB", "select").unwrap();
    step.success().unwrap();
    tx.success_with("ok").unwrap();

    let snapshot = tx.transaction_snapshot().unwrap();
    assert_eq!(snapshot.category, "HTTP");
    assert_eq!(snapshot.name, "GET /users");
    assert_eq!(snapshot.display_name.as_deref(), Some("List users"));
    assert_eq!(snapshot.parameters, Some(json!({ "page": 2 })));
    assert_eq!(snapshot.correlation_id.as_deref(), Some("req-1"));
    assert_eq!(snapshot.result, Some(json!("ok")));
    assert_eq!(snapshot.state, TransactionState::Success);
    assert_eq!(snapshot.steps().len(), 1);
    assert_eq!(snapshot.steps()[0].name, "select");
    assert!(snapshot.steps()[0].steps.is_none());
}

#[test]
fn test_step_failure_result() {
    let profiler = Profiler::default();
    let tx = profiler.transaction("jobs", "import").unwrap();
    let step = profiler.step("io", "read file").unwrap();
    step.failure(json!({ "error": "not found" })).unwrap();
    tx.success().unwrap();

    let snapshot = tx.transaction_snapshot().unwrap();
    let step = &snapshot.steps()[0];
    assert_eq!(step.state, TransactionState::Failure);
    assert_eq!(step.result, Some(json!({ "error": "not found" })));
    assert_eq!(snapshot.state, TransactionState::Success);
}

#[test]
fn test_finish_is_idempotent() {
    let profiler = Profiler::default();
    let tx = profiler.transaction("jobs", "once").unwrap();

    tx.failure("first").unwrap();
    tx.success_with("second").unwrap();
    tx.dispose().unwrap();
    tx.dispose().unwrap();

    let snapshot = tx.transaction_snapshot().unwrap();
    assert_eq!(snapshot.state, TransactionState::Failure);
    assert_eq!(snapshot.result, Some(json!("first")));
    assert_eq!(tx.state(), TransactionState::Failure);
}

#[test]
fn test_repeated_finish_publishes_one_event() {
    let profiler = Profiler::default();
    let recorder = Recorder::new();
    profiler.register_subscriber(recorder.clone()).unwrap();

    let tx = profiler.transaction("jobs", "once").unwrap();
    let step = profiler.step("jobs", "inner").unwrap();
    step.success().unwrap();
    step.failure("late").unwrap();
    drop(step);

    tx.failure("first").unwrap();
    tx.success_with("second").unwrap();
    tx.dispose().unwrap();
    tx.dispose().unwrap();
    drop(tx);

    profiler.unregister_subscriber(&recorder);
    assert_eq!(
        recorder.event_types(),
        [
            ProfilerEventType::TransactionStart,
            ProfilerEventType::StepStart,
            ProfilerEventType::StepFinish,
            ProfilerEventType::TransactionFinish,
        ]
    );
    let finish = recorder.events().pop().unwrap();
    assert_eq!(finish.outcome().map(|(_, ok)| ok), Some(false));
}

#[test]
fn test_unfinished_children_guard() {
    let profiler = Profiler::default();
    let tx = profiler.transaction("jobs", "parent").unwrap();
    let child = profiler.step("jobs", "child").unwrap();

    let err = tx.success().unwrap_err();
    assert!(matches!(err, ProfilerError::UnfinishedChildren { .. }));
    assert!(err.is_illegal_state());
    assert_eq!(tx.state(), TransactionState::Inflight);

    child.success().unwrap();
    tx.success().unwrap();
    assert_eq!(tx.state(), TransactionState::Success);
}

#[test]
fn test_drop_finishes_as_success() {
    let profiler = Profiler::default();
    let snapshot = {
        let tx = profiler.transaction("jobs", "scoped").unwrap();
        {
            let _step = profiler.step("jobs", "inner").unwrap();
        }
        tx.transaction_snapshot().unwrap()
    };
    assert_eq!(snapshot.steps()[0].state, TransactionState::Success);
    assert_eq!(snapshot.steps()[0].result, None);

    let recent = profiler.recent_transactions(false);
    assert_eq!(recent[0].state, TransactionState::Success);
}

#[test]
fn test_current_returns_to_parent_after_finish() {
    let profiler = Profiler::default();
    let tx = profiler.transaction("jobs", "root").unwrap();
    let a = profiler.step("jobs", "a").unwrap();
    a.success().unwrap();

    // Attaches to the transaction again, not to `a`
    let b = profiler.step("jobs", "b").unwrap();
    b.success().unwrap();
    tx.success().unwrap();

    let snapshot = tx.transaction_snapshot().unwrap();
    let names: Vec<&str> = snapshot.steps().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["a", "b"]);
    assert!(profiler.context().current_timing.is_none());
}

#[test]
fn test_timing_handle_accessors() {
    let profiler = Profiler::default();
    let tx = profiler.transaction("jobs", "root").unwrap();
    let step = profiler
        .step_with("jobs", "leaf", StepOptions::new().display_name("Leaf"))
        .unwrap();

    assert_eq!(tx.timing_type(), Some(TimingType::Transaction));
    assert_eq!(step.timing_type(), Some(TimingType::Step));
    let info = step.info().unwrap();
    assert_eq!(info.display_name.as_deref(), Some("Leaf"));
    assert_eq!(info.state, TransactionState::Inflight);

    step.success().unwrap();
    tx.success().unwrap();
}

/// T { sleep d0; A { sleep d1; B { sleep d2 }; C { sleep d3 } } }
#[test]
fn test_nested_steps_hierarchy() {
    init_logging();
    let profiler = Profiler::default();
    let [d0, d1, d2, d3] = [125, 201, 190, 90].map(Duration::from_millis);

    let tx = profiler.transaction("test", "T").unwrap();
    std::thread::sleep(d0);
    let a = profiler.step("test", "A").unwrap();
    std::thread::sleep(d1);
    {
        let b = profiler.step("test", "B").unwrap();
        std::thread::sleep(d2);
        b.success().unwrap();
    }
    {
        let c = profiler.step("test", "C").unwrap();
        std::thread::sleep(d3);
        c.success().unwrap();
    }
    a.success().unwrap();
    tx.success().unwrap();

    let snapshot = tx.transaction_snapshot().unwrap();
    assert_close(snapshot.duration, d0 + d1 + d2 + d3, TOLERANCE, "T duration");
    assert_close(snapshot.own_duration, d0, TOLERANCE, "T own duration");
    assert_eq!(snapshot.steps().len(), 1);

    let a = &snapshot.steps()[0];
    assert_eq!(a.name, "A");
    assert_close(a.relative_start, d0, TOLERANCE, "A start");
    assert_close(a.duration, d1 + d2 + d3, TOLERANCE, "A duration");
    assert_close(a.own_duration, d1, TOLERANCE, "A own duration");
    assert_eq!(a.steps().len(), 2);

    let (b, c) = (&a.steps()[0], &a.steps()[1]);
    assert_eq!((b.name.as_str(), c.name.as_str()), ("B", "C"));
    assert_close(b.relative_start, d0 + d1, TOLERANCE, "B start");
    assert_close(b.duration, d2, TOLERANCE, "B duration");
    assert_close(c.relative_start, d0 + d1 + d2, TOLERANCE, "C start");
    assert_close(c.duration, d3, TOLERANCE, "C duration");
    assert!(b.steps.is_none() && c.steps.is_none());
}

#[tokio::test]
async fn test_nested_async_steps_hierarchy() {
    let profiler = Profiler::default();
    let [d0, d1, d2] = [60, 80, 40].map(Duration::from_millis);

    let tx = profiler.transaction("test", "T").unwrap();
    tokio::time::sleep(d0).await;
    let a = profiler.step("test", "A").unwrap();
    tokio::time::sleep(d1).await;
    let b = profiler.step("test", "B").unwrap();
    tokio::time::sleep(d2).await;
    b.success().unwrap();
    a.success().unwrap();
    tx.success().unwrap();

    let snapshot = tx.transaction_snapshot().unwrap();
    let a = &snapshot.steps()[0];
    let b = &a.steps()[0];
    assert_close(a.relative_start, d0, TOLERANCE, "A start");
    assert_close(b.relative_start, d0 + d1, TOLERANCE, "B start");
    assert_close(snapshot.duration, d0 + d1 + d2, TOLERANCE, "T duration");
}

#[test]
fn test_snapshot_serializes_camel_case() {
    let profiler = Profiler::default();
    let tx = profiler
        .transaction_with("HTTP", "GET /", TransactionOptions::new().correlation_id("c-1"))
        .unwrap();
    profiler.step("DB", "q").unwrap().success().unwrap();
    tx.success().unwrap();

    let value = serde_json::to_value(tx.transaction_snapshot().unwrap()).unwrap();
    assert_eq!(value["correlationId"], "c-1");
    assert_eq!(value["state"], "success");
    assert!(value["ownDuration"].is_f64());
    assert!(value["steps"][0]["relativeStart"].is_f64());
    assert!(value.get("displayName").is_none());
    assert!(value.get("parameters").is_none());
}
