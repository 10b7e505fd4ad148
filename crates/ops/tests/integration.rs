//! Integration tests for the staged operation registry

use stagehand_backoff::BackoffPolicy;
use stagehand_config::OrchestratorConfig;
use stagehand_errors::{Error, FailureKind, OperationError};
use stagehand_events::{channel, AppEvent, EventReceiver, OperationEvent, ProgressEvent};
use stagehand_ops::{OperationRegistry, Step, StepResult};
use stagehand_types::{OperationKey, OperationState};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

fn registry() -> (OperationRegistry, EventReceiver) {
    let (tx, rx) = channel();
    (OperationRegistry::new(OrchestratorConfig::default(), tx), rx)
}

fn registry_with_limit(max_concurrent: usize) -> (OperationRegistry, EventReceiver) {
    let (tx, rx) = channel();
    let mut config = OrchestratorConfig::default();
    config.limits.max_concurrent_operations = max_concurrent;
    (OperationRegistry::new(config, tx), rx)
}

fn fast_policy(max_attempts: u32) -> BackoffPolicy {
    BackoffPolicy {
        initial_delay: Duration::from_millis(10),
        multiplier: 2.0,
        jitter_factor: 0.0,
        max_delay: Duration::from_millis(100),
        max_attempts,
    }
}

/// A step that parks until the operation is cancelled or times out.
fn parked_step() -> Step {
    Step::new("parked", |_cx| async move {
        std::future::pending::<()>().await;
        StepResult::Done
    })
}

fn drain(rx: &mut EventReceiver) -> Vec<AppEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn duplicate_key_is_rejected_until_terminal() {
    let (registry, _rx) = registry();
    let key = OperationKey::from("device:1");

    let handle = registry.start(key.clone(), vec![parked_step()]).unwrap();

    let second = registry.start(key.clone(), vec![parked_step()]);
    assert!(matches!(
        second,
        Err(Error::Operation(OperationError::AlreadyRunning { .. }))
    ));

    // A different key is unaffected
    let other = registry
        .start("device:2", vec![Step::new("noop", |_cx| async { StepResult::Done })])
        .unwrap();
    assert_eq!(other.wait().await.unwrap().state, OperationState::Success);

    // Once the first operation reaches terminal, the key is free again
    assert!(handle.cancel());
    assert!(registry.query(&key).is_none());
    registry.start(key, vec![parked_step()]).unwrap();
}

#[tokio::test]
async fn empty_step_list_is_rejected() {
    let (registry, _rx) = registry();
    let result = registry.start("empty", Vec::new());
    assert!(matches!(
        result,
        Err(Error::Operation(OperationError::EmptyOperation))
    ));
}

#[tokio::test]
async fn steps_run_sequentially_to_success() {
    let (registry, mut rx) = registry();
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let mut steps = Vec::new();
    for name in ["fetch", "verify", "install"] {
        let order = Arc::clone(&order);
        steps.push(Step::new(name, move |_cx| {
            let order = Arc::clone(&order);
            async move {
                order.lock().unwrap().push(name);
                StepResult::Continue
            }
        }));
    }

    let status = registry
        .start("pkg:jq", steps)
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(status.state, OperationState::Success);
    assert!(status.error.is_none());
    assert_eq!(*order.lock().unwrap(), vec!["fetch", "verify", "install"]);

    let events = drain(&mut rx);
    let step_starts: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            AppEvent::Operation(OperationEvent::StepStarted { step, .. }) => Some(step.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(step_starts, vec!["fetch", "verify", "install"]);
    assert!(events.iter().any(|event| matches!(
        event,
        AppEvent::Operation(OperationEvent::Completed { .. })
    )));
}

#[tokio::test]
async fn done_skips_remaining_steps() {
    let (registry, _rx) = registry();
    let ran_later = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran_later);

    let steps = vec![
        Step::new("first", |_cx| async { StepResult::Done }),
        Step::new("second", move |_cx| {
            let flag = Arc::clone(&flag);
            async move {
                flag.store(true, Ordering::SeqCst);
                StepResult::Continue
            }
        }),
    ];

    let status = registry
        .start("short-circuit", steps)
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(status.state, OperationState::Success);
    assert!(!ran_later.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn transient_failures_retry_until_success() {
    let (registry, mut rx) = registry();
    let calls = Arc::new(AtomicU32::new(0));
    let step_calls = Arc::clone(&calls);

    // Fails twice, succeeds on the third try: exactly max_attempts - 1
    // retries for max_attempts = 3.
    let flaky = Step::new("upload", move |_cx| {
        let calls = Arc::clone(&step_calls);
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                StepResult::retry("server unreachable")
            } else {
                StepResult::Continue
            }
        }
    });

    let status = registry
        .start_with_policy("key:rotate", vec![flaky], fast_policy(3))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(status.state, OperationState::Success);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let retries = drain(&mut rx)
        .iter()
        .filter(|event| {
            matches!(
                event,
                AppEvent::Operation(OperationEvent::StepRetrying { .. })
            )
        })
        .count();
    assert_eq!(retries, 2);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_the_operation() {
    let (registry, _rx) = registry();
    let calls = Arc::new(AtomicU32::new(0));
    let step_calls = Arc::clone(&calls);

    let always_flaky = Step::new("upload", move |_cx| {
        let calls = Arc::clone(&step_calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            StepResult::retry("server unreachable")
        }
    });

    let status = registry
        .start_with_policy("key:rotate", vec![always_flaky], fast_policy(3))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(status.state, OperationState::Error);
    assert_eq!(status.error, Some(FailureKind::Transient));
    // The step is invoked at most max_attempts times
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn fatal_failure_stops_the_pipeline() {
    let (registry, _rx) = registry();
    let ran_later = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran_later);

    let steps = vec![
        Step::new("validate", |_cx| async {
            StepResult::Fail(stagehand_errors::StepError::fatal("corrupt archive").into())
        }),
        Step::new("extract", move |_cx| {
            let flag = Arc::clone(&flag);
            async move {
                flag.store(true, Ordering::SeqCst);
                StepResult::Continue
            }
        }),
    ];

    let status = registry
        .start("pkg:broken", steps)
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(status.state, OperationState::Error);
    assert_eq!(status.error, Some(FailureKind::Fatal));
    assert!(!ran_later.load(Ordering::SeqCst));
}

#[tokio::test]
async fn failed_precondition_reports_zero_bytes() {
    let (registry, _rx) = registry();

    let steps = vec![
        Step::new("compute-size", |cx| async move {
            cx.progress().set_total(4096);
            StepResult::Continue
        }),
        Step::new("check-space", |_cx| async {
            StepResult::Fail(
                stagehand_errors::StepError::precondition("insufficient disk space").into(),
            )
        }),
        Step::new("copy", |cx| async move {
            cx.progress().add_bytes(4096);
            StepResult::Done
        }),
    ];

    let status = registry
        .start("file:A", steps)
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(status.state, OperationState::Error);
    assert_eq!(status.error, Some(FailureKind::PreconditionFailed));
    assert_eq!(status.bytes_done, 0);
    assert_eq!(status.bytes_total, Some(4096));
}

#[tokio::test]
async fn cancel_mid_step_is_terminal_and_silent_afterwards() {
    let (registry, mut rx) = registry();
    let key = OperationKey::from("file:big");

    let handle = registry.start(key.clone(), vec![parked_step()]).unwrap();

    // Let the operation start executing its step
    tokio::task::yield_now().await;
    assert!(registry.cancel(&key));

    let status = handle.wait().await.unwrap();
    assert_eq!(status.state, OperationState::Cancelled);
    assert_eq!(status.error, Some(FailureKind::Cancelled));

    // Key released synchronously; repeated cancel is a no-op
    assert!(registry.query(&key).is_none());
    assert!(!registry.cancel(&key));

    // Give the run task time to observe cancellation and unwind
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    let events = drain(&mut rx);
    let terminal_count = events
        .iter()
        .filter(|event| {
            matches!(event, AppEvent::Operation(op) if op.is_terminal())
        })
        .count();
    assert_eq!(terminal_count, 1);

    // Nothing trickles in afterwards
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn step_timeout_fails_the_operation() {
    let (registry, _rx) = registry();

    // Default step timeout is 60s; the paused clock auto-advances past it.
    let status = registry
        .start("slow", vec![parked_step()])
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(status.state, OperationState::Error);
    assert_eq!(status.error, Some(FailureKind::Timeout));
}

#[tokio::test(start_paused = true)]
async fn excess_operations_stay_queued() {
    let (registry, _rx) = registry_with_limit(1);
    let gate = Arc::new(Notify::new());

    let step_gate = Arc::clone(&gate);
    let blocking = Step::new("hold", move |_cx| {
        let gate = Arc::clone(&step_gate);
        async move {
            gate.notified().await;
            StepResult::Done
        }
    });

    let first = registry.start("op:a", vec![blocking]).unwrap();
    let second = registry
        .start("op:b", vec![Step::new("noop", |_cx| async { StepResult::Done })])
        .unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(first.status().state, OperationState::InProgress);
    assert_eq!(second.status().state, OperationState::Queued);
    assert_eq!(registry.active(), 2);

    gate.notify_one();
    assert_eq!(first.wait().await.unwrap().state, OperationState::Success);
    assert_eq!(second.wait().await.unwrap().state, OperationState::Success);
    assert_eq!(registry.active(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_while_queued_releases_nothing_it_does_not_own() {
    let (registry, _rx) = registry_with_limit(1);
    let gate = Arc::new(Notify::new());

    let step_gate = Arc::clone(&gate);
    let blocking = Step::new("hold", move |_cx| {
        let gate = Arc::clone(&step_gate);
        async move {
            gate.notified().await;
            StepResult::Done
        }
    });

    let first = registry.start("op:a", vec![blocking]).unwrap();
    let second = registry.start("op:b", vec![parked_step()]).unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(second.status().state, OperationState::Queued);

    // Cancelling the queued operation must not disturb the running one
    assert!(second.cancel());
    assert_eq!(first.status().state, OperationState::InProgress);

    gate.notify_one();
    assert_eq!(first.wait().await.unwrap().state, OperationState::Success);
}

#[tokio::test]
async fn handle_cancel_is_scoped_to_its_instance() {
    let (registry, _rx) = registry();
    let key = OperationKey::from("device:1");

    let first = registry.start(key.clone(), vec![parked_step()]).unwrap();
    assert!(first.cancel());

    // Same key, new instance: the stale handle cannot touch it
    let _second = registry.start(key.clone(), vec![parked_step()]).unwrap();
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    assert!(!first.cancel());
    assert_eq!(
        registry.query(&key).unwrap().state,
        OperationState::InProgress
    );
}

#[tokio::test]
async fn progress_updates_are_monotonic_across_steps() {
    let (registry, mut rx) = registry();

    let steps = vec![
        Step::new("compute-size", |cx| async move {
            cx.progress().set_total(300);
            StepResult::Continue
        }),
        Step::new("copy-1", |cx| async move {
            cx.progress().add_bytes(100);
            StepResult::Continue
        }),
        Step::new("copy-2", |cx| async move {
            cx.progress().add_bytes(200);
            StepResult::Continue
        }),
    ];

    let status = registry
        .start("file:A", steps)
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(status.state, OperationState::Success);
    assert_eq!(status.bytes_done, 300);

    let mut last = 0;
    for event in drain(&mut rx) {
        if let AppEvent::Progress(ProgressEvent::Updated { bytes_done, .. }) = event {
            assert!(bytes_done >= last, "bytes_done regressed: {bytes_done} < {last}");
            last = bytes_done;
        }
    }
    assert_eq!(last, 300);
}

#[tokio::test]
async fn shutdown_cancels_everything_and_refuses_new_starts() {
    let (registry, _rx) = registry();

    let a = registry.start("op:a", vec![parked_step()]).unwrap();
    let b = registry.start("op:b", vec![parked_step()]).unwrap();
    tokio::task::yield_now().await;

    registry.shutdown();

    assert_eq!(a.wait().await.unwrap().state, OperationState::Cancelled);
    assert_eq!(b.wait().await.unwrap().state, OperationState::Cancelled);
    assert_eq!(registry.active(), 0);

    let result = registry.start("op:c", vec![parked_step()]);
    assert!(matches!(
        result,
        Err(Error::Operation(OperationError::Shutdown))
    ));
}

#[tokio::test]
async fn steps_observe_cancellation_cooperatively() {
    let (registry, _rx) = registry();
    let key = OperationKey::from("cooperative");

    // A step that does its own select on the cancellation view
    let step = Step::new("watch", |cx| async move {
        cx.cancelled().await;
        StepResult::Fail(Error::Cancelled)
    });

    let handle = registry.start(key.clone(), vec![step]).unwrap();
    tokio::task::yield_now().await;

    assert!(handle.cancel());
    let status = handle.wait().await.unwrap();
    assert_eq!(status.state, OperationState::Cancelled);
}
