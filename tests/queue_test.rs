//! Integration tests for the job queue and single-flight gate.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use bytes::Bytes;
use common::{
    copy_request, wait_until, RunBehavior, ScriptedBuilder, ScriptedEngine, TestHarness,
};
use tokio::sync::Semaphore;
use tokio_test::{assert_err, assert_ok};
use transforge::config::Config;
use transforge::transcode::CancelOutcome;
use transforge_common::{EventPayload, JobId, JobState, TranscodeError};

fn completed_order(h: &TestHarness) -> Vec<JobId> {
    let mut ids: Vec<JobId> = h
        .events
        .recent_events(100)
        .into_iter()
        .filter_map(|e| match e.payload {
            EventPayload::JobCompleted { job_id, .. } => Some(job_id),
            _ => None,
        })
        .collect();
    ids.reverse();
    ids
}

// ---------------------------------------------------------------------------
// Ordering and exclusivity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_submissions_run_in_order_without_overlap() {
    let h = TestHarness::new(ScriptedEngine::new().with_delay(Duration::from_millis(10)));

    let payloads: [&'static [u8]; 5] = [b"one", b"two", b"three", b"four", b"five"];
    let tickets: Vec<_> = payloads
        .iter()
        .enumerate()
        .map(|(i, bytes)| h.queue.submit(copy_request(&format!("job{i}"), bytes)))
        .collect();
    let ids: Vec<JobId> = tickets.iter().map(|t| t.id()).collect();

    let results = futures::future::join_all(tickets.into_iter().map(|t| t.wait())).await;
    for (i, result) in results.into_iter().enumerate() {
        let artifact = result.unwrap();
        assert_eq!(artifact.name, format!("job{i}.out"));
        assert_eq!(artifact.bytes, Bytes::from_static(payloads[i]));
    }

    assert_eq!(h.engine.run_count(), 5);
    assert_eq!(h.engine.max_active(), 1);
    assert_eq!(completed_order(&h), ids);

    // Inputs were staged in submission order.
    let staged: Vec<String> = h.engine.runs().iter().map(|r| r[0].clone()).collect();
    let mut sorted = staged.clone();
    sorted.sort_by_key(|p| {
        p.trim_start_matches("in_")
            .trim_end_matches(".txt")
            .parse::<u64>()
            .unwrap()
    });
    assert_eq!(staged, sorted);
}

#[tokio::test]
async fn gate_is_released_after_failure() {
    let h = TestHarness::new(ScriptedEngine::new());

    // The prepass names no existing entry, so the copy engine fails it.
    let failing = copy_request("bad", b"bad").with_prepass(["absent", "SCRATCH.bin"]);
    let first = h.queue.submit(failing);
    let second = h.queue.submit(copy_request("good", b"good"));

    assert_matches!(first.wait().await, Err(TranscodeError::TranscodeFailure { .. }));
    assert_eq!(second.wait().await.unwrap().bytes, Bytes::from_static(b"good"));
    assert!(h.engine.entries().is_empty());
}

// ---------------------------------------------------------------------------
// Failure translation and cleanup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn engine_failure_carries_diagnostic_and_cleans_up() {
    let h = TestHarness::new(ScriptedEngine::new().with_behavior(RunBehavior::Fail {
        exit_code: 1,
        diagnostic: "unsupported codec".to_string(),
    }));

    let ticket = h.queue.submit(copy_request("a", b"hello"));
    let id = ticket.id();
    let err = ticket.wait().await.unwrap_err();
    assert_matches!(&err, TranscodeError::TranscodeFailure { diagnostic } if diagnostic.contains("unsupported codec"));

    assert!(h.engine.entries().is_empty());
    assert_eq!(h.engine.writes(), 1);
    assert_eq!(h.engine.deletes(), 2);
    assert_eq!(h.queue.executor().staging().stats().outstanding(), 0);
    assert_eq!(h.queue.status(id), Some(JobState::Failed));
}

#[tokio::test]
async fn engine_fault_is_a_transcode_failure() {
    let h = TestHarness::new(
        ScriptedEngine::new().with_behavior(RunBehavior::Fault("crashed".to_string())),
    );

    let err = h.queue.submit(copy_request("a", b"x")).wait().await.unwrap_err();
    assert_matches!(&err, TranscodeError::TranscodeFailure { diagnostic } if diagnostic.contains("crashed"));
    assert!(h.engine.entries().is_empty());
}

#[tokio::test]
async fn empty_output_is_a_transcode_failure() {
    let h = TestHarness::new(ScriptedEngine::new().with_behavior(RunBehavior::EmptyOutput));

    let err = h.queue.submit(copy_request("a", b"x")).wait().await.unwrap_err();
    assert_matches!(err, TranscodeError::TranscodeFailure { .. });
    assert!(h.engine.entries().is_empty());
}

#[tokio::test]
async fn missing_output_is_a_staging_read_error() {
    let h = TestHarness::new(ScriptedEngine::new().with_behavior(RunBehavior::NoOutput));

    let err = h.queue.submit(copy_request("a", b"x")).wait().await.unwrap_err();
    assert_matches!(err, TranscodeError::StagingRead { .. });
    assert_eq!(err.kind().as_str(), "staging_read_error");
    assert!(h.engine.entries().is_empty());
}

#[tokio::test]
async fn invalid_request_never_reaches_engine() {
    let h = TestHarness::new(ScriptedEngine::new());

    let empty = transforge::transcode::TranscodeRequest::new(
        Bytes::new(),
        "a.txt",
        "a.out",
        ["INPUT", "OUTPUT"],
    );
    let err = h.queue.submit(empty).wait().await.unwrap_err();
    assert_matches!(err, TranscodeError::InvalidRequest(_));
    assert_eq!(h.engine.run_count(), 0);
    assert_eq!(h.engine.writes(), 0);
    assert_eq!(h.builder.builds(), 0);
}

#[tokio::test]
async fn staged_entries_balance_cleanups() {
    let h = TestHarness::new(ScriptedEngine::new());

    for i in 0..4 {
        h.queue
            .submit(copy_request(&format!("j{i}"), b"payload"))
            .wait()
            .await
            .unwrap();
    }

    let stats = h.queue.executor().staging().stats();
    assert_eq!(stats.staged, 8);
    assert_eq!(stats.cleanups, 8);
    assert_eq!(h.engine.deletes(), 8);
}

// ---------------------------------------------------------------------------
// Engine availability
// ---------------------------------------------------------------------------

#[tokio::test]
async fn engine_unavailable_is_sticky_across_jobs() {
    let engine = Arc::new(ScriptedEngine::new());
    let h = TestHarness::with_builder(ScriptedBuilder::new(engine).failing(1), Config::default());

    let first = h.queue.submit(copy_request("a", b"x"));
    let second = h.queue.submit(copy_request("b", b"y"));
    assert_matches!(first.wait().await, Err(TranscodeError::EngineUnavailable(_)));
    assert_matches!(second.wait().await, Err(TranscodeError::EngineUnavailable(_)));
    assert_eq!(h.builder.builds(), 1);

    h.queue.executor().loader().reinitialize().await.unwrap();
    assert!(h.queue.submit(copy_request("c", b"z")).wait().await.is_ok());
    assert_eq!(h.builder.builds(), 2);
}

#[tokio::test]
async fn engine_is_built_once_for_many_jobs() {
    let h = TestHarness::new(ScriptedEngine::new());
    for i in 0..3 {
        h.queue
            .submit(copy_request(&format!("j{i}"), b"x"))
            .wait()
            .await
            .unwrap();
    }
    assert_eq!(h.builder.builds(), 1);
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelling_queued_job_never_runs_it() {
    let hold = Arc::new(Semaphore::new(0));
    let h = TestHarness::new(ScriptedEngine::new().with_hold(Arc::clone(&hold)));

    let a = h.queue.submit(copy_request("a", b"a"));
    let b = h.queue.submit(copy_request("b", b"b"));
    let (a_id, b_id) = (a.id(), b.id());
    wait_until(|| h.queue.running() == Some(a_id)).await;
    assert_eq!(h.queue.pending(), 1);

    assert_eq!(h.queue.cancel(b_id), CancelOutcome::Withdrawn);
    assert_matches!(b.wait().await, Err(TranscodeError::Cancelled));
    assert_eq!(h.queue.status(b_id), Some(JobState::Cancelled));
    assert_eq!(h.queue.pending(), 0);

    hold.add_permits(1);
    assert_ok!(a.wait().await);
    assert_eq!(h.engine.run_count(), 1);
    assert_eq!(h.engine.writes(), 1);
}

#[tokio::test]
async fn cancelling_running_job_is_advisory() {
    let hold = Arc::new(Semaphore::new(0));
    let h = TestHarness::new(ScriptedEngine::new().with_hold(Arc::clone(&hold)));

    let a = h.queue.submit(copy_request("a", b"a"));
    let b = h.queue.submit(copy_request("b", b"b"));
    let a_id = a.id();
    wait_until(|| h.queue.running() == Some(a_id)).await;

    assert_eq!(h.queue.cancel(a_id), CancelOutcome::Advisory);
    assert_eq!(h.queue.status(a_id), Some(JobState::Running));

    hold.add_permits(2);
    assert_matches!(a.wait().await, Err(TranscodeError::Cancelled));
    assert!(b.wait().await.is_ok());

    assert_eq!(h.queue.status(a_id), Some(JobState::Cancelled));
    assert_eq!(h.engine.run_count(), 2);
    assert!(h.engine.entries().is_empty());
}

#[tokio::test]
async fn cancelling_unknown_job_is_not_found() {
    let h = TestHarness::new(ScriptedEngine::new());
    assert_eq!(h.queue.cancel(JobId::new()), CancelOutcome::NotFound);

    let done = h.queue.submit(copy_request("a", b"a"));
    let id = done.id();
    done.wait().await.unwrap();
    assert_eq!(h.queue.cancel(id), CancelOutcome::NotFound);
    assert_eq!(h.queue.status(id), Some(JobState::Completed));
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queued_job_times_out_without_running() {
    let hold = Arc::new(Semaphore::new(0));
    let h = TestHarness::new(ScriptedEngine::new().with_hold(Arc::clone(&hold)));

    let a = h.queue.submit(copy_request("a", b"a"));
    let b = h
        .queue
        .submit(copy_request("b", b"b").with_timeout(Duration::from_millis(50)));
    let b_id = b.id();

    assert_matches!(b.wait().await, Err(TranscodeError::TimedOut { .. }));
    assert_eq!(h.queue.status(b_id), Some(JobState::TimedOut));

    hold.add_permits(1);
    assert!(a.wait().await.is_ok());
    assert_eq!(h.engine.run_count(), 1);
}

#[tokio::test]
async fn running_job_times_out_but_holds_gate_until_done() {
    let hold = Arc::new(Semaphore::new(0));
    let h = TestHarness::new(ScriptedEngine::new().with_hold(Arc::clone(&hold)));

    let a = h
        .queue
        .submit(copy_request("a", b"a").with_timeout(Duration::from_millis(50)));
    let b = h.queue.submit(copy_request("b", b"b"));
    let a_id = a.id();

    let err = a.wait().await.unwrap_err();
    assert_matches!(err, TranscodeError::TimedOut { .. });
    assert_eq!(err.kind().as_str(), "timed_out");

    // The engine is still busy with the timed-out job.
    assert_eq!(h.queue.running(), Some(a_id));
    assert_eq!(h.queue.status(a_id), Some(JobState::Running));
    assert_eq!(h.engine.run_count(), 1);

    hold.add_permits(2);
    assert!(b.wait().await.is_ok());
    assert_eq!(h.queue.status(a_id), Some(JobState::TimedOut));
    assert!(h.engine.entries().is_empty());
}

#[tokio::test]
async fn fast_job_is_unaffected_by_its_timeout() {
    let h = TestHarness::new(ScriptedEngine::new());
    let ticket = h
        .queue
        .submit(copy_request("a", b"a").with_timeout(Duration::from_secs(5)));
    assert_eq!(h.queue.armed_timeouts(), 1);
    assert_ok!(ticket.wait().await);

    // Finishing disarms the watcher instead of leaving it asleep.
    assert_eq!(h.queue.armed_timeouts(), 0);
}

#[tokio::test]
async fn withdrawn_job_disarms_its_timeout() {
    let hold = Arc::new(Semaphore::new(0));
    let h = TestHarness::new(ScriptedEngine::new().with_hold(Arc::clone(&hold)));

    let a = h.queue.submit(copy_request("a", b"a"));
    let b = h
        .queue
        .submit(copy_request("b", b"b").with_timeout(Duration::from_secs(3600)));
    assert_eq!(h.queue.armed_timeouts(), 1);

    assert_eq!(h.queue.cancel(b.id()), CancelOutcome::Withdrawn);
    assert_eq!(h.queue.armed_timeouts(), 0);
    assert_matches!(b.wait().await, Err(TranscodeError::Cancelled));

    hold.add_permits(1);
    assert_ok!(a.wait().await);
}

#[tokio::test]
async fn cancel_after_timeout_keeps_timed_out_state() {
    let hold = Arc::new(Semaphore::new(0));
    let h = TestHarness::new(ScriptedEngine::new().with_hold(Arc::clone(&hold)));

    let a = h
        .queue
        .submit(copy_request("a", b"a").with_timeout(Duration::from_millis(30)));
    let b = h.queue.submit(copy_request("b", b"b"));
    let a_id = a.id();

    assert_matches!(a.wait().await, Err(TranscodeError::TimedOut { .. }));
    assert_eq!(h.queue.running(), Some(a_id));
    assert_eq!(h.queue.cancel(a_id), CancelOutcome::NotFound);

    hold.add_permits(2);
    assert_ok!(b.wait().await);
    assert_eq!(h.queue.status(a_id), Some(JobState::TimedOut));

    let terminal: Vec<_> = h
        .events
        .job_history(a_id)
        .into_iter()
        .filter(|e| {
            matches!(
                e.payload,
                EventPayload::JobTimedOut { .. }
                    | EventPayload::JobCancelled { .. }
                    | EventPayload::JobCompleted { .. }
                    | EventPayload::JobFailed { .. }
            )
        })
        .collect();
    assert_eq!(terminal.len(), 1);
    assert_matches!(
        terminal[0].payload,
        EventPayload::JobTimedOut { was_running: true, .. }
    );
}

// ---------------------------------------------------------------------------
// Status, history, shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_history_is_bounded() {
    let mut config = Config::default();
    config.queue.history_limit = 2;
    let h = TestHarness::with_config(ScriptedEngine::new(), config);

    let mut ids = Vec::new();
    for i in 0..3 {
        let ticket = h.queue.submit(copy_request(&format!("j{i}"), b"x"));
        ids.push(ticket.id());
        ticket.wait().await.unwrap();
    }

    assert_eq!(h.queue.status(ids[0]), None);
    assert_eq!(h.queue.status(ids[1]), Some(JobState::Completed));
    assert_eq!(h.queue.status(ids[2]), Some(JobState::Completed));
}

#[tokio::test]
async fn lifecycle_events_are_broadcast() {
    let h = TestHarness::new(ScriptedEngine::new());
    let ticket = h.queue.submit(copy_request("a", b"a"));
    let id = ticket.id();
    ticket.wait().await.unwrap();

    let history = h.events.job_history(id);
    assert_matches!(history.first().map(|e| &e.payload), Some(EventPayload::JobQueued { position: 0, .. }));
    assert!(history
        .iter()
        .any(|e| matches!(e.payload, EventPayload::JobStarted { .. })));
    assert_matches!(
        history.last().map(|e| &e.payload),
        Some(EventPayload::JobCompleted { size_bytes: 1, .. })
    );
}

#[tokio::test]
async fn shutdown_cancels_outstanding_jobs() {
    let hold = Arc::new(Semaphore::new(0));
    let h = TestHarness::new(ScriptedEngine::new().with_hold(Arc::clone(&hold)));

    let a = h.queue.submit(copy_request("a", b"a"));
    let b = h.queue.submit(copy_request("b", b"b"));
    let a_id = a.id();
    wait_until(|| h.queue.running() == Some(a_id)).await;

    h.queue.shutdown().await;
    assert_matches!(a.wait().await, Err(TranscodeError::Cancelled));
    assert_matches!(b.wait().await, Err(TranscodeError::Cancelled));

    let late = h.queue.submit(copy_request("c", b"c"));
    let err = assert_err!(late.wait().await);
    assert_eq!(err, TranscodeError::Cancelled);

    // The abandoned job's staged files are reclaimed in the background.
    wait_until(|| h.engine.entries().is_empty()).await;
    assert_eq!(h.engine.run_count(), 1);
}
