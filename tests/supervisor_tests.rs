//! Integration tests for the agent supervisor: concurrency ceiling,
//! throttle, retries, timeouts, run deadline, and cancellation.

mod common;

use argos::{
    EngineConfig, ProgressSink, ResearchTask, ResearchWorker, RunContext, SearchThrottle,
    Supervisor, TaskStatus,
};
use common::mocks::{hit, SearchBehavior, StubSearch};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn fast_config() -> EngineConfig {
    EngineConfig::default()
        .with_task_timeout(Duration::from_millis(200))
        .with_run_deadline(Duration::from_secs(5))
        .with_max_attempts(2)
        .with_retry_base_backoff(Duration::from_millis(10))
        .with_cancel_grace(Duration::from_millis(50))
}

fn supervisor(search: StubSearch, throttle_permits: usize) -> Supervisor {
    let worker = ResearchWorker::new(
        Arc::new(search),
        Arc::new(SearchThrottle::new(throttle_permits)),
        5,
    );
    Supervisor::new(worker)
}

fn tasks(sub_questions: &[&str]) -> Vec<ResearchTask> {
    sub_questions
        .iter()
        .enumerate()
        .map(|(index, sub_question)| ResearchTask::new(index as u32, *sub_question))
        .collect()
}

#[tokio::test]
async fn test_concurrency_ceiling_is_respected() {
    common::init_tracing();
    let search = StubSearch::new().rule_default(SearchBehavior::Delay(
        Duration::from_millis(30),
        vec![hit("https://a", "delayed finding")],
    ));
    let max_in_flight = search.max_in_flight();
    let supervisor = supervisor(search, 16);

    let mut tasks = tasks(&["alpha", "beta", "gamma", "delta", "epsilon", "zeta"]);
    let ctx = RunContext::new(fast_config().with_concurrency(2));
    let outcomes = supervisor
        .run(&mut tasks, &ctx, &ProgressSink::disabled())
        .await;

    assert_eq!(outcomes.len(), 6);
    assert!(outcomes
        .values()
        .all(|outcome| outcome.status == TaskStatus::Succeeded));
    assert!(
        max_in_flight.load(Ordering::SeqCst) <= 2,
        "no more than two workers may run at once"
    );
}

#[tokio::test]
async fn test_throttle_bounds_search_calls_below_concurrency() {
    common::init_tracing();
    let search = StubSearch::new().rule_default(SearchBehavior::Delay(
        Duration::from_millis(20),
        vec![hit("https://a", "delayed finding")],
    ));
    let max_in_flight = search.max_in_flight();
    // worker ceiling is 6, but the provider only tolerates one call at a time
    let supervisor = supervisor(search, 1);

    let mut tasks = tasks(&["alpha", "beta", "gamma", "delta"]);
    let ctx = RunContext::new(fast_config().with_concurrency(6));
    let outcomes = supervisor
        .run(&mut tasks, &ctx, &ProgressSink::disabled())
        .await;

    assert!(outcomes
        .values()
        .all(|outcome| outcome.status == TaskStatus::Succeeded));
    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_flaky_task_retries_and_keeps_its_id() {
    common::init_tracing();
    let search = StubSearch::new().rule_default(SearchBehavior::FlakyUntil(
        1,
        vec![hit("https://a", "eventual finding")],
    ));
    let supervisor = supervisor(search, 4);

    let mut tasks = tasks(&["alpha"]);
    let ctx = RunContext::new(fast_config().with_max_attempts(3));
    let outcomes = supervisor
        .run(&mut tasks, &ctx, &ProgressSink::disabled())
        .await;

    let outcome = &outcomes[&0];
    assert_eq!(outcome.status, TaskStatus::Succeeded);
    assert_eq!(outcome.attempts, 2, "first attempt fails, second succeeds");
    assert!(!outcome.notes.is_empty());

    // the retry reused the task id, it did not mint a new one
    assert_eq!(outcomes.len(), 1);
    assert_eq!(tasks[0].id, 0);
    assert_eq!(tasks[0].status, TaskStatus::Succeeded);
    assert_eq!(tasks[0].attempts, 2);
    assert!(outcome.notes.iter().all(|note| note.task_id == 0));
}

#[tokio::test]
async fn test_timeouts_count_toward_attempts_then_fail() {
    common::init_tracing();
    let search = StubSearch::new().rule_default(SearchBehavior::Hang);
    let supervisor = supervisor(search, 4);

    let mut tasks = tasks(&["alpha"]);
    let ctx = RunContext::new(
        fast_config()
            .with_task_timeout(Duration::from_millis(50))
            .with_max_attempts(2),
    );
    let outcomes = supervisor
        .run(&mut tasks, &ctx, &ProgressSink::disabled())
        .await;

    let outcome = &outcomes[&0];
    assert_eq!(outcome.status, TaskStatus::Failed);
    assert_eq!(outcome.attempts, 2);
    assert!(outcome.error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_one_failure_never_aborts_siblings() {
    let search = StubSearch::new()
        .rule("alpha", SearchBehavior::Fail)
        .rule_default(SearchBehavior::Hits(vec![hit("https://b", "sibling finding")]));
    let supervisor = supervisor(search, 4);

    let mut tasks = tasks(&["alpha", "beta"]);
    let ctx = RunContext::new(fast_config());
    let outcomes = supervisor
        .run(&mut tasks, &ctx, &ProgressSink::disabled())
        .await;

    assert_eq!(outcomes[&0].status, TaskStatus::Failed);
    assert_eq!(outcomes[&1].status, TaskStatus::Succeeded);
    assert!(!outcomes[&1].notes.is_empty());
}

#[tokio::test]
async fn test_deadline_preserves_collected_results() {
    common::init_tracing();
    let search = StubSearch::new()
        .rule("alpha", SearchBehavior::Hits(vec![hit("https://a", "fast finding")]))
        .rule_default(SearchBehavior::Hang);
    let supervisor = supervisor(search, 4);

    let mut tasks = tasks(&["alpha", "beta", "gamma"]);
    let ctx = RunContext::new(
        fast_config()
            .with_task_timeout(Duration::from_secs(10))
            .with_run_deadline(Duration::from_millis(200))
            .with_max_attempts(1),
    );
    let outcomes = supervisor
        .run(&mut tasks, &ctx, &ProgressSink::disabled())
        .await;

    assert_eq!(outcomes[&0].status, TaskStatus::Succeeded);
    assert!(!outcomes[&0].notes.is_empty(), "no task result is discarded");
    for task_id in [1, 2] {
        let outcome = &outcomes[&task_id];
        assert_eq!(outcome.status, TaskStatus::Failed);
        assert!(outcome.error.as_deref().unwrap().contains("deadline"));
    }
}

#[tokio::test]
async fn test_cancellation_winds_down_within_grace() {
    common::init_tracing();
    let search = StubSearch::new().rule_default(SearchBehavior::Hang);
    let supervisor = supervisor(search, 4);
    let ctx = RunContext::new(
        fast_config()
            .with_task_timeout(Duration::from_secs(10))
            .with_run_deadline(Duration::from_secs(10)),
    );
    let cancel = ctx.cancel.clone();

    let run = tokio::spawn(async move {
        let mut tasks = tasks(&["alpha", "beta", "gamma"]);
        supervisor
            .run(&mut tasks, &ctx, &ProgressSink::disabled())
            .await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let outcomes = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("supervisor must wind down promptly after cancellation")
        .unwrap();

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes
        .values()
        .all(|outcome| outcome.status == TaskStatus::Cancelled));
}

#[tokio::test]
async fn test_queued_tasks_are_not_dispatched_after_cancellation() {
    common::init_tracing();
    let search = StubSearch::new().rule_default(SearchBehavior::Hang);
    let calls = search.calls();
    let supervisor = supervisor(search, 8);
    // two slots; the third task queues behind the hanging pair
    let ctx = RunContext::new(
        fast_config()
            .with_concurrency(2)
            .with_task_timeout(Duration::from_secs(10))
            .with_run_deadline(Duration::from_secs(10)),
    );
    let cancel = ctx.cancel.clone();

    let run = tokio::spawn(async move {
        let mut tasks = tasks(&["alpha", "beta", "gamma"]);
        supervisor
            .run(&mut tasks, &ctx, &ProgressSink::disabled())
            .await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    let outcomes = run.await.unwrap();

    // only the two in-flight tasks ever reached the provider
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(outcomes[&2].status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn test_empty_task_list_returns_empty_outcomes() {
    let search = StubSearch::with_hits(vec![]);
    let supervisor = supervisor(search, 4);

    let mut tasks = Vec::new();
    let ctx = RunContext::new(fast_config());
    let outcomes = supervisor
        .run(&mut tasks, &ctx, &ProgressSink::disabled())
        .await;

    assert!(outcomes.is_empty());
}
