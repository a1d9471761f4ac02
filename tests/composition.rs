//! End-to-end scenarios driving composed policy stacks through the public
//! API: listener routing, retry/timeout interplay, and external cancellation.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use palisade::policies::{Fallback, RetryPolicy, Timeout};
use palisade::{ExecutionError, Executor, PolicyRef};

/// Shared scribble pad for asserting listener dispatch order.
type Journal = Arc<Mutex<Vec<&'static str>>>;

fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

fn noted(journal: &Journal, entry: &'static str) -> impl Fn(palisade::ExecutionCompletedEvent<u32>) {
    let journal = Arc::clone(journal);
    move |_| journal.lock().expect("journal lock").push(entry)
}

fn with_listeners(executor: Executor<u32>, journal: &Journal) -> Executor<u32> {
    executor
        .on_success(noted(journal, "success"))
        .on_failure(noted(journal, "failure"))
        .on_complete(noted(journal, "complete"))
}

#[tokio::test]
async fn plain_success_routes_to_on_success() {
    let events = journal();
    let executions = Arc::new(AtomicU32::new(0));

    let executor = with_listeners(
        Executor::with(Arc::new(Fallback::with_result(0u32)) as PolicyRef<u32>),
        &events,
    )
    .on_success({
        let events = Arc::clone(&events);
        let executions = Arc::clone(&executions);
        move |event| {
            assert_eq!(event.result, Some(42));
            executions.store(event.stats.executions, Ordering::SeqCst);
            events.lock().expect("journal lock").push("success");
        }
    });

    let value = executor.get(|| async { Ok(42u32) }).await.expect("success");

    assert_eq!(value, 42);
    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert_eq!(*events.lock().expect("journal lock"), vec!["success", "complete"]);
}

#[tokio::test]
async fn fallback_recovery_routes_to_on_success() {
    let events = journal();
    let executor = with_listeners(
        Executor::with(Arc::new(Fallback::with_result(7u32)) as PolicyRef<u32>),
        &events,
    );

    let value = executor
        .get(|| async { Err(ExecutionError::message("boom")) })
        .await
        .expect("fallback recovers");

    assert_eq!(value, 7);
    assert_eq!(*events.lock().expect("journal lock"), vec!["success", "complete"]);
}

#[tokio::test(start_paused = true)]
async fn retry_then_success() {
    let events = journal();
    let calls = Arc::new(AtomicU32::new(0));
    let executor = with_listeners(
        Executor::with(Arc::new(
            RetryPolicy::with_max_attempts(3).with_delay(Duration::from_millis(1)),
        ) as PolicyRef<u32>),
        &events,
    );

    let counted = Arc::clone(&calls);
    let value = executor
        .get(move || {
            let counted = Arc::clone(&counted);
            async move {
                if counted.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ExecutionError::message("flaky"))
                } else {
                    Ok(9u32)
                }
            }
        })
        .await
        .expect("third attempt succeeds");

    assert_eq!(value, 9);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(*events.lock().expect("journal lock"), vec!["success", "complete"]);
}

#[tokio::test(start_paused = true)]
async fn timeout_wins_over_blocking_operation() {
    let events = journal();
    let timeouts = Arc::new(AtomicU32::new(0));

    let policy = Timeout::new(Duration::from_millis(10)).on_timeout_exceeded({
        let timeouts = Arc::clone(&timeouts);
        move |_| {
            timeouts.fetch_add(1, Ordering::SeqCst);
        }
    });
    let executor = with_listeners(
        Executor::with(Arc::new(policy) as PolicyRef<u32>),
        &events,
    );

    let err = executor
        .run(|| async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await
        .expect_err("timeout should fire");

    assert!(err.is_timeout());
    assert_eq!(timeouts.load(Ordering::SeqCst), 1);
    assert_eq!(*events.lock().expect("journal lock"), vec!["failure", "complete"]);
}

#[tokio::test(start_paused = true)]
async fn outer_timeout_collapses_inner_retry_loop() {
    let events = journal();
    let calls = Arc::new(AtomicU32::new(0));

    let executor = with_listeners(
        Executor::with_policies(vec![
            Arc::new(Timeout::new(Duration::from_millis(50))) as PolicyRef<u32>,
            Arc::new(RetryPolicy::with_max_attempts(100).with_delay(Duration::from_millis(5))),
        ]),
        &events,
    );

    let counted = Arc::clone(&calls);
    let err = executor
        .get(move || {
            let counted = Arc::clone(&counted);
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(ExecutionError::message("always failing"))
            }
        })
        .await
        .expect_err("outer timeout collapses the loop");

    assert!(err.is_timeout());
    let attempts = calls.load(Ordering::SeqCst);
    assert!(
        attempts > 1 && attempts < 100,
        "loop ran until the timeout, not to exhaustion (attempts={attempts})"
    );
    assert_eq!(*events.lock().expect("journal lock"), vec!["failure", "complete"]);
}

#[tokio::test(start_paused = true)]
async fn inner_timeout_is_retried_by_outer_retry() {
    let calls = Arc::new(AtomicU32::new(0));

    let executor = Executor::with_policies(vec![
        Arc::new(
            RetryPolicy::with_max_attempts(3)
                .with_delay(Duration::from_millis(1))
                .handle_if(ExecutionError::is_timeout),
        ) as PolicyRef<u32>,
        Arc::new(Timeout::new(Duration::from_millis(10))),
    ]);

    let counted = Arc::clone(&calls);
    let value = executor
        .get(move || {
            let counted = Arc::clone(&counted);
            async move {
                if counted.fetch_add(1, Ordering::SeqCst) < 2 {
                    // Outlive the per-attempt timeout.
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err(ExecutionError::message("interrupted"))
                } else {
                    Ok(11u32)
                }
            }
        })
        .await
        .expect("third attempt beats its timeout");

    assert_eq!(value, 11);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn external_cancellation_adopts_the_cancel_result() {
    let events = journal();
    let token = CancellationToken::new();

    let executor = with_listeners(
        Executor::with(Arc::new(RetryPolicy::with_max_attempts(5)) as PolicyRef<u32>)
            .with_cancellation(token.clone()),
        &events,
    );

    tokio::spawn({
        let token = token.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        }
    });

    let err = executor
        .run_with_execution(|exec| async move {
            exec.canceled().await;
            Err(ExecutionError::message("stopping on request"))
        })
        .await
        .expect_err("canceled from outside");

    assert!(err.is_canceled());
    assert_eq!(*events.lock().expect("journal lock"), vec!["failure", "complete"]);
}

#[tokio::test(start_paused = true)]
async fn pre_canceled_token_stops_after_one_attempt() {
    let token = CancellationToken::new();
    token.cancel();

    let executions = Arc::new(AtomicU32::new(0));
    let executor = Executor::with(Arc::new(RetryPolicy::with_max_attempts(5)) as PolicyRef<u32>)
        .with_cancellation(token)
        .on_complete({
            let executions = Arc::clone(&executions);
            move |event| executions.store(event.stats.executions, Ordering::SeqCst)
        });

    let err = executor
        .run_with_execution(|exec| async move {
            exec.canceled().await;
            Err(ExecutionError::message("observed the cancel"))
        })
        .await
        .expect_err("canceled before invocation");

    assert!(err.is_canceled());
    assert_eq!(executions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancellation_after_completion_is_inert() {
    let events = journal();
    let token = CancellationToken::new();

    let executor = with_listeners(
        Executor::with(Arc::new(Fallback::with_result(0u32)) as PolicyRef<u32>)
            .with_cancellation(token.clone()),
        &events,
    );

    let value = executor.get(|| async { Ok(5u32) }).await.expect("success");
    assert_eq!(value, 5);

    // The watcher has been released; firing the token now changes nothing.
    token.cancel();
    tokio::task::yield_now().await;
    assert_eq!(*events.lock().expect("journal lock"), vec!["success", "complete"]);
}

#[tokio::test]
async fn attaching_the_same_token_twice_behaves_like_once() {
    let token = CancellationToken::new();
    let executor = Executor::with(Arc::new(Fallback::with_result(0u32)) as PolicyRef<u32>)
        .with_cancellation(token.clone())
        .with_cancellation(token.clone());

    let value = executor.get(|| async { Ok(13u32) }).await.expect("success");
    assert_eq!(value, 13);
}

#[tokio::test(start_paused = true)]
async fn exactly_one_of_success_or_failure_fires() {
    for should_fail in [false, true] {
        let events = journal();
        let executor = with_listeners(
            Executor::with(Arc::new(
                RetryPolicy::with_max_attempts(2).with_delay(Duration::from_millis(1)),
            ) as PolicyRef<u32>),
            &events,
        );

        let outcome = executor
            .get(move || async move {
                if should_fail {
                    Err(ExecutionError::message("boom"))
                } else {
                    Ok(1u32)
                }
            })
            .await;

        let seen = events.lock().expect("journal lock").clone();
        if should_fail {
            assert!(outcome.is_err());
            assert_eq!(seen, vec!["failure", "complete"]);
        } else {
            assert!(outcome.is_ok());
            assert_eq!(seen, vec!["success", "complete"]);
        }
    }
}
