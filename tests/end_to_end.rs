//! End-to-end scenarios exercised against the public API only, as opposed
//! to the per-module `#[cfg(test)]` unit tests that live beside the code
//! they cover.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskpool::{BoxedError, OutcomeStatus, Pool, PoolOptions, Priority, SubmitOptions};

#[test]
fn simple_value_returning_submit() {
    let pool = Pool::new(PoolOptions::default());
    pool.start().unwrap();

    let id = pool
        .submit_with_value(|| Ok::<_, BoxedError>(42i32), SubmitOptions::default())
        .unwrap();

    let outcome = pool
        .get_result_and_wait(id, Duration::from_millis(5000))
        .unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.value::<i32>(), Some(42));

    pool.dispose();
}

#[test]
fn retry_to_success() {
    let pool = Pool::new(PoolOptions::default());
    pool.start().unwrap();

    let attempt = Arc::new(AtomicU32::new(0));
    let attempt_clone = attempt.clone();
    let options = SubmitOptions::builder()
        .max_retries(3)
        .retry_interval(Duration::from_millis(100))
        .build();
    let id = pool
        .submit_with_value(
            move || {
                let n = attempt_clone.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(Box::<dyn std::error::Error + Send + Sync>::from("not yet"))
                } else {
                    Ok("ok".to_string())
                }
            },
            options,
        )
        .unwrap();

    let outcome = pool
        .get_result_and_wait(id, Duration::from_millis(5000))
        .unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.value::<String>(), Some("ok".to_string()));
    assert_eq!(outcome.attempt_count, 3);

    pool.dispose();
}

#[test]
fn timeout_never_retries() {
    let pool = Pool::new(PoolOptions::default());
    pool.start().unwrap();

    let options = SubmitOptions::builder()
        .timeout(Duration::from_millis(500))
        .max_retries(3)
        .build();
    let id = pool
        .submit(
            || {
                std::thread::sleep(Duration::from_secs(5));
                Ok(())
            },
            options,
        )
        .unwrap();

    let outcome = pool
        .get_result_and_wait(id, Duration::from_millis(5000))
        .unwrap();
    assert_eq!(outcome.status, OutcomeStatus::TimedOut);
    assert_eq!(outcome.attempt_count, 1);

    pool.dispose();
}

#[test]
fn strict_priority_under_contention() {
    let pool = Pool::new(
        PoolOptions::builder()
            .min_workers(1)
            .max_workers(1)
            .build(),
    );
    pool.start().unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let push = |label: &'static str| {
        let order = order.clone();
        move || {
            std::thread::sleep(Duration::from_millis(50));
            order.lock().unwrap().push(label);
            Ok(())
        }
    };

    // Normal dispatches immediately (sole worker is idle); the remaining
    // three pile up behind it while it sleeps, so their relative dispatch
    // order is governed purely by priority.
    pool.submit(
        push("normal"),
        SubmitOptions::builder().priority(Priority::Normal).build(),
    )
    .unwrap();
    std::thread::sleep(Duration::from_millis(10));
    pool.submit(
        push("critical"),
        SubmitOptions::builder().priority(Priority::Critical).build(),
    )
    .unwrap();
    pool.submit(
        push("low"),
        SubmitOptions::builder().priority(Priority::Low).build(),
    )
    .unwrap();
    pool.submit(
        push("high"),
        SubmitOptions::builder().priority(Priority::High).build(),
    )
    .unwrap();

    pool.wait_all();
    assert_eq!(
        *order.lock().unwrap(),
        vec!["normal", "critical", "high", "low"]
    );

    pool.dispose();
}

#[test]
fn delayed_promotion_timing() {
    let pool = Pool::new(PoolOptions::default());
    pool.start().unwrap();

    let runs = Arc::new(AtomicU32::new(0));
    let runs_clone = runs.clone();
    pool.schedule_delayed(
        move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        Duration::from_millis(2000),
        SubmitOptions::default(),
    )
    .unwrap();

    std::thread::sleep(Duration::from_millis(1900));
    assert_eq!(runs.load(Ordering::SeqCst), 0, "fired before its release instant");

    std::thread::sleep(Duration::from_millis(400));
    assert_eq!(runs.load(Ordering::SeqCst), 1, "did not fire by t0+2.3s");

    pool.dispose();
}

#[test]
fn cancel_recurring_stops_future_ticks() {
    let pool = Pool::new(PoolOptions::default());
    pool.start().unwrap();

    let runs = Arc::new(AtomicU32::new(0));
    let runs_clone = runs.clone();
    let id = pool.schedule_recurring(
        move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        Duration::from_millis(500),
        None,
        SubmitOptions::default(),
    )
    .unwrap();

    std::thread::sleep(Duration::from_millis(1600));
    assert!(pool.cancel_scheduled(id));
    let count_at_cancel = runs.load(Ordering::SeqCst);
    assert!(
        (3..=4).contains(&count_at_cancel),
        "expected 3 or 4 ticks by t0+1.6s, got {count_at_cancel}"
    );

    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(
        runs.load(Ordering::SeqCst),
        count_at_cancel,
        "no execution may occur after cancellation"
    );

    pool.dispose();
}
