use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};

use omnistore_workers::{
    PoolError, PoolSettings, TaskOptions, TaskPayload, TaskRegistry, ThreadBackend, WorkerPool,
};

// ── Helpers ────────────────────────────────────────────────────────────────

fn thread_pool(settings: PoolSettings) -> WorkerPool<ThreadBackend> {
    WorkerPool::new(settings, ThreadBackend::new(TaskRegistry::with_builtins()))
}

fn small_settings(name: &str) -> PoolSettings {
    PoolSettings::named(name)
        .workers(1, 1)
        .warm_workers(0)
        .hibernation(false, Duration::from_secs(60))
        .health_check_interval(Duration::ZERO)
}

fn push_marker(log: &Arc<Mutex<Vec<&'static str>>>, marker: &'static str) -> TaskPayload {
    let log = Arc::clone(log);
    TaskPayload::closure(move |_ctx| {
        log.lock().unwrap().push(marker);
        Ok(Value::Null)
    })
}

// ── Priority & dispatch ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn higher_priority_dispatches_first_on_saturated_pool() {
    let pool = thread_pool(small_settings("prio"));
    pool.initialize().await.unwrap();

    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    // Saturate the single worker.
    let sleeper = pool
        .submit(
            TaskPayload::named("sleep_ms", vec![json!(300)]),
            TaskOptions::default(),
        )
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let low = pool
        .submit(push_marker(&log, "low"), TaskOptions::priority(0))
        .unwrap();
    let high = pool
        .submit(push_marker(&log, "high"), TaskOptions::priority(10))
        .unwrap();

    pool.get_result(&sleeper, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    pool.get_result(&high, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    pool.get_result(&low, Some(Duration::from_secs(5)))
        .await
        .unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["high", "low"]);
    pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn results_and_errors_are_surfaced() {
    let pool = thread_pool(small_settings("results"));
    pool.initialize().await.unwrap();

    let ok = pool
        .submit(
            TaskPayload::named("fib", vec![json!(10)]),
            TaskOptions::default(),
        )
        .unwrap();
    assert_eq!(
        pool.get_result(&ok, Some(Duration::from_secs(5))).await.unwrap(),
        json!(55)
    );

    let bad = pool
        .submit(TaskPayload::named("missing_task", vec![]), TaskOptions::default())
        .unwrap();
    let err = pool
        .get_result(&bad, Some(Duration::from_secs(5)))
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::TaskFailed(_)));

    let unknown = pool.get_result("no-such-task", None).await.unwrap_err();
    assert!(matches!(unknown, PoolError::NotFound(_)));
    pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn get_result_honors_timeout() {
    let pool = thread_pool(small_settings("timeouts"));
    pool.initialize().await.unwrap();

    let slow = pool
        .submit(
            TaskPayload::named("sleep_ms", vec![json!(2000)]),
            TaskOptions::default(),
        )
        .unwrap();
    let err = pool
        .get_result(&slow, Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::Timeout(_)));
    pool.shutdown().await;
}

// ── Bounds & checkout ──────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn worker_count_stays_within_bounds() {
    let settings = PoolSettings::named("bounds")
        .workers(2, 3)
        .warm_workers(0)
        .hibernation(false, Duration::from_secs(60))
        .health_check_interval(Duration::ZERO);
    let pool = thread_pool(settings);
    pool.initialize().await.unwrap();

    let stats = pool.stats();
    assert_eq!(stats.total_workers, 2);

    // Demand more than min; pool grows but never past max.
    let mut held = Vec::new();
    for _ in 0..3 {
        held.push(
            pool.acquire_worker(Some(Duration::from_secs(1)))
                .await
                .unwrap(),
        );
    }
    let stats = pool.stats();
    assert!(stats.total_workers <= 3);
    assert_eq!(stats.busy_workers, 3);

    let err = pool
        .acquire_worker(Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::Timeout(_)));

    for worker in &held {
        pool.release_worker(worker).await;
    }
    assert!(pool.acquire_worker(Some(Duration::from_secs(1))).await.is_ok());
    pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn run_on_worker_gives_affinity() {
    let pool = thread_pool(small_settings("affinity"));
    pool.initialize().await.unwrap();

    let worker = pool
        .acquire_worker(Some(Duration::from_secs(1)))
        .await
        .unwrap();
    pool.run_on_worker(
        &worker,
        TaskPayload::named("state_set", vec![json!("model"), json!("warm")]),
        None,
    )
    .await
    .unwrap();
    let got = pool
        .run_on_worker(
            &worker,
            TaskPayload::named("state_get", vec![json!("model")]),
            None,
        )
        .await
        .unwrap();
    assert_eq!(got, json!("warm"));
    pool.release_worker(&worker).await;
    pool.shutdown().await;
}

// ── Retirement ─────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn workers_retire_after_task_budget() {
    let settings = small_settings("retire").max_tasks_per_worker(1);
    let pool = thread_pool(settings);
    pool.initialize().await.unwrap();

    for _ in 0..3 {
        let task = pool
            .submit(TaskPayload::named("ping", vec![]), TaskOptions::default())
            .unwrap();
        pool.get_result(&task, Some(Duration::from_secs(5)))
            .await
            .unwrap();
    }

    // Each task retired its worker; the pool kept restoring the minimum.
    let stats = pool.stats();
    assert!(stats.total_workers >= 1);
    assert_eq!(stats.completed_tasks, 3);
    pool.shutdown().await;
}

// ── Hibernation ────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn idle_workers_hibernate_and_wake_on_demand() {
    let settings = PoolSettings::named("hibernate")
        .workers(1, 2)
        .warm_workers(0)
        .hibernation(true, Duration::from_millis(100))
        .health_check_interval(Duration::ZERO);
    let pool = thread_pool(settings);
    pool.initialize().await.unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(pool.stats().hibernating_workers >= 1);

    // Demand wakes a hibernator.
    let task = pool
        .submit(TaskPayload::named("ping", vec![]), TaskOptions::default())
        .unwrap();
    assert_eq!(
        pool.get_result(&task, Some(Duration::from_secs(5))).await.unwrap(),
        json!("pong")
    );
    pool.shutdown().await;
}

// ── Shutdown ───────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_raises_instead_of_hanging() {
    let pool = thread_pool(small_settings("shutdown"));
    pool.initialize().await.unwrap();

    let slow = pool
        .submit(
            TaskPayload::named("sleep_ms", vec![json!(5000)]),
            TaskOptions::default(),
        )
        .unwrap();
    let queued = pool
        .submit(TaskPayload::named("ping", vec![]), TaskOptions::default())
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let pool_for_shutdown = pool.clone();
    tokio::spawn(async move {
        pool_for_shutdown.shutdown().await;
    });

    let err = pool
        .get_result(&queued, Some(Duration::from_secs(5)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PoolError::ShuttingDown | PoolError::TaskFailed(_)
    ));

    let _ = slow;
    let err = pool
        .submit(TaskPayload::named("ping", vec![]), TaskOptions::default())
        .unwrap_err();
    assert!(matches!(err, PoolError::ShuttingDown));
}
