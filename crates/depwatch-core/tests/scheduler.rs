//! End-to-end scheduler tests against a recording metrics sink.
//!
//! Time-driven tests run on a paused clock so intervals elapse instantly.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use depwatch_core::*;

/// Remembers the last value of every series and every deletion.
#[derive(Default)]
struct RecordingSink {
    health: Mutex<HashMap<String, bool>>,
    status: Mutex<HashMap<String, StatusCategory>>,
    detail: Mutex<HashMap<String, String>>,
    latency_count: Mutex<HashMap<String, usize>>,
    critical: Mutex<HashMap<String, bool>>,
    deleted: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn live_keys(&self) -> HashSet<String> {
        let mut keys: HashSet<String> = self.health.lock().unwrap().keys().cloned().collect();
        keys.extend(self.status.lock().unwrap().keys().cloned());
        keys.extend(self.detail.lock().unwrap().keys().cloned());
        keys.extend(self.latency_count.lock().unwrap().keys().cloned());
        keys
    }
}

impl MetricsSink for RecordingSink {
    fn set_health(&self, meta: &EndpointMeta, healthy: bool) {
        self.health.lock().unwrap().insert(meta.key(), healthy);
        self.critical.lock().unwrap().insert(meta.key(), meta.critical);
    }

    fn observe_latency(&self, meta: &EndpointMeta, _: Duration) {
        *self.latency_count.lock().unwrap().entry(meta.key()).or_default() += 1;
    }

    fn set_status(&self, meta: &EndpointMeta, category: StatusCategory) {
        self.status.lock().unwrap().insert(meta.key(), category);
    }

    fn set_status_detail(&self, meta: &EndpointMeta, detail: &str) {
        self.detail.lock().unwrap().insert(meta.key(), detail.to_string());
    }

    fn delete_metrics(&self, meta: &EndpointMeta) {
        let key = meta.key();
        self.health.lock().unwrap().remove(&key);
        self.status.lock().unwrap().remove(&key);
        self.detail.lock().unwrap().remove(&key);
        self.latency_count.lock().unwrap().remove(&key);
        self.deleted.lock().unwrap().push(key);
    }
}

struct AlwaysOk;

#[async_trait]
impl Checker for AlwaysOk {
    async fn check(&self, _: &Endpoint) -> Result<(), CheckError> {
        Ok(())
    }
}

struct AlwaysFails;

#[async_trait]
impl Checker for AlwaysFails {
    async fn check(&self, _: &Endpoint) -> Result<(), CheckError> {
        Err(anyhow!("generic failure").into())
    }
}

/// Succeeds or fails depending on a switch.
struct Switch(AtomicBool);

#[async_trait]
impl Checker for Switch {
    async fn check(&self, _: &Endpoint) -> Result<(), CheckError> {
        if self.0.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CheckError::Unhealthy("switched off".into()))
        }
    }
}

/// Rejects every probe with an explicit auth classification.
struct Denied;

#[async_trait]
impl Checker for Denied {
    async fn check(&self, _: &Endpoint) -> Result<(), CheckError> {
        Err(CheckError::classified(
            StatusCategory::AuthError,
            "auth_error",
            "password authentication failed",
        ))
    }
}

fn config(failure: u32, success: u32) -> CheckConfig {
    CheckConfig::builder()
        .interval(Duration::from_secs(2))
        .timeout(Duration::from_secs(1))
        .initial_delay(Duration::ZERO)
        .failure_threshold(failure)
        .success_threshold(success)
        .build()
        .unwrap()
}

fn svc(config: CheckConfig) -> Dependency {
    Dependency::builder("svc", DependencyType::Tcp)
        .critical(true)
        .endpoint(Endpoint::new("127.0.0.1", "1234").unwrap())
        .config(config)
        .build()
        .unwrap()
}

fn endpoint(host: &str, port: &str) -> Endpoint {
    Endpoint::new(host, port).unwrap()
}

const KEY: &str = "svc:127.0.0.1:1234";

#[tokio::test(start_paused = true)]
async fn healthy_endpoint_reports_ok() {
    let sink = Arc::new(RecordingSink::default());
    let scheduler = Scheduler::new(sink.clone(), config(1, 1));
    scheduler.register(svc(config(1, 1)), Arc::new(AlwaysOk)).await.unwrap();
    scheduler.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let health = scheduler.health().await;
    assert_eq!(health, HashMap::from([(KEY.to_string(), true)]));

    let details = scheduler.health_details().await;
    let status = &details[KEY];
    assert_eq!(status.status, StatusCategory::Ok);
    assert_eq!(status.detail, "ok");
    assert_eq!(status.dep_type, DependencyType::Tcp);
    assert!(status.critical);
    assert!(status.last_checked_at.is_some());

    assert_eq!(sink.health.lock().unwrap()[KEY], true);
    assert_eq!(sink.status.lock().unwrap()[KEY], StatusCategory::Ok);
    assert_eq!(sink.latency_count.lock().unwrap()[KEY], 1);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failing_endpoint_reports_error() {
    let sink = Arc::new(RecordingSink::default());
    let scheduler = Scheduler::new(sink.clone(), config(1, 1));
    scheduler.register(svc(config(1, 1)), Arc::new(AlwaysFails)).await.unwrap();
    scheduler.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let details = scheduler.health_details().await;
    assert_eq!(details[KEY].healthy, Some(false));
    assert_eq!(details[KEY].status, StatusCategory::Error);
    assert_eq!(details[KEY].detail, "error");
    assert_eq!(scheduler.health().await[KEY], false);
    assert_eq!(sink.detail.lock().unwrap()[KEY], "error");

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn explicit_classification_reaches_state_and_metrics() {
    let sink = Arc::new(RecordingSink::default());
    let scheduler = Scheduler::new(sink.clone(), config(1, 1));
    scheduler.register(svc(config(1, 1)), Arc::new(Denied)).await.unwrap();
    scheduler.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;

    let details = scheduler.health_details().await;
    assert_eq!(details[KEY].status, StatusCategory::AuthError);
    assert_eq!(details[KEY].detail, "auth_error");
    assert_eq!(sink.status.lock().unwrap()[KEY], StatusCategory::AuthError);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn success_threshold_debounces_recovery() {
    let checker = Arc::new(Switch(AtomicBool::new(false)));
    let scheduler = Scheduler::new(Arc::new(NoopMetrics), config(1, 3));
    scheduler.register(svc(config(1, 3)), checker.clone()).await.unwrap();
    scheduler.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(scheduler.health().await[KEY], false);

    checker.0.store(true, Ordering::SeqCst);
    // Successes at t=2s and t=4s.
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(scheduler.health().await[KEY], false);

    // Third success at t=6s.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(scheduler.health().await[KEY], true);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn health_gauge_follows_debounced_flag() {
    let sink = Arc::new(RecordingSink::default());
    let checker = Arc::new(Switch(AtomicBool::new(true)));
    let scheduler = Scheduler::new(sink.clone(), config(2, 1));
    scheduler.register(svc(config(2, 1)), checker.clone()).await.unwrap();
    scheduler.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    checker.0.store(false, Ordering::SeqCst);

    // One failure: raw status is unhealthy but the flag holds.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(sink.status.lock().unwrap()[KEY], StatusCategory::Unhealthy);
    assert_eq!(sink.health.lock().unwrap()[KEY], true);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(sink.health.lock().unwrap()[KEY], false);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn add_endpoint_twice_creates_one_entry() {
    let scheduler = Scheduler::new(Arc::new(NoopMetrics), config(1, 1));
    scheduler.start().await.unwrap();

    for _ in 0..2 {
        scheduler
            .add_endpoint(
                "cache",
                DependencyType::Redis,
                false,
                endpoint("redis", "6379"),
                Arc::new(AlwaysOk),
            )
            .await
            .unwrap();
    }

    let details = scheduler.health_details().await;
    assert_eq!(details.len(), 1);
    assert!(details.contains_key("cache:redis:6379"));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(scheduler.health().await["cache:redis:6379"], true);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn remove_endpoint_clears_state_and_metrics() {
    let sink = Arc::new(RecordingSink::default());
    let scheduler = Scheduler::new(sink.clone(), config(1, 1));
    scheduler.register(svc(config(1, 1)), Arc::new(AlwaysOk)).await.unwrap();
    scheduler.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(sink.live_keys().contains(KEY));

    scheduler.remove_endpoint("svc", "127.0.0.1", "1234").await.unwrap();

    assert!(!scheduler.health().await.contains_key(KEY));
    assert!(!scheduler.health_details().await.contains_key(KEY));
    assert_eq!(*sink.deleted.lock().unwrap(), vec![KEY.to_string()]);
    assert!(sink.live_keys().is_empty());

    // The loop is gone: nothing is published for the key afterwards.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(sink.live_keys().is_empty());

    // Removing again is a no-op.
    scheduler.remove_endpoint("svc", "127.0.0.1", "1234").await.unwrap();
    assert_eq!(sink.deleted.lock().unwrap().len(), 1);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn update_endpoint_swaps_keys_and_keeps_critical() {
    let sink = Arc::new(RecordingSink::default());
    let scheduler = Scheduler::new(sink.clone(), config(1, 1));
    scheduler.register(svc(config(1, 1)), Arc::new(AlwaysOk)).await.unwrap();
    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    scheduler
        .update_endpoint(
            "svc",
            "127.0.0.1",
            "1234",
            endpoint("10.0.0.2", "4321"),
            Arc::new(AlwaysOk),
        )
        .await
        .unwrap();

    let details = scheduler.health_details().await;
    assert!(!details.contains_key(KEY));
    assert!(details.contains_key("svc:10.0.0.2:4321"));
    assert_eq!(*sink.deleted.lock().unwrap(), vec![KEY.to_string()]);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let details = scheduler.health_details().await;
    let status = &details["svc:10.0.0.2:4321"];
    assert_eq!(status.healthy, Some(true));
    assert!(status.critical);
    assert_eq!(status.dep_type, DependencyType::Tcp);
    assert_eq!(sink.critical.lock().unwrap()["svc:10.0.0.2:4321"], true);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn mutation_before_start_is_rejected() {
    let scheduler = Scheduler::new(Arc::new(NoopMetrics), config(1, 1));
    let err = scheduler
        .add_endpoint("svc", DependencyType::Tcp, true, endpoint("h", "1"), Arc::new(AlwaysOk))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::NotStarted));

    let err = scheduler
        .update_endpoint("svc", "h", "1", endpoint("h", "2"), Arc::new(AlwaysOk))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::NotStarted));
}

#[tokio::test(start_paused = true)]
async fn stop_keeps_last_observations_readable() {
    let scheduler = Scheduler::new(Arc::new(NoopMetrics), config(1, 1));
    scheduler.register(svc(config(1, 1)), Arc::new(AlwaysOk)).await.unwrap();
    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    scheduler.stop().await;
    let before = scheduler.health_details().await[KEY].last_checked_at;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(scheduler.health_details().await[KEY].last_checked_at, before);
    assert_eq!(scheduler.health().await[KEY], true);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_adds_removes_and_reads() {
    let fast = CheckConfig::builder()
        .interval(Duration::from_secs(1))
        .timeout(Duration::from_millis(500))
        .initial_delay(Duration::ZERO)
        .build()
        .unwrap();
    let sink = Arc::new(RecordingSink::default());
    let scheduler = Arc::new(Scheduler::new(sink.clone(), fast));
    scheduler.start().await.unwrap();

    let adds: Vec<_> = (0..10)
        .map(|i| {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move {
                scheduler
                    .add_endpoint(
                        &format!("dep-{i}"),
                        DependencyType::Tcp,
                        i % 2 == 0,
                        endpoint("127.0.0.1", &format!("{}", 9000 + i)),
                        Arc::new(AlwaysOk),
                    )
                    .await
            })
        })
        .collect();
    for add in adds {
        add.await.unwrap().unwrap();
    }
    assert_eq!(scheduler.health_details().await.len(), 10);

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..10)
        .map(|_| {
            let scheduler = Arc::clone(&scheduler);
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                while !done.load(Ordering::SeqCst) {
                    let health = scheduler.health().await;
                    let details = scheduler.health_details().await;
                    assert!(health.len() <= 10);
                    for (key, status) in &details {
                        assert_eq!(key, &endpoint_key(&status.name, &status.host, &status.port));
                    }
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    let removes: Vec<_> = (0..5)
        .map(|i| {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move {
                scheduler
                    .remove_endpoint(&format!("dep-{i}"), "127.0.0.1", &format!("{}", 9000 + i))
                    .await
            })
        })
        .collect();
    for remove in removes {
        remove.await.unwrap().unwrap();
    }

    done.store(true, Ordering::SeqCst);
    for reader in readers {
        reader.await.unwrap();
    }

    let details = scheduler.health_details().await;
    assert_eq!(details.len(), 5);
    for i in 0..5 {
        let key = format!("dep-{i}:127.0.0.1:{}", 9000 + i);
        assert!(!details.contains_key(&key));
        assert!(!sink.live_keys().contains(&key));
    }
    for i in 5..10 {
        assert_eq!(details[&format!("dep-{i}:127.0.0.1:{}", 9000 + i)].healthy, Some(true));
    }

    scheduler.stop().await;
}
