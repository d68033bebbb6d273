//! Tests for the check loop scheduler and the alert pipeline behind it.

use rust_uptime_monitor::alerts::local::NotifyError;
use rust_uptime_monitor::alerts::{
    Alert, AlertDispatcher, AlertKind, LocalNotifier, NotificationThrottler,
};
use rust_uptime_monitor::mail::MailRelay;
use rust_uptime_monitor::probe::{ProbeFuture, Prober};
use rust_uptime_monitor::scheduler::CheckScheduler;
use rust_uptime_monitor::targets::store::TargetStore;
use rust_uptime_monitor::targets::{Status, Target};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, Instant, sleep};

/// Plays back scripted results, then repeats the fallback forever.
struct ScriptedProber {
    script: Mutex<VecDeque<bool>>,
    fallback: bool,
    calls: AtomicUsize,
}

impl ScriptedProber {
    fn new(script: &[bool], fallback: bool) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Prober for ScriptedProber {
    fn probe<'a>(&'a self, _target: &'a Target, _timeout: Duration) -> ProbeFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let up = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(self.fallback);
            if up {
                Status::up(1)
            } else {
                Status::down(1, "scripted failure")
            }
        })
    }
}

#[derive(Default)]
struct RecordingNotifier(Mutex<Vec<Alert>>);

impl RecordingNotifier {
    fn kinds(&self) -> Vec<AlertKind> {
        self.0.lock().unwrap().iter().map(|a| a.kind).collect()
    }
}

impl LocalNotifier for RecordingNotifier {
    fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.0.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

struct Harness {
    store: Arc<TargetStore>,
    throttler: Arc<NotificationThrottler>,
    notifier: Arc<RecordingNotifier>,
    prober: Arc<ScriptedProber>,
    scheduler: CheckScheduler,
}

fn harness(prober: ScriptedProber) -> Harness {
    let store = Arc::new(TargetStore::new());
    let throttler = Arc::new(NotificationThrottler::new(10));
    let notifier = Arc::new(RecordingNotifier::default());
    let prober = Arc::new(prober);
    let dispatcher = Arc::new(AlertDispatcher::new(
        Arc::clone(&throttler),
        notifier.clone(),
        Arc::new(MailRelay::new("localhost")),
        "alert@monitoring-app.local",
    ));
    let scheduler = CheckScheduler::new(Arc::clone(&store), prober.clone(), dispatcher);
    Harness {
        store,
        throttler,
        notifier,
        prober,
        scheduler,
    }
}

fn target(id: &str, interval: &str) -> Target {
    Target::new(format!("server-{id}"), "127.0.0.1:9", "tcp")
        .with_id(id)
        .with_interval(interval)
}

/// Polls `cond` until it holds or two seconds pass.
async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    cond()
}

#[tokio::test]
async fn test_restart_keeps_a_single_loop_per_id() {
    let h = harness(ScriptedProber::new(&[], true));
    let t = target("a", "50ms");
    h.store.upsert(t.clone()).await.unwrap();

    for _ in 0..3 {
        h.scheduler.start(&t).await;
    }

    assert_eq!(h.scheduler.running_ids().await, vec!["a".to_string()]);
    assert!(eventually(|| h.scheduler.live_loops() == 1).await);

    // Still exactly one loop after a few ticks.
    sleep(Duration::from_millis(150)).await;
    assert_eq!(h.scheduler.live_loops(), 1);
    h.scheduler.stop_all().await;
    assert_eq!(h.scheduler.live_loops(), 0);
}

#[tokio::test]
async fn test_stop_ends_the_loop() {
    let h = harness(ScriptedProber::new(&[], true));
    let t = target("a", "20ms");
    h.store.upsert(t.clone()).await.unwrap();
    h.scheduler.start(&t).await;
    assert!(h.scheduler.is_running("a").await);
    assert!(eventually(|| h.prober.calls.load(Ordering::SeqCst) >= 2).await);

    assert!(h.scheduler.stop("a").await);
    assert!(!h.scheduler.is_running("a").await);
    assert!(eventually(|| h.scheduler.live_loops() == 0).await);

    let calls = h.prober.calls.load(Ordering::SeqCst);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(h.prober.calls.load(Ordering::SeqCst), calls);
    assert!(!h.scheduler.stop("a").await);
}

#[tokio::test]
async fn test_removed_target_ends_its_loop() {
    let h = harness(ScriptedProber::new(&[], true));
    let t = target("gone", "20ms");
    h.store.upsert(t.clone()).await.unwrap();
    h.scheduler.start(&t).await;
    assert!(eventually(|| h.prober.calls.load(Ordering::SeqCst) >= 1).await);

    h.store.remove("gone").await;
    assert!(eventually(|| h.scheduler.live_loops() == 0).await);
}

#[tokio::test]
async fn test_status_is_written_to_the_store() {
    let h = harness(ScriptedProber::new(&[false], true));
    let t = target("a", "30ms");
    h.store.upsert(t.clone()).await.unwrap();
    h.scheduler.start(&t).await;

    let store = Arc::clone(&h.store);
    let mut seen_down = false;
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        let status = store.status("a").await.unwrap();
        if status.last_check.is_some() && !status.is_up {
            seen_down = true;
            assert_eq!(status.last_error.as_deref(), Some("scripted failure"));
        }
        if seen_down && status.is_up {
            break;
        }
        sleep(Duration::from_millis(5)).await;
    }
    assert!(seen_down);
    assert!(store.status("a").await.unwrap().is_up);
    h.scheduler.stop_all().await;
}

#[tokio::test]
async fn test_third_failure_after_up_escalates_to_critical() {
    let h = harness(ScriptedProber::new(&[], false));
    let t = target("a", "20ms");
    let mut up = t.clone();
    up.status = Status::up(1);
    h.store.upsert(up).await.unwrap();
    h.scheduler.start(&t).await;

    assert!(eventually(|| h.prober.calls.load(Ordering::SeqCst) >= 3).await);
    assert!(eventually(|| h.notifier.kinds().len() >= 2).await);
    h.scheduler.stop_all().await;

    let kinds = h.notifier.kinds();
    assert_eq!(kinds[0], AlertKind::Down);
    assert_eq!(kinds[1], AlertKind::Critical);
    let alerts = h.notifier.0.lock().unwrap();
    assert_eq!(alerts[1].label, "DOWN (failures: 3)");
}

#[tokio::test]
async fn test_disabled_notifications_still_update_statuses() {
    let h = harness(ScriptedProber::new(&[true, false, true, false], true));
    h.throttler.set_enabled(false);
    let t = target("a", "20ms");
    h.store.upsert(t.clone()).await.unwrap();
    h.scheduler.start(&t).await;

    assert!(eventually(|| h.prober.calls.load(Ordering::SeqCst) >= 5).await);
    h.scheduler.stop_all().await;

    assert!(h.notifier.kinds().is_empty());
    assert!(h.throttler.last_sent("a", AlertKind::Down).is_none());
    let status = h.store.status("a").await.unwrap();
    assert!(status.last_check.is_some());
}

#[tokio::test]
async fn test_flapping_target_is_throttled_per_kind() {
    // up, down, up, down... with a ten minute cooldown
    let h = harness(ScriptedProber::new(
        &[true, false, true, false, true, false],
        true,
    ));
    let t = target("a", "20ms");
    h.store.upsert(t.clone()).await.unwrap();
    h.scheduler.start(&t).await;

    assert!(eventually(|| h.prober.calls.load(Ordering::SeqCst) >= 6).await);
    h.scheduler.stop_all().await;

    // first check reports UP (initial status is down), then one DOWN; repeats are suppressed
    assert_eq!(h.notifier.kinds(), vec![AlertKind::Up, AlertKind::Down]);
}

#[tokio::test]
async fn test_huge_interval_keeps_the_loop_alive() {
    let h = harness(ScriptedProber::new(&[], true));
    let t = target("slow", "10000000000000000000");
    h.store.upsert(t.clone()).await.unwrap();
    h.scheduler.start(&t).await;

    assert!(eventually(|| h.prober.calls.load(Ordering::SeqCst) >= 1).await);
    sleep(Duration::from_millis(100)).await;

    assert!(h.scheduler.is_running("slow").await);
    assert_eq!(h.scheduler.live_loops(), 1);
    assert_eq!(h.prober.calls.load(Ordering::SeqCst), 1);
    h.scheduler.stop_all().await;
    assert_eq!(h.scheduler.live_loops(), 0);
}
