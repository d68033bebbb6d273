//! Check loop lifecycle management.
//!
//! Every monitored target gets its own background task that probes it on its
//! interval, stores the result, and raises alerts through the dispatcher. The
//! scheduler starts, restarts and stops these tasks and guarantees at most one
//! registered loop per target id.

use crate::alerts::{Alert, AlertDispatcher, FailurePolicy};
use crate::probe::Prober;
use crate::targets::Target;
use crate::targets::store::TargetStore;
use crate::utils::{MAX_DURATION, interval_or_default, timeout_or_default};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};

struct LoopHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LoopHandle {
    fn signal(&self) {
        let _ = self.stop.send(true);
    }
}

struct LoopContext {
    store: Arc<TargetStore>,
    prober: Arc<dyn Prober>,
    dispatcher: Arc<AlertDispatcher>,
    live: AtomicUsize,
}

/// Decrements the live-loop counter when a loop task ends, however it ends.
struct LiveGuard<'a>(&'a AtomicUsize);

impl<'a> LiveGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct CheckScheduler {
    running: RwLock<HashMap<String, LoopHandle>>,
    ctx: Arc<LoopContext>,
}

impl CheckScheduler {
    pub fn new(
        store: Arc<TargetStore>,
        prober: Arc<dyn Prober>,
        dispatcher: Arc<AlertDispatcher>,
    ) -> Self {
        Self {
            running: RwLock::new(HashMap::new()),
            ctx: Arc::new(LoopContext {
                store,
                prober,
                dispatcher,
                live: AtomicUsize::new(0),
            }),
        }
    }

    /// Starts the loop for `target`, or restarts it if one is already running.
    ///
    /// Interval and timeout are read once here; changing them needs a restart.
    #[tracing::instrument(skip(self, target), fields(target_id = %target.id))]
    pub async fn start(&self, target: &Target) {
        let interval = interval_or_default(&target.interval);
        let timeout = timeout_or_default(&target.timeout);
        let (stop, stop_rx) = watch::channel(false);

        let mut running = self.running.write().await;
        if let Some(previous) = running.remove(&target.id) {
            previous.signal();
        }

        let task = tokio::spawn(run_loop(
            Arc::clone(&self.ctx),
            target.id.clone(),
            interval,
            timeout,
            stop_rx,
        ));
        running.insert(target.id.clone(), LoopHandle { stop, task });

        tracing::debug!(
            name = "scheduler.start",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            target_id = %target.id,
            interval = ?interval,
            timeout = ?timeout,
            message = "Check loop started"
        );
    }

    /// Stops the loop for `id`. A probe in flight completes but its result is dropped.
    #[tracing::instrument(skip(self))]
    pub async fn stop(&self, id: &str) -> bool {
        let mut running = self.running.write().await;
        match running.remove(id) {
            Some(handle) => {
                handle.signal();
                true
            }
            None => false,
        }
    }

    /// Stops all loops and waits for their tasks to finish.
    #[tracing::instrument(skip(self))]
    pub async fn stop_all(&self) {
        let handles: Vec<LoopHandle> = {
            let mut running = self.running.write().await;
            running.drain().map(|(_, handle)| handle).collect()
        };
        for handle in &handles {
            handle.signal();
        }
        futures::future::join_all(handles.into_iter().map(|handle| handle.task)).await;
    }

    pub async fn is_running(&self, id: &str) -> bool {
        self.running.read().await.contains_key(id)
    }

    pub async fn running_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.running.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Loop tasks still executing, including ones already signalled to stop.
    pub fn live_loops(&self) -> usize {
        self.ctx.live.load(Ordering::SeqCst)
    }
}

async fn run_loop(
    ctx: Arc<LoopContext>,
    id: String,
    interval: Duration,
    timeout: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let _live = LiveGuard::enter(&ctx.live);
    let mut policy = FailurePolicy::new();

    if !check_once(&ctx, &id, timeout, &mut policy, &stop).await {
        return;
    }

    let now = Instant::now();
    let first_tick = now.checked_add(interval).unwrap_or(now + MAX_DURATION);
    let mut ticker = tokio::time::interval_at(first_tick, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                if !check_once(&ctx, &id, timeout, &mut policy, &stop).await {
                    break;
                }
            }
        }
    }

    tracing::debug!(
        name = "scheduler.loop_exit",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        target_id = %id,
        message = "Check loop stopped"
    );
}

/// Probes once, stores the result and raises the alert the policy asks for.
///
/// Returns `false` when the loop should end: stop was signalled or the target
/// is gone.
async fn check_once(
    ctx: &LoopContext,
    id: &str,
    timeout: Duration,
    policy: &mut FailurePolicy,
    stop: &watch::Receiver<bool>,
) -> bool {
    if *stop.borrow() {
        return false;
    }
    let Some(before) = ctx.store.get(id).await else {
        return false;
    };

    let status = ctx.prober.probe(&before, timeout).await;
    if *stop.borrow() {
        return false;
    }
    if !ctx.store.set_status(id, status.clone()).await {
        return false;
    }

    if let Some(verdict) = policy.observe(before.status.is_up, status.is_up) {
        tracing::info!(
            name = "scheduler.transition",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            target_id = %id,
            server_name = %before.name,
            verdict = %verdict.label(),
            message = "Status change detected"
        );
        ctx.dispatcher
            .dispatch(Alert::from_verdict(&before, verdict, &status))
            .await;
    }
    true
}
