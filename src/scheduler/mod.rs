//! Tiered job scheduler.
//!
//! Owns a set of named job slots, each driven by its own trigger on the
//! shared runtime. Re-registering an id replaces the existing slot rather
//! than duplicating it. Shutdown stops every slot and waits a bounded
//! grace period for in-flight bodies before abandoning them.

mod retention;

pub use retention::*;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

/// Sweep interval for high-priority targets.
pub const HIGH_PRIORITY_INTERVAL: Duration = Duration::from_secs(300);
/// Sweep interval for medium-priority targets.
pub const MEDIUM_PRIORITY_INTERVAL: Duration = Duration::from_secs(600);
/// Daily recommendation synthesis hour (UTC).
pub const RECOMMENDATION_HOUR: u32 = 9;
/// Daily retention sweep hour (UTC).
pub const RETENTION_HOUR: u32 = 2;

/// How long shutdown waits for each in-flight job body.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

type JobFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// When a job slot fires.
#[derive(Debug, Clone, Copy)]
pub enum Trigger {
    /// Every `period`, first firing one period after start.
    Interval(Duration),
    /// Daily at the given UTC wall-clock time.
    Daily { hour: u32, minute: u32 },
    /// Once, immediately after start, off the registering task.
    Once,
}

struct Slot {
    trigger: Trigger,
    job: JobFn,
    stop: Option<broadcast::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

struct Inner {
    slots: HashMap<String, Slot>,
    started: bool,
}

/// Scheduler owning all periodic and one-shot jobs.
pub struct Scheduler {
    inner: Mutex<Inner>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: HashMap::new(),
                started: false,
            }),
        }
    }

    /// Register a job slot. An existing slot with the same id is stopped
    /// and replaced. When the scheduler is already running the new slot
    /// starts immediately.
    pub async fn register<F, Fut>(&self, id: &str, trigger: Trigger, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let job: JobFn = Arc::new(move || -> Pin<Box<dyn Future<Output = ()> + Send>> {
            Box::pin(job())
        });

        let mut inner = self.inner.lock().await;
        if let Some(mut existing) = inner.slots.remove(id) {
            tracing::info!("Replacing scheduled job {}", id);
            if let Some(stop) = existing.stop.take() {
                let _ = stop.send(());
            }
        }

        let mut slot = Slot {
            trigger,
            job,
            stop: None,
            handle: None,
        };
        if inner.started {
            spawn_slot(id, &mut slot);
        }
        inner.slots.insert(id.to_string(), slot);
    }

    /// Activate every registered slot. Subsequent registrations start on
    /// their own; calling start again does nothing.
    pub async fn start(&self) {
        let mut inner = self.inner.lock().await;
        if inner.started {
            return;
        }
        inner.started = true;

        for (id, slot) in inner.slots.iter_mut() {
            spawn_slot(id, slot);
        }
        tracing::info!("Scheduler started with {} jobs", inner.slots.len());
    }

    /// Stop every slot, waiting up to the grace period for each in-flight
    /// body before aborting it. Never hangs.
    pub async fn shutdown(&self) {
        let slots = {
            let mut inner = self.inner.lock().await;
            std::mem::take(&mut inner.slots)
        };

        let mut handles = Vec::new();
        for (id, mut slot) in slots {
            if let Some(stop) = slot.stop.take() {
                let _ = stop.send(());
            }
            if let Some(handle) = slot.handle.take() {
                handles.push((id, handle));
            }
        }

        for (id, handle) in handles {
            let abort = handle.abort_handle();
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                tracing::warn!("Job {} did not stop within grace period; aborting", id);
                abort.abort();
            }
        }
        tracing::info!("Scheduler stopped");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_slot(id: &str, slot: &mut Slot) {
    let (stop_tx, stop_rx) = broadcast::channel(1);
    let handle = tokio::spawn(run_slot(
        id.to_string(),
        slot.trigger,
        slot.job.clone(),
        stop_rx,
    ));
    slot.stop = Some(stop_tx);
    slot.handle = Some(handle);
}

async fn run_slot(id: String, trigger: Trigger, job: JobFn, mut stop: broadcast::Receiver<()>) {
    match trigger {
        Trigger::Once => {
            tokio::select! {
                _ = stop.recv() => {}
                _ = job() => {}
            }
        }
        Trigger::Interval(period) => {
            let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = stop.recv() => break,
                    _ = timer.tick() => job().await,
                }
            }
        }
        Trigger::Daily { hour, minute } => loop {
            let delay = until_next_daily_from(Utc::now(), hour, minute);
            tracing::debug!("Job {} sleeping {:?} until next run", id, delay);
            tokio::select! {
                _ = stop.recv() => break,
                _ = tokio::time::sleep(delay) => job().await,
            }
        },
    }
}

/// Time from `now` until the next UTC occurrence of `hour:minute`.
fn until_next_daily_from(now: DateTime<Utc>, hour: u32, minute: u32) -> Duration {
    let Some(at) = now.date_naive().and_hms_opt(hour, minute, 0) else {
        return Duration::from_secs(24 * 3600);
    };
    let mut next = at.and_utc();
    if next <= now {
        next += ChronoDuration::days(1);
    }
    (next - now).to_std().unwrap_or(Duration::ZERO)
}
