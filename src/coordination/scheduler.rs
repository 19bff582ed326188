//! Interval Scheduler
//!
//! Fires a callback on a fixed cadence. Every firing is spawned as its own
//! task, so a slow callback never delays the timer and may overlap with its
//! next invocation. Callbacks guard themselves against re-entry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Unit of a schedule interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        }
    }

    fn seconds(&self) -> u64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Minutes => 60,
            TimeUnit::Hours => 60 * 60,
            TimeUnit::Days => 24 * 60 * 60,
        }
    }
}

/// Cadence of a schedule, e.g. every 10 minutes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Every {
    pub interval: u64,
    pub units: TimeUnit,
}

impl Every {
    pub fn new(interval: u64, units: TimeUnit) -> Self {
        Self { interval, units }
    }

    pub fn to_duration(&self) -> Duration {
        Duration::from_secs(self.interval.saturating_mul(self.units.seconds()))
    }
}

impl fmt::Display for Every {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.interval, self.units.as_str())
    }
}

/// Identifies one active schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleHandle {
    id: u64,
}

impl ScheduleHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

struct ScheduleEntry {
    name: String,
    timer: JoinHandle<()>,
}

/// Owns the timer tasks of every schedule created through it
pub struct IntervalScheduler {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, ScheduleEntry>>,
}

impl Default for IntervalScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl IntervalScheduler {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fire `callback` every `every` until cancelled. The first firing happens
    /// one full interval after scheduling.
    pub fn schedule<F, Fut>(&self, name: &str, every: Every, callback: F) -> ScheduleHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.spawn_timer(name, every, None, callback)
    }

    /// Like [`schedule`](Self::schedule) but stops by itself after `repeats` firings.
    pub fn schedule_bounded<F, Fut>(
        &self,
        name: &str,
        every: Every,
        repeats: u32,
        callback: F,
    ) -> ScheduleHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.spawn_timer(name, every, Some(repeats), callback)
    }

    fn spawn_timer<F, Fut>(
        &self,
        name: &str,
        every: Every,
        repeats: Option<u32>,
        callback: F,
    ) -> ScheduleHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        // tokio rejects a zero period
        let period = every.to_duration().max(Duration::from_millis(1));
        let callback = Arc::new(callback);
        let job = name.to_string();

        info!("[{}] scheduled every {}", job, every);

        let timer = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut fired: u32 = 0;

            loop {
                ticker.tick().await;
                fired += 1;

                if let Some(limit) = repeats {
                    debug!("[{}] call {} of {}", job, fired, limit);
                }

                // Fire and forget: a panicking or slow callback stays in its own task.
                let callback = Arc::clone(&callback);
                tokio::spawn(async move { callback().await });

                if repeats.is_some_and(|limit| fired >= limit) {
                    debug!("[{}] stopping timer", job);
                    break;
                }
            }
        });

        self.lock_entries().insert(
            id,
            ScheduleEntry {
                name: name.to_string(),
                timer,
            },
        );

        ScheduleHandle { id }
    }

    /// Stop a schedule. Returns false when it was already cancelled.
    pub fn cancel(&self, handle: ScheduleHandle) -> bool {
        match self.lock_entries().remove(&handle.id) {
            Some(entry) => {
                entry.timer.abort();
                info!("[{}] schedule cancelled", entry.name);
                true
            }
            None => false,
        }
    }

    /// Stop every schedule, returning how many were still registered.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<ScheduleEntry> = self.lock_entries().drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.timer.abort();
            debug!("[{}] schedule cancelled", entry.name);
        }
        drained.len()
    }

    /// True while the timer is registered and has not run out of repeats.
    pub fn is_active(&self, handle: ScheduleHandle) -> bool {
        self.lock_entries()
            .get(&handle.id)
            .is_some_and(|entry| !entry.timer.is_finished())
    }

    pub fn active_count(&self) -> usize {
        self.lock_entries()
            .values()
            .filter(|entry| !entry.timer.is_finished())
            .count()
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<u64, ScheduleEntry>> {
        // A poisoned map still holds valid handles.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn units_convert_to_one_duration() {
        assert_eq!(Every::new(90, TimeUnit::Seconds).to_duration(), Duration::from_secs(90));
        assert_eq!(Every::new(10, TimeUnit::Minutes).to_duration(), Duration::from_secs(600));
        assert_eq!(Every::new(12, TimeUnit::Hours).to_duration(), Duration::from_secs(43_200));
        assert_eq!(Every::new(2, TimeUnit::Days).to_duration(), Duration::from_secs(172_800));
        assert_eq!(Every::new(10, TimeUnit::Minutes).to_string(), "10 minutes");
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_per_interval() {
        let scheduler = IntervalScheduler::new();
        let count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&count);

        let handle = scheduler.schedule("tick", Every::new(1, TimeUnit::Seconds), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0, "first firing waits a full interval");

        tokio::time::sleep(Duration::from_millis(3_000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(scheduler.is_active(handle));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_schedule_stops_after_repeats() {
        let scheduler = IntervalScheduler::new();
        let count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&count);

        let handle =
            scheduler.schedule_bounded("bounded", Every::new(1, TimeUnit::Seconds), 2, move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            });

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(!scheduler.is_active(handle));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_callbacks_overlap() {
        let scheduler = IntervalScheduler::new();
        let running = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));
        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));

        scheduler.schedule("slow", Every::new(1, TimeUnit::Seconds), move || {
            let (running, peak) = (Arc::clone(&r), Arc::clone(&p));
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent_and_stops_firing() {
        let scheduler = IntervalScheduler::new();
        let count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&count);

        let handle = scheduler.schedule("cancel", Every::new(1, TimeUnit::Seconds), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(scheduler.cancel(handle));
        assert!(!scheduler.cancel(handle));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.active_count(), 0);
    }

    async fn let_tasks_run() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_timer_fires_once_then_restarts_its_period() {
        let scheduler = IntervalScheduler::new();
        let count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&count);

        scheduler.schedule("stalled", Every::new(10, TimeUnit::Seconds), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        let_tasks_run().await;

        // Three periods missed at once: one catch-up call, no burst.
        tokio::time::advance(Duration::from_secs(35)).await;
        let_tasks_run().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // The next call is a full period after the catch-up, not on the old grid.
        tokio::time::advance(Duration::from_secs(9)).await;
        let_tasks_run().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        let_tasks_run().await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_callback_keeps_timer_alive() {
        let scheduler = IntervalScheduler::new();
        let count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&count);

        scheduler.schedule("panics", Every::new(1, TimeUnit::Seconds), move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first run fails");
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
