use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use qb_common::Settings;
use tracing::{error, info};

/// Tracks which (day, job) pairs have already fired, so a job that matches
/// its scheduled time on several consecutive ticks still only runs once per
/// calendar day. Deliberately synchronous and side-effect-free: no clock,
/// no I/O, easy to drive directly from a test.
#[derive(Default)]
pub struct ExecutedTracker {
    executed: HashSet<(NaiveDate, &'static str)>,
}

impl ExecutedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` and records the firing if `job` hasn't already run
    /// today; returns `false` if it has. Entries from prior days are
    /// dropped first so the set doesn't grow without bound.
    pub fn try_mark(&mut self, today: NaiveDate, job: &'static str) -> bool {
        self.executed.retain(|(day, _)| *day == today);
        self.executed.insert((today, job))
    }
}

const TICK_INTERVAL: Duration = Duration::from_secs(30);

/// One scheduled job: an enabled flag, an `HH:mm` fire time, and the async
/// work to run when it fires.
pub struct ScheduledJob {
    pub name: &'static str,
    pub dispatch: Box<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>,
}

/// Wall-clock scheduler. Ticks every 30 seconds, reloads settings on every
/// tick (so a user edit takes effect within one tick), and dispatches a
/// job's work the first time its `HH:mm` matches the current time on a
/// given day. Never runs a job while the task runner is already busy — the
/// tick is simply skipped and retried on the next one.
pub struct Scheduler {
    settings_path: std::path::PathBuf,
    is_busy: Arc<dyn Fn() -> bool + Send + Sync>,
    auto_extract: ScheduledJob,
    auto_update: ScheduledJob,
    tracker: tokio::sync::Mutex<ExecutedTracker>,
}

impl Scheduler {
    pub fn new(
        settings_path: std::path::PathBuf,
        is_busy: Arc<dyn Fn() -> bool + Send + Sync>,
        auto_extract: ScheduledJob,
        auto_update: ScheduledJob,
    ) -> Self {
        Self {
            settings_path,
            is_busy,
            auto_extract,
            auto_update,
            tracker: tokio::sync::Mutex::new(ExecutedTracker::new()),
        }
    }

    /// Evaluates one tick against `now`. Exposed directly so a test can
    /// drive arbitrary timestamps without real sleeping.
    pub async fn tick(&self, now: DateTime<Utc>) {
        if (self.is_busy)() {
            return;
        }

        let settings = match Settings::load_or_init(&self.settings_path) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to load settings during scheduler tick");
                return;
            }
        };

        let today = now.date_naive();
        let current_hhmm = now.format("%H:%M").to_string();

        if settings.auto_extract_enabled && settings.auto_extract_time == current_hhmm {
            let mut tracker = self.tracker.lock().await;
            if tracker.try_mark(today, self.auto_extract.name) {
                info!(job = self.auto_extract.name, "scheduled job firing");
                (self.auto_extract.dispatch)().await;
            }
        }

        if settings.auto_update_enabled && settings.auto_update_time == current_hhmm {
            let mut tracker = self.tracker.lock().await;
            if tracker.try_mark(today, self.auto_update.name) {
                info!(job = self.auto_update.name, "scheduled job firing");
                (self.auto_update.dispatch)().await;
            }
        }
    }

    /// Runs the tick loop forever. Intended to be spawned once at startup.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            interval.tick().await;
            self.tick(Utc::now()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn fires_once_per_day_then_refuses_a_repeat() {
        let mut tracker = ExecutedTracker::new();
        assert!(tracker.try_mark(d("2026-07-27"), "auto_extract"));
        assert!(!tracker.try_mark(d("2026-07-27"), "auto_extract"));
    }

    #[test]
    fn different_jobs_on_the_same_day_are_independent() {
        let mut tracker = ExecutedTracker::new();
        assert!(tracker.try_mark(d("2026-07-27"), "auto_extract"));
        assert!(tracker.try_mark(d("2026-07-27"), "auto_update"));
    }

    #[test]
    fn a_new_day_resets_the_tracker() {
        let mut tracker = ExecutedTracker::new();
        assert!(tracker.try_mark(d("2026-07-27"), "auto_extract"));
        assert!(tracker.try_mark(d("2026-07-28"), "auto_extract"));
    }

    #[tokio::test]
    async fn tick_skips_dispatch_while_task_runner_busy() {
        let dir = tempfile_dir();
        let settings_path = dir.join("settings.json");
        qb_common::Settings {
            auto_extract_enabled: true,
            auto_extract_time: "08:00".to_string(),
            ..Default::default()
        }
        .write(&settings_path)
        .unwrap();

        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fired_clone = fired.clone();

        let scheduler = Scheduler::new(
            settings_path,
            Arc::new(|| true),
            ScheduledJob {
                name: "auto_extract",
                dispatch: Box::new(move || {
                    let fired = fired_clone.clone();
                    Box::pin(async move {
                        fired.store(true, std::sync::atomic::Ordering::SeqCst);
                    })
                }),
            },
            ScheduledJob {
                name: "auto_update",
                dispatch: Box::new(|| Box::pin(async {})),
            },
        );

        let now = Utc.with_ymd_and_hms(2026, 7, 27, 8, 0, 0).unwrap();
        scheduler.tick(now).await;
        assert!(!fired.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn tick_dispatches_matching_job_exactly_once() {
        let dir = tempfile_dir();
        let settings_path = dir.join("settings.json");
        qb_common::Settings {
            auto_extract_enabled: true,
            auto_extract_time: "08:00".to_string(),
            ..Default::default()
        }
        .write(&settings_path)
        .unwrap();

        let fire_count = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let fire_count_clone = fire_count.clone();

        let scheduler = Scheduler::new(
            settings_path,
            Arc::new(|| false),
            ScheduledJob {
                name: "auto_extract",
                dispatch: Box::new(move || {
                    let fire_count = fire_count_clone.clone();
                    Box::pin(async move {
                        fire_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    })
                }),
            },
            ScheduledJob {
                name: "auto_update",
                dispatch: Box::new(|| Box::pin(async {})),
            },
        );

        let now = Utc.with_ymd_and_hms(2026, 7, 27, 8, 0, 0).unwrap();
        scheduler.tick(now).await;
        scheduler.tick(now).await;
        assert_eq!(fire_count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    fn tempfile_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "qb-scheduler-test-{:?}",
            std::thread::current().id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
