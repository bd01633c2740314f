//! The analytics service: one handle owning every cache.
//!
//! Readers get `Arc`s out of an immutable [`Snapshot`]. `refresh()` and
//! `update_range()` build a new snapshot from clones and swap it in, so a
//! reader never sees a half-applied update.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::StatsError;
use crate::index::RunHistory;
use crate::range::{DateWindow, RangeCache, parse_date_range};
use crate::run::{Run, RunSource};
use crate::stats::{RunStats, RunStatsByDate, StatsPolicy};
use crate::streaks::{StreakCache, StreakDetector, StreakView};

/// Everything readers can see, as of one refresh.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub all: Arc<RunStats>,
    pub by_date: Arc<RunStatsByDate>,
    pub streaks: Arc<StreakCache>,
}

impl Snapshot {
    fn empty(since: Option<NaiveDateTime>) -> Self {
        Self {
            all: Arc::new(RunStats::new()),
            by_date: Arc::new(RunStatsByDate::new(DateWindow::all_time())),
            streaks: Arc::new(StreakCache::empty(Arc::new(RunHistory::default()), since)),
        }
    }
}

/// JSON shape handed to command and web layers.
#[derive(Debug, Serialize)]
pub struct Report {
    pub all: RunStats,
    pub by_date: RunStatsByDate,
    pub streaks: Vec<StreakView>,
}

pub struct AnalyticsCache {
    source: Arc<dyn RunSource>,
    profile: usize,
    policy: StatsPolicy,
    since: Option<NaiveDateTime>,
    source_timeout: Duration,
    range: Mutex<RangeCache>,
    snapshot: RwLock<Arc<Snapshot>>,
    /// Serializes snapshot writers (refresh, range changes).
    write_lock: Mutex<()>,
}

impl AnalyticsCache {
    pub fn new(source: Arc<dyn RunSource>, config: &Config) -> Self {
        let since = config.streak_since();
        Self {
            source,
            profile: config.profile,
            policy: config.policy,
            since,
            source_timeout: config.source_timeout(),
            range: Mutex::new(RangeCache::new(config.range_file.clone())),
            snapshot: RwLock::new(Arc::new(Snapshot::empty(since))),
            write_lock: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        match self.snapshot.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn publish(&self, next: Snapshot) {
        let next = Arc::new(next);
        match self.snapshot.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Pull the run log and bring every cache up to date.
    ///
    /// Returns true if a new snapshot was published. Cheap when nothing was
    /// appended since the last call.
    pub async fn refresh(&self) -> bool {
        let _lock = self.write_lock.lock().await;
        let window = self.persisted_window().await;
        let runs = self.fetch_runs().await;
        let current = self.snapshot();

        let history = match RunHistory::from_newest_first(runs) {
            Ok(history) => history,
            Err(e) => {
                tracing::error!("stats: {e}; treating as no runs");
                RunHistory::default()
            }
        };

        let previous = current.streaks.history();
        let reshaped = !previous.same_shape(&history);
        let appended_only = history.starts_with(previous);

        // Appends rebuild the index and containers in one O(n) pass: a new
        // win can turn a short group into a winning container, which changes
        // how older non-winning groups merge. Counters below stay O(new runs).
        let streaks = if reshaped {
            Arc::new(self.detect(Arc::new(history)))
        } else {
            Arc::clone(&current.streaks)
        };

        // A rewritten log invalidates incremental state; start cold.
        let (mut all, mut by_date) = if appended_only {
            ((*current.all).clone(), (*current.by_date).clone())
        } else {
            tracing::info!("stats: run log rewritten, rebuilding from scratch");
            (RunStats::new(), RunStatsByDate::new(window))
        };
        if by_date.window != window {
            by_date = RunStatsByDate::new(window);
        }
        all.refresh(&streaks, None, &self.policy);
        by_date.refresh(&streaks, &self.policy);

        let all_changed = all != *current.all;
        let by_date_changed = by_date != *current.by_date;
        if !reshaped && !all_changed && !by_date_changed {
            return false;
        }

        if let Some(latest) = streaks.history().latest().and_then(|id| streaks.history().get(id)) {
            tracing::info!(
                run = %latest.id,
                character = latest.character.as_str(),
                won = latest.won,
                "stats: refreshed"
            );
        }
        self.publish(Snapshot {
            all: if all_changed { Arc::new(all) } else { Arc::clone(&current.all) },
            by_date: if by_date_changed {
                Arc::new(by_date)
            } else {
                Arc::clone(&current.by_date)
            },
            streaks,
        });
        true
    }

    fn detect(&self, history: Arc<RunHistory>) -> StreakCache {
        match StreakDetector::new(self.since).detect(Arc::clone(&history)) {
            Ok(cache) => cache,
            Err(e) => {
                tracing::error!("stats: streak detection failed: {e}");
                StreakCache::empty(history, self.since)
            }
        }
    }

    /// Source failures and timeouts degrade to an empty log.
    async fn fetch_runs(&self) -> Vec<Run> {
        let source = Arc::clone(&self.source);
        let profile = self.profile;
        let task = tokio::task::spawn_blocking(move || source.runs(profile));

        match tokio::time::timeout(self.source_timeout, task).await {
            Ok(Ok(Ok(runs))) => runs,
            Ok(Ok(Err(e))) => {
                if e.is_degradable() {
                    tracing::warn!("source: {e}; treating as no runs");
                } else {
                    tracing::error!("source: {e}; treating as no runs");
                }
                Vec::new()
            }
            Ok(Err(e)) => {
                tracing::warn!("source: read task failed: {e}; treating as no runs");
                Vec::new()
            }
            Err(_) => {
                let e = StatsError::SourceTimeout(self.source_timeout.as_millis() as u64);
                tracing::warn!("source: {e}; treating as no runs");
                Vec::new()
            }
        }
    }

    /// The persisted window, loading it on first use.
    async fn persisted_window(&self) -> DateWindow {
        let mut range = self.range.lock().await;
        if !range.is_loaded() {
            range.load().await;
        }
        range.window()
    }

    /// Rebuild the cached windowed stats for `window` from the current runs.
    fn install_window(&self, window: DateWindow) {
        let current = self.snapshot();
        let mut by_date = RunStatsByDate::new(window);
        by_date.refresh(&current.streaks, &self.policy);
        self.publish(Snapshot {
            by_date: Arc::new(by_date),
            ..(*current).clone()
        });
    }

    async fn ensure_range_loaded(&self) {
        if self.range.lock().await.is_loaded() {
            return;
        }
        let _lock = self.write_lock.lock().await;
        let window = self.persisted_window().await;
        if self.snapshot().by_date.window != window {
            self.install_window(window);
        }
    }

    pub fn get_all_run_stats(&self) -> Arc<RunStats> {
        Arc::clone(&self.snapshot().all)
    }

    /// Stats for a window. Both `None` means the persisted window.
    ///
    /// The persisted window (or one equal to it) returns the cached instance;
    /// any other window is computed on the spot and not kept.
    pub async fn get_run_stats_by_date(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Arc<RunStatsByDate> {
        self.ensure_range_loaded().await;
        let current = self.snapshot();
        if start.is_none() && end.is_none() {
            return Arc::clone(&current.by_date);
        }

        let requested = DateWindow { start, end };
        if current.by_date.window == requested {
            return Arc::clone(&current.by_date);
        }
        let mut ad_hoc = RunStatsByDate::new(requested);
        ad_hoc.refresh(&current.streaks, &self.policy);
        Arc::new(ad_hoc)
    }

    /// Like [`Self::get_run_stats_by_date`] with a range expression such as `2023/06-2023/08`.
    pub async fn get_run_stats_by_date_string(
        &self,
        expr: &str,
    ) -> Result<Arc<RunStatsByDate>, StatsError> {
        let window = parse_date_range(expr)?;
        Ok(self.get_run_stats_by_date(window.start, window.end).await)
    }

    /// Persist a new window and rebuild the cached windowed stats for it.
    ///
    /// Bounds widen to whole calendar days, which is what the range file
    /// keeps. A failed write is logged; the new window still applies for
    /// this process.
    pub async fn update_range(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<(), StatsError> {
        let window = DateWindow::from_dates(start.map(|s| s.date()), end.map(|e| e.date()));
        window.validate()?;
        let _lock = self.write_lock.lock().await;
        {
            let mut range = self.range.lock().await;
            if let Err(e) = range.update(window).await {
                tracing::warn!(
                    "range: failed to persist to {}: {e}",
                    range.path().display()
                );
            }
        }
        self.install_window(window);
        Ok(())
    }

    /// Containers newest first.
    pub fn get_streak_cache(&self) -> Arc<StreakCache> {
        Arc::clone(&self.snapshot().streaks)
    }

    pub async fn report(&self) -> Report {
        let by_date = self.get_run_stats_by_date(None, None).await;
        let current = self.snapshot();
        Report {
            all: (*current.all).clone(),
            by_date: (*by_date).clone(),
            streaks: current.streaks.views(),
        }
    }

    /// Refresh on a fixed period until the handle is aborted.
    pub fn spawn_refresh_loop(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.refresh().await;
            }
        })
    }
}
