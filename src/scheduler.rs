use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Shortest tick period a scheduler will run at.
pub const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

/// Monotonic time source, measured from an arbitrary origin.
pub trait Clock: Send {
    fn now(&self) -> Duration;
}

/// Real monotonic clock.
///
/// Built on tokio's `Instant`, so a paused tokio runtime also pauses it.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: tokio::time::Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_us: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Saturates at `u64::MAX` microseconds.
    pub fn advance(&self, by: Duration) {
        let delta = u64::try_from(by.as_micros()).unwrap_or(u64::MAX);
        let _ = self
            .now_us
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| Some(now.saturating_add(delta)));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.now_us.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchedulerStats {
    pub total_starts: u32,
    pub total_stops: u32,
    pub total_ticks: u64,
}

/// Fixed-period tick source.
///
/// Holds at most one armed deadline; `start` and `stop` are no-ops when the
/// scheduler is already in the requested state.
#[derive(Debug)]
pub struct TickScheduler {
    period: Duration,
    next_due: Option<Duration>,
    stats: SchedulerStats,
}

impl TickScheduler {
    /// Periods below [`MIN_TICK_PERIOD`] are raised to it.
    pub fn new(period: Duration) -> Self {
        let period = if period < MIN_TICK_PERIOD {
            warn!("Tick period {:?} too short; using {:?}", period, MIN_TICK_PERIOD);
            MIN_TICK_PERIOD
        } else {
            period
        };

        Self {
            period,
            next_due: None,
            stats: SchedulerStats::default(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    /// Number of pending timers; never more than one.
    pub fn armed_timers(&self) -> usize {
        usize::from(self.next_due.is_some())
    }

    /// Arms the first tick one period from `now`. Returns `false` if
    /// already running.
    pub fn start(&mut self, now: Duration) -> bool {
        if self.is_running() {
            return false;
        }
        self.next_due = Some(now + self.period);
        self.stats.total_starts += 1;
        true
    }

    /// Disarms the timer. Returns `false` if not running.
    pub fn stop(&mut self) -> bool {
        if self.next_due.take().is_none() {
            return false;
        }
        self.stats.total_stops += 1;
        true
    }

    /// Consumes every period that has elapsed by `now` and returns how many
    /// ticks are due.
    pub fn poll(&mut self, now: Duration) -> u32 {
        let Some(mut due) = self.next_due else {
            return 0;
        };

        let mut ticks = 0;
        while now >= due {
            ticks += 1;
            due += self.period;
        }

        self.next_due = Some(due);
        self.stats.total_ticks += u64::from(ticks);
        ticks
    }

    /// Delay until the next tick, or `None` when stopped.
    pub fn time_until_next(&self, now: Duration) -> Option<Duration> {
        self.next_due.map(|due| due.saturating_sub(now))
    }

    pub fn get_stats(&self) -> &SchedulerStats {
        &self.stats
    }
}
