use std::{sync::Arc, time::Duration};

use chrono::NaiveDate;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::utils::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Stopped,
    Paused,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub previous: Phase,
    pub current: Phase,
}

/// Called synchronously from the mutating call, before it returns. It must not call back into
/// the tracker.
pub type PhaseListener = Box<dyn Fn(PhaseChange) + Send + Sync>;

/// Result of closing a calendar day. `total` belongs to `day` and should be persisted for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRollover {
    pub day: NaiveDate,
    pub total: Duration,
}

/// Time accounting for a single activity.
///
/// `elapsed` covers the current run (since the last stop or day reset) while `total_today` holds
/// what was already flushed for the current day. Only [TimeTracker::stop] and
/// [TimeTracker::day_reset] move time from one to the other. All operations are total, calls
/// that don't make sense in the current phase do nothing.
pub struct TimeTracker {
    phase: Phase,
    started_at: Option<Instant>,
    elapsed_buffer: Duration,
    total_today: Duration,
    day: NaiveDate,
    clock: Arc<dyn Clock>,
    listener: Option<PhaseListener>,
}

impl TimeTracker {
    /// `seed` is the time already spent today, as recovered from storage.
    pub fn new(clock: Arc<dyn Clock>, seed: Duration, listener: Option<PhaseListener>) -> Self {
        let day = clock.today();
        Self {
            phase: Phase::Stopped,
            started_at: None,
            elapsed_buffer: Duration::ZERO,
            total_today: seed,
            day,
            clock,
            listener,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn total_today(&self) -> Duration {
        self.total_today
    }

    /// Calendar day `total_today` is accumulated for.
    pub fn day(&self) -> NaiveDate {
        self.day
    }

    /// Time of the current run. Doesn't change anything, so it can be polled for display.
    pub fn elapsed(&self) -> Duration {
        match self.started_at {
            Some(started_at) => self.elapsed_buffer + self.clock.instant().duration_since(started_at),
            None => self.elapsed_buffer,
        }
    }

    /// Everything spent today, including the open interval.
    pub fn observed_total(&self) -> Duration {
        self.total_today + self.elapsed()
    }

    /// Starts or resumes tracking. Calling it while running keeps the current interval.
    pub fn start(&mut self) {
        if self.phase == Phase::Running {
            debug!("Already running, ignoring start");
            return;
        }
        self.started_at = Some(self.clock.instant());
        self.set_phase(Phase::Running);
    }

    /// Moves the current run into `total_today`. Persisting the new total is up to the caller.
    pub fn stop(&mut self) {
        self.total_today += self.elapsed();
        self.started_at = None;
        self.elapsed_buffer = Duration::ZERO;
        self.set_phase(Phase::Stopped);
    }

    pub fn pause(&mut self) {
        let Some(started_at) = self.started_at.take() else {
            debug!("Not running, ignoring pause");
            return;
        };
        self.elapsed_buffer += self.clock.instant().duration_since(started_at);
        self.set_phase(Phase::Paused);
    }

    /// Closes the current day. A running interval is split at this moment: the part before goes
    /// into the closed day and tracking continues from zero. When not running nothing is flushed.
    /// Afterwards the tracker accumulates for the current local day.
    pub fn day_reset(&mut self) -> DayRollover {
        if self.phase == Phase::Running {
            self.total_today += self.elapsed();
            self.started_at = Some(self.clock.instant());
            self.elapsed_buffer = Duration::ZERO;
        }
        let rollover = DayRollover {
            day: self.day,
            total: self.total_today,
        };
        self.total_today = Duration::ZERO;
        self.day = self.clock.today();
        info!(
            "Closed {} with {:?}, now tracking {}",
            rollover.day, rollover.total, self.day
        );
        rollover
    }

    fn set_phase(&mut self, phase: Phase) {
        let previous = self.phase;
        self.phase = phase;
        if previous == phase {
            return;
        }
        info!("Tracking {previous:?} -> {phase:?}");
        if let Some(listener) = &self.listener {
            listener(PhaseChange {
                previous,
                current: phase,
            });
        }
    }
}
