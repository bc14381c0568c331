use std::{sync::Arc, time::Duration};

use anyhow::Result;
use chrono::NaiveDate;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::utils::clock::Clock;

use super::{
    event::TrackerEvent,
    notification::{format_elapsed, NotificationSink},
    recovery::{day_to_scalar, duration_to_ms, SPENT_TIME_DAY_KEY, SPENT_TIME_KEY},
    scheduler::{Scheduler, DAY_BOUNDARY},
    state::{Phase, TimeTracker},
    storage::durable_store::DurableStore,
};

/// Connects triggers and toggle requests to the [TimeTracker] and the [DurableStore].
///
/// Events are consumed one by one from a single queue, so tracker mutations never overlap and
/// a persistence write always finishes before the next event is looked at.
pub struct Orchestrator<S: DurableStore> {
    tracker: TimeTracker,
    store: S,
    scheduler: Scheduler,
    sink: Box<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    receiver: UnboundedReceiver<TrackerEvent>,
    shutdown: CancellationToken,
    time_cap: Duration,
    day_boundary_armed: bool,
}

impl<S: DurableStore> Orchestrator<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tracker: TimeTracker,
        store: S,
        scheduler: Scheduler,
        sink: Box<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        receiver: UnboundedReceiver<TrackerEvent>,
        shutdown: CancellationToken,
        time_cap: Duration,
    ) -> Self {
        Self {
            tracker,
            store,
            scheduler,
            sink,
            clock,
            receiver,
            shutdown,
            time_cap,
            day_boundary_armed: false,
        }
    }

    /// Executes the event loop until shutdown is requested. Tracking is stopped and persisted
    /// before returning.
    pub async fn run(mut self) -> Result<()> {
        self.arm_day_boundary();
        self.refresh_display();

        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                event = self.receiver.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle(event).await;
        }

        self.teardown().await;
        Ok(())
    }

    #[instrument(level = "trace", skip(self))]
    async fn handle(&mut self, event: TrackerEvent) {
        if !self.day_boundary_armed {
            self.arm_day_boundary();
        }
        // The wake-up might have been missed (suspend, failed arming), so every event checks the
        // calendar.
        let rolled_over = self.roll_over_if_needed().await;

        match event {
            TrackerEvent::Refresh => self.refresh_display(),
            TrackerEvent::Checkpoint => self.checkpoint().await,
            TrackerEvent::Wakeup(DAY_BOUNDARY) => {
                if !rolled_over {
                    debug!("Day boundary fired before the day changed");
                }
                self.arm_day_boundary();
            }
            TrackerEvent::Wakeup(token) => warn!("Unknown wake-up {token:?}"),
            TrackerEvent::Toggle => self.toggle().await,
            TrackerEvent::Pause => self.pause().await,
            TrackerEvent::PhaseChanged(change) => {
                match change.current {
                    Phase::Running => self.scheduler.arm_periodic(),
                    Phase::Stopped | Phase::Paused => self.scheduler.disarm_periodic(),
                }
                self.refresh_display();
            }
        }
    }

    async fn toggle(&mut self) {
        if self.tracker.phase() == Phase::Running {
            self.tracker.stop();
            self.persist_day(self.tracker.day(), self.tracker.total_today())
                .await;
            self.checkpoint().await;
        } else {
            self.tracker.start();
        }
    }

    async fn pause(&mut self) {
        if self.tracker.phase() == Phase::Running {
            self.tracker.pause();
            self.checkpoint().await;
        }
    }

    /// Closes the tracked day if the local calendar moved on. Returns whether it did.
    async fn roll_over_if_needed(&mut self) -> bool {
        let today = self.clock.today();
        if today == self.tracker.day() {
            return false;
        }
        info!("Day changed from {} to {today}", self.tracker.day());
        let rollover = self.tracker.day_reset();
        self.persist_day(rollover.day, rollover.total).await;
        self.checkpoint().await;
        self.refresh_display();
        true
    }

    fn arm_day_boundary(&mut self) {
        match self.scheduler.arm_day_boundary() {
            Ok(_) => self.day_boundary_armed = true,
            Err(e) => {
                self.day_boundary_armed = false;
                error!("Day boundary is not armed, will retry on the next event {e:?}");
            }
        }
    }

    /// Writes the running total of the day into the scalar cache.
    async fn checkpoint(&mut self) {
        let total = duration_to_ms(self.tracker.observed_total());
        let day = day_to_scalar(self.tracker.day());
        debug!("Checkpoint {total}ms");
        // Both keys go in one write, a total must never be paired with another day.
        let result = self
            .store
            .put_scalars(&[(SPENT_TIME_DAY_KEY, day), (SPENT_TIME_KEY, total)])
            .await;
        if let Err(e) = result {
            error!("Failed to checkpoint tracked time, keeping it in memory {e:?}");
        }
    }

    async fn persist_day(&mut self, day: NaiveDate, total: Duration) {
        let total = duration_to_ms(total);
        match self.store.upsert_row(day, total).await {
            Ok(()) => info!("Stored {total}ms for {day}"),
            Err(e) => error!("Failed to store {total}ms for {day}, keeping it in memory {e:?}"),
        }
    }

    fn refresh_display(&mut self) {
        let shown = if self.tracker.phase() != Phase::Stopped {
            self.tracker.elapsed()
        } else {
            self.tracker.total_today()
        };
        let over_cap = self.tracker.observed_total() > self.time_cap;
        self.sink.refresh(&format_elapsed(shown), over_cap);
    }

    async fn teardown(&mut self) {
        info!("Stopping tracker");
        self.tracker.stop();
        self.persist_day(self.tracker.day(), self.tracker.total_today())
            .await;
        self.checkpoint().await;
        self.scheduler.shutdown().await;
        self.receiver.close();
    }
}
