use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use tokio::{sync::mpsc::UnboundedSender, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::utils::clock::Clock;

use super::event::TrackerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WakeupToken(pub u32);

/// Token of the wake-up at local midnight.
pub const DAY_BOUNDARY: WakeupToken = WakeupToken(0);

const ARM_ATTEMPTS: usize = 3;

/// Schedules wake-ups at absolute wall clock time. A fired wake-up is delivered as
/// [TrackerEvent::Wakeup].
#[cfg_attr(test, automock)]
pub trait WakeupScheduler: Send {
    /// Replaces the wake-up previously armed under the same token.
    fn arm_one_shot(&mut self, at: DateTime<Utc>, token: WakeupToken) -> Result<()>;

    fn cancel(&mut self, token: WakeupToken);
}

/// [WakeupScheduler] backed by tokio timers. Every wake-up is a task sleeping for the
/// difference between the requested time and the current wall time.
pub struct TokioWakeupScheduler {
    sender: UnboundedSender<TrackerEvent>,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
    armed: HashMap<WakeupToken, CancellationToken>,
}

impl TokioWakeupScheduler {
    pub fn new(
        sender: UnboundedSender<TrackerEvent>,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sender,
            clock,
            shutdown,
            armed: HashMap::new(),
        }
    }
}

impl WakeupScheduler for TokioWakeupScheduler {
    fn arm_one_shot(&mut self, at: DateTime<Utc>, token: WakeupToken) -> Result<()> {
        if self.shutdown.is_cancelled() {
            bail!("Wake-up scheduler is shut down");
        }
        if self.sender.is_closed() {
            bail!("Nobody is listening for wake-ups");
        }
        self.cancel(token);

        // Times in the past fire right away.
        let delay = (at - self.clock.time()).to_std().unwrap_or(Duration::ZERO);
        let cancel = self.shutdown.child_token();
        self.armed.insert(token, cancel.clone());

        let sender = self.sender.clone();
        let clock = self.clock.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => (),
                _ = clock.sleep(delay) => {
                    debug!("Wake-up {token:?} fired");
                    let _ = sender.send(TrackerEvent::Wakeup(token));
                }
            }
        });
        Ok(())
    }

    fn cancel(&mut self, token: WakeupToken) {
        if let Some(cancel) = self.armed.remove(&token) {
            cancel.cancel();
        }
    }
}

struct PeriodicTicks {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Issues refresh and checkpoint ticks and the day boundary wake-up.
///
/// The day boundary is not periodic. It is armed for the next local midnight and has to be armed
/// again every time it fires, which keeps it correct across DST and timezone changes.
pub struct Scheduler {
    wakeups: Box<dyn WakeupScheduler>,
    sender: UnboundedSender<TrackerEvent>,
    clock: Arc<dyn Clock>,
    refresh_interval: Duration,
    checkpoint_interval: Duration,
    shutdown: CancellationToken,
    periodic: Option<PeriodicTicks>,
}

impl Scheduler {
    pub fn new(
        wakeups: Box<dyn WakeupScheduler>,
        sender: UnboundedSender<TrackerEvent>,
        clock: Arc<dyn Clock>,
        refresh_interval: Duration,
        checkpoint_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            wakeups,
            sender,
            clock,
            refresh_interval,
            checkpoint_interval,
            shutdown,
            periodic: None,
        }
    }

    #[cfg(test)]
    fn periodic_armed(&self) -> bool {
        self.periodic.is_some()
    }

    /// Starts refresh and checkpoint ticks unless they are already running.
    pub fn arm_periodic(&mut self) {
        if self.periodic.is_some() || self.shutdown.is_cancelled() {
            return;
        }
        let cancel = self.shutdown.child_token();
        let tasks = [
            (TrackerEvent::Refresh, self.refresh_interval),
            (TrackerEvent::Checkpoint, self.checkpoint_interval),
        ]
        .into_iter()
        .map(|(event, period)| {
            tokio::spawn(run_periodic(
                event,
                period,
                self.sender.clone(),
                self.clock.clone(),
                cancel.clone(),
            ))
        })
        .collect();
        debug!("Armed periodic ticks");
        self.periodic = Some(PeriodicTicks { cancel, tasks });
    }

    pub fn disarm_periodic(&mut self) {
        if let Some(periodic) = self.periodic.take() {
            debug!("Disarmed periodic ticks");
            periodic.cancel.cancel();
        }
    }

    /// Arms the wake-up for the upcoming local midnight, retrying a few times. Returns the time it
    /// was armed for.
    pub fn arm_day_boundary(&mut self) -> Result<DateTime<Utc>> {
        let mut last_error = None;
        for attempt in 1..=ARM_ATTEMPTS {
            let armed = self
                .clock
                .next_midnight()
                .context("Next midnight can't be represented")
                .and_then(|at| self.wakeups.arm_one_shot(at, DAY_BOUNDARY).map(|_| at));
            match armed {
                Ok(at) => {
                    info!("Day boundary armed for {at}");
                    return Ok(at);
                }
                Err(e) => {
                    warn!("Attempt {attempt} to arm the day boundary failed {e:?}");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("Day boundary was never armed")))
    }

    /// Cancels every trigger and waits for periodic tasks to finish.
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        self.wakeups.cancel(DAY_BOUNDARY);
        if let Some(periodic) = self.periodic.take() {
            periodic.cancel.cancel();
            for task in periodic.tasks {
                let _ = task.await;
            }
        }
    }
}

/// Sends `event` every `period` until cancelled.
async fn run_periodic(
    event: TrackerEvent,
    period: Duration,
    sender: UnboundedSender<TrackerEvent>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) {
    let mut next_tick = clock.instant();
    loop {
        next_tick += period;
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = clock.sleep_until(next_tick) => ()
        }
        if sender.send(event).is_err() {
            return;
        }
        // After a suspend only one tick is sent instead of all the missed ones.
        let now = clock.instant();
        if next_tick < now {
            next_tick = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::anyhow;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tokio::{
        sync::mpsc::{self, UnboundedReceiver},
        time::sleep,
    };
    use tokio_util::sync::CancellationToken;

    use crate::{
        tracker::event::TrackerEvent,
        utils::clock::{test_clock::TestClock, Clock},
    };

    use super::{MockWakeupScheduler, Scheduler, TokioWakeupScheduler, WakeupScheduler, DAY_BOUNDARY};

    fn clock_at(hour: u32, minute: u32, second: u32) -> Arc<dyn Clock> {
        Arc::new(TestClock::starting_at(
            NaiveDateTime::new(
                NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(),
                NaiveTime::from_hms_opt(hour, minute, second).unwrap(),
            ),
            2,
        ))
    }

    fn drain(receiver: &mut UnboundedReceiver<TrackerEvent>) -> Vec<TrackerEvent> {
        let mut events = vec![];
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    fn scheduler(
        clock: Arc<dyn Clock>,
        wakeups: Box<dyn WakeupScheduler>,
    ) -> (Scheduler, UnboundedReceiver<TrackerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(
            wakeups,
            sender,
            clock,
            Duration::from_secs(1),
            Duration::from_secs(60),
            CancellationToken::new(),
        );
        (scheduler, receiver)
    }

    fn tokio_scheduler(clock: Arc<dyn Clock>) -> (Scheduler, UnboundedReceiver<TrackerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let wakeups = TokioWakeupScheduler::new(sender.clone(), clock.clone(), shutdown.clone());
        let scheduler = Scheduler::new(
            Box::new(wakeups),
            sender,
            clock,
            Duration::from_secs(1),
            Duration::from_secs(60),
            shutdown,
        );
        (scheduler, receiver)
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_ticks() {
        let (mut scheduler, mut receiver) = tokio_scheduler(clock_at(12, 0, 0));
        scheduler.arm_periodic();
        scheduler.arm_periodic();

        sleep(Duration::from_millis(120_500)).await;

        let events = drain(&mut receiver);
        let refreshes = events.iter().filter(|v| **v == TrackerEvent::Refresh).count();
        let checkpoints = events
            .iter()
            .filter(|v| **v == TrackerEvent::Checkpoint)
            .count();
        assert_eq!(refreshes, 120);
        assert_eq!(checkpoints, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_stops_ticks() {
        let (mut scheduler, mut receiver) = tokio_scheduler(clock_at(12, 0, 0));
        scheduler.arm_periodic();
        sleep(Duration::from_millis(2_500)).await;
        assert_eq!(drain(&mut receiver).len(), 2);

        scheduler.disarm_periodic();
        assert!(!scheduler.periodic_armed());
        sleep(Duration::from_secs(120)).await;
        assert!(drain(&mut receiver).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_day_boundary_fires_at_local_midnight() {
        let clock = clock_at(23, 59, 30);
        let (mut scheduler, mut receiver) = tokio_scheduler(clock.clone());

        let at = scheduler.arm_day_boundary().unwrap();
        // 00:00 at UTC+2
        assert_eq!(at, Utc.with_ymd_and_hms(2018, 7, 4, 22, 0, 0).unwrap());

        sleep(Duration::from_secs(29)).await;
        assert!(drain(&mut receiver).is_empty());

        sleep(Duration::from_secs(2)).await;
        assert_eq!(
            drain(&mut receiver),
            vec![TrackerEvent::Wakeup(DAY_BOUNDARY)]
        );

        // Armed again right after firing it points to the next midnight.
        let next = scheduler.arm_day_boundary().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2018, 7, 5, 22, 0, 0).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_replaces_previous_wakeup() {
        let (mut scheduler, mut receiver) = tokio_scheduler(clock_at(23, 59, 0));
        scheduler.arm_day_boundary().unwrap();
        scheduler.arm_day_boundary().unwrap();

        sleep(Duration::from_secs(120)).await;

        assert_eq!(
            drain(&mut receiver),
            vec![TrackerEvent::Wakeup(DAY_BOUNDARY)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_everything() {
        let (mut scheduler, mut receiver) = tokio_scheduler(clock_at(23, 59, 0));
        scheduler.arm_periodic();
        scheduler.arm_day_boundary().unwrap();

        scheduler.shutdown().await;
        sleep(Duration::from_secs(600)).await;

        assert!(drain(&mut receiver).is_empty());
        assert!(scheduler.arm_day_boundary().is_err());
        scheduler.arm_periodic();
        assert!(!scheduler.periodic_armed());
    }

    #[tokio::test]
    async fn test_day_boundary_arming_is_retried() {
        let mut wakeups = MockWakeupScheduler::new();
        let mut failures = 2;
        wakeups
            .expect_arm_one_shot()
            .withf(|_, token| *token == DAY_BOUNDARY)
            .times(3)
            .returning(move |_, _| {
                if failures > 0 {
                    failures -= 1;
                    Err(anyhow!("alarm service unavailable"))
                } else {
                    Ok(())
                }
            });
        let (mut scheduler, _receiver) = scheduler(clock_at(12, 0, 0), Box::new(wakeups));

        assert!(scheduler.arm_day_boundary().is_ok());
    }

    #[tokio::test]
    async fn test_day_boundary_arming_gives_up() {
        let mut wakeups = MockWakeupScheduler::new();
        wakeups
            .expect_arm_one_shot()
            .times(3)
            .returning(|_, _| Err(anyhow!("alarm service unavailable")));
        let (mut scheduler, _receiver) = scheduler(clock_at(12, 0, 0), Box::new(wakeups));

        assert!(scheduler.arm_day_boundary().is_err());
    }
}
