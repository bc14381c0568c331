use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use config::TrackerConfig;
use event::TrackerEvent;
use notification::{NotificationSink, TerminalSink};
use orchestrator::Orchestrator;
use recovery::reconcile;
use scheduler::{Scheduler, TokioWakeupScheduler};
use state::{PhaseChange, TimeTracker};
use storage::durable_store::{DurableStore, FileDurableStore};
use tokio::{
    io::BufReader,
    sync::mpsc::{self, UnboundedSender},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::utils::clock::{Clock, DefaultClock};

pub mod config;
pub mod event;
pub mod input;
pub mod notification;
pub mod orchestrator;
pub mod recovery;
pub mod scheduler;
pub mod shutdown;
pub mod state;
pub mod storage;

/// Directory under the application directory holding the durable store.
pub const STORE_DIR: &str = "store";

/// Represents the starting point for a tracking session
pub async fn start_tracker(dir: PathBuf, config: TrackerConfig) -> Result<()> {
    let store = FileDurableStore::new(dir.join(STORE_DIR))?;
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let seed = reconcile(&store, clock.today()).await;

    let shutdown_token = CancellationToken::new();
    let (orchestrator, sender) = create_orchestrator(
        store,
        seed,
        clock,
        &config,
        Box::new(TerminalSink::stdout()),
        &shutdown_token,
    );

    info!("Tracking session ready");

    let (_, input_result, tracking_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        input::read_toggles(
            BufReader::new(tokio::io::stdin()),
            sender,
            shutdown_token.clone()
        ),
        orchestrator.run(),
    );

    if let Err(input_result) = input_result {
        error!("Reading input got an error {:?}", input_result);
    }

    if let Err(tracking_result) = tracking_result {
        error!("Tracking got an error {:?}", tracking_result);
    }

    Ok(())
}

/// Wires the tracker, the scheduler and the orchestrator together. The returned sender feeds
/// toggle requests into the orchestrator.
fn create_orchestrator<S: DurableStore>(
    store: S,
    seed: Duration,
    clock: Arc<dyn Clock>,
    config: &TrackerConfig,
    sink: Box<dyn NotificationSink>,
    shutdown_token: &CancellationToken,
) -> (Orchestrator<S>, UnboundedSender<TrackerEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel::<TrackerEvent>();

    let wakeups = TokioWakeupScheduler::new(
        sender.clone(),
        clock.clone(),
        shutdown_token.child_token(),
    );
    let scheduler = Scheduler::new(
        Box::new(wakeups),
        sender.clone(),
        clock.clone(),
        config.refresh_interval(),
        config.checkpoint_interval(),
        shutdown_token.child_token(),
    );

    let listener = sender.clone();
    let tracker = TimeTracker::new(
        clock.clone(),
        seed,
        Some(Box::new(move |change: PhaseChange| {
            let _ = listener.send(TrackerEvent::PhaseChanged(change));
        })),
    );

    let orchestrator = Orchestrator::new(
        tracker,
        store,
        scheduler,
        sink,
        clock,
        receiver,
        shutdown_token.clone(),
        config.time_cap(),
    );
    (orchestrator, sender)
}
