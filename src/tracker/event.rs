use super::{scheduler::WakeupToken, state::PhaseChange};

/// Everything the orchestrator reacts to. Events are handled one at a time, in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerEvent {
    /// Periodic display refresh.
    Refresh,
    /// Periodic write of the running total into the scalar cache.
    Checkpoint,
    /// A one-shot wake-up armed through [super::scheduler::WakeupScheduler] fired.
    Wakeup(WakeupToken),
    /// The user asked to start or stop tracking.
    Toggle,
    /// The user asked to hold the current run without closing it.
    Pause,
    PhaseChanged(PhaseChange),
}
