use std::time::Duration;

use clap::Args;

/// Tunables of the tracking session.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// How often the displayed time is redrawn while tracking.
    #[arg(long = "refresh-ms", default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    pub refresh_ms: u64,
    /// How often the running total is written into the cache while tracking.
    #[arg(long = "checkpoint-secs", default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub checkpoint_secs: u64,
    /// Daily limit. Once the day total exceeds it the time is shown in red.
    #[arg(long = "cap-minutes", default_value_t = 120)]
    pub cap_minutes: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            refresh_ms: 1000,
            checkpoint_secs: 60,
            cap_minutes: 120,
        }
    }
}

impl TrackerConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_secs)
    }

    pub fn time_cap(&self) -> Duration {
        Duration::from_secs(self.cap_minutes.saturating_mul(60))
    }
}
