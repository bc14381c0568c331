use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Local, NaiveDate, Utc};
use tokio::time::Instant;

use super::time::next_day_start;

/// Represents an entity responsible for providing dates across application. This can allow it to
/// be used for testing
///
/// Elapsed time is always computed from [Clock::instant], wall time is only used for calendar
/// days and for scheduling the day boundary.
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    fn time(&self) -> DateTime<Utc>;

    fn instant(&self) -> Instant;

    /// Current time in the user's timezone.
    fn local_time(&self) -> DateTime<FixedOffset> {
        self.time().with_timezone(&Local).fixed_offset()
    }

    /// Local calendar day the user is currently in.
    fn today(&self) -> NaiveDate {
        self.local_time().date_naive()
    }

    /// The upcoming local midnight. Timezone rules are consulted at call time, so this has to be
    /// recomputed every time it's needed instead of adding 24 hours to a previous result.
    fn next_midnight(&self) -> Option<DateTime<Utc>> {
        next_day_start(self.time().with_timezone(&Local)).map(|v| v.with_timezone(&Utc))
    }

    async fn sleep(&self, duration: Duration);

    async fn sleep_until(&self, instant: tokio::time::Instant);
}

pub struct DefaultClock;

#[async_trait]
impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn sleep_until(&self, instant: tokio::time::Instant) {
        tokio::time::sleep_until(instant).await;
    }
}
