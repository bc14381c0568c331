//! Startup read-repair of the two persisted copies of today's total.
//!
//! The scalar cache is written every checkpoint while day rows are only written when tracking
//! stops or the day ends. If the process dies in between, the cache is ahead of the rows. This
//! module copies the cache into the rows when that happens and decides which value today starts
//! from.

use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use tracing::{error, info, warn};

use super::storage::durable_store::DurableStore;

/// Scalar cache key holding total time spent (in milliseconds).
pub const SPENT_TIME_KEY: &str = "time_spent_for_single_day";
/// Scalar cache key holding the day [SPENT_TIME_KEY] belongs to, see [day_to_scalar].
pub const SPENT_TIME_DAY_KEY: &str = "time_spent_for_single_day.day";

pub fn day_to_scalar(day: NaiveDate) -> i64 {
    day.num_days_from_ce().into()
}

pub fn scalar_to_day(value: i64) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(value.try_into().ok()?)
}

pub fn duration_to_ms(value: Duration) -> i64 {
    value.as_millis().try_into().unwrap_or(i64::MAX)
}

pub fn ms_to_duration(value: i64) -> Duration {
    Duration::from_millis(value.max(0).unsigned_abs())
}

async fn read_scalar(store: &impl DurableStore, key: &str) -> Option<i64> {
    store
        .get_scalar(key)
        .await
        .inspect_err(|e| warn!("Failed to read {key}, treating it as missing {e:?}"))
        .ok()
        .flatten()
}

async fn read_row(store: &impl DurableStore, day: NaiveDate) -> Option<i64> {
    store
        .get_row(day)
        .await
        .inspect_err(|e| warn!("Failed to read record for {day}, treating it as missing {e:?}"))
        .ok()
        .flatten()
}

/// Returns the day the cached value belongs to and that day's row.
async fn cached_day_record(
    store: &impl DurableStore,
    today: NaiveDate,
) -> (Option<NaiveDate>, Option<i64>) {
    if let Some(day) = read_scalar(store, SPENT_TIME_DAY_KEY)
        .await
        .and_then(scalar_to_day)
    {
        return (Some(day), read_row(store, day).await);
    }

    // Without a day key the cache is attributed to the newest record.
    let latest = store
        .latest_row()
        .await
        .inspect_err(|e| warn!("Failed to read latest record, treating it as missing {e:?}"))
        .ok()
        .flatten();
    match latest {
        Some(row) => {
            let day = row.parsed_date().unwrap_or_else(|| {
                warn!("Record date {:?} is malformed, assuming today", row.date);
                today
            });
            (Some(day), Some(row.spent_ms))
        }
        None => (None, None),
    }
}

/// Cached total if the cache belongs to `day`.
pub async fn cached_total_for(store: &impl DurableStore, day: NaiveDate) -> Option<i64> {
    let cached_day = read_scalar(store, SPENT_TIME_DAY_KEY)
        .await
        .and_then(scalar_to_day)?;
    if cached_day != day {
        return None;
    }
    read_scalar(store, SPENT_TIME_KEY).await.filter(|v| *v >= 0)
}

/// Repairs the store and returns how much time was already spent `today`.
///
/// Running it again over the same store returns the same value.
pub async fn reconcile(store: &impl DurableStore, today: NaiveDate) -> Duration {
    let cached = read_scalar(store, SPENT_TIME_KEY)
        .await
        .filter(|v| *v >= 0);
    let (day, mut stored) = cached_day_record(store, today).await;

    if let (Some(day), Some(cached)) = (day, cached) {
        if cached > stored.unwrap_or(0) {
            info!("Cached time {cached}ms is ahead of the record for {day} ({stored:?}), repairing");
            match store.upsert_row(day, cached).await {
                Ok(()) => stored = Some(cached),
                Err(e) => error!("Failed to repair record for {day} {e:?}"),
            }
        }
    }

    let day = day.unwrap_or(today);
    if day != today {
        info!("Last tracked day was {day}, starting {today} from zero");
        let reset = [(SPENT_TIME_DAY_KEY, day_to_scalar(today)), (SPENT_TIME_KEY, 0)];
        if let Err(e) = store.put_scalars(&reset).await {
            error!("Failed to reset cached time {e:?}");
        }
        return Duration::ZERO;
    }

    let seed = cached.unwrap_or(0).max(stored.unwrap_or(0));
    info!("Recovered {seed}ms for {today}");
    ms_to_duration(seed)
}
