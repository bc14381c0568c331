use std::{future, io::Write, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{Days, NaiveDate};
use futures::{stream, Stream, StreamExt};
use tracing::error;

use crate::{
    tracker::{
        notification::format_elapsed,
        recovery::{cached_total_for, ms_to_duration},
        storage::durable_store::{DurableStore, FileDurableStore},
        STORE_DIR,
    },
    utils::clock::{Clock, DefaultClock},
};

/// Prints totals of the last `days` days, oldest first.
pub async fn process_history_command(dir: PathBuf, days: u32) -> Result<()> {
    let store = FileDurableStore::new(dir.join(STORE_DIR))?;
    let today = DefaultClock.today();
    let mut stdout = std::io::stdout().lock();
    write_history(store, today, days, &mut stdout).await
}

async fn write_history(
    store: impl DurableStore,
    today: NaiveDate,
    days: u32,
    out: &mut impl Write,
) -> Result<()> {
    let start = today
        .checked_sub_days(Days::new(days.saturating_sub(1).into()))
        .unwrap_or(NaiveDate::MIN);

    let mut totals = Box::pin(day_totals(store, start, today));
    while let Some((day, total)) = totals.next().await {
        match total {
            Ok(total) => writeln!(out, "{day}\t{}", format_elapsed(total))?,
            Err(e) => {
                error!("Failed to read record for {day} {e:?}");
                writeln!(out, "{day}\tunreadable")?;
            }
        }
    }
    Ok(())
}

/// Time spent on every day between `start` and `today`. Days without a record are zero. For
/// today the checkpoint cache is consulted too, because it runs ahead of the record while
/// tracking.
fn day_totals(
    store: impl DurableStore,
    start: NaiveDate,
    today: NaiveDate,
) -> impl Stream<Item = (NaiveDate, Result<Duration>)> {
    let store = Arc::new(store);

    date_range(start, today)
        .map(move |day| {
            let store = store.clone();
            async move {
                let total = async {
                    let mut spent = store.get_row(day).await?.unwrap_or(0);
                    if day == today {
                        spent = spent.max(cached_total_for(&store, day).await.unwrap_or(0));
                    }
                    anyhow::Ok(ms_to_duration(spent))
                }
                .await;
                (day, total)
            }
        })
        .buffered(4)
}

/// Returns a stream of dates between start (inclusive) and end (inclusive).
fn date_range(start: NaiveDate, end: NaiveDate) -> impl Stream<Item = NaiveDate> {
    stream::unfold(Some(start), move |current| {
        future::ready(current.filter(|v| *v <= end).map(|v| (v, v.succ_opt())))
    })
}
