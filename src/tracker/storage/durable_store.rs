use std::{
    future::Future,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use tokio::fs::File;
use tracing::{debug, warn};

use crate::{
    fs::operations::{is_temporary, read_if_exists, write_atomically},
    utils::time::date_to_record_name,
};

use super::entities::{DayRecordEntity, ScalarCacheEntity};

/// Interface for abstracting durable storage of tracked time.
///
/// There are two independent parts: a scalar key/value cache that is cheap to update and a row
/// store with one row per local calendar day.
pub trait DurableStore {
    fn get_scalar(&self, key: &str) -> impl Future<Output = Result<Option<i64>>>;

    fn put_scalar(&self, key: &str, value: i64) -> impl Future<Output = Result<()>>;

    /// Writes all `values` at once. Either every value is stored or none is.
    fn put_scalars(&self, values: &[(&str, i64)]) -> impl Future<Output = Result<()>>;

    fn get_row(&self, date: NaiveDate) -> impl Future<Output = Result<Option<i64>>>;

    /// Inserts a row for `date` or replaces the existing one.
    fn upsert_row(&self, date: NaiveDate, spent_ms: i64) -> impl Future<Output = Result<()>>;

    /// Row with the most recent date.
    fn latest_row(&self) -> impl Future<Output = Result<Option<DayRecordEntity>>>;
}

impl<T: Deref> DurableStore for T
where
    T::Target: DurableStore,
{
    fn get_scalar(&self, key: &str) -> impl Future<Output = Result<Option<i64>>> {
        self.deref().get_scalar(key)
    }

    fn put_scalar(&self, key: &str, value: i64) -> impl Future<Output = Result<()>> {
        self.deref().put_scalar(key, value)
    }

    fn put_scalars(&self, values: &[(&str, i64)]) -> impl Future<Output = Result<()>> {
        self.deref().put_scalars(values)
    }

    fn get_row(&self, date: NaiveDate) -> impl Future<Output = Result<Option<i64>>> {
        self.deref().get_row(date)
    }

    fn upsert_row(&self, date: NaiveDate, spent_ms: i64) -> impl Future<Output = Result<()>> {
        self.deref().upsert_row(date, spent_ms)
    }

    fn latest_row(&self) -> impl Future<Output = Result<Option<DayRecordEntity>>> {
        self.deref().latest_row()
    }
}

const RECORDS_DIR: &str = "records";
const CACHE_FILE: &str = "cache.json";
const LOCK_FILE: &str = ".lock";

/// The main realization of [DurableStore]. Layout of the store directory:
///  - `records/YYYY-MM-DD` holds a single [DayRecordEntity] as json.
///  - `cache.json` holds the scalar cache.
///  - `.lock` is used to coordinate with other processes reading the same directory.
///
/// Every write replaces a whole file atomically, so a crash leaves either the previous or the
/// new value behind.
pub struct FileDurableStore {
    root: PathBuf,
}

impl FileDurableStore {
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(root.join(RECORDS_DIR))?;

        Ok(Self { root })
    }

    fn records_dir(&self) -> PathBuf {
        self.root.join(RECORDS_DIR)
    }

    fn row_path(&self, date: NaiveDate) -> PathBuf {
        self.records_dir().join(date_to_record_name(date))
    }

    fn cache_path(&self) -> PathBuf {
        self.root.join(CACHE_FILE)
    }

    async fn with_lock<T>(
        &self,
        exclusive: bool,
        operation: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let lock = File::options()
            .create(true)
            .write(true)
            .read(true)
            .truncate(false)
            .open(self.root.join(LOCK_FILE))
            .await?;
        if exclusive {
            lock.lock_exclusive()?;
        } else {
            lock.lock_shared()?;
        }
        let result = operation.await;
        lock.unlock_async().await?;
        result
    }

    async fn read_cache(&self) -> Result<ScalarCacheEntity> {
        let path = self.cache_path();
        match read_if_exists(&path).await? {
            Some(contents) => serde_json::from_slice(&contents)
                .with_context(|| format!("Scalar cache {path:?} is corrupted")),
            None => Ok(ScalarCacheEntity::default()),
        }
    }

    async fn read_row(path: &Path) -> Result<Option<DayRecordEntity>> {
        debug!("Reading {path:?}");
        let Some(contents) = read_if_exists(path).await? else {
            return Ok(None);
        };
        let row = serde_json::from_slice(&contents)
            .with_context(|| format!("Day record {path:?} is corrupted"))?;
        Ok(Some(row))
    }

    async fn latest_row_path(&self) -> Result<Option<PathBuf>> {
        let mut entries = tokio::fs::read_dir(self.records_dir()).await?;
        let mut latest: Option<PathBuf> = None;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_temporary(&path) || !entry.file_type().await?.is_file() {
                continue;
            }
            // Record names are ISO dates, so lexicographic order is chronological.
            if latest
                .as_ref()
                .map_or(true, |v| v.file_name() < path.file_name())
            {
                latest = Some(path);
            }
        }
        Ok(latest)
    }
}

impl DurableStore for FileDurableStore {
    async fn get_scalar(&self, key: &str) -> Result<Option<i64>> {
        let cache = self.with_lock(false, self.read_cache()).await?;
        Ok(cache.values.get(key).copied())
    }

    async fn put_scalar(&self, key: &str, value: i64) -> Result<()> {
        self.put_scalars(&[(key, value)]).await
    }

    async fn put_scalars(&self, values: &[(&str, i64)]) -> Result<()> {
        self.with_lock(true, async {
            let mut cache = self.read_cache().await.unwrap_or_else(|e| {
                // Starting over is better than never being able to write the cache again.
                warn!("Discarding unreadable scalar cache {e:?}");
                ScalarCacheEntity::default()
            });
            cache
                .values
                .extend(values.iter().map(|(key, value)| (key.to_string(), *value)));
            write_atomically(&self.cache_path(), &serde_json::to_vec(&cache)?).await?;
            Ok(())
        })
        .await
    }

    async fn get_row(&self, date: NaiveDate) -> Result<Option<i64>> {
        let path = self.row_path(date);
        let row = self.with_lock(false, Self::read_row(&path)).await?;
        Ok(row.map(|v| v.spent_ms))
    }

    async fn upsert_row(&self, date: NaiveDate, spent_ms: i64) -> Result<()> {
        let row = DayRecordEntity::new(date, spent_ms);
        let contents = serde_json::to_vec(&row)?;
        let path = self.row_path(date);
        self.with_lock(true, async {
            write_atomically(&path, &contents).await?;
            Ok(())
        })
        .await
    }

    async fn latest_row(&self) -> Result<Option<DayRecordEntity>> {
        self.with_lock(false, async {
            match self.latest_row_path().await? {
                Some(path) => Self::read_row(&path).await,
                None => Ok(None),
            }
        })
        .await
    }
}
