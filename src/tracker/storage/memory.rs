//! In-memory [DurableStore] used by tests. Reads and writes can be made to fail on demand.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use anyhow::{bail, Result};
use chrono::NaiveDate;

use crate::utils::time::date_to_record_name;

use super::{durable_store::DurableStore, entities::DayRecordEntity};

#[derive(Default)]
pub struct MemoryStore {
    scalars: Mutex<BTreeMap<String, i64>>,
    /// Keyed by the raw date string so that malformed dates can be planted.
    rows: Mutex<BTreeMap<String, i64>>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub row_writes: AtomicUsize,
    /// Once a row for this date is written every later write fails, as if the process died.
    pub crash_after_row: Mutex<Option<NaiveDate>>,
}

impl MemoryStore {
    pub fn with_row(self, date: &str, spent_ms: i64) -> Self {
        self.rows.lock().unwrap().insert(date.to_owned(), spent_ms);
        self
    }

    pub fn with_scalar(self, key: &str, value: i64) -> Self {
        self.scalars.lock().unwrap().insert(key.to_owned(), value);
        self
    }

    pub fn row(&self, date: NaiveDate) -> Option<i64> {
        self.rows
            .lock()
            .unwrap()
            .get(&date_to_record_name(date))
            .copied()
    }

    pub fn scalar(&self, key: &str) -> Option<i64> {
        self.scalars.lock().unwrap().get(key).copied()
    }

    pub fn rows(&self) -> BTreeMap<String, i64> {
        self.rows.lock().unwrap().clone()
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("read failure");
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("write failure");
        }
        Ok(())
    }
}

impl DurableStore for MemoryStore {
    async fn get_scalar(&self, key: &str) -> Result<Option<i64>> {
        self.check_read()?;
        Ok(self.scalar(key))
    }

    async fn put_scalar(&self, key: &str, value: i64) -> Result<()> {
        self.check_write()?;
        self.scalars.lock().unwrap().insert(key.to_owned(), value);
        Ok(())
    }

    async fn put_scalars(&self, values: &[(&str, i64)]) -> Result<()> {
        self.check_write()?;
        let mut scalars = self.scalars.lock().unwrap();
        for (key, value) in values {
            scalars.insert((*key).to_owned(), *value);
        }
        Ok(())
    }

    async fn get_row(&self, date: NaiveDate) -> Result<Option<i64>> {
        self.check_read()?;
        Ok(self.row(date))
    }

    async fn upsert_row(&self, date: NaiveDate, spent_ms: i64) -> Result<()> {
        self.check_write()?;
        self.row_writes.fetch_add(1, Ordering::SeqCst);
        self.rows
            .lock()
            .unwrap()
            .insert(date_to_record_name(date), spent_ms);
        if *self.crash_after_row.lock().unwrap() == Some(date) {
            self.fail_writes.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn latest_row(&self) -> Result<Option<DayRecordEntity>> {
        self.check_read()?;
        Ok(self
            .rows
            .lock()
            .unwrap()
            .last_key_value()
            .map(|(date, spent_ms)| DayRecordEntity {
                date: date.clone(),
                spent_ms: *spent_ms,
            }))
    }
}
