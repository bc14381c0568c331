use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::utils::time::{date_to_record_name, record_name_to_date};

/// Total time spent during one local calendar day. The date is kept as written so that a
/// damaged value can still be reported instead of failing the whole read.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct DayRecordEntity {
    pub date: String,
    pub spent_ms: i64,
}

impl DayRecordEntity {
    pub fn new(date: NaiveDate, spent_ms: i64) -> Self {
        Self {
            date: date_to_record_name(date),
            spent_ms,
        }
    }

    pub fn parsed_date(&self) -> Option<NaiveDate> {
        record_name_to_date(&self.date)
    }
}

/// Contents of the scalar cache file.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Default)]
#[serde(transparent)]
pub struct ScalarCacheEntity {
    pub values: BTreeMap<String, i64>,
}
