//! Per-minute aggregation of failed requests.
//!
//! This module counts bad-status requests per source IP and minute,
//! producing the frequency table the classifier works from.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::core::extractor::LogRecord;
use crate::core::DetectionConfig;

/// A one-minute window taken from the log's own date and time fields
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MinuteBucket {
    /// Date as written in the log
    pub date: String,
    /// Time truncated to `HH:MM`
    pub minute: String,
}

impl MinuteBucket {
    /// Build a bucket from a date and a `HH:MM:SS` time, dropping the seconds
    pub fn new(date: &str, time: &str) -> Self {
        let minute = match time.match_indices(':').nth(1) {
            Some((idx, _)) => &time[..idx],
            None => time,
        };

        Self {
            date: date.to_string(),
            minute: minute.to_string(),
        }
    }
}

impl fmt::Display for MinuteBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.date, self.minute)
    }
}

/// Frequency table key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregationKey {
    pub ip: String,
    pub bucket: MinuteBucket,
}

impl AggregationKey {
    pub fn from_record(record: &LogRecord) -> Self {
        Self {
            ip: record.source_ip.clone(),
            bucket: MinuteBucket::new(&record.date, &record.time),
        }
    }
}

/// Bad-request counts per (IP, minute)
pub type FrequencyTable = HashMap<AggregationKey, u32>;

/// Builds a frequency table from a stream of records
pub struct RateAggregator {
    /// Statuses that count as failed requests
    bad_status_codes: HashSet<String>,
    /// Counts collected so far
    table: FrequencyTable,
}

impl RateAggregator {
    /// Create a new aggregator instance
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            bad_status_codes: config.bad_status_codes.clone(),
            table: FrequencyTable::new(),
        }
    }

    /// Count a record if its status is a bad one
    ///
    /// # Returns
    ///
    /// * `true` if the record was counted
    /// * `false` if its status is not configured as bad
    pub fn record(&mut self, record: &LogRecord) -> bool {
        if !self.bad_status_codes.contains(&record.http_status) {
            return false;
        }

        *self
            .table
            .entry(AggregationKey::from_record(record))
            .or_insert(0) += 1;
        true
    }

    pub fn table(&self) -> &FrequencyTable {
        &self.table
    }

    pub fn into_table(self) -> FrequencyTable {
        self.table
    }
}
