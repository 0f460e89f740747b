//! Core functionality for the IP blocklist service.
//!
//! This module contains the core components of the service, including
//! log extraction, per-minute aggregation, threshold classification, and
//! the collaborators for log retrieval and firewall updates.

pub mod extractor;
pub mod aggregator;
pub mod classifier;
pub mod scanner;
pub mod log_source;
pub mod waf;
pub mod pipeline;

use std::collections::HashSet;

use crate::config::ConfigurationError;
use crate::models::Config;

/// Detection settings shared by the aggregator and the classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionConfig {
    /// HTTP statuses that count as failed requests
    pub bad_status_codes: HashSet<String>,
    /// Bad requests within one minute that trigger blocklisting
    pub bad_requests_per_min: u32,
    /// Column layout of the access log
    pub columns: LogColumns,
}

impl DetectionConfig {
    pub fn new<I, S>(bad_status_codes: I, bad_requests_per_min: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bad_status_codes: bad_status_codes.into_iter().map(Into::into).collect(),
            bad_requests_per_min,
            columns: LogColumns::default(),
        }
    }

    pub fn with_columns(mut self, columns: LogColumns) -> Self {
        self.columns = columns;
        self
    }

    /// Validate the loaded configuration into detection settings
    pub fn from_config(config: &Config) -> Result<Self, ConfigurationError> {
        let codes = parse_status_codes(&config.bad_http_status_codes);
        if codes.is_empty() {
            return Err(ConfigurationError::Invalid {
                key: "BAD_HTTP_STATUS_CODES",
                reason: "no status codes given".to_string(),
            });
        }
        if config.bad_requests_per_min == 0 {
            return Err(ConfigurationError::Invalid {
                key: "BAD_REQUESTS_PER_MIN",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self::new(codes, config.bad_requests_per_min).with_columns(config.log_columns))
    }
}

/// Split a comma-separated status list, trimming entries and dropping empty ones
pub fn parse_status_codes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(String::from)
        .collect()
}

pub use extractor::{extract_record, Extracted, LogColumns, LogRecord};
pub use aggregator::{AggregationKey, FrequencyTable, MinuteBucket, RateAggregator};
pub use classifier::{BlocklistCandidateSet, ThresholdClassifier};
pub use scanner::{scan_gzip, scan_lines, LineStats, LogScanner, ScanSummary};
pub use log_source::{LocalLogSource, LogSource, LogSourceError, ObjectStoreLogSource};
pub use waf::{BlocklistUpdater, IpSetUpdate, WafClient, WafError};
pub use pipeline::{BlocklistPipeline, PipelineError, ProcessingReport};

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    /// A CloudFront-style access log line
    pub fn cloudfront_line(date: &str, time: &str, ip: &str, status: &str) -> String {
        format!(
            "{}\t{}\tIAD89-C1\t2390\t{}\tGET\td111111abcdef8.cloudfront.net\t/index.html\t{}\t-\tMozilla/5.0\t-\t-\tError\tabc123==\td111111abcdef8.cloudfront.net\thttps\t250\t0.002",
            date, time, ip, status
        )
    }

    pub fn gzip_lines<S: AsRef<str>>(lines: &[S]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        for line in lines {
            encoder.write_all(line.as_ref().as_bytes()).unwrap();
            encoder.write_all(b"\n").unwrap();
        }
        encoder.finish().unwrap()
    }
}
