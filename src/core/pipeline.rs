//! Blocklist pipeline for the IP blocklist service.
//!
//! Fetches one log artifact, scans it, classifies the offenders and
//! submits them to the firewall IP set.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::core::classifier::ThresholdClassifier;
use crate::core::log_source::{LogSource, LogSourceError};
use crate::core::scanner::{scan_gzip, LineStats};
use crate::core::waf::{BlocklistUpdater, IpSetUpdate, WafError};
use crate::core::DetectionConfig;

/// Errors that abort processing of an artifact
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unable to retrieve log {bucket}/{key}: {source}")]
    UnretrievableArtifact {
        bucket: String,
        key: String,
        #[source]
        source: LogSourceError,
    },
    #[error("Blocklist update failed: {0}")]
    BlocklistUpdate(#[from] WafError),
    #[error("Log scan did not complete: {0}")]
    ScanAborted(#[from] tokio::task::JoinError),
}

/// Outcome of processing one artifact
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingReport {
    pub invocation_id: Uuid,
    pub bucket: String,
    pub key: String,
    pub stats: LineStats,
    /// IPs that crossed the threshold
    pub blocked_ips: Vec<String>,
    /// Offenders left out of the update because they are not IPv4
    pub skipped_ips: Vec<String>,
    /// Change token of the applied update, if one was sent
    pub change_token: Option<String>,
    pub dry_run: bool,
    pub completed_at: DateTime<Utc>,
}

/// Runs fetch, scan, classify and update for one artifact at a time
pub struct BlocklistPipeline {
    detection: Arc<DetectionConfig>,
    ip_set_id: String,
    log_source: Arc<dyn LogSource>,
    updater: Arc<dyn BlocklistUpdater>,
}

impl BlocklistPipeline {
    pub fn new(
        detection: DetectionConfig,
        ip_set_id: String,
        log_source: Arc<dyn LogSource>,
        updater: Arc<dyn BlocklistUpdater>,
    ) -> Self {
        Self {
            detection: Arc::new(detection),
            ip_set_id,
            log_source,
            updater,
        }
    }

    /// Process one artifact
    ///
    /// # Arguments
    ///
    /// * `bucket` - Storage bucket holding the log
    /// * `key` - Decoded object key of the log
    /// * `dry_run` - Classify only, without touching the IP set
    ///
    /// # Returns
    ///
    /// * `Ok(ProcessingReport)` once the artifact is fully handled
    /// * `Err(PipelineError)` if the log could not be read or the update failed
    pub async fn process(&self, bucket: &str, key: &str, dry_run: bool) -> Result<ProcessingReport, PipelineError> {
        let invocation_id = Uuid::new_v4();
        info!("[{}] Processing log {}/{}", invocation_id, bucket, key);

        let unretrievable = |source: LogSourceError| PipelineError::UnretrievableArtifact {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        };

        let bytes = self.log_source.fetch(bucket, key).await.map_err(unretrievable)?;

        // Decompression and aggregation are CPU bound, keep them off the async workers
        let detection = Arc::clone(&self.detection);
        let summary = tokio::task::spawn_blocking(move || scan_gzip(bytes.as_slice(), &detection))
            .await?
            .map_err(|e| unretrievable(LogSourceError::Decompression(e)))?;

        let stats = summary.stats;
        info!(
            "[{}] Scanned {} line(s): {} record(s), {} bad-status, {} malformed, {} comment(s)",
            invocation_id, stats.total, stats.records, stats.bad_status, stats.malformed, stats.comments
        );
        debug!("[{}] IP/minute table: {:?}", invocation_id, summary.table);
        metrics::counter!("log_lines_total", stats.total);
        metrics::counter!("log_lines_malformed_total", stats.malformed);

        let candidates = ThresholdClassifier::new(&self.detection).classify(&summary.table);
        info!("[{}] IPs to be blocklisted: {:?}", invocation_id, candidates);

        let mut updates = Vec::with_capacity(candidates.len());
        let mut skipped_ips = Vec::new();
        for ip in &candidates {
            match IpSetUpdate::insert_host(ip) {
                Some(update) => updates.push(update),
                None => {
                    warn!("[{}] Not blocklisting {}: not an IPv4 address", invocation_id, ip);
                    skipped_ips.push(ip.clone());
                }
            }
        }

        let mut change_token = None;
        if dry_run {
            info!("[{}] Dry run, {} update(s) not submitted", invocation_id, updates.len());
        } else if !updates.is_empty() {
            let count = updates.len() as u64;
            match self.updater.update_ip_set(&self.ip_set_id, updates).await {
                Ok(token) => {
                    metrics::counter!("blocklist_ips_submitted_total", count);
                    change_token = Some(token);
                }
                Err(e) => {
                    error!("[{}] Failed to update IP set {}: {}", invocation_id, self.ip_set_id, e);
                    return Err(e.into());
                }
            }
        }

        Ok(ProcessingReport {
            invocation_id,
            bucket: bucket.to_string(),
            key: key.to_string(),
            stats,
            blocked_ips: candidates.into_iter().collect(),
            skipped_ips,
            change_token,
            dry_run,
            completed_at: Utc::now(),
        })
    }
}
