use serde::{Deserialize, Serialize};

use crate::core::LogColumns;
use crate::utils::decode_object_key;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Where log artifacts are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSourceKind {
    /// HTTP(S) object store
    ObjectStore,
    /// Local directory, one sub-directory per bucket
    Local,
}

/// Log source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSourceConfig {
    /// Source type
    pub kind: LogSourceKind,
    /// Object store endpoint
    pub endpoint: String,
    /// Root directory for the local source
    pub root: String,
    /// Download timeout in seconds
    pub request_timeout_seconds: u64,
}

impl Default for LogSourceConfig {
    fn default() -> Self {
        Self {
            kind: LogSourceKind::ObjectStore,
            endpoint: "http://127.0.0.1:9000".to_string(),
            root: "/var/lib/ip-blocklist/logs".to_string(),
            request_timeout_seconds: 60,
        }
    }
}

/// Firewall API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WafConfig {
    /// API endpoint
    pub endpoint: String,
    /// Prefix of the `X-Amz-Target` operation header
    pub target_prefix: String,
    /// Change token fetches per update before giving up
    pub max_update_attempts: u32,
    /// Request timeout in seconds
    pub request_timeout_seconds: u64,
}

impl Default for WafConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://waf.amazonaws.com/".to_string(),
            target_prefix: "AWSWAF_20150824".to_string(),
            max_update_attempts: 3,
            request_timeout_seconds: 30,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Comma-separated HTTP statuses that count as failed requests
    pub bad_http_status_codes: String,
    /// Bad requests per minute that trigger blocklisting
    pub bad_requests_per_min: u32,
    /// IP set receiving the offenders
    pub ip_set_id: String,
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Access log column layout
    #[serde(default)]
    pub log_columns: LogColumns,
    /// Log source configuration
    #[serde(default)]
    pub log_source: LogSourceConfig,
    /// Firewall API configuration
    #[serde(default)]
    pub waf: WafConfig,
}

#[cfg(test)]
impl Config {
    pub(crate) fn for_tests() -> Self {
        Self {
            bad_http_status_codes: "500,502,503,504".to_string(),
            bad_requests_per_min: 5,
            ip_set_id: "ipset-1".to_string(),
            server: ServerConfig::default(),
            log_columns: LogColumns::default(),
            log_source: LogSourceConfig::default(),
            waf: WafConfig::default(),
        }
    }
}

/// Storage event notification announcing new log objects
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<StorageEventRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageEventRecord {
    pub s3: StorageEntity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageEntity {
    pub bucket: BucketEntity,
    pub object: ObjectEntity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketEntity {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectEntity {
    /// URL-encoded object key
    pub key: String,
}

impl StorageEvent {
    /// Bucket and decoded key of the first record
    pub fn object_location(&self) -> Option<(String, String)> {
        let record = self.records.first()?;
        Some((
            record.s3.bucket.name.clone(),
            decode_object_key(&record.s3.object.key),
        ))
    }
}

/// Invocation response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}
