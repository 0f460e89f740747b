//! Web application firewall client for the IP blocklist service.
//!
//! This module submits IP set updates to a WAF-compatible JSON API. Each
//! update needs a fresh change token, and a token that went stale between
//! fetch and use is retried with a new one.

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

use crate::models::WafConfig;

const AMZ_JSON: &str = "application/x-amz-json-1.1";

/// Errors that can occur during WAF API operations
#[derive(Debug, Error)]
pub enum WafError {
    #[error("API request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Change token {0} is stale")]
    StaleChangeToken(String),
    #[error("Update rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// IP set update action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateAction {
    #[serde(rename = "INSERT")]
    Insert,
}

/// Address entry of an IP set update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpSetDescriptor {
    /// Address family (`IPV4`)
    #[serde(rename = "Type")]
    pub kind: String,
    /// Address in CIDR notation
    #[serde(rename = "Value")]
    pub value: String,
}

/// One entry of an `UpdateIPSet` batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpSetUpdate {
    #[serde(rename = "Action")]
    pub action: UpdateAction,
    #[serde(rename = "IPSetDescriptor")]
    pub descriptor: IpSetDescriptor,
}

impl IpSetUpdate {
    /// Insert a single IPv4 host (`/32`)
    ///
    /// Returns `None` when `ip` is not an IPv4 address, since it cannot
    /// be expressed as an IPv4 CIDR.
    pub fn insert_host(ip: &str) -> Option<Self> {
        let addr: Ipv4Addr = ip.parse().ok()?;
        Some(Self {
            action: UpdateAction::Insert,
            descriptor: IpSetDescriptor {
                kind: "IPV4".to_string(),
                value: format!("{}/32", addr),
            },
        })
    }
}

#[derive(Debug, Serialize)]
struct UpdateIpSetRequest<'a> {
    #[serde(rename = "IPSetId")]
    ip_set_id: &'a str,
    #[serde(rename = "ChangeToken")]
    change_token: &'a str,
    #[serde(rename = "Updates")]
    updates: &'a [IpSetUpdate],
}

#[derive(Debug, Deserialize)]
struct ChangeTokenResponse {
    #[serde(rename = "ChangeToken")]
    change_token: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: String,
}

/// Applies IP set updates on the firewall
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlocklistUpdater: Send + Sync {
    /// Apply `updates` to the IP set and return the change token that was used
    async fn update_ip_set(&self, ip_set_id: &str, updates: Vec<IpSetUpdate>) -> Result<String, WafError>;
}

/// WAF API client
pub struct WafClient {
    /// HTTP client
    client: Client,
    /// API endpoint
    endpoint: Url,
    /// Prefix of the `X-Amz-Target` header
    target_prefix: String,
    /// Token fetches per update before giving up on stale tokens
    max_update_attempts: u32,
    /// Serializes token fetch and update within this process
    update_lock: Mutex<()>,
}

impl WafClient {
    /// Create a new WAF client instance
    pub fn new(client: Client, endpoint: Url, target_prefix: String, max_update_attempts: u32) -> Self {
        Self {
            client,
            endpoint,
            target_prefix,
            max_update_attempts: max_update_attempts.max(1),
            update_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &WafConfig) -> Result<Self, WafError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| WafError::InvalidEndpoint(format!("{}: {}", config.endpoint, e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self::new(
            client,
            endpoint,
            config.target_prefix.clone(),
            config.max_update_attempts,
        ))
    }

    async fn call(&self, operation: &str, body: Vec<u8>) -> Result<reqwest::Response, WafError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("X-Amz-Target", format!("{}.{}", self.target_prefix, operation))
            .header(CONTENT_TYPE, AMZ_JSON)
            .body(body)
            .send()
            .await?;
        Ok(response)
    }

    /// Get a fresh change token
    pub async fn get_change_token(&self) -> Result<String, WafError> {
        let response = self.call("GetChangeToken", b"{}".to_vec()).await?;
        if !response.status().is_success() {
            return Err(rejection(response, None).await);
        }

        let body: ChangeTokenResponse = response
            .json()
            .await
            .map_err(|e| WafError::InvalidResponse(e.to_string()))?;
        Ok(body.change_token)
    }

    async fn send_update(
        &self,
        ip_set_id: &str,
        change_token: &str,
        updates: &[IpSetUpdate],
    ) -> Result<String, WafError> {
        let body = serde_json::to_vec(&UpdateIpSetRequest {
            ip_set_id,
            change_token,
            updates,
        })?;

        let response = self.call("UpdateIPSet", body).await?;
        if !response.status().is_success() {
            return Err(rejection(response, Some(change_token)).await);
        }

        let body: ChangeTokenResponse = response
            .json()
            .await
            .map_err(|e| WafError::InvalidResponse(e.to_string()))?;
        Ok(body.change_token)
    }
}

#[async_trait]
impl BlocklistUpdater for WafClient {
    async fn update_ip_set(&self, ip_set_id: &str, updates: Vec<IpSetUpdate>) -> Result<String, WafError> {
        let _guard = self.update_lock.lock().await;
        let mut attempt = 1;

        loop {
            let change_token = self.get_change_token().await?;
            debug!("Got change token {} (attempt {})", change_token, attempt);

            match self.send_update(ip_set_id, &change_token, &updates).await {
                Ok(applied) => {
                    info!(
                        "Inserted {} address(es) into IP set {} with change token {}",
                        updates.len(),
                        ip_set_id,
                        applied
                    );
                    return Ok(applied);
                }
                Err(WafError::StaleChangeToken(stale)) if attempt < self.max_update_attempts => {
                    warn!("Change token {} went stale, retrying update of {}", stale, ip_set_id);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Turn an unsuccessful response into an error
async fn rejection(response: reqwest::Response, change_token: Option<&str>) -> WafError {
    let status = response.status();
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => return WafError::RequestError(e),
    };
    let body: Option<ApiErrorBody> = serde_json::from_str(&text).ok();

    let stale = status == StatusCode::CONFLICT
        || body.as_ref().map_or(false, |b| b.kind.contains("StaleData"));
    if let (true, Some(token)) = (stale, change_token) {
        return WafError::StaleChangeToken(token.to_string());
    }

    WafError::Rejected {
        status: status.as_u16(),
        message: body
            .map(|b| format!("{} {}", b.kind, b.message).trim().to_string())
            .unwrap_or(text),
    }
}
