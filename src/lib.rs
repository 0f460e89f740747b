//! IP blocklist service
//!
//! Scans compressed access logs for IPs producing bursts of failed
//! requests and inserts them into a firewall IP set.

pub mod api;
pub mod config;
pub mod core;
pub mod models;
pub mod utils;
