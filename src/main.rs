//! IP Blocklist Service
//!
//! This is the main entry point for the IP blocklist service.
//! It loads configuration, builds the pipeline and starts the web server.

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use log::info;
use metrics_exporter_prometheus::PrometheusBuilder;

use ip_blocklist_service::api::{self, ApiState};
use ip_blocklist_service::config;
use ip_blocklist_service::core::{log_source, BlocklistPipeline, DetectionConfig, WafClient};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    info!("Starting IP blocklist service...");

    // Configuration problems stop the service before anything is processed
    let config = config::load_config().context("Failed to load configuration")?;
    let detection = DetectionConfig::from_config(&config)?;
    info!(
        "Blocklisting IPs with at least {} bad request(s) per minute, bad statuses {:?}, IP set {}",
        detection.bad_requests_per_min, detection.bad_status_codes, config.ip_set_id
    );

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install metrics recorder")?;

    let log_source = log_source::from_config(&config.log_source)?;
    let waf = Arc::new(WafClient::from_config(&config.waf)?);
    let pipeline = BlocklistPipeline::new(detection, config.ip_set_id.clone(), log_source, waf);

    let state = web::Data::new(ApiState {
        pipeline: Arc::new(pipeline),
        metrics: Some(metrics),
    });

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::config)
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;

    Ok(())
}
