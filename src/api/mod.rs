//! API endpoints for the IP blocklist service.
//!
//! This module provides the HTTP endpoints that receive storage event
//! notifications for new access logs, plus health and metrics.

use actix_web::error::InternalError;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use log::error;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::{BlocklistPipeline, PipelineError};
use crate::models::{InvocationResponse, StorageEvent};

pub struct ApiState {
    pub pipeline: Arc<BlocklistPipeline>,
    pub metrics: Option<PrometheusHandle>,
}

/// API configuration function for Actix-web
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/health").route(web::get().to(health_check)))
            .service(
                web::resource("/invocations")
                    .app_data(web::JsonConfig::default().error_handler(|err, req| rejected_event(err, req)))
                    .app_data(web::QueryConfig::default().error_handler(|err, req| rejected_event(err, req)))
                    .route(web::post().to(handle_invocation)),
            ),
    )
    .service(web::resource("/metrics").route(web::get().to(render_metrics)));
}

/// Health check endpoint response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Invocation options
#[derive(Debug, Default, Deserialize)]
pub struct InvocationQuery {
    /// Classify without updating the IP set
    #[serde(default)]
    pub dry_run: bool,
}

/// Health check endpoint
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn respond(status: StatusCode, body: String) -> HttpResponse {
    HttpResponse::build(status).json(InvocationResponse {
        status_code: status.as_u16(),
        body,
    })
}

/// Turn an extractor failure into a `{statusCode, body}` rejection
fn rejected_event<E>(err: E, _req: &HttpRequest) -> actix_web::Error
where
    E: std::fmt::Display + std::fmt::Debug + 'static,
{
    let response = respond(StatusCode::BAD_REQUEST, format!("Invalid invocation: {}", err));
    InternalError::from_response(err, response).into()
}

/// Log arrival endpoint
pub async fn handle_invocation(
    state: web::Data<ApiState>,
    query: web::Query<InvocationQuery>,
    event: web::Json<StorageEvent>,
) -> impl Responder {
    let (bucket, key) = match event.object_location() {
        Some(location) => location,
        None => {
            return respond(
                StatusCode::BAD_REQUEST,
                "Event does not reference a log object".to_string(),
            )
        }
    };

    match state.pipeline.process(&bucket, &key, query.dry_run).await {
        Ok(report) if report.dry_run => respond(
            StatusCode::OK,
            format!(
                "Dry run of {}/{}: {} IP(s) would be blocklisted",
                bucket,
                key,
                report.blocked_ips.len() - report.skipped_ips.len()
            ),
        ),
        Ok(report) => respond(
            StatusCode::OK,
            format!(
                "Processed {}/{}: {} IP(s) blocklisted",
                bucket,
                key,
                report.blocked_ips.len() - report.skipped_ips.len()
            ),
        ),
        Err(e) => {
            error!("Invocation for {}/{} failed: {}", bucket, key, e);
            metrics::counter!("invocations_failed_total", 1);
            let status = match &e {
                PipelineError::UnretrievableArtifact { .. } | PipelineError::BlocklistUpdate(_) => {
                    StatusCode::BAD_GATEWAY
                }
                PipelineError::ScanAborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            respond(status, e.to_string())
        }
    }
}

/// Prometheus metrics endpoint
async fn render_metrics(state: web::Data<ApiState>) -> impl Responder {
    match &state.metrics {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::NotFound().finish(),
    }
}
