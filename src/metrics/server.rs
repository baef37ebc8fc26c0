use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;

/// Static facts reported by `/health`.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub store_backend: &'static str,
    pub notifications: &'static str,
    pub started_at: DateTime<Utc>,
}

/// Start the metrics HTTP server
/// Runs until the process exits; spawn it next to the main workload.
pub async fn start_metrics_server(
    registry: Arc<Registry>,
    info: ServerInfo,
    port: u16,
) -> std::io::Result<()> {
    tracing::info!(port, "Starting metrics server on http://0.0.0.0:{}/metrics", port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(registry.clone()))
            .app_data(web::Data::new(info.clone()))
            .route("/metrics", web::get().to(metrics_handler))
            .route("/health", web::get().to(health_handler))
    })
    .workers(1)
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

async fn metrics_handler(registry: web::Data<Arc<Registry>>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health_handler(info: web::Data<ServerInfo>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "courier-tracking",
        "store": info.store_backend,
        "notifications": info.notifications,
        "startedAt": info.started_at.to_rfc3339(),
    }))
}
