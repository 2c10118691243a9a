//! Actix Web endpoints: viewer page, MJPEG stream, latest detection, metrics.
//!
//! Handlers never touch the camera or the model directly. `/video_feed`
//! subscribes to the shared [`StreamHub`] and forwards its parts; dropping the
//! response body (client disconnect) drops the subscription.

use std::net::SocketAddr;

use actix_web::{
    App, HttpResponse, HttpServer,
    http::header,
    web::{self, Bytes},
};
use anyhow::{Context, Result};
use async_stream::stream;
use tracing::{error, info};

use crate::vision::{
    data::DetectionStateStore, encoding::MULTIPART_CONTENT_TYPE, pipeline::StreamHub, telemetry,
};

/// Shared state backing HTTP handlers.
pub struct ServerState {
    pub hub: StreamHub,
    pub store: DetectionStateStore,
}

impl ServerState {
    pub fn new(hub: StreamHub) -> Self {
        let store = hub.store().clone();
        Self { hub, store }
    }
}

/// Register every route. Used by [`run_server`] and by tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index_route))
        .route("/video_feed", web::get().to(video_feed_handler))
        .route(
            "/latest_detection_data",
            web::get().to(latest_detection_handler),
        )
        .route("/metrics", web::get().to(metrics_handler));
}

/// Serve until the server is stopped (Ctrl-C / SIGTERM).
pub async fn run_server(bind: SocketAddr, state: web::Data<ServerState>) -> Result<()> {
    let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(configure))
        .shutdown_timeout(5)
        .bind(bind)
        .with_context(|| format!("Failed to bind HTTP server to {bind}"))?
        .run();

    info!("serving on http://{bind}");
    server.await.context("HTTP server error")
}

/// Serve the viewer page.
async fn index_route() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(crate::html::index::INDEX_HTML)
}

/// Stream annotated frames as `multipart/x-mixed-replace`.
async fn video_feed_handler(state: web::Data<ServerState>) -> HttpResponse {
    let mut subscription = match state.hub.subscribe() {
        Ok(subscription) => subscription,
        Err(err) => {
            error!("Failed to start video feed: {err:#}");
            return HttpResponse::ServiceUnavailable().body(err.to_string());
        }
    };
    info!(viewer = subscription.id(), "video feed opened");

    let stream = stream! {
        while let Some(part) = subscription.next_part().await {
            yield Ok::<Bytes, actix_web::Error>(part);
        }
    };

    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .append_header(("Cache-Control", "no-cache"))
        .content_type(MULTIPART_CONTENT_TYPE)
        .streaming(stream)
}

/// Return the most recent top detection, or the `N/A` sentinel.
async fn latest_detection_handler(state: web::Data<ServerState>) -> HttpResponse {
    HttpResponse::Ok()
        .append_header(("Cache-Control", "no-cache"))
        .json(state.store.read())
}

async fn metrics_handler() -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::NoContent().finish(),
    }
}
