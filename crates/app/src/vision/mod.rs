//! Live detection server: one shared capture pipeline, fanned out to HTTP
//! viewers, with the latest top detection exposed as JSON.
//!
//! The module is split into focused submodules:
//! - `config`: CLI configuration parsing.
//! - `model`: Class names and the ordered model fallback at startup.
//! - `pipeline`: Capture sessions and per-viewer fan-out.
//! - `processing`: Per-frame inference, top-detection choice, store update.
//! - `annotation`: Box and label drawing.
//! - `encoding`: JPEG encode and multipart framing.
//! - `server`: Actix Web endpoints.
//! - `data`: Shared structs and the latest-detection store.
//! - `telemetry`: Tracing, metrics, and thread helpers.

pub use config::{VisionCliArgs, VisionConfig};
pub use data::{DetectionSnapshot, DetectionStateStore};
pub use pipeline::{HubSettings, SharedModel, StreamHub, Subscription};
pub use processing::{FrameOutcome, FrameProcessor, SkipReason};
pub use server::{ServerState, configure, run_server};

pub mod annotation;
pub mod config;
pub mod data;
pub mod encoding;
pub mod model;
pub mod pipeline;
pub mod processing;
pub mod server;
pub mod telemetry;

use std::sync::Arc;

use actix_web::web;
use anyhow::{Context, Result};
use tracing::info;
use video_ingest::{CameraOpener, DeviceOpener};

/// Load the model, build the shared pipeline, and serve until stopped.
pub fn run(config: VisionConfig) -> Result<()> {
    if let Err(err) = telemetry::init_metrics_recorder() {
        tracing::warn!("metrics disabled: {err:#}");
    }

    let model = model::load_detection_model(&config)?;
    let opener = DeviceOpener::new(config.source.clone(), (config.width, config.height))
        .with_fps(config.fps);
    info!(
        "capture source {} at {}x{}",
        opener.describe(),
        config.width,
        config.height
    );

    let hub = StreamHub::new(
        Arc::new(opener),
        model,
        DetectionStateStore::new(),
        HubSettings {
            viewer_queue: config.viewer_queue,
            jpeg_quality: config.jpeg_quality,
            verbose: config.verbose,
        },
    );
    let state = web::Data::new(ServerState::new(hub.clone()));

    let served = actix_web::rt::System::new()
        .block_on(run_server(config.bind, state))
        .context("Server stopped with an error");
    hub.shutdown();
    info!("shutdown complete");
    served
}
