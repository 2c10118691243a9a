//! Configuration parsing for the vision server.
//!
//! This module owns translation of CLI arguments into a `VisionConfig` struct
//! which the bootstrap and server use without re-parsing flags.

use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;

pub const DEFAULT_MODEL: &str = "runs/detect/train/weights/best.torchscript";
pub const DEFAULT_FALLBACK_MODEL: &str = "yolo11n.torchscript";

/// Canonical configuration shared by the bootstrap, pipeline and server.
#[derive(Clone, Debug)]
pub struct VisionConfig {
    /// Camera index, device path, or URI.
    pub source: String,
    /// Weights tried in order until one loads.
    pub model_candidates: Vec<PathBuf>,
    /// Newline-separated class names; COCO names when absent.
    pub labels: Option<PathBuf>,
    pub width: i32,
    pub height: i32,
    pub fps: f64,
    /// Square detector input edge in pixels.
    pub detector_size: i64,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub jpeg_quality: u8,
    /// Parts buffered per viewer before frames are dropped for it.
    pub viewer_queue: usize,
    pub bind: SocketAddr,
    /// Force CPU inference.
    pub use_cpu: bool,
    /// Log every frame's detections.
    pub verbose: bool,
}

/// CLI arguments accepted by `vision-server`.
#[derive(Debug, Parser)]
#[command(
    name = "vision-server",
    version,
    about = "Stream a camera with live object-detection overlays"
)]
pub struct VisionCliArgs {
    /// Camera index (`0`), device path (`/dev/video0`), file, or stream URI.
    #[arg(long = "source", value_name = "URI", default_value = "0")]
    pub source: String,
    /// Primary TorchScript weights.
    #[arg(long = "model", value_name = "PATH", default_value = DEFAULT_MODEL)]
    pub model: PathBuf,
    /// Weights tried when the primary model cannot be loaded.
    #[arg(long = "fallback-model", value_name = "PATH", default_value = DEFAULT_FALLBACK_MODEL)]
    pub fallback_model: PathBuf,
    /// Class names file, one per line.
    #[arg(long = "labels", value_name = "PATH")]
    pub labels: Option<PathBuf>,
    /// Capture width in pixels.
    #[arg(long = "width", value_name = "PX", default_value_t = 640)]
    pub width: i32,
    /// Capture height in pixels.
    #[arg(long = "height", value_name = "PX", default_value_t = 480)]
    pub height: i32,
    /// Requested capture rate.
    #[arg(long = "fps", value_name = "FPS", default_value_t = 30.0)]
    pub fps: f64,
    /// Detector input size in pixels (square).
    #[arg(long = "detector-size", value_name = "PX", default_value_t = 640)]
    pub detector_size: i64,
    /// Minimum confidence for a detection to be kept.
    #[arg(long = "confidence", value_name = "SCORE", default_value_t = 0.25)]
    pub confidence: f32,
    /// IoU threshold used by non-maximum suppression.
    #[arg(long = "iou", value_name = "IOU", default_value_t = 0.45)]
    pub iou: f32,
    /// JPEG quality used by the encoder (1-100).
    #[arg(long = "jpeg-quality", value_name = "QUALITY", default_value_t = 85)]
    pub jpeg_quality: i32,
    /// Parts buffered per viewer.
    #[arg(long = "viewer-queue", value_name = "N", default_value_t = 4)]
    pub viewer_queue: usize,
    /// HTTP listen address.
    #[arg(long = "bind", value_name = "ADDR", default_value = "0.0.0.0:5000")]
    pub bind: String,
    /// Force CPU inference.
    #[arg(long = "cpu", action = clap::ArgAction::SetTrue)]
    pub use_cpu: bool,
    /// Enable verbose logging (per-frame detections).
    #[arg(long = "verbose", action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
}

impl TryFrom<VisionCliArgs> for VisionConfig {
    type Error = anyhow::Error;

    fn try_from(args: VisionCliArgs) -> Result<Self> {
        if args.source.trim().is_empty() {
            bail!("--source must not be empty");
        }
        if args.width <= 0 || args.height <= 0 {
            bail!("Capture width and height must be positive integers");
        }
        if !(args.fps.is_finite() && args.fps > 0.0) {
            bail!("--fps must be a positive number");
        }
        if args.detector_size < 32 || args.detector_size % 32 != 0 {
            bail!("--detector-size must be a positive multiple of 32");
        }
        if !(0.0..=1.0).contains(&args.confidence) {
            bail!("--confidence must be between 0 and 1");
        }
        if !(0.0..=1.0).contains(&args.iou) {
            bail!("--iou must be between 0 and 1");
        }
        if !(1..=100).contains(&args.jpeg_quality) {
            bail!("--jpeg-quality must be an integer between 1 and 100");
        }
        if args.viewer_queue == 0 {
            bail!("--viewer-queue must be at least 1");
        }
        let bind = args
            .bind
            .parse::<SocketAddr>()
            .with_context(|| format!("--bind expects host:port, got {:?}", args.bind))?;

        let mut model_candidates = vec![args.model];
        if !model_candidates.contains(&args.fallback_model) {
            model_candidates.push(args.fallback_model);
        }

        Ok(Self {
            source: args.source,
            model_candidates,
            labels: args.labels,
            width: args.width,
            height: args.height,
            fps: args.fps,
            detector_size: args.detector_size,
            confidence_threshold: args.confidence,
            iou_threshold: args.iou,
            jpeg_quality: args.jpeg_quality as u8,
            viewer_queue: args.viewer_queue,
            bind,
            use_cpu: args.use_cpu,
            verbose: args.verbose,
        })
    }
}

impl VisionConfig {
    pub fn from_cli() -> Result<Self> {
        Self::try_from(VisionCliArgs::parse())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<VisionConfig> {
        let argv = std::iter::once("vision-server").chain(args.iter().copied());
        VisionConfig::try_from(VisionCliArgs::try_parse_from(argv)?)
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.source, "0");
        assert_eq!(
            config.model_candidates,
            vec![PathBuf::from(DEFAULT_MODEL), PathBuf::from(DEFAULT_FALLBACK_MODEL)]
        );
        assert_eq!((config.width, config.height), (640, 480));
        assert_eq!(config.detector_size, 640);
        assert_eq!(config.jpeg_quality, 85);
        assert_eq!(config.viewer_queue, 4);
        assert_eq!(config.bind, "0.0.0.0:5000".parse::<SocketAddr>().unwrap());
        assert!(config.labels.is_none());
        assert!(!config.use_cpu && !config.verbose);
    }

    #[test]
    fn identical_fallback_is_not_tried_twice() {
        let config = parse(&["--model", "a.pt", "--fallback-model", "a.pt"]).unwrap();
        assert_eq!(config.model_candidates, vec![PathBuf::from("a.pt")]);
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--source",
            "rtsp://cam/stream",
            "--width",
            "1280",
            "--height",
            "720",
            "--jpeg-quality",
            "60",
            "--bind",
            "127.0.0.1:8080",
            "--cpu",
            "--verbose",
        ])
        .unwrap();
        assert_eq!(config.source, "rtsp://cam/stream");
        assert_eq!((config.width, config.height), (1280, 720));
        assert_eq!(config.jpeg_quality, 60);
        assert_eq!(config.bind.port(), 8080);
        assert!(config.use_cpu && config.verbose);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(parse(&["--jpeg-quality", "0"]).is_err());
        assert!(parse(&["--jpeg-quality", "101"]).is_err());
        assert!(parse(&["--width", "0"]).is_err());
        assert!(parse(&["--viewer-queue", "0"]).is_err());
        assert!(parse(&["--confidence", "1.5"]).is_err());
        assert!(parse(&["--detector-size", "100"]).is_err());
        assert!(parse(&["--bind", "not-an-address"]).is_err());
    }
}
