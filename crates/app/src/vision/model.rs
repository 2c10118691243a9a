//! Startup model selection: class names, device, and the ordered fallback.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use ml_core::{ClassNames, DecodeParams, DetectionModel, load_with_fallback};
use tracing::info;

use crate::vision::{config::VisionConfig, pipeline::SharedModel};

/// Class names from `--labels`, or the COCO table.
pub fn class_names(config: &VisionConfig) -> Result<ClassNames> {
    match config.labels.as_deref() {
        Some(path) => {
            let names = ClassNames::from_file(path)?;
            info!("loaded {} class names from {}", names.len(), path.display());
            Ok(names)
        }
        None => Ok(ClassNames::coco()),
    }
}

pub fn decode_params(config: &VisionConfig) -> DecodeParams {
    DecodeParams {
        confidence_threshold: config.confidence_threshold,
        iou_threshold: config.iou_threshold,
        ..DecodeParams::default()
    }
}

/// Load the first usable model candidate. Failure of every candidate is fatal.
pub fn load_detection_model(config: &VisionConfig) -> Result<SharedModel> {
    let names = class_names(config)?;
    let params = decode_params(config);
    let loaded = load_with_fallback(&config.model_candidates, |path| {
        open_detector(config, path, params, names.clone())
    })
    .context("Failed to load a detection model")?;

    if loaded.fallback_used {
        info!("serving detections from fallback model {}", loaded.path.display());
    }
    Ok(Arc::new(Mutex::new(loaded.model)))
}

#[cfg(feature = "with-tch")]
fn open_detector(
    config: &VisionConfig,
    path: &std::path::Path,
    params: DecodeParams,
    names: ClassNames,
) -> Result<Box<dyn DetectionModel>> {
    use ml_core::{detector::TorchScriptDetector, tch::Device};

    let device = if config.use_cpu {
        Device::Cpu
    } else {
        Device::cuda_if_available()
    };
    let detector = TorchScriptDetector::load(path, device, config.detector_size, params, names)?;
    info!("detector running on {:?}", detector.device());
    Ok(Box::new(detector))
}

#[cfg(not(feature = "with-tch"))]
fn open_detector(
    _config: &VisionConfig,
    path: &std::path::Path,
    _params: DecodeParams,
    _names: ClassNames,
) -> Result<Box<dyn DetectionModel>> {
    anyhow::bail!(
        "cannot load {}: rebuild with `--features with-tch` to enable TorchScript inference",
        path.display()
    )
}
