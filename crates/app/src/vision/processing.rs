//! Per-frame work: infer, pick the top detection, annotate, encode.
//!
//! [`FrameProcessor::process`] is synchronous and owns no threads; the
//! capture session in `pipeline` drives it once per captured frame.

use std::time::Instant;

use actix_web::web::Bytes;
use ml_core::{Detection, DetectionModel};
use tracing::{debug, warn};
use video_ingest::Frame;

use crate::vision::{
    annotation::{annotate, frame_to_rgb},
    data::{BoundingBox, DetectionSnapshot, DetectionStateStore, LabeledDetection},
    encoding::{encode_jpeg, multipart_part},
};

/// Why a frame produced no multipart part.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    MalformedFrame,
    Inference,
    Encode,
}

impl SkipReason {
    pub fn label(self) -> &'static str {
        match self {
            SkipReason::MalformedFrame => "malformed_frame",
            SkipReason::Inference => "inference",
            SkipReason::Encode => "encode",
        }
    }
}

#[derive(Debug)]
pub enum FrameOutcome {
    /// A complete multipart part ready for viewers.
    Emitted(Bytes),
    Skipped(SkipReason),
}

/// Stateless per-frame processor writing into the shared store.
#[derive(Clone, Debug)]
pub struct FrameProcessor {
    store: DetectionStateStore,
    jpeg_quality: u8,
    verbose: bool,
}

impl FrameProcessor {
    pub fn new(store: DetectionStateStore, jpeg_quality: u8, verbose: bool) -> Self {
        Self {
            store,
            jpeg_quality,
            verbose,
        }
    }

    pub fn store(&self) -> &DetectionStateStore {
        &self.store
    }

    /// Run one frame through inference, annotation, and encoding.
    ///
    /// The store is written once the detections are known, before encoding,
    /// so an encode failure still leaves the snapshot describing this frame.
    /// Malformed frames and inference errors leave the store untouched.
    pub fn process(
        &self,
        model: &mut dyn DetectionModel,
        frame: &Frame,
        frame_number: u64,
    ) -> FrameOutcome {
        let mut image = match frame_to_rgb(frame) {
            Ok(image) => image,
            Err(err) => {
                warn!("frame #{frame_number}: skipping malformed frame: {err}");
                return skipped(SkipReason::MalformedFrame);
            }
        };

        let inference_start = Instant::now();
        let raw = match model.infer(&frame.data, frame.width, frame.height) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("frame #{frame_number}: inference failed: {err:#}");
                return skipped(SkipReason::Inference);
            }
        };
        metrics::histogram!("vision_stage_latency_seconds", "stage" => "inference")
            .record(inference_start.elapsed().as_secs_f64());

        let detections = label_detections(model, raw, frame.width, frame.height);
        if self.verbose {
            log_detections(frame_number, &detections);
        }

        let top = select_top(&detections);
        annotate(&mut image, &detections, top);
        self.store.write(match top {
            Some(top) => DetectionSnapshot::from(top),
            None => DetectionSnapshot::none(),
        });

        let encode_start = Instant::now();
        let jpeg = match encode_jpeg(&image, self.jpeg_quality) {
            Ok(jpeg) => jpeg,
            Err(err) => {
                warn!("frame #{frame_number}: {err}");
                return skipped(SkipReason::Encode);
            }
        };
        metrics::histogram!("vision_stage_latency_seconds", "stage" => "encoding")
            .record(encode_start.elapsed().as_secs_f64());
        metrics::counter!("vision_frames_processed_total").increment(1);

        FrameOutcome::Emitted(multipart_part(&jpeg))
    }
}

fn skipped(reason: SkipReason) -> FrameOutcome {
    metrics::counter!("vision_frames_skipped_total", "reason" => reason.label()).increment(1);
    FrameOutcome::Skipped(reason)
}

/// Resolve class ids to labels and clip boxes to the frame, dropping boxes
/// that end up empty and scores that are not finite.
pub fn label_detections(
    model: &dyn DetectionModel,
    raw: Vec<Detection>,
    width: i32,
    height: i32,
) -> Vec<LabeledDetection> {
    raw.into_iter()
        .filter(|det| det.score.is_finite())
        .filter_map(|det| {
            let bbox = BoundingBox::clipped(det.bbox, width, height)?;
            Some(LabeledDetection {
                label: model.class_name(det.class_id),
                confidence: det.score.clamp(0.0, 1.0),
                bbox,
            })
        })
        .collect()
}

/// Highest-confidence detection; the earliest one wins a tie.
pub fn select_top(detections: &[LabeledDetection]) -> Option<&LabeledDetection> {
    detections.iter().fold(None, |best, candidate| match best {
        Some(current) if candidate.confidence <= current.confidence => Some(current),
        _ => Some(candidate),
    })
}

fn log_detections(frame_number: u64, detections: &[LabeledDetection]) {
    if detections.is_empty() {
        debug!("frame #{frame_number}: no detections");
        return;
    }
    debug!("frame #{frame_number}: {} detection(s)", detections.len());
    for (idx, det) in detections.iter().enumerate() {
        debug!(
            "  #{idx}: label={} conf={:.3} bbox={:?}",
            det.label, det.confidence, det.bbox
        );
    }
}
