//! Decoding of raw YOLO head output into frame-space detections.
//!
//! Ultralytics detection heads export a `[1, 4 + classes, anchors]` tensor.
//! After transposing, every anchor row reads `[cx, cy, w, h, score_0, ..]`
//! in detector input pixels.

use crate::model::Detection;

pub const MAX_DETECTIONS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeParams {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: MAX_DETECTIONS,
        }
    }
}

/// Turn anchor rows into thresholded corner boxes, keeping the best class per row.
pub fn decode_rows(rows: &[Vec<f32>], params: &DecodeParams) -> Vec<Detection> {
    let mut detections = Vec::new();
    for row in rows {
        if row.len() < 5 {
            continue;
        }
        let Some((class_idx, score)) = row[4..]
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, score)| score.is_finite())
            .fold(None, |best: Option<(usize, f32)>, (idx, score)| match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((idx, score)),
            })
        else {
            continue;
        };
        if score < params.confidence_threshold {
            continue;
        }
        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        detections.push(Detection::new(
            class_idx as i64,
            score.min(1.0),
            [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
        ));
    }
    detections
}

/// Intersection over union of two corner boxes.
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix1 = a[0].max(b[0]);
    let iy1 = a[1].max(b[1]);
    let ix2 = a[2].min(b[2]);
    let iy2 = a[3].min(b[3]);
    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

/// Greedy per-class NMS. Output is sorted by descending score; equal scores
/// keep their input order.
pub fn non_max_suppression(mut detections: Vec<Detection>, params: &DecodeParams) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len().min(params.max_detections));
    for candidate in detections {
        if kept.len() >= params.max_detections {
            break;
        }
        let suppressed = kept.iter().any(|keep| {
            keep.class_id == candidate.class_id
                && iou(&keep.bbox, &candidate.bbox) > params.iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// Map boxes from detector input space `from` into frame space `to`.
pub fn rescale(detections: &mut [Detection], from: (f32, f32), to: (f32, f32)) {
    let scale_x = if from.0 > 0.0 { to.0 / from.0 } else { 1.0 };
    let scale_y = if from.1 > 0.0 { to.1 / from.1 } else { 1.0 };
    for det in detections {
        det.bbox[0] = (det.bbox[0] * scale_x).clamp(0.0, to.0);
        det.bbox[1] = (det.bbox[1] * scale_y).clamp(0.0, to.1);
        det.bbox[2] = (det.bbox[2] * scale_x).clamp(0.0, to.0);
        det.bbox[3] = (det.bbox[3] * scale_y).clamp(0.0, to.1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cx: f32, cy: f32, w: f32, h: f32, scores: &[f32]) -> Vec<f32> {
        let mut row = vec![cx, cy, w, h];
        row.extend_from_slice(scores);
        row
    }

    #[test]
    fn decode_picks_best_class_and_converts_to_corners() {
        let rows = vec![row(50.0, 40.0, 20.0, 10.0, &[0.1, 0.8, 0.3])];
        let detections = decode_rows(&rows, &DecodeParams::default());
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id, 1);
        assert!((detections[0].score - 0.8).abs() < f32::EPSILON);
        assert_eq!(detections[0].bbox, [40.0, 35.0, 60.0, 45.0]);
    }

    #[test]
    fn decode_drops_low_scores_short_rows_and_nan() {
        let rows = vec![
            row(10.0, 10.0, 4.0, 4.0, &[0.1, 0.2]),
            vec![1.0, 2.0, 3.0],
            row(10.0, 10.0, 4.0, 4.0, &[f32::NAN]),
        ];
        assert!(decode_rows(&rows, &DecodeParams::default()).is_empty());
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = [0.0, 0.0, 10.0, 10.0];
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
        let half = iou(&a, &[5.0, 0.0, 15.0, 10.0]);
        assert!((half - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn nms_suppresses_overlaps_within_a_class_only() {
        let detections = vec![
            Detection::new(0, 0.6, [0.0, 0.0, 10.0, 10.0]),
            Detection::new(0, 0.9, [1.0, 1.0, 11.0, 11.0]),
            Detection::new(1, 0.7, [0.0, 0.0, 10.0, 10.0]),
        ];
        let kept = non_max_suppression(detections, &DecodeParams::default());
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.9);
        assert_eq!(kept[1].class_id, 1);
    }

    #[test]
    fn nms_keeps_input_order_for_equal_scores() {
        let detections = vec![
            Detection::new(2, 0.5, [0.0, 0.0, 5.0, 5.0]),
            Detection::new(3, 0.5, [50.0, 50.0, 60.0, 60.0]),
        ];
        let kept = non_max_suppression(detections, &DecodeParams::default());
        assert_eq!(kept[0].class_id, 2);
        assert_eq!(kept[1].class_id, 3);
    }

    #[test]
    fn nms_caps_output() {
        let params = DecodeParams {
            max_detections: 2,
            ..DecodeParams::default()
        };
        let detections = (0..5)
            .map(|i| {
                let x = i as f32 * 100.0;
                Detection::new(0, 0.5, [x, 0.0, x + 10.0, 10.0])
            })
            .collect();
        assert_eq!(non_max_suppression(detections, &params).len(), 2);
    }

    #[test]
    fn rescale_maps_detector_space_to_frame() {
        let mut detections = vec![Detection::new(0, 0.9, [64.0, 64.0, 320.0, 700.0])];
        rescale(&mut detections, (640.0, 640.0), (1280.0, 720.0));
        assert_eq!(detections[0].bbox, [128.0, 72.0, 640.0, 720.0]);
    }
}
