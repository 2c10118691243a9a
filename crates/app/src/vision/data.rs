//! Shared structs passed between stages, and the latest-detection store.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

/// Integer pixel box with `x2 > x1` and `y2 > y1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Round a float box and clip it to a `width` x `height` frame. Returns
    /// `None` when nothing of the box remains.
    pub fn clipped(bbox: [f32; 4], width: i32, height: i32) -> Option<Self> {
        if bbox.iter().any(|v| !v.is_finite()) || width <= 0 || height <= 0 {
            return None;
        }
        let x1 = (bbox[0].round() as i32).clamp(0, width - 1);
        let y1 = (bbox[1].round() as i32).clamp(0, height - 1);
        let x2 = (bbox[2].round() as i32).clamp(0, width - 1);
        let y2 = (bbox[3].round() as i32).clamp(0, height - 1);
        (x2 > x1 && y2 > y1).then_some(Self { x1, y1, x2, y2 })
    }
}

/// A detection resolved to its display label, owned for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct LabeledDetection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Most recent top detection, or the "nothing seen" sentinel.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionSnapshot {
    pub class_name: String,
    pub confidence: f32,
}

impl DetectionSnapshot {
    pub const NONE_LABEL: &'static str = "N/A";

    pub fn none() -> Self {
        Self {
            class_name: Self::NONE_LABEL.to_string(),
            confidence: 0.0,
        }
    }

    pub fn new(class_name: impl Into<String>, confidence: f32) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            class_name: class_name.into(),
            confidence,
        }
    }

    pub fn is_none(&self) -> bool {
        self.class_name == Self::NONE_LABEL && self.confidence == 0.0
    }
}

impl Default for DetectionSnapshot {
    fn default() -> Self {
        Self::none()
    }
}

impl From<&LabeledDetection> for DetectionSnapshot {
    fn from(detection: &LabeledDetection) -> Self {
        Self::new(detection.label.clone(), detection.confidence)
    }
}

/// Cloneable handle on the single latest [`DetectionSnapshot`].
///
/// Writes replace the whole record under one lock, so readers never see a
/// label paired with another detection's confidence.
#[derive(Clone, Debug, Default)]
pub struct DetectionStateStore {
    inner: Arc<Mutex<DetectionSnapshot>>,
}

impl DetectionStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, snapshot: DetectionSnapshot) {
        // A poisoned lock still holds a complete record; replacing it is safe.
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = snapshot;
    }

    pub fn read(&self) -> DetectionSnapshot {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn store_starts_with_sentinel() {
        let store = DetectionStateStore::new();
        assert_eq!(store.read(), DetectionSnapshot::none());
        assert!(store.read().is_none());
    }

    #[test]
    fn write_replaces_whole_record() {
        let store = DetectionStateStore::new();
        store.write(DetectionSnapshot::new("cup", 0.42));
        assert_eq!(store.read(), DetectionSnapshot::new("cup", 0.42));
        store.write(DetectionSnapshot::none());
        assert!(store.read().is_none());
    }

    #[test]
    fn snapshot_confidence_is_clamped() {
        assert_eq!(DetectionSnapshot::new("a", 1.7).confidence, 1.0);
        assert_eq!(DetectionSnapshot::new("a", -0.2).confidence, 0.0);
        assert_eq!(DetectionSnapshot::new("a", f32::NAN).confidence, 0.0);
    }

    #[test]
    fn snapshot_serializes_with_expected_keys() {
        let json = serde_json::to_value(DetectionSnapshot::none()).unwrap();
        assert_eq!(json, serde_json::json!({"class_name": "N/A", "confidence": 0.0}));
    }

    #[test]
    fn concurrent_readers_never_see_torn_records() {
        let store = DetectionStateStore::new();
        let pairs = [("cup", 0.25_f32), ("bottle", 0.75_f32)];

        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..5_000 {
                    let (label, confidence) = pairs[i % 2];
                    store.write(DetectionSnapshot::new(label, confidence));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..5_000 {
                        let snapshot = store.read();
                        let consistent = snapshot.is_none()
                            || pairs.iter().any(|(label, confidence)| {
                                snapshot.class_name == *label && snapshot.confidence == *confidence
                            });
                        assert!(consistent, "torn snapshot: {snapshot:?}");
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn clipped_box_rejects_degenerate_and_out_of_frame() {
        assert_eq!(
            BoundingBox::clipped([10.2, 9.6, 50.4, 50.5], 100, 100),
            Some(BoundingBox {
                x1: 10,
                y1: 10,
                x2: 50,
                y2: 51
            })
        );
        assert_eq!(BoundingBox::clipped([150.0, 10.0, 180.0, 40.0], 100, 100), None);
        assert_eq!(BoundingBox::clipped([10.0, 10.0, 10.0, 40.0], 100, 100), None);
        assert_eq!(BoundingBox::clipped([f32::NAN, 0.0, 5.0, 5.0], 100, 100), None);
        assert_eq!(
            BoundingBox::clipped([-20.0, -5.0, 30.0, 200.0], 100, 100),
            Some(BoundingBox {
                x1: 0,
                y1: 0,
                x2: 30,
                y2: 99
            })
        );
    }
}
