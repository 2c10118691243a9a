use anyhow::Result;

/// Single detection in frame pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Detection {
    pub class_id: i64,
    pub score: f32,
    /// Corner coordinates `[x1, y1, x2, y2]`.
    pub bbox: [f32; 4],
}

impl Detection {
    pub fn new(class_id: i64, score: f32, bbox: [f32; 4]) -> Self {
        Self {
            class_id,
            score,
            bbox,
        }
    }
}

/// Black-box localiser consumed by the frame pipeline.
///
/// `infer` receives a packed BGR8 buffer and returns detections in the order
/// the model ranks them; callers must not assume any particular order.
pub trait DetectionModel: Send {
    fn infer(&mut self, bgr: &[u8], width: i32, height: i32) -> Result<Vec<Detection>>;

    fn class_name(&self, class_id: i64) -> String;
}

impl<M: DetectionModel + ?Sized> DetectionModel for Box<M> {
    fn infer(&mut self, bgr: &[u8], width: i32, height: i32) -> Result<Vec<Detection>> {
        (**self).infer(bgr, width, height)
    }

    fn class_name(&self, class_id: i64) -> String {
        (**self).class_name(class_id)
    }
}
