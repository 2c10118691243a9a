use anyhow::Error;
use chrono::Utc;
use thiserror::Error;

/// Raw BGR frame captured from a video source. Lives for one pipeline iteration.
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

impl FrameFormat {
    pub fn channels(self) -> usize {
        match self {
            FrameFormat::Bgr8 => 3,
        }
    }
}

impl Frame {
    /// Wrap a packed BGR8 buffer, stamping it with the current wall clock.
    pub fn bgr8(data: Vec<u8>, width: i32, height: i32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        }
    }

    /// Number of bytes a well-formed buffer of this size and format holds.
    pub fn expected_len(&self) -> usize {
        if self.width <= 0 || self.height <= 0 {
            return 0;
        }
        (self.width as usize) * (self.height as usize) * self.format.channels()
    }

    pub fn is_well_formed(&self) -> bool {
        self.expected_len() > 0 && self.data.len() == self.expected_len()
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("video source {uri:?} reached end of stream")]
    EndOfStream { uri: String },
    #[error("capture support for {uri:?} is not compiled in (enable the `opencv` feature)")]
    Unsupported { uri: String },
    #[error(transparent)]
    Other(#[from] Error),
}
