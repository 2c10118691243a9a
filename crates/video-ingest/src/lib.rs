//! Camera capture sources.
//!
//! A [`CameraOpener`] knows how to acquire a device; each successful open
//! yields a [`CameraSource`] that hands out one frame per `read` call and owns
//! the device until it is released or dropped.

#[cfg(feature = "opencv")]
mod camera;
mod types;

#[cfg(feature = "opencv")]
pub use camera::OpenCvCamera;
pub use types::{CaptureError, Frame, FrameFormat};

/// An opened capture device.
///
/// `read` blocks until the next frame is available. `release` must be
/// idempotent; implementations also release on drop.
pub trait CameraSource: Send {
    fn read(&mut self) -> Result<Frame, CaptureError>;
    fn release(&mut self);
}

/// Factory for capture devices, invoked once per streaming session.
pub trait CameraOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn CameraSource>, CaptureError>;

    /// Human readable description of the device for logs.
    fn describe(&self) -> String;
}

/// Opens the configured camera URI with the compiled-in backend.
#[derive(Clone, Debug)]
pub struct DeviceOpener {
    uri: String,
    target_size: (i32, i32),
    fps: f64,
}

impl DeviceOpener {
    pub fn new(uri: impl Into<String>, target_size: (i32, i32)) -> Self {
        Self {
            uri: uri.into(),
            target_size,
            fps: 30.0,
        }
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }
}

impl CameraOpener for DeviceOpener {
    #[cfg(feature = "opencv")]
    fn open(&self) -> Result<Box<dyn CameraSource>, CaptureError> {
        let camera = OpenCvCamera::open(&self.uri, self.target_size, self.fps)?;
        Ok(Box::new(camera))
    }

    #[cfg(not(feature = "opencv"))]
    fn open(&self) -> Result<Box<dyn CameraSource>, CaptureError> {
        let _ = (self.target_size, self.fps);
        Err(CaptureError::Unsupported {
            uri: self.uri.clone(),
        })
    }

    fn describe(&self) -> String {
        match parse_device_index(&self.uri) {
            Some(index) => format!("camera #{index}"),
            None => self.uri.clone(),
        }
    }
}

/// Parse a `/dev/videoX` style URI (or bare index) and return the zero-based index.
pub fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return (index >= 0).then_some(index);
    }
    let stripped = uri.strip_prefix("/dev/video")?;
    if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
        return stripped.parse::<i32>().ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_index_from_bare_number_and_dev_path() {
        assert_eq!(parse_device_index("0"), Some(0));
        assert_eq!(parse_device_index("3"), Some(3));
        assert_eq!(parse_device_index("/dev/video2"), Some(2));
    }

    #[test]
    fn device_index_rejects_uris_and_negative_values() {
        assert_eq!(parse_device_index("-1"), None);
        assert_eq!(parse_device_index("/dev/video"), None);
        assert_eq!(parse_device_index("/dev/videoX"), None);
        assert_eq!(parse_device_index("rtsp://cam.local/stream"), None);
        assert_eq!(parse_device_index("clip.mp4"), None);
    }

    #[test]
    fn frame_shape_check() {
        let frame = Frame::bgr8(vec![0; 4 * 2 * 3], 4, 2);
        assert!(frame.is_well_formed());
        let short = Frame::bgr8(vec![0; 5], 4, 2);
        assert!(!short.is_well_formed());
        let empty = Frame::bgr8(Vec::new(), 0, 0);
        assert!(!empty.is_well_formed());
    }

    #[test]
    fn frames_are_stamped_with_capture_time() {
        let before = chrono::Utc::now().timestamp_millis();
        let frame = Frame::bgr8(vec![0; 3], 1, 1);
        let after = chrono::Utc::now().timestamp_millis();
        assert!((before..=after).contains(&frame.timestamp_ms));
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn device_opener_without_backend_reports_unsupported() {
        let opener = DeviceOpener::new("0", (640, 480));
        assert_eq!(opener.describe(), "camera #0");
        match opener.open() {
            Err(CaptureError::Unsupported { uri }) => assert_eq!(uri, "0"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("open should fail without a capture backend"),
        }
    }
}
