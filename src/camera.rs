use crate::config::CameraConfig;
use opencv::{core::Mat, prelude::*, videoio};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    OpenCameraFailed(opencv::Error),
    #[error("Camera device {0} is not available")]
    DeviceUnavailable(i32),
    #[error("Failed to read frame: {0}")]
    ReadFrameFailed(opencv::Error),
    #[error("OpenCV error: {0}")]
    OpenCvError(opencv::Error),
}

impl From<opencv::Error> for CameraError {
    fn from(err: opencv::Error) -> Self {
        CameraError::OpenCvError(err)
    }
}

/// Source of frames for the inspection worker. `Camera` is the device
/// implementation; the trait is the seam for driving the worker without
/// capture hardware.
pub trait FrameSource: Send {
    /// Reads one BGR frame. An empty frame signals end-of-stream.
    fn read_frame(&mut self) -> Result<Mat, CameraError>;
}

/// Exclusive handle on a capture device. Owned by the inspection worker
/// while a session is running; dropping it releases the device.
#[derive(Debug)]
pub struct Camera {
    capture: videoio::VideoCapture,
}

impl Camera {
    pub fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        let mut capture = videoio::VideoCapture::new(config.device_index, videoio::CAP_ANY)
            .map_err(CameraError::OpenCameraFailed)?;

        if !capture.is_opened().map_err(CameraError::from)? {
            return Err(CameraError::DeviceUnavailable(config.device_index));
        }

        // Requested properties; drivers may silently pick the closest mode.
        capture.set(videoio::CAP_PROP_FRAME_WIDTH, config.frame_width as f64)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, config.frame_height as f64)?;
        capture.set(videoio::CAP_PROP_FPS, config.capture_fps as f64)?;

        Ok(Self { capture })
    }
}

impl FrameSource for Camera {
    fn read_frame(&mut self) -> Result<Mat, CameraError> {
        let mut frame = Mat::default();
        self.capture
            .read(&mut frame)
            .map_err(CameraError::ReadFrameFailed)?;
        Ok(frame)
    }
}
