use crate::camera::FrameSource;
use crate::classify::{DefectRules, Status};
use crate::cv_utils::{CvUtilsError, ImageConverter};
use crate::detector::Detector;
use crate::events::{Event, EventHub};
use crate::stats::{FpsCounter, SessionStats};
use crate::telemetry::Metrics;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use opencv::{core::Mat, prelude::*};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};
use tokio::{sync::mpsc, task::JoinHandle, time::sleep};

/// One processed frame's worth of outbound events.
pub struct FrameUpdate {
    pub detection: Event,
    pub frame: Event,
}

/// Drains the bounded worker channel into the broadcast hub, keeping
/// transport delivery off the capture/inference path. Lives for the
/// process lifetime, across worker restarts.
pub fn spawn_publisher(hub: EventHub, mut frames_rx: mpsc::Receiver<FrameUpdate>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(update) = frames_rx.recv().await {
            hub.publish(update.detection);
            hub.publish(update.frame);
        }
        tracing::debug!("Frame publisher stopped");
    })
}

/// Capture→infer→classify→annotate→publish loop. Owns the camera for the
/// duration of a session; exits when the running flag clears or the
/// device stops producing frames.
pub(crate) struct InspectionWorker {
    pub(crate) camera: Box<dyn FrameSource>,
    pub(crate) detector: Arc<dyn Detector>,
    pub(crate) rules: Arc<DefectRules>,
    pub(crate) stats: Arc<parking_lot::Mutex<SessionStats>>,
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) frames_tx: mpsc::Sender<FrameUpdate>,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) loop_delay: Duration,
}

impl InspectionWorker {
    pub(crate) async fn run(mut self) {
        let mut fps = FpsCounter::new(Instant::now());

        while self.running.load(Ordering::SeqCst) {
            let frame = match self.camera.read_frame() {
                Ok(frame) if !frame.empty() => frame,
                Ok(_) => {
                    tracing::warn!("Camera signalled end of stream, capture loop exiting");
                    break;
                }
                Err(e) => {
                    tracing::warn!("Camera read failed, capture loop exiting: {e}");
                    break;
                }
            };
            self.metrics.record_frame();

            match self.process_frame(frame, &mut fps) {
                Ok(Some(update)) => {
                    if self.frames_tx.try_send(update).is_err() {
                        tracing::debug!("Publisher queue full, dropping frame");
                    }
                }
                // Inference failed for this tick; already logged, nothing published.
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Frame processing error: {e}");
                }
            }

            sleep(self.loop_delay).await;
        }

        tracing::info!("Capture loop stopped");
    }

    fn process_frame(
        &self,
        mut frame: Mat,
        fps: &mut FpsCounter,
    ) -> Result<Option<FrameUpdate>, CvUtilsError> {
        let image_data = ImageConverter::encode_mat_to_jpg(&frame)?;

        let inference_started = Instant::now();
        let detections = match self.detector.detect(&image_data) {
            Ok(detections) => detections,
            Err(e) => {
                tracing::error!("Detection error: {e}");
                return Ok(None);
            }
        };
        self.metrics
            .record_inference_duration(inference_started.elapsed().as_millis() as u64);

        let (defect_flags, status) = self.rules.evaluate(&detections);

        let now = Instant::now();
        let snapshot = {
            let mut stats = self.stats.lock();
            if stats.record(status, now) {
                self.metrics.record_inspection(status.as_str());
            }
            stats.snapshot()
        };
        let fps_value = fps.tick(now);
        self.metrics.record_camera_fps(fps_value as f64);

        ImageConverter::annotate_detections(&mut frame, &detections, &defect_flags)?;
        ImageConverter::draw_status_banner(&mut frame, status, fps_value)?;
        let annotated = ImageConverter::encode_mat_to_jpg(&frame)?;

        Ok(Some(FrameUpdate {
            detection: Event::detection_result(status, status == Status::Ng, snapshot),
            frame: Event::VideoFrame {
                frame: BASE64.encode(annotated),
            },
        }))
    }
}
