use crate::camera::{Camera, CameraError, FrameSource};
use crate::classify::DefectRules;
use crate::config::{CameraConfig, Config};
use crate::detector::Detector;
use crate::stats::SessionStats;
use crate::telemetry::Metrics;
use crate::worker::{FrameUpdate, InspectionWorker};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use thiserror::Error;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time::sleep,
};

const RESTART_PAUSE: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("Camera acquisition task failed: {0}")]
    CameraTask(#[from] tokio::task::JoinError),
}

/// Produces a frame source for a new worker. The default acquires the
/// capture device; tests substitute sources that need no hardware.
pub type CameraFactory =
    Arc<dyn Fn(&CameraConfig) -> Result<Box<dyn FrameSource>, CameraError> + Send + Sync>;

struct SessionState {
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

/// Supervisor over the capture loop. Guarantees at most one worker per
/// session: control operations serialize on the state mutex, so a
/// concurrent start cannot spawn a second loop.
///
/// Production counters live here, outside the worker, so they survive
/// stop/start and reset only when the process restarts.
pub struct InspectionSession {
    config: Config,
    detector: Arc<dyn Detector>,
    rules: Arc<DefectRules>,
    camera_factory: CameraFactory,
    frames_tx: mpsc::Sender<FrameUpdate>,
    metrics: Arc<Metrics>,
    stats: Arc<parking_lot::Mutex<SessionStats>>,
    state: Mutex<SessionState>,
}

impl InspectionSession {
    pub fn new(
        config: Config,
        detector: Arc<dyn Detector>,
        frames_tx: mpsc::Sender<FrameUpdate>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let camera_factory: CameraFactory = Arc::new(|camera_config: &CameraConfig| {
            Ok(Box::new(Camera::open(camera_config)?) as Box<dyn FrameSource>)
        });
        Self::with_camera_factory(config, detector, frames_tx, metrics, camera_factory)
    }

    pub fn with_camera_factory(
        config: Config,
        detector: Arc<dyn Detector>,
        frames_tx: mpsc::Sender<FrameUpdate>,
        metrics: Arc<Metrics>,
        camera_factory: CameraFactory,
    ) -> Self {
        let rules = Arc::new(DefectRules::new(&config.classification));
        Self {
            config,
            detector,
            rules,
            camera_factory,
            frames_tx,
            metrics,
            stats: Arc::new(parking_lot::Mutex::new(SessionStats::new())),
            state: Mutex::new(SessionState {
                running: Arc::new(AtomicBool::new(false)),
                worker: None,
            }),
        }
    }

    /// Acquires the camera and spawns the capture loop. A no-op when the
    /// session is already marked running. On camera failure the session
    /// stays stopped and the error is reported to the caller.
    pub async fn start(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        if state.running.load(Ordering::SeqCst) {
            tracing::debug!("Start requested while already running");
            return Ok(());
        }

        // Device probing can stall for seconds on slow hardware; keep it
        // off the runtime threads. The state mutex stays held so another
        // control call cannot slip in and double-spawn.
        let camera_factory = self.camera_factory.clone();
        let camera_config = self.config.camera.clone();
        let camera =
            tokio::task::spawn_blocking(move || camera_factory(&camera_config)).await??;
        state.running.store(true, Ordering::SeqCst);

        let worker = InspectionWorker {
            camera,
            detector: self.detector.clone(),
            rules: self.rules.clone(),
            stats: self.stats.clone(),
            running: state.running.clone(),
            frames_tx: self.frames_tx.clone(),
            metrics: self.metrics.clone(),
            loop_delay: Duration::from_millis(self.config.camera.get_loop_delay_ms()),
        };
        state.worker = Some(tokio::spawn(worker.run()));
        tracing::info!("Inspection started");

        Ok(())
    }

    /// Clears the running flag. The worker observes it at the top of its
    /// next iteration, exits, and releases the camera; stop does not wait
    /// for that to happen. Counters are left untouched.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        state.running.store(false, Ordering::SeqCst);
        state.worker.take();
        tracing::info!("Inspection stopped");
    }

    /// Stop, pause for device release, start. Behaves like a plain start
    /// when the session is already stopped.
    pub async fn restart(&self) -> Result<(), SessionError> {
        self.stop().await;
        sleep(RESTART_PAUSE).await;
        self.start().await
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Status;
    use crate::config::{
        CameraConfig, ClassificationConfig, DetectorConfig, LogLevel, ServerConfig,
    };
    use crate::detector::{Detection, DetectorError};
    use opencv::core::Mat;
    use std::path::PathBuf;
    use std::time::Instant;

    struct StubDetector;

    impl Detector for StubDetector {
        fn detect(&self, _image_data: &[u8]) -> Result<Vec<Detection>, DetectorError> {
            Ok(vec![])
        }
    }

    /// Signals end-of-stream immediately, so a spawned worker exits on
    /// its first read without needing a device.
    struct EndOfStreamSource;

    impl FrameSource for EndOfStreamSource {
        fn read_frame(&mut self) -> Result<Mat, CameraError> {
            Ok(Mat::default())
        }
    }

    fn end_of_stream_factory() -> CameraFactory {
        Arc::new(|_: &CameraConfig| Ok(Box::new(EndOfStreamSource) as Box<dyn FrameSource>))
    }

    fn unavailable_device_factory() -> CameraFactory {
        Arc::new(|camera_config: &CameraConfig| {
            Err(CameraError::DeviceUnavailable(camera_config.device_index))
        })
    }

    fn test_session(camera_factory: CameraFactory) -> InspectionSession {
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            log_level: LogLevel::Info,
            camera: CameraConfig {
                device_index: 0,
                frame_width: 1280,
                frame_height: 720,
                capture_fps: 30,
            },
            detector: DetectorConfig {
                model_dir: PathBuf::from("models"),
                onnx_file: "model.onnx".to_string(),
                labels_file: "labels.txt".to_string(),
                confidence_threshold: 0.5,
            },
            classification: ClassificationConfig::default(),
        };
        let (frames_tx, _frames_rx) = mpsc::channel(8);
        InspectionSession::with_camera_factory(
            config,
            Arc::new(StubDetector),
            frames_tx,
            Arc::new(Metrics::new()),
            camera_factory,
        )
    }

    #[tokio::test]
    async fn start_when_running_is_idempotent() {
        let session = test_session(unavailable_device_factory());
        {
            let state = session.state.lock().await;
            state.running.store(true, Ordering::SeqCst);
        }

        // Returns without touching the device or spawning a worker; the
        // factory here would error if the acquisition path were taken.
        session.start().await.unwrap();

        let state = session.state.lock().await;
        assert!(state.running.load(Ordering::SeqCst));
        assert!(state.worker.is_none());
    }

    #[tokio::test]
    async fn start_spawns_a_worker_and_marks_running() {
        let session = test_session(end_of_stream_factory());

        session.start().await.unwrap();

        let state = session.state.lock().await;
        assert!(state.running.load(Ordering::SeqCst));
        assert!(state.worker.is_some());
    }

    #[tokio::test]
    async fn failed_camera_acquisition_leaves_session_stopped() {
        let session = test_session(unavailable_device_factory());

        let result = session.start().await;

        assert!(matches!(
            result,
            Err(SessionError::Camera(CameraError::DeviceUnavailable(0)))
        ));
        let state = session.state.lock().await;
        assert!(!state.running.load(Ordering::SeqCst));
        assert!(state.worker.is_none());
    }

    #[tokio::test]
    async fn stop_when_stopped_is_a_noop() {
        let session = test_session(unavailable_device_factory());
        session.stop().await;
        assert!(!session.is_running().await);
    }

    #[tokio::test]
    async fn restart_while_stopped_behaves_like_start() {
        let session = test_session(end_of_stream_factory());
        assert!(!session.is_running().await);

        session.restart().await.unwrap();

        let state = session.state.lock().await;
        assert!(state.running.load(Ordering::SeqCst));
        assert!(state.worker.is_some());
    }

    #[tokio::test]
    async fn counters_survive_a_stop_start_cycle() {
        let session = test_session(end_of_stream_factory());
        session.stats.lock().record(Status::Ng, Instant::now());

        session.stop().await;
        session.start().await.unwrap();

        let snapshot = session.stats.lock().snapshot();
        assert_eq!(snapshot.total, 1);
        assert_eq!(snapshot.ng, 1);
    }
}
