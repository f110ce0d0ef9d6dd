use crate::config::Config;
use crate::detector::{Detector, OrtDetector};
use crate::events::EventHub;
use crate::server::HttpServer;
use crate::session::InspectionSession;
use crate::telemetry::Metrics;
use crate::worker::spawn_publisher;

use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast, sync::mpsc};

const EVENT_HUB_CAPACITY: usize = 32;
const FRAME_QUEUE_CAPACITY: usize = 8;

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let detector: Arc<dyn Detector> = match OrtDetector::new(&config.detector) {
        Ok(detector) => Arc::new(detector),
        Err(e) => {
            tracing::error!("Failed to initialize detector: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let metrics = Arc::new(Metrics::new());
    let hub = EventHub::new(EVENT_HUB_CAPACITY);
    let (frames_tx, frames_rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);
    let publisher = spawn_publisher(hub.clone(), frames_rx);

    let session = Arc::new(InspectionSession::new(
        config.clone(),
        detector,
        frames_tx,
        metrics.clone(),
    ));

    let server = HttpServer::new(session.clone(), hub, metrics, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();
    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    session.stop().await;
    let _ = shutdown_tx.send(());
    let _ = server_handle.await;
    publisher.abort();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
