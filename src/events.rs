use crate::classify::Status;
use crate::stats::StatsSnapshot;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Outbound dashboard events, serialized as tagged JSON text frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    DetectionResult {
        status: Status,
        defects_detected: bool,
        pass_count: u64,
        ng_count: u64,
        total_count: u64,
        ng_rate: f64,
    },
    VideoFrame {
        /// Base64-encoded JPEG of the annotated frame.
        frame: String,
    },
    SystemStatus {
        is_running: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl Event {
    pub fn detection_result(status: Status, defects_detected: bool, stats: StatsSnapshot) -> Self {
        Event::DetectionResult {
            status,
            defects_detected,
            pass_count: stats.pass,
            ng_count: stats.ng,
            total_count: stats.total,
            ng_rate: stats.ng_rate(),
        }
    }

    pub fn system_status(is_running: bool, message: Option<String>) -> Self {
        Event::SystemStatus {
            is_running,
            message,
        }
    }
}

/// Inbound control commands from dashboard clients. No payloads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    StartDetection,
    StopDetection,
    RestartSystem,
}

/// Fire-and-forget fan-out to every connected dashboard. Subscribers that
/// fall behind lose events; there is no queuing or replay.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<Event>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: Event) {
        // Err means no subscriber is connected right now.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_result_serializes_with_dashboard_field_names() {
        let stats = StatsSnapshot {
            total: 10,
            pass: 9,
            ng: 1,
        };
        let event = Event::detection_result(Status::Ng, true, stats);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "detection_result");
        assert_eq!(json["status"], "NG");
        assert_eq!(json["defects_detected"], true);
        assert_eq!(json["pass_count"], 9);
        assert_eq!(json["ng_count"], 1);
        assert_eq!(json["total_count"], 10);
        assert_eq!(json["ng_rate"], 10.0);
    }

    #[test]
    fn system_status_omits_absent_message() {
        let json = serde_json::to_value(Event::system_status(true, None)).unwrap();
        assert_eq!(json["type"], "system_status");
        assert_eq!(json["is_running"], true);
        assert!(json.get("message").is_none());

        let json =
            serde_json::to_value(Event::system_status(false, Some("Failed to initialize camera".into())))
                .unwrap();
        assert_eq!(json["message"], "Failed to initialize camera");
    }

    #[test]
    fn commands_parse_from_tagged_json() {
        let command: Command = serde_json::from_str(r#"{"type":"start_detection"}"#).unwrap();
        assert_eq!(command, Command::StartDetection);
        let command: Command = serde_json::from_str(r#"{"type":"stop_detection"}"#).unwrap();
        assert_eq!(command, Command::StopDetection);
        let command: Command = serde_json::from_str(r#"{"type":"restart_system"}"#).unwrap();
        assert_eq!(command, Command::RestartSystem);
        assert!(serde_json::from_str::<Command>(r#"{"type":"reboot"}"#).is_err());
    }

    #[test]
    fn hub_fans_out_to_every_subscriber() {
        let hub = EventHub::new(4);
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        hub.publish(Event::system_status(true, None));

        assert_eq!(first.try_recv().unwrap(), Event::system_status(true, None));
        assert_eq!(second.try_recv().unwrap(), Event::system_status(true, None));
    }
}
