use crate::events::{Command, Event, EventHub};
use crate::server::SharedState;
use crate::session::InspectionSession;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::instrument;

#[instrument(skip(ws, state))]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sink, mut stream) = socket.split();

    // Bring the new client up to date with the current loop state.
    let hello = Event::system_status(state.session.is_running().await, None);
    if let Ok(text) = serde_json::to_string(&hello) {
        if sink.send(Message::Text(text.into())).await.is_err() {
            return;
        }
    }

    let mut events_rx = state.hub.subscribe();
    let mut send_task = tokio::spawn(async move {
        loop {
            match events_rx.recv().await {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Slow websocket client skipped {skipped} events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let session = state.session.clone();
    let hub = state.hub.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            match message {
                Message::Text(text) => match serde_json::from_str::<Command>(&text) {
                    Ok(command) => handle_command(command, &session, &hub).await,
                    Err(e) => tracing::debug!("Ignoring unrecognized client message: {e}"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn handle_command(command: Command, session: &InspectionSession, hub: &EventHub) {
    match command {
        Command::StartDetection => match session.start().await {
            Ok(()) => hub.publish(Event::system_status(true, None)),
            Err(e) => {
                tracing::error!("Failed to start inspection: {e}");
                hub.publish(Event::system_status(
                    false,
                    Some("Failed to initialize camera".to_string()),
                ));
            }
        },
        Command::StopDetection => {
            session.stop().await;
            hub.publish(Event::system_status(false, None));
        }
        Command::RestartSystem => match session.restart().await {
            Ok(()) => hub.publish(Event::system_status(true, None)),
            Err(e) => {
                tracing::error!("Failed to restart inspection: {e}");
                hub.publish(Event::system_status(
                    false,
                    Some("Failed to restart detection".to_string()),
                ));
            }
        },
    }
}
