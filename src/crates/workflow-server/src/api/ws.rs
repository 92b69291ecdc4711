//! Live step log streaming over WebSocket
//!
//! `WS /graph/ws/logs/:run_id` forwards step events for one run as they are
//! persisted. A run that is already terminal when the client connects has its
//! log replayed and the socket is closed. Unknown run ids are rejected with
//! 404 before the upgrade.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt, Sink};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use workflow_core::{RunStatus, StepEvent, StepRecord};

use crate::api::{error::ApiResult, routes::AppState};

/// Frames sent to log stream clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogFrame {
    Connected { run_id: String, message: String },
    Log { run_id: String, entry: StepRecord },
    Finished { run_id: String, status: RunStatus },
    Ack { message: String },
}

impl LogFrame {
    fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(text) => Some(Message::Text(text)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode log frame");
                None
            }
        }
    }
}

/// GET /graph/ws/logs/:run_id
pub async fn log_stream(
    ws: WebSocketUpgrade,
    Path(run_id): Path<String>,
    State(app_state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    app_state.engine.get_run(&run_id).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, run_id, app_state)))
}

async fn handle_socket(socket: WebSocket, run_id: String, app_state: AppState) {
    // Subscribe before anything else so no step published after this point is missed
    let mut events = app_state.broadcast.subscribe();
    let (mut sender, mut receiver) = socket.split();

    tracing::info!(run_id = %run_id, "Log stream client connected");

    let connected = LogFrame::Connected {
        run_id: run_id.clone(),
        message: "Connected to log stream".to_string(),
    };
    if !send(&mut sender, &connected).await {
        return;
    }

    if let Ok(run) = app_state.engine.get_run(&run_id).await {
        if run.is_terminal() {
            for entry in run.log {
                let frame = LogFrame::Log {
                    run_id: run_id.clone(),
                    entry,
                };
                if !send(&mut sender, &frame).await {
                    return;
                }
            }
            let finished = LogFrame::Finished {
                run_id: run_id.clone(),
                status: run.status,
            };
            send(&mut sender, &finished).await;
            let _ = sender.close().await;
            return;
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) if event.run_id() == run_id => {
                    let (frame, done) = match event {
                        StepEvent::Step { run_id, step } => (LogFrame::Log { run_id, entry: step }, false),
                        StepEvent::Finished { run_id, status, .. } => (LogFrame::Finished { run_id, status }, true),
                    };
                    if !send(&mut sender, &frame).await || done {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(run_id = %run_id, skipped, "Log stream client lagged");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(_))) => {
                    let ack = LogFrame::Ack {
                        message: "Message received".to_string(),
                    };
                    if !send(&mut sender, &ack).await {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(run_id = %run_id, error = %e, "Log stream receive error");
                    break;
                }
            },
        }
    }

    let _ = sender.close().await;
    tracing::info!(run_id = %run_id, "Log stream client disconnected");
}

async fn send<S>(sender: &mut S, frame: &LogFrame) -> bool
where
    S: Sink<Message> + Unpin,
{
    match frame.to_message() {
        Some(message) => sender.send(message).await.is_ok(),
        None => false,
    }
}
