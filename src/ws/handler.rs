//! Host bridge WebSocket handler

use std::collections::HashSet;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::host::PlayerId;
use crate::game::EngineInput;
use crate::http::middleware::verify_token;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::ws::protocol::{HostCommand, HostEvent};

/// Query parameters for the bridge connection
#[derive(Debug, Deserialize)]
pub struct HostQuery {
    /// Token signed with the host secret
    pub token: String,
}

/// WebSocket upgrade handler for the host runtime
pub async fn host_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<HostQuery>,
    State(state): State<AppState>,
) -> Response {
    match verify_token(&query.token, &state.config.host_secret) {
        Ok(claims) => {
            info!(runtime = %claims.sub, "Host bridge upgrade");
            ws.on_upgrade(move |socket| handle_socket(socket, claims.sub, state))
        }
        Err(e) => {
            error!(error = %e, "Host bridge auth failed");
            e.into_response()
        }
    }
}

async fn handle_socket(socket: WebSocket, runtime: String, state: AppState) {
    info!(runtime = %runtime, "Host runtime connected");

    let (ws_sink, ws_stream) = socket.split();
    let command_rx = state.engine.subscribe_commands();
    let input_tx = state.engine.input_tx.clone();

    let seen = run_session(&runtime, &state, ws_sink, ws_stream, command_rx, &input_tx).await;

    // The runtime's players are gone with it
    for player_id in seen {
        state.player_limiters.remove(&player_id);
        let _ = input_tx
            .send(EngineInput::Host(HostEvent::PlayerLeft { player_id }))
            .await;
    }

    info!(runtime = %runtime, "Host runtime disconnected");
}

/// Pump commands out and events in until either side closes. Returns the
/// players still connected through this runtime.
async fn run_session(
    runtime: &str,
    state: &AppState,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut command_rx: broadcast::Receiver<HostCommand>,
    input_tx: &mpsc::Sender<EngineInput>,
) -> HashSet<PlayerId> {
    let writer_runtime = runtime.to_string();
    let writer_handle = tokio::spawn(async move {
        loop {
            match command_rx.recv().await {
                Ok(command) => {
                    if let Err(e) = send_command(&mut ws_sink, &command).await {
                        debug!(runtime = %writer_runtime, error = %e, "Bridge send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        runtime = %writer_runtime,
                        lagged_count = n,
                        "Runtime lagged, dropped {} commands", n
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(runtime = %writer_runtime, "Command channel closed");
                    break;
                }
            }
        }
    });

    let mut seen = HashSet::new();

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let event = match serde_json::from_str::<HostEvent>(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(runtime = %runtime, error = %e, "Failed to parse host event");
                        continue;
                    }
                };

                match &event {
                    HostEvent::PlayerJoined { player_id, .. } => {
                        seen.insert(*player_id);
                    }
                    HostEvent::PlayerLeft { player_id } => {
                        seen.remove(player_id);
                        state.player_limiters.remove(player_id);
                    }
                    HostEvent::Ui { player_id, .. } => {
                        let allowed = state
                            .player_limiters
                            .entry(*player_id)
                            .or_insert_with(PlayerRateLimiter::new)
                            .check_ui();
                        if !allowed {
                            warn!(player_id = %player_id, "Rate limited UI message");
                            continue;
                        }
                    }
                    HostEvent::Trigger { player_id, .. } => {
                        let allowed = state
                            .player_limiters
                            .entry(*player_id)
                            .or_insert_with(PlayerRateLimiter::new)
                            .check_trigger();
                        if !allowed {
                            debug!(player_id = %player_id, "Rate limited trigger");
                            continue;
                        }
                    }
                    _ => {}
                }

                if input_tx.send(EngineInput::Host(event)).await.is_err() {
                    debug!(runtime = %runtime, "Engine input channel closed");
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(runtime = %runtime, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(runtime = %runtime, "Runtime initiated close");
                break;
            }
            Err(e) => {
                error!(runtime = %runtime, error = %e, "Bridge socket error");
                break;
            }
        }
    }

    writer_handle.abort();
    seen
}

async fn send_command(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    command: &HostCommand,
) -> Result<(), String> {
    let json = serde_json::to_string(command).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
