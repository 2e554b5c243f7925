//! Per-connection I/O: one send task draining the connection's outbound
//! channel to the socket, and the upgrade task reading frames and
//! dispatching decoded `ClientMessage`s into the engine.
//!
//! Splits the socket, registers an outbound channel, runs send/receive
//! concurrently, and cleans up on either exit. Batching, auth, and binary
//! encoding negotiation are out of scope; this protocol only ever carries
//! JSON text frames.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::engine::Engine;
use crate::ids::{ConnectionId, SubjectId};
use crate::protocol::{ClientMessage, ServerMessage};

const OUTBOUND_CHANNEL_CAPACITY: usize = 32;

pub(super) async fn handle_socket(socket: WebSocket, engine: Arc<Engine>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Arc<ServerMessage>>(OUTBOUND_CHANNEL_CAPACITY);

    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let payload = match serde_json::to_string(message.as_ref()) {
                Ok(payload) => payload,
                Err(error) => {
                    tracing::error!(%error, "failed to serialize server message");
                    continue;
                }
            };
            if sink.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    let mut identity: Option<(SubjectId, ConnectionId)> = None;

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(error) => {
                tracing::debug!(%error, "websocket read error, closing connection");
                break;
            }
        };

        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let client_message: ClientMessage = match serde_json::from_str(&text) {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(%error, "failed to parse client frame, ignoring");
                continue;
            }
        };

        match (client_message, identity) {
            (ClientMessage::RegisterSubject { subject_id, connection_id }, None) => {
                let connection_id = ConnectionId(connection_id);
                let reconnected = engine.reconnect(subject_id, connection_id, tx.clone()).await;
                if !reconnected {
                    if let Err(error) = engine.register_subject(subject_id, connection_id, tx.clone()).await {
                        tracing::warn!(%subject_id, %error, "register_subject rejected, closing connection");
                        break;
                    }
                }
                identity = Some((subject_id, connection_id));
            }
            (_, None) => {
                tracing::warn!("client message received before register_subject, ignoring");
            }
            (message, Some((subject_id, connection_id))) => {
                dispatch(&engine, subject_id, connection_id, message).await;
            }
        }
    }

    if let Some((_, connection_id)) = identity {
        engine.disconnect(connection_id).await;
    }
    send_task.abort();
}

async fn dispatch(engine: &Arc<Engine>, subject_id: SubjectId, connection_id: ConnectionId, message: ClientMessage) {
    match message {
        ClientMessage::RegisterSubject { .. } => {
            tracing::debug!(%subject_id, "duplicate register_subject on an active connection, ignoring");
        }
        ClientMessage::ScreeningResult { pass, .. } => {
            engine.screening_result(subject_id, connection_id, pass).await;
        }
        ClientMessage::RuntimeLoadingStart => {
            engine.runtime_loading_start(subject_id);
        }
        ClientMessage::RuntimeLoadingComplete { ok, .. } => {
            engine.runtime_loading_complete(subject_id, connection_id, ok).await;
        }
        ClientMessage::AdvanceScene => {
            engine.advance_scene(subject_id, connection_id).await;
        }
        ClientMessage::PlayerAction { action, input_frame, .. } => {
            engine.player_action(subject_id, action, input_frame).await;
        }
        ClientMessage::StateHash { frame, hash, .. } => {
            engine.state_hash(subject_id, frame, hash).await;
        }
        ClientMessage::ProbeReport { handle, rtt_ms } => {
            engine.probe_report(handle, rtt_ms);
        }
        ClientMessage::Heartbeat => {
            engine.transport().send(connection_id, ServerMessage::HeartbeatAck).await;
        }
    }
}
