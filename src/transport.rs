//! Duplex transport contract (spec.md §4.1) and its in-process
//! realization over WebSocket connections (SPEC_FULL.md §4.12).
//!
//! A `local_clients` map of connection -> outbound channel plus a
//! `room_players` map, both guarded by `tokio::sync::RwLock` rather than
//! `DashMap` since room membership must become visible together with
//! `GameManager` state under Rule L3.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};

use crate::ids::{ConnectionId, RoomId};
use crate::protocol::ServerMessage;

/// `send`/`broadcast`/`join_room`/`leave_room`/`close_room`, per spec.md
/// §4.1. Per-connection delivery is best-effort ordered; there is no
/// cross-sender ordering guarantee.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, connection_id: ConnectionId, message: ServerMessage);
    async fn broadcast(&self, room_id: RoomId, message: ServerMessage);
    async fn join_room(&self, connection_id: ConnectionId, room_id: RoomId);
    async fn leave_room(&self, connection_id: ConnectionId, room_id: RoomId);
    async fn close_room(&self, room_id: RoomId);
}

/// In-process `Transport`: every connection's outbound channel is a
/// `tokio::sync::mpsc::Sender<Arc<ServerMessage>>` feeding that
/// connection's websocket send task (`crate::websocket::connection`).
#[derive(Default)]
pub struct InProcessTransport {
    connections: RwLock<HashMap<ConnectionId, mpsc::Sender<Arc<ServerMessage>>>>,
    rooms: RwLock<HashMap<RoomId, HashSet<ConnectionId>>>,
}

impl InProcessTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly connected socket's outbound channel. Called by
    /// the websocket upgrade handler before dispatching any messages.
    pub async fn register_connection(&self, connection_id: ConnectionId, sender: mpsc::Sender<Arc<ServerMessage>>) {
        self.connections.write().await.insert(connection_id, sender);
    }

    /// Drops a connection's outbound channel and removes it from every
    /// room. Called on every connection-task exit path.
    pub async fn unregister_connection(&self, connection_id: ConnectionId) {
        self.connections.write().await.remove(&connection_id);
        let mut rooms = self.rooms.write().await;
        rooms.retain(|_, members| {
            members.remove(&connection_id);
            !members.is_empty()
        });
    }

    #[must_use]
    pub async fn room_size(&self, room_id: RoomId) -> usize {
        self.rooms.read().await.get(&room_id).map_or(0, HashSet::len)
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn send(&self, connection_id: ConnectionId, message: ServerMessage) {
        let connections = self.connections.read().await;
        if let Some(sender) = connections.get(&connection_id) {
            if sender.try_send(Arc::new(message)).is_err() {
                tracing::warn!(%connection_id, "failed to send message, connection buffer full or closed");
            }
        } else {
            tracing::debug!(%connection_id, "send target not registered, dropping message");
        }
    }

    async fn broadcast(&self, room_id: RoomId, message: ServerMessage) {
        let rooms = self.rooms.read().await;
        let Some(members) = rooms.get(&room_id) else {
            return;
        };
        let connections = self.connections.read().await;
        let payload = Arc::new(message);
        for connection_id in members {
            if let Some(sender) = connections.get(connection_id) {
                if sender.try_send(Arc::clone(&payload)).is_err() {
                    tracing::warn!(%connection_id, %room_id, "failed to broadcast, connection buffer full or closed");
                }
            }
        }
    }

    async fn join_room(&self, connection_id: ConnectionId, room_id: RoomId) {
        self.rooms.write().await.entry(room_id).or_default().insert(connection_id);
    }

    async fn leave_room(&self, connection_id: ConnectionId, room_id: RoomId) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(&room_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                rooms.remove(&room_id);
            }
        }
    }

    async fn close_room(&self, room_id: RoomId) {
        self.rooms.write().await.remove(&room_id);
    }
}
