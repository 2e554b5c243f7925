//! Wire protocol: the client/server message vocabulary from spec.md §6,
//! plus the additional events SPEC_FULL.md §6.1 names to make the
//! protocol runnable (`waitroom_timeout`, the probe out-of-band channel,
//! heartbeats).
//!
//! Tagged with `#[serde(tag = "type", content = "data")]`, so each frame
//! on the wire looks like `{"type": "start_game", "data": {...}}`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EndReason;
use crate::ids::{GameId, SceneId, SubjectId};
use crate::runtime::GameMode;

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    RegisterSubject {
        subject_id: SubjectId,
        connection_id: Uuid,
    },
    ScreeningResult {
        pass: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    RuntimeLoadingStart,
    RuntimeLoadingComplete {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    AdvanceScene,
    PlayerAction {
        game_id: GameId,
        #[serde(with = "bytes_serde")]
        action: bytes::Bytes,
        input_frame: u64,
    },
    StateHash {
        game_id: GameId,
        frame: u64,
        hash: u64,
    },
    /// Client-side report for an out-of-band P2P latency probe (§6.1).
    ProbeReport {
        handle: Uuid,
        rtt_ms: u32,
    },
    Heartbeat,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    ExperimentConfig {
        pyodide_config: PyodideConfig,
        entry_screening: bool,
    },
    ActivateScene {
        scene_id: SceneId,
        metadata: serde_json::Value,
    },
    /// Sent when a join finds no matchmaker match yet (spec.md §4.4 "emit
    /// a waiting notice to the subject and stop").
    Waiting {
        scene_id: SceneId,
    },
    StartGame {
        game_id: GameId,
        seat_index: u32,
        mode: GameMode,
        fps: u32,
        group_key: Uuid,
    },
    StateBroadcast {
        game_id: GameId,
        frame: u64,
        game_state_objects: Vec<GameObject>,
        removed: Vec<u64>,
    },
    EndGame {
        game_id: GameId,
        reason: EndReason,
    },
    /// Relay-mode action brokering (§4.5 "brokers partner actions"): the
    /// runtime rebroadcasts one seat's action to every other seat.
    RelayAction {
        game_id: GameId,
        seat_index: u32,
        #[serde(with = "bytes_serde")]
        action: bytes::Bytes,
        input_frame: u64,
    },
    WaitroomTimeout {
        scene_id: SceneId,
        #[serde(skip_serializing_if = "Option::is_none")]
        redirect: Option<SceneId>,
    },
    ExclusionMessage {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    /// Server-initiated out-of-band P2P latency probe (§6.1).
    ProbeStart {
        handle: Uuid,
        peer_subject_id: SubjectId,
    },
    HeartbeatAck,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PyodideConfig {
    pub needs_pyodide: bool,
    pub packages: Vec<String>,
    pub pyodide_load_timeout_s: u64,
}

/// One object in a `state_broadcast` payload. Clients replace-render: any
/// non-permanent object not present in `game_state_objects` and not listed
/// in `removed` is treated as unchanged, not removed (spec.md §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameObject {
    pub id: u64,
    pub kind: String,
    #[serde(with = "bytes_serde")]
    pub payload: bytes::Bytes,
    #[serde(default)]
    pub permanent: bool,
}

/// Custom serde module for `bytes::Bytes`: works with both JSON (as a byte
/// array) and a future binary encoding without changing the field type.
mod bytes_serde {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serde_bytes::Bytes::new(bytes.as_ref()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let vec: Vec<u8> = serde_bytes::ByteBuf::deserialize(deserializer)?.into_vec();
        Ok(Bytes::from(vec))
    }
}
