//! Game runtime: the two variants of an in-flight game's simulation loop
//! (spec.md §4.5). `GameManager` (`crate::game`) holds each running game's
//! runtime behind `Arc<dyn GameRuntimeHandle>` and never matches on which
//! variant it is -- the same opaque-handle seam `ProbeCoordinator` uses for
//! its oracle.

pub mod authoritative;
pub mod relay;

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::EndReason;
use crate::ids::{ConnectionId, GameId, SubjectId};
use crate::protocol::GameObject;

pub use authoritative::AuthoritativeRuntime;
pub use relay::RelayRuntime;

/// Which variant a `Game` runs (spec.md §3's `Game.mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    ServerAuthoritative,
    Relay,
}

/// A seat in a running game: its subject and the connection to reach it.
/// A seat's position in the slice passed to a runtime's `spawn` is its
/// seat index.
#[derive(Debug, Clone, Copy)]
pub struct Seat {
    pub subject_id: SubjectId,
    pub connection_id: ConnectionId,
}

pub(crate) fn seat_index_by_subject(seats: &[Seat]) -> HashMap<SubjectId, u32> {
    seats
        .iter()
        .enumerate()
        .map(|(index, seat)| (seat.subject_id, index as u32))
        .collect()
}

/// Contract shared by both runtime variants (spec.md §4.5).
#[async_trait]
pub trait GameRuntimeHandle: Send + Sync {
    /// Enqueues `action`, tagged with the client's `input_frame`. Never
    /// blocks past enqueue (Rule L2); a full buffer drops the action.
    fn ingest_action(&self, subject_id: SubjectId, action: Bytes, input_frame: u64);

    /// Relay-mode consistency check (spec.md §6 `state_hash`). A no-op for
    /// the server-authoritative variant, which has no client-side
    /// simulation to validate against.
    fn report_state_hash(&self, _subject_id: SubjectId, _frame: u64, _hash: u64) {}

    /// Cancels the runtime's tick task and releases its environment.
    /// Idempotent: a second call after teardown is a no-op.
    async fn request_teardown(&self);
}

/// Per-tick simulation contract. The engine never interprets action or
/// state payloads beyond routing them -- scene content is out of scope
/// (spec.md §1).
pub trait SimulationEnvironment: Send {
    /// Advances the environment by one tick given the latest action per
    /// seat index (a seat with no action uses [`Self::default_action`]).
    fn step(&mut self, actions: &HashMap<u32, Bytes>) -> StepOutcome;

    /// Resets to a fresh episode. Called whenever `step` reports
    /// `episode_done`.
    fn reset(&mut self);

    fn default_action(&self) -> Bytes {
        Bytes::new()
    }

    /// Opaque per-episode trace handed to the `ExportSink` on episode
    /// boundary, if the scene requests recording. `None` skips export.
    fn export_episode(&self) -> Option<Bytes> {
        None
    }
}

/// Result of one [`SimulationEnvironment::step`].
pub struct StepOutcome {
    pub objects: Vec<GameObject>,
    pub removed: Vec<u64>,
    pub episode_done: bool,
}

/// Delivered once a game's runtime stops running, for `GameManager` to
/// drive `cleanup_game` -- the single-direction "terminated" event the
/// REDESIGN FLAGS call for, replacing a manager/runtime cyclic callback.
#[derive(Debug, Clone, Copy)]
pub struct TerminationEvent {
    pub game_id: GameId,
    pub reason: EndReason,
}
