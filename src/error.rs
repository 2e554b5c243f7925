//! Subsystem error types.
//!
//! Each subsystem that can fail owns a small `thiserror` enum at the
//! boundary it controls. `anyhow::Result` is reserved for process edges
//! (`main.rs`, `Engine::new`) where the caller only needs to log-and-exit,
//! not match on a specific variant.

use thiserror::Error;

use crate::ids::{GameId, SceneId, SubjectId};

/// Errors returned by [`crate::session::SessionRegistry::register`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegisterError {
    #[error("subject {0} is already registered on another connection")]
    DuplicateSubject(SubjectId),
}

/// Errors returned by [`crate::game::GameManager::join`].
///
/// These are the "matchmaker errors fatal to join" spec.md §4.4 describes:
/// the caller's waiting-queue entry is left untouched and the subject stays
/// wherever it was before the call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JoinError {
    #[error("subject {subject} is already in game {game} for scene {scene}")]
    AlreadyInGame {
        subject: SubjectId,
        game: GameId,
        scene: SceneId,
    },
}

/// Errors surfaced by the loading gate to the subject's own connection only
/// (spec.md §7: "per-subject errors surface only on that subject's
/// connection").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadingGateError {
    #[error("entry screening failed: {0}")]
    ScreeningFailed(String),
    #[error("runtime failed to load: {0}")]
    RuntimeFailed(String),
    #[error("loading timed out after {0}s")]
    Timeout(u64),
}

/// Errors from the running game's simulation step.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("environment step failed: {0}")]
    Step(#[source] anyhow::Error),
    #[error("reported state hash diverged from authoritative hash on frame {frame}")]
    Desync { frame: u64 },
}

/// Why a game ended, carried into `on_terminated` and the `end_game` wire
/// event's `reason` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Normal,
    PartnerLost,
    Error,
    Desync,
}
