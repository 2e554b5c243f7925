#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Scene Engine
//!
//! Tracks each connected participant's position in a scripted sequence of
//! scenes, forms groups via a latency-aware matchmaker, drives running
//! games, and tears down shared state idempotently on every exit path.

/// Server configuration and environment variables.
pub mod config;

/// Opaque identifier newtypes (`SubjectId`, `GameId`, `SceneId`, ...).
pub mod ids;

/// Subsystem error types.
pub mod error;

/// Structured logging configuration.
pub mod logging;

/// Metrics collection and reporting.
pub mod metrics;

/// Wire protocol message definitions.
pub mod protocol;

/// Process-wide participant session tracking and reconnection grace.
pub mod session;

/// Per-subject scripted scene sequencing.
pub mod stager;

/// Two-signal loading gate (entry screening + runtime readiness).
pub mod loading_gate;

/// Candidate matching (FIFO / latency-aware).
pub mod matchmaker;

/// Peer-to-peer latency probe orchestration.
pub mod probe;

/// Append-only record of who played together.
pub mod pairing;

/// Append-only match log and per-episode export sink.
pub mod recording;

/// Per-scene game queues, running games, and the central cleanup path.
pub mod game;

/// Server-authoritative and relay game runtime variants.
pub mod runtime;

/// Process-scoped aggregate wiring every collaborator above.
pub mod engine;

/// Transport: WebSocket connections, rooms, broadcast.
pub mod transport;

/// Axum routes and per-connection WebSocket handling.
pub mod websocket;
