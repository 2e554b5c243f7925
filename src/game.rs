//! Per-scene game lifecycle (spec.md §4.4): the waiting queue, the atomic
//! create-game step (Rule L3), and `cleanup_game`, the single function
//! every termination path routes through.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use uuid::Uuid;

use crate::error::{EndReason, JoinError};
use crate::ids::{ConnectionId, GameId, RoomId, SceneId, SubjectId};
use crate::matchmaker::{find_match, should_reject_for_rtt, MatchCandidate, MatchmakerConfig};
use crate::metrics::EngineMetrics;
use crate::pairing::PairingRegistry;
use crate::probe::ProbeCoordinator;
use crate::protocol::ServerMessage;
use crate::recording::{ExportSink, MatchLogger};
use crate::runtime::{
    AuthoritativeRuntime, GameMode, GameRuntimeHandle, RelayRuntime, Seat, SimulationEnvironment, TerminationEvent,
};
use crate::transport::Transport;

/// A subject that has arrived but isn't yet seated in a `Game`.
#[derive(Debug, Clone)]
pub struct WaitingEntry {
    pub subject_id: SubjectId,
    pub connection_id: ConnectionId,
    pub measured_rtt_ms: Option<u32>,
    pub arrived_at: DateTime<Utc>,
    pub required_group_key: Option<Uuid>,
}

impl WaitingEntry {
    fn as_candidate(&self) -> MatchCandidate {
        MatchCandidate {
            subject_id: self.subject_id,
            measured_rtt_ms: self.measured_rtt_ms,
            arrived_at: self.arrived_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Waiting,
    Running,
    Ended,
}

/// A seated subject (spec.md §3's "ordered slots of subject_id or
/// Available"). Every seat created by this module is always occupied;
/// `Available` slots aren't reachable through the join/create-game path
/// this module implements, but the type still models the slot as an
/// `Option` for fidelity to that shape.
#[derive(Debug, Clone, Copy)]
pub struct SeatOccupant {
    pub subject_id: SubjectId,
    pub connection_id: ConnectionId,
}

pub struct Game {
    pub game_id: GameId,
    pub scene_id: SceneId,
    pub seats: Vec<Option<SeatOccupant>>,
    pub status: GameStatus,
    pub group_key: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub mode: GameMode,
    runtime: Option<Arc<dyn GameRuntimeHandle>>,
}

#[derive(Default)]
struct ManagerState {
    games: HashMap<GameId, Game>,
    waiting: Vec<WaitingEntry>,
    subject_to_game: HashMap<SubjectId, GameId>,
    subject_to_room: HashMap<SubjectId, RoomId>,
}

/// Owns one scene's waiting queue and running games. Holds its mutable
/// state behind one `tokio::sync::Mutex` (Rule L3: matching and game
/// creation must be atomic) rather than the finer-grained sharding the
/// finer-grained sharding per collection, because spec.md's invariants
/// (M1/M2/M3) are exactly about `waiting`, `games` and `subject_to_game`
/// never being observed out of sync with each other.
pub struct GameManager {
    scene_id: SceneId,
    group_size: usize,
    mode: GameMode,
    matchmaker_config: MatchmakerConfig,
    waitroom_timeout: Duration,
    fps: u32,
    state_broadcast_interval: u32,
    input_delay_frames: u32,
    input_buffer_size: usize,
    episodes_total: u32,
    frame_confirmation_timeout: Duration,
    transport: Arc<dyn Transport>,
    probe: Option<Arc<ProbeCoordinator>>,
    pairing: Option<Arc<PairingRegistry>>,
    match_logger: Option<Arc<MatchLogger>>,
    export_sink: Option<Arc<ExportSink>>,
    environment_factory: Option<Arc<dyn Fn() -> Box<dyn SimulationEnvironment> + Send + Sync>>,
    metrics: Arc<EngineMetrics>,
    terminated_tx: mpsc::UnboundedSender<TerminationEvent>,
    state: AsyncMutex<ManagerState>,
}

/// Configuration a `GameManager` needs beyond its collaborators, grouped
/// so `GameManager::new` doesn't take a dozen bare scalar arguments.
#[derive(Clone, Copy)]
pub struct GameManagerConfig {
    pub group_size: usize,
    pub mode: GameMode,
    pub matchmaker: MatchmakerConfig,
    pub waitroom_timeout: Duration,
    pub fps: u32,
    pub state_broadcast_interval: u32,
    pub input_delay_frames: u32,
    pub input_buffer_size: usize,
    pub episodes_total: u32,
    pub frame_confirmation_timeout: Duration,
}

impl GameManager {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        scene_id: SceneId,
        config: GameManagerConfig,
        transport: Arc<dyn Transport>,
        probe: Option<Arc<ProbeCoordinator>>,
        pairing: Option<Arc<PairingRegistry>>,
        match_logger: Option<Arc<MatchLogger>>,
        export_sink: Option<Arc<ExportSink>>,
        environment_factory: Option<Arc<dyn Fn() -> Box<dyn SimulationEnvironment> + Send + Sync>>,
        metrics: Arc<EngineMetrics>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<TerminationEvent>) {
        let (terminated_tx, terminated_rx) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            scene_id,
            group_size: config.group_size,
            mode: config.mode,
            matchmaker_config: config.matchmaker,
            waitroom_timeout: config.waitroom_timeout,
            fps: config.fps,
            state_broadcast_interval: config.state_broadcast_interval,
            input_delay_frames: config.input_delay_frames,
            input_buffer_size: config.input_buffer_size,
            episodes_total: config.episodes_total,
            frame_confirmation_timeout: config.frame_confirmation_timeout,
            transport,
            probe,
            pairing,
            match_logger,
            export_sink,
            environment_factory,
            metrics,
            terminated_tx,
            state: AsyncMutex::new(ManagerState::default()),
        });
        (manager, terminated_rx)
    }

    #[must_use]
    pub fn scene_id(&self) -> &SceneId {
        &self.scene_id
    }

    /// Drains `rx` for as long as the manager (and its runtimes) live,
    /// routing every termination through `cleanup_game` -- the single-
    /// direction event a runtime's tick task emits instead of calling back
    /// into the manager directly.
    pub async fn run_termination_listener(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<TerminationEvent>) {
        while let Some(event) = rx.recv().await {
            self.cleanup_game(event.game_id, event.reason).await;
        }
    }

    /// Enqueues `subject_id`, looks for a match, and either creates a game
    /// immediately, kicks off an RTT probe, or leaves the subject waiting.
    /// Never blocks on transport I/O while holding the manager lock (Rule
    /// L1): all sends happen after the lock is released.
    pub async fn join(
        self: &Arc<Self>,
        subject_id: SubjectId,
        connection_id: ConnectionId,
        measured_rtt_ms: Option<u32>,
        required_group_key: Option<Uuid>,
    ) -> Result<(), JoinError> {
        let partner_ids = {
            let mut state = self.state.lock().await;

            if let Some(&existing_game) = state.subject_to_game.get(&subject_id) {
                if state.games.contains_key(&existing_game) {
                    return Err(JoinError::AlreadyInGame {
                        subject: subject_id,
                        game: existing_game,
                        scene: self.scene_id.clone(),
                    });
                }
                // Stale: the game it pointed at is already gone. Self-heal
                // rather than reject the new join.
                state.subject_to_game.remove(&subject_id);
                state.subject_to_room.remove(&subject_id);
            }

            let entry = WaitingEntry {
                subject_id,
                connection_id,
                measured_rtt_ms,
                arrived_at: Utc::now(),
                required_group_key,
            };
            state.waiting.push(entry.clone());

            let waiting_candidates: Vec<MatchCandidate> = state
                .waiting
                .iter()
                .filter(|w| w.subject_id != subject_id)
                .map(WaitingEntry::as_candidate)
                .collect();

            find_match(&self.matchmaker_config, &entry.as_candidate(), &waiting_candidates, self.group_size)
        };

        let Some(partner_ids) = partner_ids else {
            self.transport
                .send(connection_id, ServerMessage::Waiting { scene_id: self.scene_id.clone() })
                .await;
            return Ok(());
        };

        let needs_probe = self.probe.is_some() && self.matchmaker_config.max_p2p_rtt_ms.is_some();

        if !needs_probe {
            let mut members = partner_ids;
            members.push(subject_id);
            self.create_and_publish(members).await;
            return Ok(());
        }

        let [partner_id] = partner_ids[..] else {
            tracing::warn!(
                scene = %self.scene_id,
                group_size = self.group_size,
                "probe gating is only implemented for two-candidate pairing"
            );
            return Ok(());
        };

        let probe = self.probe.clone().expect("needs_probe implies a probe is configured");
        let max_p2p_rtt_ms = self.matchmaker_config.max_p2p_rtt_ms;
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let result = probe.create_probe(subject_id, partner_id).await;
            if should_reject_for_rtt(max_p2p_rtt_ms, result) {
                manager.metrics.probes_rejected.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                manager.metrics.matchmaker_rejections_rtt.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                tracing::info!(%subject_id, %partner_id, "probe rejected pairing, both candidates remain queued");
                return;
            }
            manager.metrics.probes_accepted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            manager.create_and_publish(vec![subject_id, partner_id]).await;
        });

        Ok(())
    }

    /// Removes every waiting entry past `waitroom_timeout` and notifies
    /// each one. Expected to be driven by a periodic sweep owned by the
    /// engine aggregate.
    pub async fn sweep_waitroom_timeouts(&self) {
        let deadline = chrono::Duration::from_std(self.waitroom_timeout).unwrap_or_else(|_| chrono::Duration::zero());
        let expired = {
            let mut state = self.state.lock().await;
            let now = Utc::now();
            let mut expired = Vec::new();
            state.waiting.retain(|entry| {
                if now - entry.arrived_at >= deadline {
                    expired.push(entry.clone());
                    false
                } else {
                    true
                }
            });
            expired
        };

        self.metrics.waitroom_timeouts.fetch_add(expired.len() as u64, std::sync::atomic::Ordering::Relaxed);

        for entry in expired {
            self.transport
                .send(
                    entry.connection_id,
                    ServerMessage::WaitroomTimeout {
                        scene_id: self.scene_id.clone(),
                        redirect: None,
                    },
                )
                .await;
        }
    }

    /// Removes `subject_id` from the waiting queue, if present.
    pub async fn leave_waiting(&self, subject_id: SubjectId) -> bool {
        let mut state = self.state.lock().await;
        let before = state.waiting.len();
        state.waiting.retain(|w| w.subject_id != subject_id);
        state.waiting.len() != before
    }

    /// Routes a disconnect-grace expiry (or any other departure) through
    /// whichever of `leave_waiting`/`cleanup_game` applies. Safe to call
    /// for a subject this manager has never heard of.
    pub async fn cleanup_for_subject(self: &Arc<Self>, subject_id: SubjectId) {
        let game_id = {
            let state = self.state.lock().await;
            state.subject_to_game.get(&subject_id).copied()
        };
        if let Some(game_id) = game_id {
            self.cleanup_game(game_id, EndReason::PartnerLost).await;
        } else {
            self.leave_waiting(subject_id).await;
        }
    }

    pub async fn ingest_action(&self, subject_id: SubjectId, action: bytes::Bytes, input_frame: u64) {
        let runtime = self.runtime_for_subject(subject_id).await;
        if let Some(runtime) = runtime {
            runtime.ingest_action(subject_id, action, input_frame);
        }
    }

    pub async fn report_state_hash(&self, subject_id: SubjectId, frame: u64, hash: u64) {
        let runtime = self.runtime_for_subject(subject_id).await;
        if let Some(runtime) = runtime {
            runtime.report_state_hash(subject_id, frame, hash);
        }
    }

    async fn runtime_for_subject(&self, subject_id: SubjectId) -> Option<Arc<dyn GameRuntimeHandle>> {
        let state = self.state.lock().await;
        let game_id = state.subject_to_game.get(&subject_id)?;
        state.games.get(game_id)?.runtime.clone()
    }

    /// The atomic "create game" step (Rule L3): removes the matched
    /// entries from `waiting`, allocates the `Game`, and spawns its
    /// runtime, all under one lock acquisition. Returns `None` if a
    /// member vanished from `waiting` between matching and creation (e.g.
    /// it disconnected while an RTT probe was in flight) -- the caller
    /// aborts rather than starting a game with a missing seat.
    fn try_create_game(
        &self,
        state: &mut ManagerState,
        member_subjects: &[SubjectId],
    ) -> Option<(GameId, Uuid, Vec<WaitingEntry>)> {
        let mut members = Vec::with_capacity(member_subjects.len());
        for subject in member_subjects {
            let position = state.waiting.iter().position(|w| &w.subject_id == subject)?;
            members.push(state.waiting.remove(position));
        }
        members.sort_by_key(|m| m.arrived_at);

        let game_id = GameId::new();
        let group_key = Uuid::new_v4();
        let room = RoomId::from(game_id);

        let seats: Vec<Option<SeatOccupant>> = members
            .iter()
            .map(|m| {
                Some(SeatOccupant {
                    subject_id: m.subject_id,
                    connection_id: m.connection_id,
                })
            })
            .collect();

        for member in &members {
            state.subject_to_game.insert(member.subject_id, game_id);
            state.subject_to_room.insert(member.subject_id, room);
        }

        let runtime_seats: Vec<Seat> = members
            .iter()
            .map(|m| Seat {
                subject_id: m.subject_id,
                connection_id: m.connection_id,
            })
            .collect();

        let runtime: Arc<dyn GameRuntimeHandle> = match self.mode {
            GameMode::ServerAuthoritative => {
                let factory = self
                    .environment_factory
                    .as_ref()
                    .expect("server-authoritative scenes require an environment factory");
                AuthoritativeRuntime::spawn(
                    game_id,
                    room,
                    self.scene_id.clone(),
                    runtime_seats,
                    factory(),
                    self.transport.clone(),
                    self.export_sink.clone(),
                    self.fps,
                    self.state_broadcast_interval,
                    self.input_delay_frames,
                    self.input_buffer_size,
                    self.episodes_total,
                    self.terminated_tx.clone(),
                    self.metrics.clone(),
                )
            }
            GameMode::Relay => RelayRuntime::spawn(
                game_id,
                room,
                runtime_seats,
                self.transport.clone(),
                self.input_buffer_size,
                self.frame_confirmation_timeout,
                self.terminated_tx.clone(),
            ),
        };

        state.games.insert(
            game_id,
            Game {
                game_id,
                scene_id: self.scene_id.clone(),
                seats,
                status: GameStatus::Running,
                group_key,
                started_at: Utc::now(),
                ended_at: None,
                mode: self.mode,
                runtime: Some(runtime),
            },
        );

        Some((game_id, group_key, members))
    }

    async fn create_and_publish(self: &Arc<Self>, member_subjects: Vec<SubjectId>) {
        let created = {
            let mut state = self.state.lock().await;
            self.try_create_game(&mut state, &member_subjects)
        };

        let Some((game_id, group_key, members)) = created else {
            tracing::warn!(
                scene = %self.scene_id,
                "aborting game creation: a candidate left the queue before the match could be created"
            );
            return;
        };

        let room = RoomId::from(game_id);
        for (seat_index, member) in members.iter().enumerate() {
            self.transport.join_room(member.connection_id, room).await;
            self.transport
                .send(
                    member.connection_id,
                    ServerMessage::StartGame {
                        game_id,
                        seat_index: seat_index as u32,
                        mode: self.mode,
                        fps: self.fps,
                        group_key,
                    },
                )
                .await;
        }

        self.metrics.record_match_formed();
        self.metrics.games_started.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        // PairingRegistry records form at cleanup_game, not here (spec.md
        // §4.4 step 4) -- MatchLogger is the creation-time record
        // (spec.md §4.10).
        if let Some(logger) = &self.match_logger {
            let member_ids: Vec<SubjectId> = members.iter().map(|m| m.subject_id).collect();
            logger.record_game(game_id, &self.scene_id, &member_ids, group_key, Utc::now()).await;
        }
    }

    /// The central invariant (spec.md §4.4): every way a game ends routes
    /// through this function, never through deleting `games`/
    /// `subject_to_game`/`subject_to_room` directly. Idempotent: a second
    /// call for a `game_id` already removed is a no-op.
    pub async fn cleanup_game(&self, game_id: GameId, reason: EndReason) {
        let removed = {
            let mut state = self.state.lock().await;
            let Some(game) = state.games.remove(&game_id) else {
                self.metrics.record_cleanup(true);
                return;
            };

            let occupants: Vec<SeatOccupant> = game.seats.into_iter().flatten().collect();
            let room = RoomId::from(game_id);
            for occupant in &occupants {
                if state.subject_to_game.get(&occupant.subject_id) == Some(&game_id) {
                    state.subject_to_game.remove(&occupant.subject_id);
                }
                if state.subject_to_room.get(&occupant.subject_id) == Some(&room) {
                    state.subject_to_room.remove(&occupant.subject_id);
                }
            }

            (occupants, game.group_key, game.runtime)
        };

        let (occupants, group_key, runtime) = removed;
        self.metrics.record_cleanup(false);
        self.metrics.record_game_ended(reason);

        // Step: cancel any waiting reset/ready signals tied to the game.
        // This manager never creates such signals (nothing downstream
        // consumes a per-game ready gate), so there's nothing to drain --
        // the step is satisfied vacuously.

        if let Some(runtime) = runtime {
            runtime.request_teardown().await;
        }

        let room = RoomId::from(game_id);
        self.transport.broadcast(room, ServerMessage::EndGame { game_id, reason }).await;
        for occupant in &occupants {
            self.transport.leave_room(occupant.connection_id, room).await;
        }
        self.transport.close_room(room).await;

        if let Some(pairing) = &self.pairing {
            let members: Vec<SubjectId> = occupants.iter().map(|o| o.subject_id).collect();
            if !members.is_empty() {
                pairing.create_group(members, self.scene_id.clone(), group_key);
            }
        }
    }

    #[must_use]
    pub async fn waiting_len(&self) -> usize {
        self.state.lock().await.waiting.len()
    }

    #[must_use]
    pub async fn games_len(&self) -> usize {
        self.state.lock().await.games.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeOracle;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingTransport {
        sends: AtomicUsize,
        broadcasts: AtomicUsize,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, _connection_id: ConnectionId, _message: ServerMessage) {
            self.sends.fetch_add(1, Ordering::SeqCst);
        }

        async fn broadcast(&self, _room_id: RoomId, _message: ServerMessage) {
            self.broadcasts.fetch_add(1, Ordering::SeqCst);
        }

        async fn join_room(&self, _connection_id: ConnectionId, _room_id: RoomId) {}
        async fn leave_room(&self, _connection_id: ConnectionId, _room_id: RoomId) {}
        async fn close_room(&self, _room_id: RoomId) {}
    }

    fn manager(group_size: usize, mode: GameMode) -> (Arc<GameManager>, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let config = GameManagerConfig {
            group_size,
            mode,
            matchmaker: MatchmakerConfig::default(),
            waitroom_timeout: Duration::from_secs(60),
            fps: 30,
            state_broadcast_interval: 1,
            input_delay_frames: 0,
            input_buffer_size: 16,
            episodes_total: 1,
            frame_confirmation_timeout: Duration::from_secs(5),
        };
        let (manager, rx) = GameManager::new(
            "main".into(),
            config,
            transport.clone() as Arc<dyn Transport>,
            None,
            None,
            None,
            None,
            None,
            Arc::new(EngineMetrics::new()),
        );
        tokio::spawn(Arc::clone(&manager).run_termination_listener(rx));
        (manager, transport)
    }

    #[tokio::test]
    async fn first_join_waits_for_a_partner() {
        let (manager, transport) = manager(2, GameMode::Relay);
        manager.join(SubjectId::new(), ConnectionId::new(), None, None).await.unwrap();
        assert_eq!(manager.waiting_len().await, 1);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_join_forms_a_game_and_clears_the_queue() {
        let (manager, transport) = manager(2, GameMode::Relay);
        manager.join(SubjectId::new(), ConnectionId::new(), None, None).await.unwrap();
        manager.join(SubjectId::new(), ConnectionId::new(), None, None).await.unwrap();

        assert_eq!(manager.waiting_len().await, 0);
        assert_eq!(manager.games_len().await, 1);
        // One `waiting` notice to the first arrival, two `start_game`s.
        assert_eq!(transport.sends.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn already_in_game_is_rejected() {
        let (manager, _transport) = manager(2, GameMode::Relay);
        let subject = SubjectId::new();
        manager.join(subject, ConnectionId::new(), None, None).await.unwrap();
        manager.join(SubjectId::new(), ConnectionId::new(), None, None).await.unwrap();

        let err = manager.join(subject, ConnectionId::new(), None, None).await.unwrap_err();
        assert!(matches!(err, JoinError::AlreadyInGame { .. }));
    }

    #[tokio::test]
    async fn cleanup_game_is_idempotent_and_clears_membership() {
        let (manager, _transport) = manager(2, GameMode::Relay);
        let a = SubjectId::new();
        let b = SubjectId::new();
        manager.join(a, ConnectionId::new(), None, None).await.unwrap();
        manager.join(b, ConnectionId::new(), None, None).await.unwrap();
        assert_eq!(manager.games_len().await, 1);

        let game_id = {
            let state = manager.state.lock().await;
            *state.subject_to_game.get(&a).unwrap()
        };

        manager.cleanup_game(game_id, EndReason::Normal).await;
        assert_eq!(manager.games_len().await, 0);

        // Second call must be a silent no-op, not a panic.
        manager.cleanup_game(game_id, EndReason::Normal).await;

        // Both subjects can now re-join.
        manager.join(a, ConnectionId::new(), None, None).await.unwrap();
        assert_eq!(manager.waiting_len().await, 1);
    }

    #[tokio::test]
    async fn leave_waiting_removes_a_queued_subject() {
        let (manager, _transport) = manager(2, GameMode::Relay);
        let subject = SubjectId::new();
        manager.join(subject, ConnectionId::new(), None, None).await.unwrap();
        assert!(manager.leave_waiting(subject).await);
        assert_eq!(manager.waiting_len().await, 0);
        assert!(!manager.leave_waiting(subject).await);
    }

    struct RejectingOracle {
        coordinator: std::sync::Mutex<Option<Arc<ProbeCoordinator>>>,
        rtt_ms: u32,
    }

    #[async_trait]
    impl ProbeOracle for RejectingOracle {
        async fn start_probe(&self, handle: Uuid, _a: SubjectId, _b: SubjectId) {
            let coordinator = self.coordinator.lock().unwrap().clone();
            let rtt_ms = self.rtt_ms;
            if let Some(coordinator) = coordinator {
                tokio::spawn(async move {
                    coordinator.report_result(handle, Some(rtt_ms));
                });
            }
        }
    }

    #[tokio::test]
    async fn probe_rejection_leaves_both_candidates_queued() {
        let oracle = Arc::new(RejectingOracle {
            coordinator: std::sync::Mutex::new(None),
            rtt_ms: 120,
        });
        let probe = Arc::new(ProbeCoordinator::new(
            oracle.clone(),
            Duration::from_secs(5),
            Arc::new(EngineMetrics::new()),
        ));
        *oracle.coordinator.lock().unwrap() = Some(probe.clone());

        let transport = Arc::new(RecordingTransport::default());
        let config = GameManagerConfig {
            group_size: 2,
            mode: GameMode::Relay,
            matchmaker: MatchmakerConfig {
                max_server_rtt_ms: None,
                max_p2p_rtt_ms: Some(80),
            },
            waitroom_timeout: Duration::from_secs(60),
            fps: 30,
            state_broadcast_interval: 1,
            input_delay_frames: 0,
            input_buffer_size: 16,
            episodes_total: 1,
            frame_confirmation_timeout: Duration::from_secs(5),
        };
        let (manager, rx) = GameManager::new(
            "main".into(),
            config,
            transport.clone() as Arc<dyn Transport>,
            Some(probe),
            None,
            None,
            None,
            None,
            Arc::new(EngineMetrics::new()),
        );
        tokio::spawn(Arc::clone(&manager).run_termination_listener(rx));

        manager.join(SubjectId::new(), ConnectionId::new(), None, None).await.unwrap();
        manager.join(SubjectId::new(), ConnectionId::new(), None, None).await.unwrap();

        // The probe runs on a spawned task; give it a moment to resolve and
        // reject before asserting neither candidate was seated.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.games_len().await, 0);
        assert_eq!(manager.waiting_len().await, 2);
    }

    #[tokio::test]
    async fn waitroom_timeout_sweep_notifies_and_removes() {
        let (manager, transport) = manager(2, GameMode::Relay);
        manager.join(SubjectId::new(), ConnectionId::new(), None, None).await.unwrap();
        {
            let mut state = manager.state.lock().await;
            for entry in &mut state.waiting {
                entry.arrived_at = Utc::now() - chrono::Duration::seconds(120);
            }
        }

        manager.sweep_waitroom_timeouts().await;
        assert_eq!(manager.waiting_len().await, 0);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 2);
    }
}
