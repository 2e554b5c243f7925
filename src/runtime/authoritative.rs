//! Server-authoritative runtime variant (spec.md §4.5): the server owns
//! the simulation and drives a fixed-tick loop.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::error::EndReason;
use crate::ids::{GameId, RoomId, SceneId, SubjectId};
use crate::metrics::EngineMetrics;
use crate::protocol::ServerMessage;
use crate::recording::ExportSink;
use crate::transport::Transport;

use super::{seat_index_by_subject, GameRuntimeHandle, Seat, SimulationEnvironment, TerminationEvent};

struct IncomingAction {
    seat: u32,
    action: Bytes,
    input_frame: u64,
}

pub struct AuthoritativeRuntime {
    game_id: GameId,
    seat_by_subject: HashMap<SubjectId, u32>,
    action_tx: mpsc::Sender<IncomingAction>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AuthoritativeRuntime {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn spawn(
        game_id: GameId,
        room: RoomId,
        scene_id: SceneId,
        seats: Vec<Seat>,
        mut env: Box<dyn SimulationEnvironment>,
        transport: Arc<dyn Transport>,
        export_sink: Option<Arc<ExportSink>>,
        fps: u32,
        state_broadcast_interval: u32,
        input_delay_frames: u32,
        input_buffer_size: usize,
        episodes_total: u32,
        on_terminated: mpsc::UnboundedSender<TerminationEvent>,
        metrics: Arc<EngineMetrics>,
    ) -> Arc<Self> {
        let seat_by_subject = seat_index_by_subject(&seats);
        let (action_tx, mut action_rx) = mpsc::channel(input_buffer_size.max(1));

        let task_seats = seats.clone();
        let join_handle = tokio::spawn(async move {
            let tick_duration = Duration::from_secs_f64(1.0 / f64::from(fps.max(1)));
            let mut interval = tokio::time::interval(tick_duration);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let broadcast_interval = u64::from(state_broadcast_interval.max(1));
            let delay = input_delay_frames;

            let mut latest: HashMap<u32, Bytes> = HashMap::new();
            let mut pending: VecDeque<HashMap<u32, Bytes>> = VecDeque::new();
            let mut tick: u64 = 0;
            let mut frame: u64 = 0;
            let mut episode_index: u32 = 0;
            let mut episode_id = Uuid::new_v4();
            let reason;

            loop {
                interval.tick().await;

                while let Ok(incoming) = action_rx.try_recv() {
                    if incoming.input_frame < tick {
                        // Tagged for a tick already executed; drop.
                        metrics.player_actions_dropped_late.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        continue;
                    }
                    latest.insert(incoming.seat, incoming.action);
                }

                pending.push_back(latest.clone());
                let to_apply = if pending.len() as u32 > delay {
                    pending.pop_front().unwrap_or_default()
                } else {
                    HashMap::new()
                };

                let mut actions: HashMap<u32, Bytes> = HashMap::with_capacity(task_seats.len());
                for (index, _seat) in task_seats.iter().enumerate() {
                    let index = index as u32;
                    let action = to_apply.get(&index).cloned().unwrap_or_else(|| env.default_action());
                    actions.insert(index, action);
                }

                let outcome = env.step(&actions);
                tick += 1;

                if tick % broadcast_interval == 0 || outcome.episode_done {
                    frame += 1;
                    transport
                        .broadcast(
                            room,
                            ServerMessage::StateBroadcast {
                                game_id,
                                frame,
                                game_state_objects: outcome.objects,
                                removed: outcome.removed,
                            },
                        )
                        .await;
                    metrics.state_broadcasts_sent.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }

                if outcome.episode_done {
                    if let (Some(sink), Some(payload)) = (&export_sink, env.export_episode()) {
                        for seat in &task_seats {
                            if let Err(error) = sink.write_episode(&scene_id, seat.subject_id, episode_id, &payload).await {
                                tracing::error!(%error, game_id = %game_id, "failed to write episode export");
                            }
                        }
                    }

                    episode_index += 1;
                    if episode_index >= episodes_total.max(1) {
                        reason = EndReason::Normal;
                        break;
                    }
                    env.reset();
                    episode_id = Uuid::new_v4();
                    pending.clear();
                    latest.clear();
                }
            }

            let _ = on_terminated.send(TerminationEvent { game_id, reason });
        });

        Arc::new(Self {
            game_id,
            seat_by_subject,
            action_tx,
            handle: Mutex::new(Some(join_handle)),
        })
    }
}

#[async_trait]
impl GameRuntimeHandle for AuthoritativeRuntime {
    fn ingest_action(&self, subject_id: SubjectId, action: Bytes, input_frame: u64) {
        let Some(&seat) = self.seat_by_subject.get(&subject_id) else {
            return;
        };
        if self
            .action_tx
            .try_send(IncomingAction { seat, action, input_frame })
            .is_err()
        {
            tracing::debug!(game_id = %self.game_id, seat, "dropping action: buffer full or runtime stopped");
        }
    }

    async fn request_teardown(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ConnectionId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEnv {
        steps: Arc<AtomicUsize>,
    }

    impl SimulationEnvironment for CountingEnv {
        fn step(&mut self, _actions: &HashMap<u32, Bytes>) -> super::super::StepOutcome {
            self.steps.fetch_add(1, Ordering::SeqCst);
            super::super::StepOutcome {
                objects: Vec::new(),
                removed: Vec::new(),
                episode_done: self.steps.load(Ordering::SeqCst) >= 3,
            }
        }

        fn reset(&mut self) {}
    }

    struct RecordingTransport {
        broadcasts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn broadcast(&self, _room: RoomId, _message: ServerMessage) {
            self.broadcasts.fetch_add(1, Ordering::SeqCst);
        }

        async fn send(&self, _connection_id: ConnectionId, _message: ServerMessage) {}
    }

    #[tokio::test]
    async fn runtime_terminates_after_configured_episodes() {
        let steps = Arc::new(AtomicUsize::new(0));
        let broadcasts = Arc::new(AtomicUsize::new(0));
        let metrics = Arc::new(EngineMetrics::new());
        let (terminated_tx, mut terminated_rx) = mpsc::unbounded_channel();
        let seat = Seat {
            subject_id: SubjectId::new(),
            connection_id: ConnectionId::new(),
        };

        let _runtime = AuthoritativeRuntime::spawn(
            GameId::new(),
            RoomId(Uuid::new_v4()),
            "main".into(),
            vec![seat],
            Box::new(CountingEnv { steps: steps.clone() }),
            Arc::new(RecordingTransport { broadcasts: broadcasts.clone() }),
            None,
            1000,
            1,
            0,
            8,
            1,
            terminated_tx,
            metrics.clone(),
        );

        let event = tokio::time::timeout(Duration::from_secs(2), terminated_rx.recv())
            .await
            .expect("runtime should terminate")
            .expect("channel should yield an event");
        assert_eq!(event.reason, EndReason::Normal);
        assert!(steps.load(Ordering::SeqCst) >= 3);
        assert!(metrics.state_broadcasts_sent.load(Ordering::SeqCst) >= 3);
    }
}
