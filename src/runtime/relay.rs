//! Relay runtime variant (spec.md §4.5): clients simulate locally; the
//! server brokers actions between seats and validates that their reported
//! state hashes agree on confirmed frames.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::error::EndReason;
use crate::ids::{GameId, RoomId, SubjectId};
use crate::protocol::ServerMessage;

use super::{seat_index_by_subject, GameRuntimeHandle, Seat, TerminationEvent};
use crate::transport::Transport;

enum RelayEvent {
    Action { seat: u32, action: Bytes, input_frame: u64 },
    Hash { seat: u32, frame: u64, hash: u64 },
}

pub struct RelayRuntime {
    game_id: GameId,
    seat_by_subject: HashMap<SubjectId, u32>,
    event_tx: mpsc::Sender<RelayEvent>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RelayRuntime {
    #[must_use]
    pub fn spawn(
        game_id: GameId,
        room: RoomId,
        seats: Vec<Seat>,
        transport: Arc<dyn Transport>,
        input_buffer_size: usize,
        frame_confirmation_timeout: Duration,
        on_terminated: mpsc::UnboundedSender<TerminationEvent>,
    ) -> Arc<Self> {
        let seat_by_subject = seat_index_by_subject(&seats);
        let seat_count = seats.len();
        let (event_tx, mut event_rx) = mpsc::channel(input_buffer_size.max(1));

        let task_seats = seats.clone();
        let join_handle = tokio::spawn(async move {
            let mut hashes_by_frame: HashMap<u64, HashMap<u32, u64>> = HashMap::new();
            let mut unconfirmed_since: HashMap<u64, Instant> = HashMap::new();
            let mut sweep = tokio::time::interval(frame_confirmation_timeout);
            let reason;

            loop {
                tokio::select! {
                    event = event_rx.recv() => {
                        let Some(event) = event else {
                            reason = EndReason::PartnerLost;
                            break;
                        };
                        match event {
                            RelayEvent::Action { seat, action, input_frame } => {
                                unconfirmed_since.entry(input_frame).or_insert_with(Instant::now);
                                for (index, other) in task_seats.iter().enumerate() {
                                    if index as u32 != seat {
                                        transport
                                            .send(
                                                other.connection_id,
                                                ServerMessage::RelayAction {
                                                    game_id,
                                                    seat_index: seat,
                                                    action: action.clone(),
                                                    input_frame,
                                                },
                                            )
                                            .await;
                                    }
                                }
                            }
                            RelayEvent::Hash { seat, frame, hash } => {
                                let entry = hashes_by_frame.entry(frame).or_default();
                                entry.insert(seat, hash);
                                if entry.len() >= seat_count {
                                    let unique: HashSet<u64> = entry.values().copied().collect();
                                    if unique.len() > 1 {
                                        tracing::warn!(game_id = %game_id, frame, "state hash mismatch across seats");
                                        reason = EndReason::Desync;
                                        break;
                                    }
                                    hashes_by_frame.remove(&frame);
                                    unconfirmed_since.remove(&frame);
                                }
                            }
                        }
                        continue;
                    }
                    _ = sweep.tick() => {
                        let now = Instant::now();
                        let timed_out = unconfirmed_since
                            .iter()
                            .any(|(_, started)| now.duration_since(*started) > frame_confirmation_timeout);
                        if timed_out {
                            tracing::warn!(game_id = %game_id, "frame confirmation timed out");
                            reason = EndReason::Desync;
                            break;
                        }
                        continue;
                    }
                }
            }

            let _ = on_terminated.send(TerminationEvent { game_id, reason });
        });

        Arc::new(Self {
            game_id,
            seat_by_subject,
            event_tx,
            handle: Mutex::new(Some(join_handle)),
        })
    }
}

#[async_trait]
impl GameRuntimeHandle for RelayRuntime {
    fn ingest_action(&self, subject_id: SubjectId, action: Bytes, input_frame: u64) {
        let Some(&seat) = self.seat_by_subject.get(&subject_id) else {
            return;
        };
        if self
            .event_tx
            .try_send(RelayEvent::Action { seat, action, input_frame })
            .is_err()
        {
            tracing::debug!(game_id = %self.game_id, seat, "dropping relay action: buffer full or runtime stopped");
        }
    }

    fn report_state_hash(&self, subject_id: SubjectId, frame: u64, hash: u64) {
        let Some(&seat) = self.seat_by_subject.get(&subject_id) else {
            return;
        };
        let _ = self.event_tx.try_send(RelayEvent::Hash { seat, frame, hash });
    }

    async fn request_teardown(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
    }
}
