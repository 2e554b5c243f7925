//! Process-wide participant session tracking (spec.md §4.6).
//!
//! `SessionRegistry` exclusively owns `ParticipantSession` records, kept in
//! two `DashMap`s (subject -> session, connection -> subject) guarded
//! independently since nothing here needs the cross-map atomicity that
//! `GameManager` state does.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;

use crate::error::RegisterError;
use crate::ids::{ConnectionId, SceneId, SubjectId};
use crate::stager::SceneStager;

/// A participant's session state, owned exclusively by `SessionRegistry`.
#[derive(Debug, Clone)]
pub struct ParticipantSession {
    pub subject_id: SubjectId,
    pub current_scene_id: Option<SceneId>,
    pub current_connection_id: Option<ConnectionId>,
    pub stager: SceneStager,
    /// Set when the connection drops; cleared on reconnect. Expiry is
    /// driven by comparing `reconnect_epoch` before and after the grace
    /// sleep, not by cancelling a handle: "late arrival is simply
    /// ignored" rather than hard cancellation.
    reconnect_deadline: Option<Instant>,
    reconnect_epoch: u64,
    pub in_loading_grace_until: Option<Instant>,
}

impl ParticipantSession {
    fn new(subject_id: SubjectId, connection_id: ConnectionId, scenes: Vec<SceneId>) -> Self {
        Self {
            subject_id,
            current_scene_id: scenes.first().cloned(),
            current_connection_id: Some(connection_id),
            stager: SceneStager::new(scenes),
            reconnect_deadline: None,
            reconnect_epoch: 0,
            in_loading_grace_until: None,
        }
    }

    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.reconnect_deadline.is_some()
    }
}

/// An opaque token identifying one disconnection episode. A timer spawned
/// at disconnect time carries this token and only runs its expiry callback
/// if the session's epoch hasn't moved on by the time the grace period
/// elapses (i.e. no reconnect happened in between).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectEpoch(u64);

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SubjectId, ParticipantSession>,
    connection_to_subject: DashMap<ConnectionId, SubjectId>,
    epoch_counter: AtomicU64,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly connecting subject. Rejects a duplicate subject
    /// that is currently live on another connection (spec.md §7); a
    /// subject that is mid-grace-period is expected to come back through
    /// [`Self::reconnect`] instead, not through `register` again.
    pub fn register(
        &self,
        subject_id: SubjectId,
        connection_id: ConnectionId,
        scenes: Vec<SceneId>,
    ) -> Result<(), RegisterError> {
        if let Some(existing) = self.sessions.get(&subject_id) {
            let grace_expired = existing.reconnect_deadline.is_some_and(|d| Instant::now() >= d);
            if !grace_expired {
                return Err(RegisterError::DuplicateSubject(subject_id));
            }
        }

        self.sessions
            .insert(subject_id, ParticipantSession::new(subject_id, connection_id, scenes));
        self.connection_to_subject.insert(connection_id, subject_id);
        Ok(())
    }

    #[must_use]
    pub fn subject_for_connection(&self, connection_id: ConnectionId) -> Option<SubjectId> {
        self.connection_to_subject.get(&connection_id).map(|r| *r)
    }

    /// Marks a subject disconnected and returns the epoch the caller must
    /// present to [`Self::take_if_still_expired`] after sleeping the grace
    /// period, to distinguish "still disconnected" from "reconnected and
    /// then disconnected again".
    pub fn mark_disconnected(&self, subject_id: SubjectId, grace: std::time::Duration) -> Option<ReconnectEpoch> {
        let mut entry = self.sessions.get_mut(&subject_id)?;
        entry.current_connection_id = None;
        entry.reconnect_deadline = Some(Instant::now() + grace);
        let epoch = self.epoch_counter.fetch_add(1, Ordering::SeqCst) + 1;
        entry.reconnect_epoch = epoch;
        Some(ReconnectEpoch(epoch))
    }

    /// Reconnects a subject within its grace window. Returns the scene the
    /// caller should re-emit `activate_scene` for (spec.md §4.7: "resume-
    /// after-reconnect re-emits current scene only").
    pub fn reconnect(
        &self,
        subject_id: SubjectId,
        connection_id: ConnectionId,
    ) -> Option<Option<SceneId>> {
        let mut entry = self.sessions.get_mut(&subject_id)?;
        if !entry.is_disconnected() {
            return None;
        }

        entry.current_connection_id = Some(connection_id);
        entry.reconnect_deadline = None;
        entry.reconnect_epoch = self.epoch_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.connection_to_subject.insert(connection_id, subject_id);
        Some(entry.current_scene_id.clone())
    }

    /// Called after sleeping the grace period: returns `true`, and removes
    /// the session, only if the subject is still disconnected under the
    /// same epoch (no reconnect happened in the meantime).
    pub fn take_if_still_expired(&self, subject_id: SubjectId, epoch: ReconnectEpoch) -> bool {
        let Some(entry) = self.sessions.get(&subject_id) else {
            return false;
        };
        let still_expired = entry.is_disconnected() && entry.reconnect_epoch == epoch.0;
        drop(entry);

        if still_expired {
            self.sessions.remove(&subject_id);
            true
        } else {
            false
        }
    }

    pub fn with_session<R>(&self, subject_id: SubjectId, f: impl FnOnce(&mut ParticipantSession) -> R) -> Option<R> {
        self.sessions.get_mut(&subject_id).map(|mut e| f(&mut e))
    }

    #[must_use]
    pub fn current_scene(&self, subject_id: SubjectId) -> Option<SceneId> {
        self.sessions.get(&subject_id).and_then(|s| s.current_scene_id.clone())
    }

    /// Removes a subject's session outright, regardless of grace state.
    /// Used for terminal teardown paths that preclude reconnection (a
    /// loading-gate failure, an explicit exclusion) where there's no
    /// grace window to honor.
    pub fn remove(&self, subject_id: SubjectId) {
        if let Some((_, session)) = self.sessions.remove(&subject_id) {
            if let Some(connection_id) = session.current_connection_id {
                self.connection_to_subject.remove(&connection_id);
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
