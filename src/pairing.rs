//! Append-only record of who played together (spec.md §4.9). Shared and
//! read concurrently across scenes; writers only ever append.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::ids::{SceneId, SubjectId};

#[derive(Debug, Clone)]
pub struct PairingRecord {
    pub scene_id: SceneId,
    pub group_key: Uuid,
    pub members: Vec<SubjectId>,
    pub formed_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct PairingRegistry {
    records: RwLock<Vec<PairingRecord>>,
}

impl PairingRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_group(&self, members: Vec<SubjectId>, scene_id: SceneId, group_key: Uuid) {
        let record = PairingRecord {
            scene_id,
            group_key,
            members,
            formed_at: Utc::now(),
        };
        self.records.write().expect("pairing registry lock poisoned").push(record);
    }

    /// Returns the most recently formed group containing `subject_id` for
    /// `scene_id`, used to "wait for a known group" when re-pairing.
    #[must_use]
    pub fn get_last_group_for(&self, subject_id: SubjectId, scene_id: &SceneId) -> Option<PairingRecord> {
        let records = self.records.read().expect("pairing registry lock poisoned");
        records
            .iter()
            .rev()
            .find(|r| &r.scene_id == scene_id && r.members.contains(&subject_id))
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().expect("pairing registry lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_group_is_append_only_and_queryable() {
        let registry = PairingRegistry::new();
        let scene: SceneId = "main".into();
        let a = SubjectId::new();
        let b = SubjectId::new();
        let group_key = Uuid::new_v4();

        registry.create_group(vec![a, b], scene.clone(), group_key);
        assert_eq!(registry.len(), 1);

        let found = registry.get_last_group_for(a, &scene).unwrap();
        assert_eq!(found.group_key, group_key);
        assert!(found.members.contains(&b));
    }

    #[test]
    fn get_last_group_returns_most_recent() {
        let registry = PairingRegistry::new();
        let scene: SceneId = "main".into();
        let a = SubjectId::new();
        let first_key = Uuid::new_v4();
        let second_key = Uuid::new_v4();

        registry.create_group(vec![a], scene.clone(), first_key);
        registry.create_group(vec![a], scene.clone(), second_key);

        let found = registry.get_last_group_for(a, &scene).unwrap();
        assert_eq!(found.group_key, second_key);
    }
}
