//! Per-subject scripted scene sequencing (spec.md §4.7).
//!
//! ```text
//! [scene 0] --advance()--> [scene 1] --advance()--> ... --advance()--> [done]
//! ```
//! `advance()` only ever moves the index forward by one; a completed scene
//! is never re-entered and a scene is never skipped. Reconnect re-emits
//! whatever the current scene already is, it never calls `advance()`.

use crate::ids::SceneId;

#[derive(Debug, Clone)]
pub struct SceneStager {
    scenes: Vec<SceneId>,
    index: usize,
}

impl SceneStager {
    #[must_use]
    pub fn new(scenes: Vec<SceneId>) -> Self {
        Self { scenes, index: 0 }
    }

    #[must_use]
    pub fn current(&self) -> Option<&SceneId> {
        self.scenes.get(self.index)
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.index >= self.scenes.len()
    }

    /// Monotonically advances to the next scene, returning it. Returns
    /// `None` (and leaves state unchanged) once the sequence is exhausted.
    pub fn advance(&mut self) -> Option<&SceneId> {
        if self.index >= self.scenes.len() {
            return None;
        }
        self.index += 1;
        self.scenes.get(self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stager() -> SceneStager {
        SceneStager::new(vec!["intro".into(), "main".into(), "debrief".into()])
    }

    #[test]
    fn starts_at_first_scene() {
        let s = stager();
        assert_eq!(s.current(), Some(&SceneId::from("intro")));
    }

    #[test]
    fn advance_moves_forward_monotonically() {
        let mut s = stager();
        assert_eq!(s.advance(), Some(&SceneId::from("main")));
        assert_eq!(s.current(), Some(&SceneId::from("main")));
        assert_eq!(s.advance(), Some(&SceneId::from("debrief")));
        assert_eq!(s.advance(), None);
        assert!(s.is_done());
    }

    #[test]
    fn advance_past_the_end_is_a_noop_not_a_wraparound() {
        let mut s = SceneStager::new(vec!["only".into()]);
        assert_eq!(s.advance(), None);
        assert_eq!(s.advance(), None);
        assert!(s.is_done());
    }

    proptest::proptest! {
        #[test]
        fn advance_never_revisits_a_completed_scene(n in 1usize..8) {
            let scenes: Vec<SceneId> = (0..n).map(|i| SceneId::from(format!("scene-{i}"))).collect();
            let mut s = SceneStager::new(scenes.clone());
            let mut seen = vec![s.current().cloned().unwrap()];
            while let Some(scene) = s.advance() {
                seen.push(scene.clone());
            }
            proptest::prop_assert_eq!(seen, scenes);
        }
    }
}
