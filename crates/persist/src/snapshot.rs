use scenedit_scene::Scene;
use serde::{Deserialize, Serialize};

/// A content-checked copy of the scene as it was when the project was saved.
///
/// `hash` is the scene's own `state_hash`, so corruption that survives
/// decoding (or a scene format drift) is caught on restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSnapshot {
    /// Save revision this snapshot belongs to.
    pub revision: u32,
    pub scene: Scene,
    pub hash: u64,
}

impl SceneSnapshot {
    pub fn capture(revision: u32, scene: &Scene) -> Self {
        Self {
            revision,
            scene: scene.clone(),
            hash: scene.state_hash(),
        }
    }

    /// Recompute the hash and compare.
    pub fn verify(&self) -> bool {
        self.scene.state_hash() == self.hash
    }

    /// The saved scene.
    pub fn restore(self) -> Scene {
        self.scene
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use scenedit_common::Transform;
    use scenedit_scene::SceneObject;

    fn sample() -> Scene {
        let mut scene = Scene::new();
        let root = scene.insert(SceneObject::new("Root", Transform::default()));
        let child = scene.insert(SceneObject::new(
            "Child",
            Transform::from_position(Vec3::new(1.0, 2.0, 3.0)),
        ));
        scene.set_parent(child, Some(root));
        scene
    }

    #[test]
    fn capture_and_verify() {
        let snap = SceneSnapshot::capture(1, &sample());
        assert!(snap.verify());
    }

    #[test]
    fn tampered_snapshot_fails_verify() {
        let mut snap = SceneSnapshot::capture(1, &sample());
        snap.hash ^= 1;
        assert!(!snap.verify());
    }

    #[test]
    fn restore_keeps_state() {
        let scene = sample();
        let hash = scene.state_hash();
        let restored = SceneSnapshot::capture(3, &scene).restore();
        assert_eq!(restored.state_hash(), hash);
        assert_eq!(restored.entity_count(), 2);
    }
}
