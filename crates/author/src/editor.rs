use crate::commands::{
    AddEntity, RemoveEntity, SetName, SetParent, SetPosition, SetTransform, SetVisible,
    scene_registry,
};
use glam::Vec3;
use scenedit_common::{EntityId, Transform};
use scenedit_history::{
    Clock, Command, CommandId, CommandSummary, HistoryConfig, HistoryEngine, HistoryError,
    HistoryEvent, HistoryRecord, LoadReport,
};
use scenedit_scene::{Scene, SceneObject};
use std::sync::mpsc::Receiver;

/// Errors from edit operations.
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("entity {0} not found")]
    EntityNotFound(EntityId),
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// A scene together with its edit history.
///
/// Every authoring operation builds a command from the current scene state
/// and runs it through the history engine, so it is reversible via `undo()`
/// and re-applicable via `redo()`.
pub struct Editor {
    scene: Scene,
    history: HistoryEngine<Scene>,
}

impl Editor {
    /// Create an editor on an empty scene.
    pub fn new(config: HistoryConfig) -> Self {
        Self::with_scene(Scene::new(), config)
    }

    /// Create an editor on an existing scene. The history starts empty.
    pub fn with_scene(scene: Scene, config: HistoryConfig) -> Self {
        Self {
            scene,
            history: HistoryEngine::new(config, scene_registry()),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.history = self.history.with_clock(clock);
        self
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn history(&self) -> &HistoryEngine<Scene> {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryEngine<Scene> {
        &mut self.history
    }

    pub fn subscribe(&mut self) -> Receiver<HistoryEvent> {
        self.history.subscribe()
    }

    pub fn into_parts(self) -> (Scene, HistoryEngine<Scene>) {
        (self.scene, self.history)
    }

    fn object(&self, id: EntityId) -> Result<&SceneObject, EditError> {
        self.scene.get(id).ok_or(EditError::EntityNotFound(id))
    }

    /// Run an arbitrary command through the history.
    pub fn execute(&mut self, command: Box<dyn Command<Scene>>) -> Result<CommandId, EditError> {
        Ok(self.history.execute(&mut self.scene, command)?)
    }

    /// Run several commands as one undo step.
    pub fn group(
        &mut self,
        label: impl Into<String>,
        commands: Vec<Box<dyn Command<Scene>>>,
    ) -> Result<CommandId, EditError> {
        Ok(self.history.execute_group(&mut self.scene, label, commands)?)
    }

    /// Add a named object and return its id.
    pub fn spawn(
        &mut self,
        name: impl Into<String>,
        transform: Transform,
    ) -> Result<EntityId, EditError> {
        let command = AddEntity::new(SceneObject::new(name, transform));
        let id = command.entity;
        self.execute(command)?;
        Ok(id)
    }

    /// Add objects without recording them, e.g. when setting up a scene
    /// that should open with an empty history.
    pub fn populate(
        &mut self,
        objects: impl IntoIterator<Item = SceneObject>,
    ) -> Result<Vec<EntityId>, EditError> {
        let mut quiet = self.history.suspend();
        let mut ids = Vec::new();
        for object in objects {
            let command = AddEntity::new(object);
            ids.push(command.entity);
            quiet.execute(&mut self.scene, command)?;
        }
        tracing::debug!(count = ids.len(), "scene populated without history");
        Ok(ids)
    }

    pub fn despawn(&mut self, id: EntityId) -> Result<CommandId, EditError> {
        self.object(id)?;
        self.execute(RemoveEntity::new(id))
    }

    pub fn set_transform(&mut self, id: EntityId, new: Transform) -> Result<CommandId, EditError> {
        let old = self.object(id)?.transform;
        self.execute(SetTransform::new(id, old, new))
    }

    /// Move an object. Successive calls inside the merge window become one
    /// undo step, which is how a viewport drag is recorded.
    pub fn set_position(&mut self, id: EntityId, new: Vec3) -> Result<CommandId, EditError> {
        let old = self.object(id)?.transform.position;
        self.execute(SetPosition::new(id, old, new))
    }

    pub fn rename(&mut self, id: EntityId, name: impl Into<String>) -> Result<CommandId, EditError> {
        let old = self.object(id)?.name.clone();
        self.execute(SetName::new(id, old, name))
    }

    pub fn set_visible(&mut self, id: EntityId, visible: bool) -> Result<CommandId, EditError> {
        let old = self.object(id)?.visible;
        self.execute(SetVisible::new(id, old, visible))
    }

    pub fn set_parent(
        &mut self,
        id: EntityId,
        parent: Option<EntityId>,
    ) -> Result<CommandId, EditError> {
        let old = self.object(id)?.parent;
        self.execute(SetParent::new(id, old, parent))
    }

    pub fn undo(&mut self) -> Result<Option<CommandSummary>, EditError> {
        Ok(self.history.undo(&mut self.scene)?)
    }

    pub fn redo(&mut self) -> Result<Option<CommandSummary>, EditError> {
        Ok(self.history.redo(&mut self.scene)?)
    }

    /// Jump to the state right after `target` (`None`: before any edit).
    pub fn go_to_state(&mut self, target: Option<CommandId>) -> Result<(), EditError> {
        Ok(self.history.go_to_state(&mut self.scene, target)?)
    }

    /// The persistable part of the history.
    pub fn save_history(&self) -> HistoryRecord {
        self.history.to_record()
    }

    /// Replace the history with a saved one. The scene must already be in
    /// the state the history was saved against.
    pub fn load_history(&mut self, record: &HistoryRecord) -> LoadReport {
        self.history.load_record(record, &self.scene)
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenedit_history::ManualClock;
    use std::time::Duration;

    fn editor() -> (Editor, ManualClock) {
        let clock = ManualClock::new();
        let config = HistoryConfig {
            persistence_enabled: true,
            ..HistoryConfig::default()
        };
        (Editor::new(config).with_clock(clock.clone()), clock)
    }

    #[test]
    fn spawn_and_undo() {
        let (mut editor, _) = editor();

        let id = editor.spawn("Cube", Transform::default()).unwrap();
        assert_eq!(editor.scene().entity_count(), 1);

        assert!(editor.undo().unwrap().is_some());
        assert_eq!(editor.scene().entity_count(), 0);
        assert!(editor.scene().get(id).is_none());
    }

    #[test]
    fn spawn_undo_redo() {
        let (mut editor, _) = editor();

        let id = editor.spawn("Cube", Transform::default()).unwrap();
        editor.undo().unwrap();
        assert_eq!(editor.scene().entity_count(), 0);

        editor.redo().unwrap();
        assert_eq!(editor.scene().entity_count(), 1);
        assert!(editor.scene().get(id).is_some());
    }

    #[test]
    fn despawn_and_undo() {
        let (mut editor, _) = editor();

        let id = editor.spawn("Cube", Transform::default()).unwrap();
        editor.despawn(id).unwrap();
        assert_eq!(editor.scene().entity_count(), 0);

        editor.undo().unwrap();
        assert_eq!(editor.scene().entity_count(), 1);
        assert_eq!(editor.scene().get(id).unwrap().name, "Cube");
    }

    #[test]
    fn despawn_nonexistent_returns_error() {
        let (mut editor, _) = editor();
        let fake_id = EntityId::new();
        assert!(matches!(
            editor.despawn(fake_id),
            Err(EditError::EntityNotFound(id)) if id == fake_id
        ));
        assert_eq!(editor.history().undo_count(), 0);
    }

    #[test]
    fn drag_collapses_into_one_step() {
        let (mut editor, clock) = editor();
        let id = editor.spawn("Cube", Transform::default()).unwrap();
        let after_spawn = editor.scene().state_hash();

        for step in 1..=10 {
            clock.advance(Duration::from_millis(16));
            editor.set_position(id, Vec3::new(step as f32, 0.0, 0.0)).unwrap();
        }
        assert_eq!(editor.history().undo_count(), 2);
        assert_eq!(editor.scene().get(id).unwrap().transform.position.x, 10.0);

        editor.undo().unwrap();
        assert_eq!(editor.scene().state_hash(), after_spawn);
    }

    #[test]
    fn long_drag_leaves_only_final_state_in_scene() {
        let (mut editor, clock) = editor();
        let id = editor.spawn("Cube", Transform::default()).unwrap();
        for step in 1..=1000 {
            clock.advance(Duration::from_millis(1));
            editor.set_position(id, Vec3::new(0.0, step as f32, 0.0)).unwrap();
        }
        assert_eq!(editor.history().undo_count(), 2);

        let mut expected = Scene::new();
        expected.insert_with_id(
            id,
            SceneObject::new("Cube", Transform::from_position(Vec3::new(0.0, 1000.0, 0.0))),
        );
        assert_eq!(
            serde_json::to_value(editor.scene()).unwrap(),
            serde_json::to_value(&expected).unwrap()
        );
    }

    #[test]
    fn pause_in_drag_splits_steps() {
        let (mut editor, clock) = editor();
        let id = editor.spawn("Cube", Transform::default()).unwrap();
        editor.set_position(id, Vec3::X).unwrap();
        clock.advance(Duration::from_millis(600));
        editor.set_position(id, Vec3::Y).unwrap();
        assert_eq!(editor.history().undo_count(), 3);

        editor.undo().unwrap();
        assert_eq!(editor.scene().get(id).unwrap().transform.position, Vec3::X);
    }

    #[test]
    fn redo_cleared_on_new_edit() {
        let (mut editor, _) = editor();

        editor.spawn("A", Transform::default()).unwrap();
        editor.undo().unwrap();
        assert!(editor.history().can_redo());

        // New edit clears redo stack
        editor.spawn("B", Transform::default()).unwrap();
        assert!(!editor.history().can_redo());
    }

    #[test]
    fn undo_empty_returns_none() {
        let (mut editor, _) = editor();
        assert!(editor.undo().unwrap().is_none());
        assert!(editor.redo().unwrap().is_none());
    }

    #[test]
    fn group_undoes_as_one() {
        let (mut editor, _) = editor();
        let a = editor.spawn("A", Transform::default()).unwrap();
        let b = editor.spawn("B", Transform::default()).unwrap();
        let before = editor.scene().state_hash();

        editor
            .group(
                "Hide both",
                vec![SetVisible::new(a, true, false), SetVisible::new(b, true, false)],
            )
            .unwrap();
        assert_eq!(editor.scene().summary().hidden, 2);

        editor.undo().unwrap();
        assert_eq!(editor.scene().state_hash(), before);
    }

    #[test]
    fn populate_is_not_recorded() {
        let (mut editor, _) = editor();
        let ids = editor
            .populate(["Floor", "Wall"].map(|n| SceneObject::new(n, Transform::default())))
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(editor.scene().entity_count(), 2);
        assert!(!editor.history().can_undo());
        assert!(!editor.history().is_suspended());
    }

    #[test]
    fn go_to_state_replays_hierarchy_edits() {
        let (mut editor, _) = editor();
        let rig = editor.spawn("Rig", Transform::default()).unwrap();
        let arm = editor.spawn("Arm", Transform::default()).unwrap();
        let parented = editor.set_parent(arm, Some(rig)).unwrap();
        let renamed = editor.rename(rig, "Skeleton").unwrap();
        editor.despawn(rig).unwrap();
        let end = editor.scene().state_hash();

        editor.go_to_state(Some(parented)).unwrap();
        assert_eq!(editor.scene().get(arm).unwrap().parent, Some(rig));
        assert_eq!(editor.scene().get(rig).unwrap().name, "Rig");

        editor.go_to_state(None).unwrap();
        assert_eq!(editor.scene().entity_count(), 0);

        editor.go_to_state(Some(CommandId(renamed.0 + 1))).unwrap();
        assert_eq!(editor.scene().state_hash(), end);
    }

    #[test]
    fn saved_history_reloads_against_same_scene() {
        let (mut editor, _) = editor();
        let id = editor.spawn("Cube", Transform::default()).unwrap();
        editor.set_visible(id, false).unwrap();
        editor.despawn(id).unwrap();
        editor.undo().unwrap();
        let record = editor.save_history();
        let (scene, _) = editor.into_parts();

        let mut reopened = Editor::with_scene(scene, HistoryConfig::default());
        let report = reopened.load_history(&record);
        assert!(report.is_complete(), "{:?}", report.skipped);
        assert_eq!(reopened.history().undo_count(), 2);

        reopened.go_to_state(None).unwrap();
        assert_eq!(reopened.scene().entity_count(), 0);
        reopened.redo().unwrap();
        reopened.redo().unwrap();
        reopened.redo().unwrap();
        assert!(reopened.scene().get(id).is_none());
    }
}
