use super::{applied, rehydrate_as};
use glam::Vec3;
use scenedit_common::{EntityId, Transform};
use scenedit_history::{Command, CommandError, CommandRecord, LoadContext, LoadError, fields_of};
use scenedit_scene::Scene;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;

/// Replace a whole transform. Consecutive edits of one object merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetTransform {
    pub entity: EntityId,
    pub old: Transform,
    pub new: Transform,
}

impl SetTransform {
    pub const TYPE_TAG: &'static str = "SetTransform";

    pub fn new(entity: EntityId, old: Transform, new: Transform) -> Box<Self> {
        Box::new(Self { entity, old, new })
    }

    pub fn rehydrate(
        record: &CommandRecord,
        cx: &LoadContext<'_, Scene>,
    ) -> Result<Box<dyn Command<Scene>>, LoadError> {
        rehydrate_as(record, cx, |c: &Self| vec![c.entity])
    }
}

impl Command<Scene> for SetTransform {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn label(&self) -> String {
        format!("Transform {}", self.entity.short())
    }

    fn mergeable(&self) -> bool {
        true
    }

    fn targets(&self) -> Vec<EntityId> {
        vec![self.entity]
    }

    fn execute(&mut self, doc: &mut Scene) -> Result<(), CommandError> {
        applied(doc.set_transform(self.entity, self.new), self.entity)
    }

    fn undo(&mut self, doc: &mut Scene) -> Result<(), CommandError> {
        applied(doc.set_transform(self.entity, self.old), self.entity)
    }

    fn to_fields(&self) -> Result<Map<String, Value>, CommandError> {
        fields_of(self)
    }

    fn update(&mut self, other: &dyn Command<Scene>) -> bool {
        absorb(other).map(|o: &Self| self.new = o.new).is_some()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Move an object, leaving rotation and scale alone. This is what a
/// viewport drag emits, once per frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetPosition {
    pub entity: EntityId,
    pub old: Vec3,
    pub new: Vec3,
}

impl SetPosition {
    pub const TYPE_TAG: &'static str = "SetPosition";

    pub fn new(entity: EntityId, old: Vec3, new: Vec3) -> Box<Self> {
        Box::new(Self { entity, old, new })
    }

    pub fn rehydrate(
        record: &CommandRecord,
        cx: &LoadContext<'_, Scene>,
    ) -> Result<Box<dyn Command<Scene>>, LoadError> {
        rehydrate_as(record, cx, |c: &Self| vec![c.entity])
    }

    fn place(&self, doc: &mut Scene, position: Vec3) -> Result<(), CommandError> {
        let current = doc
            .get(self.entity)
            .ok_or(CommandError::EntityNotFound(self.entity))?
            .transform;
        applied(
            doc.set_transform(self.entity, current.with_position(position)),
            self.entity,
        )
    }
}

impl Command<Scene> for SetPosition {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn label(&self) -> String {
        let p = self.new;
        format!("Move {} to ({:.2}, {:.2}, {:.2})", self.entity.short(), p.x, p.y, p.z)
    }

    fn mergeable(&self) -> bool {
        true
    }

    fn targets(&self) -> Vec<EntityId> {
        vec![self.entity]
    }

    fn execute(&mut self, doc: &mut Scene) -> Result<(), CommandError> {
        self.place(doc, self.new)
    }

    fn undo(&mut self, doc: &mut Scene) -> Result<(), CommandError> {
        self.place(doc, self.old)
    }

    fn to_fields(&self) -> Result<Map<String, Value>, CommandError> {
        fields_of(self)
    }

    fn update(&mut self, other: &dyn Command<Scene>) -> bool {
        absorb(other).map(|o: &Self| self.new = o.new).is_some()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Rename an object. Typing into the name field merges into one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetName {
    pub entity: EntityId,
    pub old: String,
    pub new: String,
}

impl SetName {
    pub const TYPE_TAG: &'static str = "SetName";

    pub fn new(entity: EntityId, old: impl Into<String>, new: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            entity,
            old: old.into(),
            new: new.into(),
        })
    }

    pub fn rehydrate(
        record: &CommandRecord,
        cx: &LoadContext<'_, Scene>,
    ) -> Result<Box<dyn Command<Scene>>, LoadError> {
        rehydrate_as(record, cx, |c: &Self| vec![c.entity])
    }
}

impl Command<Scene> for SetName {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn label(&self) -> String {
        format!("Rename {:?} to {:?}", self.old, self.new)
    }

    fn mergeable(&self) -> bool {
        true
    }

    fn targets(&self) -> Vec<EntityId> {
        vec![self.entity]
    }

    fn execute(&mut self, doc: &mut Scene) -> Result<(), CommandError> {
        applied(doc.set_name(self.entity, self.new.as_str()), self.entity)
    }

    fn undo(&mut self, doc: &mut Scene) -> Result<(), CommandError> {
        applied(doc.set_name(self.entity, self.old.as_str()), self.entity)
    }

    fn to_fields(&self) -> Result<Map<String, Value>, CommandError> {
        fields_of(self)
    }

    fn update(&mut self, other: &dyn Command<Scene>) -> bool {
        absorb(other).map(|o: &Self| self.new.clone_from(&o.new)).is_some()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Show or hide an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetVisible {
    pub entity: EntityId,
    pub old: bool,
    pub new: bool,
}

impl SetVisible {
    pub const TYPE_TAG: &'static str = "SetVisible";

    pub fn new(entity: EntityId, old: bool, new: bool) -> Box<Self> {
        Box::new(Self { entity, old, new })
    }

    pub fn rehydrate(
        record: &CommandRecord,
        cx: &LoadContext<'_, Scene>,
    ) -> Result<Box<dyn Command<Scene>>, LoadError> {
        rehydrate_as(record, cx, |c: &Self| vec![c.entity])
    }
}

impl Command<Scene> for SetVisible {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn label(&self) -> String {
        let verb = if self.new { "Show" } else { "Hide" };
        format!("{verb} {}", self.entity.short())
    }

    fn targets(&self) -> Vec<EntityId> {
        vec![self.entity]
    }

    fn execute(&mut self, doc: &mut Scene) -> Result<(), CommandError> {
        applied(doc.set_visible(self.entity, self.new), self.entity)
    }

    fn undo(&mut self, doc: &mut Scene) -> Result<(), CommandError> {
        applied(doc.set_visible(self.entity, self.old), self.entity)
    }

    fn to_fields(&self) -> Result<Map<String, Value>, CommandError> {
        fields_of(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn absorb<C: 'static>(other: &dyn Command<Scene>) -> Option<&C> {
    other.as_any().downcast_ref::<C>()
}
