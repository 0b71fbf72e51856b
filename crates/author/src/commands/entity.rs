use super::rehydrate_as;
use scenedit_common::EntityId;
use scenedit_history::{Command, CommandError, CommandRecord, LoadContext, LoadError, fields_of};
use scenedit_scene::{Scene, SceneObject};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;

/// Create an object. Carries the whole object, so it can be replayed on a
/// scene that has never seen it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddEntity {
    pub entity: EntityId,
    pub object: SceneObject,
}

impl AddEntity {
    pub const TYPE_TAG: &'static str = "AddEntity";

    /// Add `object` under a fresh id.
    pub fn new(object: SceneObject) -> Box<Self> {
        Box::new(Self {
            entity: EntityId::new(),
            object,
        })
    }

    pub fn rehydrate(
        record: &CommandRecord,
        cx: &LoadContext<'_, Scene>,
    ) -> Result<Box<dyn Command<Scene>>, LoadError> {
        rehydrate_as(record, cx, |c: &Self| c.object.parent.into_iter().collect())
    }
}

impl Command<Scene> for AddEntity {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn label(&self) -> String {
        format!("Add {}", self.object.name)
    }

    fn targets(&self) -> Vec<EntityId> {
        vec![self.entity]
    }

    fn declared_entities(&self) -> Vec<EntityId> {
        vec![self.entity]
    }

    fn execute(&mut self, doc: &mut Scene) -> Result<(), CommandError> {
        if !doc.insert_with_id(self.entity, self.object.clone()) {
            return Err(CommandError::EntityExists(self.entity));
        }
        Ok(())
    }

    fn undo(&mut self, doc: &mut Scene) -> Result<(), CommandError> {
        doc.remove(self.entity)
            .map(|_| ())
            .ok_or(CommandError::EntityNotFound(self.entity))
    }

    fn to_fields(&self) -> Result<Map<String, Value>, CommandError> {
        fields_of(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Delete an object.
///
/// The object and the ids of its direct children are captured when the
/// command runs; undo puts the object back and re-attaches those children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveEntity {
    pub entity: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<SceneObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<EntityId>,
}

impl RemoveEntity {
    pub const TYPE_TAG: &'static str = "RemoveEntity";

    pub fn new(entity: EntityId) -> Box<Self> {
        Box::new(Self {
            entity,
            object: None,
            children: Vec::new(),
        })
    }

    pub fn rehydrate(
        record: &CommandRecord,
        cx: &LoadContext<'_, Scene>,
    ) -> Result<Box<dyn Command<Scene>>, LoadError> {
        let command: Self = record.parse_fields()?;
        if command.object.is_none() {
            return Err(LoadError::Malformed {
                type_tag: record.type_tag.clone(),
                reason: "removed object was not captured".into(),
            });
        }
        rehydrate_as(record, cx, |c: &Self| c.children.clone())
    }
}

impl Command<Scene> for RemoveEntity {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn label(&self) -> String {
        match &self.object {
            Some(object) => format!("Remove {}", object.name),
            None => format!("Remove {}", self.entity.short()),
        }
    }

    fn targets(&self) -> Vec<EntityId> {
        vec![self.entity]
    }

    fn declared_entities(&self) -> Vec<EntityId> {
        vec![self.entity]
    }

    fn execute(&mut self, doc: &mut Scene) -> Result<(), CommandError> {
        let removed = doc
            .remove(self.entity)
            .ok_or(CommandError::EntityNotFound(self.entity))?;
        self.object = Some(removed.object);
        self.children = removed.children;
        Ok(())
    }

    fn undo(&mut self, doc: &mut Scene) -> Result<(), CommandError> {
        let object = self.object.clone().ok_or(CommandError::NotExecuted)?;
        if !doc.insert_with_id(self.entity, object) {
            return Err(CommandError::EntityExists(self.entity));
        }
        for child in &self.children {
            if !doc.set_parent(*child, Some(self.entity)) {
                tracing::debug!(child = %child.short(), "child gone, not re-attached");
            }
        }
        Ok(())
    }

    fn to_fields(&self) -> Result<Map<String, Value>, CommandError> {
        fields_of(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Move an object in the hierarchy. `None` is the scene root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetParent {
    pub entity: EntityId,
    pub old: Option<EntityId>,
    pub new: Option<EntityId>,
}

impl SetParent {
    pub const TYPE_TAG: &'static str = "SetParent";

    pub fn new(entity: EntityId, old: Option<EntityId>, new: Option<EntityId>) -> Box<Self> {
        Box::new(Self { entity, old, new })
    }

    pub fn rehydrate(
        record: &CommandRecord,
        cx: &LoadContext<'_, Scene>,
    ) -> Result<Box<dyn Command<Scene>>, LoadError> {
        rehydrate_as(record, cx, |c: &Self| {
            std::iter::once(c.entity).chain(c.old).chain(c.new).collect()
        })
    }

    fn attach(&self, doc: &mut Scene, parent: Option<EntityId>) -> Result<(), CommandError> {
        if doc.set_parent(self.entity, parent) {
            Ok(())
        } else {
            Err(CommandError::InvalidParent {
                child: self.entity,
                parent,
            })
        }
    }
}

impl Command<Scene> for SetParent {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn label(&self) -> String {
        match self.new {
            Some(parent) => format!("Parent {} to {}", self.entity.short(), parent.short()),
            None => format!("Unparent {}", self.entity.short()),
        }
    }

    fn targets(&self) -> Vec<EntityId> {
        vec![self.entity]
    }

    fn execute(&mut self, doc: &mut Scene) -> Result<(), CommandError> {
        self.attach(doc, self.new)
    }

    fn undo(&mut self, doc: &mut Scene) -> Result<(), CommandError> {
        self.attach(doc, self.old)
    }

    fn to_fields(&self) -> Result<Map<String, Value>, CommandError> {
        fields_of(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
