//! Toy document and commands for engine tests.

use crate::command::{Command, CommandRecord, fields_of};
use crate::error::{CommandError, LoadError};
use crate::registry::{LoadContext, Registry};
use scenedit_common::{EntityId, EntityLookup};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::BTreeMap;

/// Named integer cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    pub values: BTreeMap<EntityId, i64>,
}

impl Ledger {
    pub fn add(&mut self, value: i64) -> EntityId {
        let id = EntityId::new();
        self.values.insert(id, value);
        id
    }

    pub fn get(&self, id: EntityId) -> Option<i64> {
        self.values.get(&id).copied()
    }
}

impl EntityLookup for Ledger {
    fn contains_entity(&self, id: EntityId) -> bool {
        self.values.contains_key(&id)
    }
}

pub fn registry() -> Registry<Ledger> {
    let mut r = Registry::new();
    r.register(SetValue::TYPE_TAG, SetValue::rehydrate)
        .register(Insert::TYPE_TAG, Insert::rehydrate);
    r
}

/// Mergeable value change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetValue {
    pub entity: EntityId,
    pub old: i64,
    pub new: i64,
}

impl SetValue {
    pub const TYPE_TAG: &'static str = "SetValue";

    /// Change `entity` to `new`, remembering its current value.
    pub fn to(ledger: &Ledger, entity: EntityId, new: i64) -> Box<Self> {
        let old = ledger.get(entity).unwrap_or_default();
        Box::new(Self { entity, old, new })
    }

    pub fn rehydrate(
        record: &CommandRecord,
        cx: &LoadContext<'_, Ledger>,
    ) -> Result<Box<dyn Command<Ledger>>, LoadError> {
        let cmd: Self = record.parse_fields()?;
        cx.resolve(Self::TYPE_TAG, cmd.entity)?;
        Ok(Box::new(cmd))
    }
}

impl Command<Ledger> for SetValue {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn label(&self) -> String {
        format!("Set {} to {}", self.entity.short(), self.new)
    }

    fn mergeable(&self) -> bool {
        true
    }

    fn targets(&self) -> Vec<EntityId> {
        vec![self.entity]
    }

    fn execute(&mut self, doc: &mut Ledger) -> Result<(), CommandError> {
        let slot = doc
            .values
            .get_mut(&self.entity)
            .ok_or(CommandError::EntityNotFound(self.entity))?;
        *slot = self.new;
        Ok(())
    }

    fn undo(&mut self, doc: &mut Ledger) -> Result<(), CommandError> {
        let slot = doc
            .values
            .get_mut(&self.entity)
            .ok_or(CommandError::EntityNotFound(self.entity))?;
        *slot = self.old;
        Ok(())
    }

    fn to_fields(&self) -> Result<Map<String, Value>, CommandError> {
        fields_of(self)
    }

    fn update(&mut self, other: &dyn Command<Ledger>) -> bool {
        match other.as_any().downcast_ref::<Self>() {
            Some(other) => {
                self.new = other.new;
                true
            }
            None => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Creates a cell; carries its full state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insert {
    pub entity: EntityId,
    pub value: i64,
}

impl Insert {
    pub const TYPE_TAG: &'static str = "Insert";

    pub fn new(value: i64) -> Box<Self> {
        Box::new(Self {
            entity: EntityId::new(),
            value,
        })
    }

    pub fn rehydrate(
        record: &CommandRecord,
        _cx: &LoadContext<'_, Ledger>,
    ) -> Result<Box<dyn Command<Ledger>>, LoadError> {
        let cmd: Self = record.parse_fields()?;
        Ok(Box::new(cmd))
    }
}

impl Command<Ledger> for Insert {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn label(&self) -> String {
        format!("Insert {}", self.value)
    }

    fn targets(&self) -> Vec<EntityId> {
        vec![self.entity]
    }

    fn declared_entities(&self) -> Vec<EntityId> {
        vec![self.entity]
    }

    fn execute(&mut self, doc: &mut Ledger) -> Result<(), CommandError> {
        if doc.values.contains_key(&self.entity) {
            return Err(CommandError::EntityExists(self.entity));
        }
        doc.values.insert(self.entity, self.value);
        Ok(())
    }

    fn undo(&mut self, doc: &mut Ledger) -> Result<(), CommandError> {
        doc.values
            .remove(&self.entity)
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
