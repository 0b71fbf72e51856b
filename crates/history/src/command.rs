use crate::error::{CommandError, LoadError};
use scenedit_common::EntityId;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;

/// Engine-assigned identity of an executed command.
///
/// Strictly increasing per engine; `CommandId::FIRST` is the first id handed
/// out. Never reused while the command is in either log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub u64);

impl CommandId {
    pub const FIRST: CommandId = CommandId(1);
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A reversible edit of a document `D`.
///
/// A command is built with enough state to apply *and* reverse itself, and
/// refers to its targets by [`EntityId`] rather than by reference, so it can be
/// saved and rebuilt later (see [`crate::Registry`]).
///
/// `undo` is only ever called after a successful `execute`, and at most once
/// per `execute`. The engine calls `execute` again for redo.
pub trait Command<D>: fmt::Debug {
    /// Stable name of the concrete command type. Used as the registry key.
    fn type_tag(&self) -> &'static str;

    /// Human-readable description for the history list.
    fn label(&self) -> String;

    /// Whether a later command of the same type, issued inside the merge
    /// window, may be folded into this one.
    fn mergeable(&self) -> bool {
        false
    }

    /// Entities this command edits.
    fn targets(&self) -> Vec<EntityId> {
        Vec::new()
    }

    /// Entities whose full state this command carries (created or removed
    /// objects). These count as resolvable while a history is loaded.
    fn declared_entities(&self) -> Vec<EntityId> {
        Vec::new()
    }

    fn execute(&mut self, doc: &mut D) -> Result<(), CommandError>;

    fn undo(&mut self, doc: &mut D) -> Result<(), CommandError>;

    /// Command-specific part of the saved record: target ids plus the
    /// before/after values. The engine adds `id`, `typeTag` and `label`.
    fn to_fields(&self) -> Result<Map<String, Value>, CommandError>;

    /// Fold `other`'s new state into `self`, leaving `self`'s old state
    /// alone. Returns false when `other` is not something this command can
    /// absorb.
    fn update(&mut self, other: &dyn Command<D>) -> bool {
        let _ = other;
        false
    }

    fn as_any(&self) -> &dyn Any;
}

/// Self-describing saved form of one command.
///
/// Top-level log entries always carry an `id`; children embedded in a
/// composite do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CommandId>,
    pub type_tag: String,
    #[serde(default)]
    pub label: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl CommandRecord {
    /// Capture `command` as a record.
    pub fn capture<D>(
        id: Option<CommandId>,
        label: &str,
        command: &dyn Command<D>,
    ) -> Result<Self, CommandError> {
        Ok(Self {
            id,
            type_tag: command.type_tag().to_owned(),
            label: label.to_owned(),
            fields: command.to_fields()?,
        })
    }

    /// Decode the command-specific fields into a typed payload.
    pub fn parse_fields<T: DeserializeOwned>(&self) -> Result<T, LoadError> {
        serde_json::from_value(Value::Object(self.fields.clone())).map_err(|e| {
            LoadError::Malformed {
                type_tag: self.type_tag.clone(),
                reason: e.to_string(),
            }
        })
    }
}

/// Encode a typed payload as record fields. The payload must serialize to a
/// JSON object.
pub fn fields_of<T: Serialize>(payload: &T) -> Result<Map<String, Value>, CommandError> {
    match serde_json::to_value(payload) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(CommandError::Serialize(format!(
            "expected an object, got {other}"
        ))),
        Err(e) => Err(CommandError::Serialize(e.to_string())),
    }
}

/// What listeners and the history list see of a logged command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSummary {
    pub id: CommandId,
    pub type_tag: String,
    pub label: String,
}

impl fmt::Display for CommandSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.label)
    }
}
