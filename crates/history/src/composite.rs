use crate::command::{Command, CommandRecord};
use crate::error::{CommandError, LoadError};
use crate::registry::LoadContext;
use scenedit_common::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;

/// Ordered group of commands applied and reversed as one history entry.
///
/// Execute runs the children in order; undo runs them in reverse. If a child
/// fails, the children already run are rolled back so the document is left
/// as it was before the call.
pub struct CompositeCommand<D> {
    label: String,
    children: Vec<Box<dyn Command<D>>>,
}

#[derive(Serialize, Deserialize)]
struct CompositeFields {
    children: Vec<CommandRecord>,
}

impl<D: 'static> CompositeCommand<D> {
    pub const TYPE_TAG: &'static str = "Composite";

    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(label: impl Into<String>, children: Vec<Box<dyn Command<D>>>) -> Self {
        Self {
            label: label.into(),
            children,
        }
    }

    pub fn push(&mut self, child: Box<dyn Command<D>>) {
        self.children.push(child);
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn children(&self) -> &[Box<dyn Command<D>>] {
        &self.children
    }

    /// Rebuild each embedded child through the registry, then assemble. One
    /// bad child fails the whole composite.
    pub fn rehydrate(
        record: &CommandRecord,
        cx: &LoadContext<'_, D>,
    ) -> Result<Box<dyn Command<D>>, LoadError> {
        let fields: CompositeFields = record.parse_fields()?;
        let children = fields
            .children
            .iter()
            .map(|child| cx.rehydrate(child))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Box::new(Self::with_children(record.label.clone(), children)))
    }

    fn collect_ids(&self, each: impl Fn(&dyn Command<D>) -> Vec<EntityId>) -> Vec<EntityId> {
        let mut ids = Vec::new();
        for child in &self.children {
            for id in each(child.as_ref()) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }
}

impl<D> fmt::Debug for CompositeCommand<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeCommand")
            .field("label", &self.label)
            .field("children", &self.children)
            .finish()
    }
}

impl<D: 'static> Command<D> for CompositeCommand<D> {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn targets(&self) -> Vec<EntityId> {
        self.collect_ids(|c| c.targets())
    }

    fn declared_entities(&self) -> Vec<EntityId> {
        self.collect_ids(|c| c.declared_entities())
    }

    fn execute(&mut self, doc: &mut D) -> Result<(), CommandError> {
        for index in 0..self.children.len() {
            if let Err(source) = self.children[index].execute(doc) {
                for done in self.children[..index].iter_mut().rev() {
                    if let Err(e) = done.undo(doc) {
                        tracing::warn!(child = %done.label(), error = %e, "composite rollback step failed");
                    }
                }
                return Err(CommandError::Child {
                    index,
                    source: Box::new(source),
                });
            }
        }
        Ok(())
    }

    fn undo(&mut self, doc: &mut D) -> Result<(), CommandError> {
        for index in (0..self.children.len()).rev() {
            if let Err(source) = self.children[index].undo(doc) {
                for undone in self.children[index + 1..].iter_mut() {
                    if let Err(e) = undone.execute(doc) {
                        tracing::warn!(child = %undone.label(), error = %e, "composite rollback step failed");
                    }
                }
                return Err(CommandError::Child {
                    index,
                    source: Box::new(source),
                });
            }
        }
        Ok(())
    }

    fn to_fields(&self) -> Result<Map<String, Value>, CommandError> {
        let children = self
            .children
            .iter()
            .map(|child| CommandRecord::capture(None, &child.label(), child.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        crate::command::fields_of(&CompositeFields { children })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
