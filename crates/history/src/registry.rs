use crate::command::{Command, CommandRecord};
use crate::composite::CompositeCommand;
use crate::error::LoadError;
use scenedit_common::{EntityId, EntityLookup};
use std::collections::HashMap;
use std::fmt;

/// Rebuilds one concrete command from its saved record.
pub type RehydrateFn<D> =
    fn(&CommandRecord, &LoadContext<'_, D>) -> Result<Box<dyn Command<D>>, LoadError>;

/// Explicit type-tag → constructor map.
///
/// Each command module registers its own types at startup and the finished
/// registry is handed to the engine, so the set of loadable commands is an
/// ordinary value rather than global state. `Registry::new` already knows
/// [`CompositeCommand`].
pub struct Registry<D> {
    factories: HashMap<&'static str, RehydrateFn<D>>,
}

impl<D: 'static> Registry<D> {
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(CompositeCommand::<D>::TYPE_TAG, CompositeCommand::<D>::rehydrate);
        registry
    }

    /// A registry that knows no command types at all.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register `rehydrate` under `type_tag`, replacing any earlier entry.
    pub fn register(&mut self, type_tag: &'static str, rehydrate: RehydrateFn<D>) -> &mut Self {
        if self.factories.insert(type_tag, rehydrate).is_some() {
            tracing::debug!(type_tag, "command factory replaced");
        }
        self
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.factories.contains_key(type_tag)
    }

    /// Registered tags, sorted.
    pub fn type_tags(&self) -> Vec<&'static str> {
        let mut tags: Vec<_> = self.factories.keys().copied().collect();
        tags.sort_unstable();
        tags
    }

    /// Rebuild the command described by `record`, resolving its targets
    /// through `lookup`.
    pub fn rehydrate(
        &self,
        record: &CommandRecord,
        lookup: &dyn EntityLookup,
    ) -> Result<Box<dyn Command<D>>, LoadError> {
        LoadContext::new(self, lookup).rehydrate(record)
    }
}

impl<D: 'static> Default for Registry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> fmt::Debug for Registry<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.factories.keys().collect();
        tags.sort_unstable();
        f.debug_struct("Registry").field("types", &tags).finish()
    }
}

/// What a factory sees while rebuilding a command: the registry (for nested
/// records) and the host's entity lookup.
pub struct LoadContext<'a, D> {
    registry: &'a Registry<D>,
    lookup: &'a dyn EntityLookup,
}

impl<'a, D: 'static> LoadContext<'a, D> {
    pub fn new(registry: &'a Registry<D>, lookup: &'a dyn EntityLookup) -> Self {
        Self { registry, lookup }
    }

    /// Rebuild a (possibly nested) record.
    pub fn rehydrate(&self, record: &CommandRecord) -> Result<Box<dyn Command<D>>, LoadError> {
        let factory = self
            .registry
            .factories
            .get(record.type_tag.as_str())
            .ok_or_else(|| LoadError::UnknownTypeTag(record.type_tag.clone()))?;
        factory(record, self)
    }

    /// Check that `entity` exists in the open document.
    pub fn resolve(&self, type_tag: &str, entity: EntityId) -> Result<EntityId, LoadError> {
        if self.lookup.contains_entity(entity) {
            Ok(entity)
        } else {
            Err(LoadError::UnresolvableReference {
                type_tag: type_tag.to_owned(),
                entity,
            })
        }
    }
}
