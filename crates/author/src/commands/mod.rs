//! Concrete edit commands for a [`Scene`].
//!
//! Every command is a plain serde struct; its serialized form is the record
//! payload, so `to_fields` and `rehydrate` are thin wrappers around
//! [`fields_of`] and [`CommandRecord::parse_fields`].

mod entity;
mod property;

pub use entity::{AddEntity, RemoveEntity, SetParent};
pub use property::{SetName, SetPosition, SetTransform, SetVisible};

use scenedit_common::EntityId;
use scenedit_history::{Command, CommandError, CommandRecord, LoadContext, LoadError, Registry};
use scenedit_scene::Scene;
use serde::de::DeserializeOwned;

/// Install every scene command type in `registry`.
pub fn register_scene_commands(registry: &mut Registry<Scene>) {
    registry
        .register(AddEntity::TYPE_TAG, AddEntity::rehydrate)
        .register(RemoveEntity::TYPE_TAG, RemoveEntity::rehydrate)
        .register(SetParent::TYPE_TAG, SetParent::rehydrate)
        .register(SetTransform::TYPE_TAG, SetTransform::rehydrate)
        .register(SetPosition::TYPE_TAG, SetPosition::rehydrate)
        .register(SetName::TYPE_TAG, SetName::rehydrate)
        .register(SetVisible::TYPE_TAG, SetVisible::rehydrate);
}

/// A registry that knows the composite and every scene command.
pub fn scene_registry() -> Registry<Scene> {
    let mut registry = Registry::new();
    register_scene_commands(&mut registry);
    registry
}

/// Decode `record` as `C`, then check that every entity it references
/// resolves in the open document.
fn rehydrate_as<C>(
    record: &CommandRecord,
    cx: &LoadContext<'_, Scene>,
    references: impl FnOnce(&C) -> Vec<EntityId>,
) -> Result<Box<dyn Command<Scene>>, LoadError>
where
    C: Command<Scene> + DeserializeOwned + 'static,
{
    let command: C = record.parse_fields()?;
    for entity in references(&command) {
        cx.resolve(&record.type_tag, entity)?;
    }
    Ok(Box::new(command))
}

/// `Ok` when the scene accepted the mutation.
fn applied(ok: bool, entity: EntityId) -> Result<(), CommandError> {
    if ok {
        Ok(())
    } else {
        Err(CommandError::EntityNotFound(entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_knows_every_scene_command() {
        let registry = scene_registry();
        assert_eq!(
            registry.type_tags(),
            vec![
                "AddEntity",
                "Composite",
                "RemoveEntity",
                "SetName",
                "SetParent",
                "SetPosition",
                "SetTransform",
                "SetVisible",
            ]
        );
    }
}
