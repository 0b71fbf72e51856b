//! Shared value types used by the scene document, the edit commands and the
//! persistence layer.

mod types;

pub use types::{EntityId, ParseEntityIdError, Transform};

/// Host-side lookup used when rebuilding saved commands: "is there an entity
/// with this id in the open document?"
pub trait EntityLookup {
    fn contains_entity(&self, id: EntityId) -> bool;
}

impl<T: EntityLookup + ?Sized> EntityLookup for &T {
    fn contains_entity(&self, id: EntityId) -> bool {
        (**self).contains_entity(id)
    }
}
