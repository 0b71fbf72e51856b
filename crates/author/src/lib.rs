//! Scene authoring: the concrete edit commands and an [`Editor`] that routes
//! every edit through the history engine.
//!
//! # Invariants
//! - All authoring ops are reversible.
//! - Every command type here is installed by [`register_scene_commands`], so
//!   any history the editor writes can be loaded back.

pub mod commands;
pub mod editor;

pub use commands::{
    AddEntity, RemoveEntity, SetName, SetParent, SetPosition, SetTransform, SetVisible,
    register_scene_commands, scene_registry,
};
pub use editor::{EditError, Editor};
