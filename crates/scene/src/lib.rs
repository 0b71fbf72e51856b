//! Scene document: the live data the editor mutates.
//!
//! # Invariants
//! - Every mutation goes through an explicit operation.
//! - Iteration order is deterministic (BTreeMap keyed by `EntityId`).
//! - A parent link always points at an object that exists.

pub mod scene;

pub use scene::{RemovedObject, Scene, SceneObject, SceneSummary};
