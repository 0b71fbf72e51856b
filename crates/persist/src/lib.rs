//! Persistence: scene snapshots plus the saved edit history, written as
//! numbered revisions into a project directory.
//!
//! # Invariants
//! - Files are write-once; every save appends a new revision.
//! - Every file is listed in a hash-chained manifest and checked on load.
//! - A store written with another schema version is refused, never migrated
//!   silently.

mod codec;
pub mod snapshot;
pub mod store;

pub use snapshot::SceneSnapshot;
pub use store::{
    HISTORY_SCHEMA_VERSION, IntegrityManifest, ManifestEntry, ProjectMeta, ProjectStore, Revision,
    SCENE_SCHEMA_VERSION, StoreError,
};
