//! File-backed project persistence.
//!
//! Layout inside the project directory:
//! ```text
//! project.meta.json            - metadata and schema versions
//! scenes/
//!   000001.scene.cbor.zst      - CBOR+zstd scene snapshots
//! history/
//!   000001.history.json.zst    - JSON+zstd saved edit histories
//! integrity/
//!   manifest.json              - hash chain manifest
//! ```
//!
//! Every save writes one scene snapshot and one history file under the same
//! revision number; the history is only meaningful against its own scene.

use crate::codec::{decode_cbor, decode_json, encode_cbor, encode_json, sha256_hex};
use crate::snapshot::SceneSnapshot;
use scenedit_history::HistoryRecord;
use scenedit_scene::Scene;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current schema versions.
pub const SCENE_SCHEMA_VERSION: u32 = 1;
pub const HISTORY_SCHEMA_VERSION: u32 = 1;

const META_FILE: &str = "project.meta.json";
const SCENES_DIR: &str = "scenes";
const HISTORY_DIR: &str = "history";

/// Errors from file-backed persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("integrity check failed for {file}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        file: String,
        expected: String,
        actual: String,
    },
    #[error("{0} is not listed in the integrity manifest")]
    Unlisted(String),
    #[error("schema version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("no saved revisions")]
    NoRevisions,
    #[error("revision {0} does not exist")]
    UnknownRevision(u32),
}

/// Metadata stored in project.meta.json.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub scene_schema_version: u32,
    pub history_schema_version: u32,
    pub revision_count: u32,
}

/// A single entry in the integrity manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub filename: String,
    pub sha256: String,
    pub prev_hash: Option<String>,
}

/// Integrity manifest tracking every written file in a hash chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityManifest {
    pub entries: Vec<ManifestEntry>,
}

impl IntegrityManifest {
    fn find(&self, filename: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.filename == filename)
    }

    fn push(&mut self, filename: String, data: &[u8]) {
        let prev_hash = self.entries.last().map(|e| e.sha256.clone());
        self.entries.push(ManifestEntry {
            filename,
            sha256: sha256_hex(data),
            prev_hash,
        });
    }
}

/// What one save revision holds.
#[derive(Debug, Clone)]
pub struct Revision {
    pub number: u32,
    pub scene: Scene,
    pub history: HistoryRecord,
}

/// File-backed project store with schema versioning and integrity checking.
pub struct ProjectStore {
    root: PathBuf,
    meta: ProjectMeta,
    manifest: IntegrityManifest,
}

impl ProjectStore {
    /// Open or create a project store at the given path.
    ///
    /// An existing store written with a different schema version is refused.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join(SCENES_DIR))?;
        std::fs::create_dir_all(root.join(HISTORY_DIR))?;
        std::fs::create_dir_all(root.join("integrity"))?;

        let meta_path = root.join(META_FILE);
        let manifest_path = manifest_path(&root);

        let (meta, manifest) = if meta_path.exists() {
            let meta: ProjectMeta = serde_json::from_reader(std::fs::File::open(&meta_path)?)?;
            check_schema(meta.scene_schema_version, SCENE_SCHEMA_VERSION)?;
            check_schema(meta.history_schema_version, HISTORY_SCHEMA_VERSION)?;
            let manifest: IntegrityManifest = if manifest_path.exists() {
                serde_json::from_reader(std::fs::File::open(&manifest_path)?)?
            } else {
                IntegrityManifest::default()
            };
            tracing::debug!(path = %root.display(), revisions = meta.revision_count, "project store opened");
            (meta, manifest)
        } else {
            let meta = ProjectMeta {
                scene_schema_version: SCENE_SCHEMA_VERSION,
                history_schema_version: HISTORY_SCHEMA_VERSION,
                revision_count: 0,
            };
            let manifest = IntegrityManifest::default();
            serde_json::to_writer_pretty(std::fs::File::create(&meta_path)?, &meta)?;
            serde_json::to_writer_pretty(std::fs::File::create(&manifest_path)?, &manifest)?;
            tracing::info!(path = %root.display(), "project store created");
            (meta, manifest)
        };

        Ok(Self {
            root,
            meta,
            manifest,
        })
    }

    /// Write `scene` and `history` as the next revision and return its number.
    pub fn save(&mut self, scene: &Scene, history: &HistoryRecord) -> Result<u32, StoreError> {
        let revision = self.meta.revision_count + 1;

        let scene_bytes = encode_cbor(&SceneSnapshot::capture(revision, scene))?;
        let history_bytes = encode_json(history)?;

        let scene_file = scene_filename(revision);
        let history_file = history_filename(revision);
        std::fs::write(self.root.join(SCENES_DIR).join(&scene_file), &scene_bytes)?;
        std::fs::write(self.root.join(HISTORY_DIR).join(&history_file), &history_bytes)?;

        self.manifest.push(scene_file, &scene_bytes);
        self.manifest.push(history_file, &history_bytes);
        self.meta.revision_count = revision;

        self.save_meta()?;
        self.save_manifest()?;
        tracing::info!(
            revision,
            entities = scene.entity_count(),
            commands = history.len(),
            "project saved"
        );
        Ok(revision)
    }

    /// Load the newest revision.
    pub fn load_latest(&self) -> Result<Revision, StoreError> {
        if self.meta.revision_count == 0 {
            return Err(StoreError::NoRevisions);
        }
        self.load_revision(self.meta.revision_count)
    }

    /// Load a specific revision, checking both files against the manifest.
    pub fn load_revision(&self, number: u32) -> Result<Revision, StoreError> {
        if number == 0 || number > self.meta.revision_count {
            return Err(StoreError::UnknownRevision(number));
        }
        let scene_file = scene_filename(number);
        let snapshot: SceneSnapshot = decode_cbor(&self.read_verified(SCENES_DIR, &scene_file)?)?;
        if snapshot.revision != number || !snapshot.verify() {
            return Err(StoreError::IntegrityMismatch {
                file: scene_file,
                expected: format!("revision {number} with hash {:#018x}", snapshot.hash),
                actual: format!(
                    "revision {} with hash {:#018x}",
                    snapshot.revision,
                    snapshot.scene.state_hash()
                ),
            });
        }
        let history: HistoryRecord =
            decode_json(&self.read_verified(HISTORY_DIR, &history_filename(number))?)?;

        tracing::debug!(revision = number, commands = history.len(), "revision loaded");
        Ok(Revision {
            number,
            scene: snapshot.restore(),
            history,
        })
    }

    /// Walk the manifest: every link must point at its predecessor and every
    /// file must still hash to what was recorded.
    pub fn verify_integrity(&self) -> Result<(), StoreError> {
        let mut prev_hash: Option<String> = None;
        for entry in &self.manifest.entries {
            if entry.prev_hash != prev_hash {
                return Err(StoreError::IntegrityMismatch {
                    file: entry.filename.clone(),
                    expected: prev_hash.unwrap_or_else(|| "None".into()),
                    actual: entry.prev_hash.clone().unwrap_or_else(|| "None".into()),
                });
            }

            let data = std::fs::read(self.path_of(&entry.filename))?;
            let actual = sha256_hex(&data);
            if actual != entry.sha256 {
                return Err(StoreError::IntegrityMismatch {
                    file: entry.filename.clone(),
                    expected: entry.sha256.clone(),
                    actual,
                });
            }

            prev_hash = Some(entry.sha256.clone());
        }
        tracing::debug!(files = self.manifest.entries.len(), "integrity verified");
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta(&self) -> &ProjectMeta {
        &self.meta
    }

    pub fn manifest(&self) -> &IntegrityManifest {
        &self.manifest
    }

    fn path_of(&self, filename: &str) -> PathBuf {
        let dir = if filename.ends_with(".scene.cbor.zst") {
            SCENES_DIR
        } else {
            HISTORY_DIR
        };
        self.root.join(dir).join(filename)
    }

    fn read_verified(&self, dir: &str, filename: &str) -> Result<Vec<u8>, StoreError> {
        let data = std::fs::read(self.root.join(dir).join(filename))?;
        let entry = self
            .manifest
            .find(filename)
            .ok_or_else(|| StoreError::Unlisted(filename.to_owned()))?;
        let actual = sha256_hex(&data);
        if entry.sha256 != actual {
            return Err(StoreError::IntegrityMismatch {
                file: filename.to_owned(),
                expected: entry.sha256.clone(),
                actual,
            });
        }
        Ok(data)
    }

    fn save_meta(&self) -> Result<(), StoreError> {
        let path = self.root.join(META_FILE);
        serde_json::to_writer_pretty(std::fs::File::create(path)?, &self.meta)?;
        Ok(())
    }

    fn save_manifest(&self) -> Result<(), StoreError> {
        serde_json::to_writer_pretty(std::fs::File::create(manifest_path(&self.root))?, &self.manifest)?;
        Ok(())
    }
}

fn check_schema(file_version: u32, expected_version: u32) -> Result<(), StoreError> {
    if file_version == expected_version {
        Ok(())
    } else {
        Err(StoreError::SchemaMismatch {
            file_version,
            expected_version,
        })
    }
}

fn manifest_path(root: &Path) -> PathBuf {
    root.join("integrity").join("manifest.json")
}

fn scene_filename(revision: u32) -> String {
    format!("{revision:06}.scene.cbor.zst")
}

fn history_filename(revision: u32) -> String {
    format!("{revision:06}.history.json.zst")
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use scenedit_author::Editor;
    use scenedit_common::Transform;
    use scenedit_history::{CommandId, HistoryConfig};

    /// An editor with a few recorded edits, one of them undone.
    fn edited() -> Editor {
        let config = HistoryConfig {
            persistence_enabled: true,
            merge_window_ms: 0,
            ..HistoryConfig::default()
        };
        let mut editor = Editor::new(config);
        let a = editor.spawn("Crate", Transform::default()).unwrap();
        let b = editor
            .spawn("Lamp", Transform::from_position(Vec3::new(10.0, 5.0, -3.0)))
            .unwrap();
        editor.set_parent(b, Some(a)).unwrap();
        editor.rename(a, "Big crate").unwrap();
        editor.undo().unwrap();
        editor
    }

    #[test]
    fn store_open_creates_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ProjectStore::open(tmp.path().join("project")).unwrap();
        assert_eq!(store.meta().revision_count, 0);
        assert!(store.root().join("scenes").is_dir());
        assert!(store.root().join("history").is_dir());
        assert!(store.root().join("integrity").join("manifest.json").is_file());
        assert!(matches!(store.load_latest(), Err(StoreError::NoRevisions)));
    }

    #[test]
    fn save_and_reload_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("project");
        let editor = edited();
        let hash = editor.scene().state_hash();
        let record = editor.save_history();

        let mut store = ProjectStore::open(&path).unwrap();
        assert_eq!(store.save(editor.scene(), &record).unwrap(), 1);

        let reopened = ProjectStore::open(&path).unwrap();
        let revision = reopened.load_latest().unwrap();
        assert_eq!(revision.number, 1);
        assert_eq!(revision.scene.state_hash(), hash);
        assert_eq!(revision.history, record);
    }

    #[test]
    fn reloaded_history_navigates_the_reloaded_scene() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = ProjectStore::open(tmp.path()).unwrap();
        let editor = edited();
        store.save(editor.scene(), &editor.save_history()).unwrap();

        let revision = store.load_latest().unwrap();
        let mut reopened = Editor::with_scene(revision.scene, HistoryConfig::default());
        let report = reopened.load_history(&revision.history);
        assert!(report.is_complete(), "{:?}", report.skipped);

        reopened.go_to_state(None).unwrap();
        assert_eq!(reopened.scene().entity_count(), 0);
        reopened.go_to_state(Some(CommandId(4))).unwrap();
        assert!(
            reopened
                .scene()
                .entities()
                .values()
                .any(|o| o.name == "Big crate")
        );
    }

    #[test]
    fn revisions_accumulate_and_stay_loadable() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = ProjectStore::open(tmp.path()).unwrap();
        let mut editor = edited();
        store.save(editor.scene(), &editor.save_history()).unwrap();
        let first_hash = editor.scene().state_hash();

        editor.redo().unwrap();
        store.save(editor.scene(), &editor.save_history()).unwrap();

        assert_eq!(store.meta().revision_count, 2);
        assert_eq!(store.manifest().entries.len(), 4);
        assert_eq!(store.load_revision(1).unwrap().scene.state_hash(), first_hash);
        assert_eq!(
            store.load_latest().unwrap().scene.state_hash(),
            editor.scene().state_hash()
        );
        assert!(matches!(
            store.load_revision(3),
            Err(StoreError::UnknownRevision(3))
        ));
        store.verify_integrity().unwrap();
    }

    #[test]
    fn integrity_fail_closed_on_corruption() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("project");
        let mut store = ProjectStore::open(&path).unwrap();
        let editor = edited();
        store.save(editor.scene(), &editor.save_history()).unwrap();

        // Corrupt the history file
        let history_path = path.join("history").join("000001.history.json.zst");
        let mut data = std::fs::read(&history_path).unwrap();
        if let Some(byte) = data.last_mut() {
            *byte ^= 0xff;
        }
        std::fs::write(&history_path, &data).unwrap();

        let reopened = ProjectStore::open(&path).unwrap();
        assert!(matches!(
            reopened.verify_integrity(),
            Err(StoreError::IntegrityMismatch { .. })
        ));
        assert!(matches!(
            reopened.load_latest(),
            Err(StoreError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn broken_chain_is_detected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = ProjectStore::open(tmp.path()).unwrap();
        let editor = edited();
        store.save(editor.scene(), &editor.save_history()).unwrap();

        store.manifest.entries[1].prev_hash = None;
        assert!(store.verify_integrity().is_err());
    }

    #[test]
    fn schema_mismatch_fail_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("project");

        // Create a valid store
        let _store = ProjectStore::open(&path).unwrap();

        // Tamper with the meta file to have a wrong version
        let meta_path = path.join("project.meta.json");
        let mut meta: ProjectMeta =
            serde_json::from_reader(std::fs::File::open(&meta_path).unwrap()).unwrap();
        meta.history_schema_version = 999;
        serde_json::to_writer_pretty(std::fs::File::create(&meta_path).unwrap(), &meta).unwrap();

        match ProjectStore::open(&path) {
            Err(StoreError::SchemaMismatch {
                file_version,
                expected_version,
            }) => {
                assert_eq!(file_version, 999);
                assert_eq!(expected_version, HISTORY_SCHEMA_VERSION);
            }
            Err(e) => panic!("expected SchemaMismatch, got: {e}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }
}
