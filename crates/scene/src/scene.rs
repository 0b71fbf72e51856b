use scenedit_common::{EntityId, EntityLookup, Transform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Per-object data stored in the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    pub transform: Transform,
    pub visible: bool,
    pub parent: Option<EntityId>,
}

impl SceneObject {
    pub fn new(name: impl Into<String>, transform: Transform) -> Self {
        Self {
            name: name.into(),
            transform,
            visible: true,
            parent: None,
        }
    }
}

/// What `Scene::remove` hands back: the object itself plus the ids of its
/// direct children, which were detached to the root.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedObject {
    pub object: SceneObject,
    pub children: Vec<EntityId>,
}

/// The edited document.
///
/// Only edit commands mutate it; everything else reads. Uses BTreeMap so that
/// iteration and `state_hash` are stable across runs and platforms.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scene {
    objects: BTreeMap<EntityId, SceneObject>,
}

impl Scene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects in the scene.
    pub fn entity_count(&self) -> usize {
        self.objects.len()
    }

    /// Read-only access to all objects in canonical order.
    pub fn entities(&self) -> &BTreeMap<EntityId, SceneObject> {
        &self.objects
    }

    pub fn get(&self, id: EntityId) -> Option<&SceneObject> {
        self.objects.get(&id)
    }

    /// Direct children of `id`, in canonical order.
    pub fn children(&self, id: EntityId) -> Vec<EntityId> {
        self.objects
            .iter()
            .filter(|(_, obj)| obj.parent == Some(id))
            .map(|(child, _)| *child)
            .collect()
    }

    /// Add a new object under a fresh id.
    pub fn insert(&mut self, object: SceneObject) -> EntityId {
        let id = EntityId::new();
        self.insert_with_id(id, object);
        id
    }

    /// Add an object under a caller-chosen id (undo, redo, load).
    ///
    /// Returns false and leaves the scene untouched if the id is taken. A
    /// parent link to a missing object is dropped.
    pub fn insert_with_id(&mut self, id: EntityId, mut object: SceneObject) -> bool {
        if self.objects.contains_key(&id) {
            return false;
        }
        if object.parent.is_some_and(|p| !self.objects.contains_key(&p)) {
            tracing::debug!(entity = %id.short(), "dropping dangling parent link on insert");
            object.parent = None;
        }
        self.objects.insert(id, object);
        true
    }

    /// Remove an object. Its direct children are detached to the root.
    pub fn remove(&mut self, id: EntityId) -> Option<RemovedObject> {
        let object = self.objects.remove(&id)?;
        let children = self.children(id);
        for child in &children {
            if let Some(obj) = self.objects.get_mut(child) {
                obj.parent = None;
            }
        }
        tracing::debug!(entity = %id.short(), children = children.len(), "object removed");
        Some(RemovedObject { object, children })
    }

    /// Update an object's transform. Returns false if the object is missing.
    pub fn set_transform(&mut self, id: EntityId, new: Transform) -> bool {
        let Some(obj) = self.objects.get_mut(&id) else {
            return false;
        };
        obj.transform = new;
        true
    }

    pub fn set_name(&mut self, id: EntityId, name: impl Into<String>) -> bool {
        let Some(obj) = self.objects.get_mut(&id) else {
            return false;
        };
        obj.name = name.into();
        true
    }

    pub fn set_visible(&mut self, id: EntityId, visible: bool) -> bool {
        let Some(obj) = self.objects.get_mut(&id) else {
            return false;
        };
        obj.visible = visible;
        true
    }

    /// Attach `id` under `parent` (or to the root with `None`).
    ///
    /// Rejected when either object is missing or the link would create a
    /// cycle.
    pub fn set_parent(&mut self, id: EntityId, parent: Option<EntityId>) -> bool {
        if !self.objects.contains_key(&id) {
            return false;
        }
        if let Some(p) = parent {
            if !self.objects.contains_key(&p) || self.is_ancestor_or_self(id, p) {
                return false;
            }
        }
        let Some(obj) = self.objects.get_mut(&id) else {
            return false;
        };
        obj.parent = parent;
        true
    }

    /// Whether `ancestor` is `node` or lies on `node`'s parent chain.
    fn is_ancestor_or_self(&self, ancestor: EntityId, node: EntityId) -> bool {
        let mut cursor = Some(node);
        let mut hops = 0;
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            hops += 1;
            if hops > self.objects.len() {
                return true;
            }
            cursor = self.objects.get(&current).and_then(|o| o.parent);
        }
        false
    }

    /// Deterministic hash of the scene contents, for comparing states.
    /// Uses canonical (BTreeMap) iteration order.
    pub fn state_hash(&self) -> u64 {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325; // FNV offset basis
        let mix = |h: &mut u64, bytes: &[u8]| {
            for &b in bytes {
                *h ^= b as u64;
                *h = h.wrapping_mul(0x0100_0000_01b3);
            }
        };
        for (id, obj) in &self.objects {
            mix(&mut h, id.0.as_bytes());
            mix(&mut h, obj.name.as_bytes());
            mix(&mut h, &[0xff, obj.visible as u8]);
            match obj.parent {
                Some(p) => mix(&mut h, p.0.as_bytes()),
                None => mix(&mut h, &[0]),
            }
            let t = &obj.transform;
            for f in t
                .position
                .to_array()
                .into_iter()
                .chain(t.rotation.to_array())
                .chain(t.scale.to_array())
            {
                mix(&mut h, &f.to_le_bytes());
            }
        }
        h
    }

    /// One-line summary for logs and the CLI.
    pub fn summary(&self) -> SceneSummary {
        SceneSummary {
            entity_count: self.objects.len(),
            hidden: self.objects.values().filter(|o| !o.visible).count(),
            roots: self.objects.values().filter(|o| o.parent.is_none()).count(),
            hash: self.state_hash(),
        }
    }
}

impl EntityLookup for Scene {
    fn contains_entity(&self, id: EntityId) -> bool {
        self.objects.contains_key(&id)
    }
}

/// Summary of scene state for inspection output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneSummary {
    pub entity_count: usize,
    pub hidden: usize,
    pub roots: usize,
    pub hash: u64,
}

impl fmt::Display for SceneSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scene: entities={} roots={} hidden={} hash={:#018x}",
            self.entity_count, self.roots, self.hidden, self.hash
        )
    }
}
