//! Object store client for omap-backed persistence.
//!
//! The backing store exposes, per object, an unordered string-to-bytes map
//! (the omap) plus a separate header bytes field. Writes within a single
//! mutation apply atomically; separate mutations on one object do not.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::ops::Bound;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

/// Name of a backing object.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectId(String);

impl ObjectId {
    /// Creates an object name.
    pub fn new(name: impl Into<String>) -> Self {
        ObjectId(name.into())
    }

    /// The object name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors surfaced by the object store client.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object does not exist.
    #[error("object {0} not found")]
    ObjectNotFound(ObjectId),

    /// A lower-level transport or I/O failure.
    #[error("object store i/o error: {0}")]
    Io(String),
}

/// A single atomic mutation of one object.
///
/// Parts apply in order: clear, header, upserts, removals. The `clear`
/// part is fail-ok: clearing a missing or already-empty omap succeeds.
#[derive(Clone, Debug, Default)]
pub struct OmapMutation {
    /// Priority hint forwarded to the store.
    pub priority: i32,
    /// Remove every omap key before applying the rest.
    pub clear: bool,
    /// Replace the object header.
    pub set_header: Option<Vec<u8>>,
    /// Keys to insert or overwrite.
    pub set: BTreeMap<String, Vec<u8>>,
    /// Keys to remove.
    pub remove: BTreeSet<String>,
}

/// One page of omap values.
#[derive(Clone, Debug)]
pub struct OmapPage {
    /// The values, in lexicographic key order.
    pub values: BTreeMap<String, Vec<u8>>,
    /// Whether keys beyond this page remain.
    pub more: bool,
}

/// Asynchronous object store client.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Applies one atomic mutation, creating the object if needed.
    async fn mutate(&self, oid: &ObjectId, op: OmapMutation) -> Result<(), StoreError>;

    /// Reads the object header.
    async fn omap_get_header(&self, oid: &ObjectId) -> Result<Vec<u8>, StoreError>;

    /// Reads up to `max` omap values with keys strictly greater than
    /// `start_after` in lexicographic order.
    async fn omap_get_vals(
        &self,
        oid: &ObjectId,
        start_after: &str,
        max: usize,
    ) -> Result<OmapPage, StoreError>;
}

#[derive(Default)]
struct ObjectState {
    header: Vec<u8>,
    omap: BTreeMap<String, Vec<u8>>,
}

/// In-memory object store, for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<ObjectId, ObjectState>>,
}

impl MemoryObjectStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn mutate(&self, oid: &ObjectId, op: OmapMutation) -> Result<(), StoreError> {
        let mut objects = self.objects.lock().unwrap();
        let obj = objects.entry(oid.clone()).or_default();
        if op.clear {
            obj.omap.clear();
        }
        if let Some(header) = op.set_header {
            obj.header = header;
        }
        for (key, value) in op.set {
            obj.omap.insert(key, value);
        }
        for key in &op.remove {
            obj.omap.remove(key);
        }
        Ok(())
    }

    async fn omap_get_header(&self, oid: &ObjectId) -> Result<Vec<u8>, StoreError> {
        let objects = self.objects.lock().unwrap();
        objects
            .get(oid)
            .map(|obj| obj.header.clone())
            .ok_or_else(|| StoreError::ObjectNotFound(oid.clone()))
    }

    async fn omap_get_vals(
        &self,
        oid: &ObjectId,
        start_after: &str,
        max: usize,
    ) -> Result<OmapPage, StoreError> {
        let objects = self.objects.lock().unwrap();
        let obj = objects
            .get(oid)
            .ok_or_else(|| StoreError::ObjectNotFound(oid.clone()))?;

        let mut range = obj
            .omap
            .range::<str, _>((Bound::Excluded(start_after), Bound::Unbounded));
        let mut values = BTreeMap::new();
        for (key, value) in range.by_ref().take(max) {
            values.insert(key.clone(), value.clone());
        }
        let more = range.next().is_some();
        Ok(OmapPage { values, more })
    }
}
