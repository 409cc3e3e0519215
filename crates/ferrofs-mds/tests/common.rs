//! Shared fixtures for open file table tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use ferrofs_mds::cache::InodeCache;
use ferrofs_mds::inode::MdsInode;
use ferrofs_mds::objecter::{
    MemoryObjectStore, ObjectId, ObjectStore, OmapMutation, OmapPage, StoreError,
};
use ferrofs_mds::openfiles::{OpenFileTable, OpenFileTableConfig, WriteErrorHandler};
use ferrofs_mds::types::{DentryType, InodeNo, MdsRank, PoolId, PoolMap};

/// The rank every test table runs as.
pub const LOCAL_RANK: MdsRank = MdsRank::new(0);

/// Issues a commit and waits for its completion.
pub async fn commit_sync(oft: &OpenFileTable, seq: u64) {
    let (tx, rx) = tokio::sync::oneshot::channel();
    oft.commit(Some(tx), seq, 0);
    rx.await.expect("commit completion dropped");
}

/// Starts the boot-time load and waits for it to finish.
pub async fn load_sync(oft: &OpenFileTable) {
    let (tx, rx) = tokio::sync::oneshot::channel();
    oft.load(Some(tx));
    rx.await.expect("load completion dropped");
}

/// Waits for prefetch to reach its done state.
pub async fn prefetch_wait(oft: &OpenFileTable) {
    let (tx, rx) = tokio::sync::oneshot::channel();
    oft.wait_for_prefetch(tx);
    rx.await.expect("prefetch completion dropped");
}

/// All keys currently persisted on the test object.
pub async fn store_keys(store: &dyn ObjectStore) -> Vec<String> {
    match store.omap_get_vals(&oid(), "", usize::MAX).await {
        Ok(page) => page.values.keys().cloned().collect(),
        Err(_) => Vec::new(),
    }
}

/// The commit marker currently persisted on the test object.
pub async fn store_header(store: &dyn ObjectStore) -> u64 {
    let buf = store.omap_get_header(&oid()).await.expect("object missing");
    ferrofs_mds::anchor::decode_header(&buf).expect("bad header")
}

pub fn pools() -> PoolMap {
    PoolMap {
        metadata: PoolId::new(1),
        first_data: PoolId::new(2),
    }
}

pub fn oid() -> ObjectId {
    ObjectId::new("mds0_openfiles")
}

pub fn dir(ino: u64) -> Arc<MdsInode> {
    MdsInode::new(InodeNo::new(ino), DentryType::Dir)
}

pub fn file(ino: u64) -> Arc<MdsInode> {
    MdsInode::new(InodeNo::new(ino), DentryType::File)
}

pub fn link(child: &Arc<MdsInode>, parent: &Arc<MdsInode>, name: &str) {
    child.set_parent(parent, name);
}

pub fn table(store: Arc<dyn ObjectStore>, cache: Arc<dyn InodeCache>) -> OpenFileTable {
    table_with(store, cache, Arc::new(RecordingErrors::new()), OpenFileTableConfig::default())
}

pub fn table_with(
    store: Arc<dyn ObjectStore>,
    cache: Arc<dyn InodeCache>,
    errors: Arc<RecordingErrors>,
    config: OpenFileTableConfig,
) -> OpenFileTable {
    OpenFileTable::new(store, cache, LOCAL_RANK, pools(), errors, config)
}

/// Inode cache double: a configurable set of already-cached inodes, a map
/// of open results, and logs of every open and recovery hand-off.
#[derive(Default)]
pub struct TestCache {
    pub cached: Mutex<HashSet<InodeNo>>,
    pub auth: Mutex<HashMap<InodeNo, MdsRank>>,
    pub opened: Mutex<Vec<InodeNo>>,
    pub forwarded: Mutex<Vec<(InodeNo, Option<MdsRank>)>>,
}

impl TestCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cached(&self, ino: u64) {
        self.cached.lock().unwrap().insert(InodeNo::new(ino));
    }

    pub fn set_auth(&self, ino: u64, rank: i32) {
        self.auth
            .lock()
            .unwrap()
            .insert(InodeNo::new(ino), MdsRank::new(rank));
    }

    pub fn opened(&self) -> Vec<InodeNo> {
        self.opened.lock().unwrap().clone()
    }

    pub fn forwarded(&self) -> Vec<(InodeNo, Option<MdsRank>)> {
        self.forwarded.lock().unwrap().clone()
    }
}

#[async_trait]
impl InodeCache for TestCache {
    fn contains(&self, ino: InodeNo) -> bool {
        self.cached.lock().unwrap().contains(&ino)
    }

    async fn open_ino(&self, ino: InodeNo, _pool: PoolId) -> Option<MdsRank> {
        self.opened.lock().unwrap().push(ino);
        tokio::task::yield_now().await;
        self.auth.lock().unwrap().get(&ino).copied()
    }

    fn prefetch_ino_complete(&self, ino: InodeNo, auth: Option<MdsRank>) {
        self.forwarded.lock().unwrap().push((ino, auth));
    }
}

/// Error sink capturing every reported write failure.
#[derive(Default)]
pub struct RecordingErrors {
    pub errors: Mutex<Vec<String>>,
}

impl RecordingErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }
}

impl WriteErrorHandler for RecordingErrors {
    fn handle_write_error(&self, err: StoreError) {
        self.errors.lock().unwrap().push(err.to_string());
    }
}

/// Store wrapper capturing every mutation so tests can inspect sub-op
/// structure (header placement, clear flag, batch splits).
pub struct RecordingStore {
    inner: Arc<MemoryObjectStore>,
    ops: Mutex<Vec<OmapMutation>>,
}

impl RecordingStore {
    pub fn new(inner: Arc<MemoryObjectStore>) -> Self {
        Self {
            inner,
            ops: Mutex::new(Vec::new()),
        }
    }

    pub fn ops(&self) -> Vec<OmapMutation> {
        self.ops.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn mutate(&self, oid: &ObjectId, op: OmapMutation) -> Result<(), StoreError> {
        self.ops.lock().unwrap().push(op.clone());
        self.inner.mutate(oid, op).await
    }

    async fn omap_get_header(&self, oid: &ObjectId) -> Result<Vec<u8>, StoreError> {
        self.inner.omap_get_header(oid).await
    }

    async fn omap_get_vals(
        &self,
        oid: &ObjectId,
        start_after: &str,
        max: usize,
    ) -> Result<OmapPage, StoreError> {
        self.inner.omap_get_vals(oid, start_after, max).await
    }
}

/// Store whose writes always fail, for exercising the error sink.
#[derive(Default)]
pub struct FailingStore {
    inner: MemoryObjectStore,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for FailingStore {
    async fn mutate(&self, _oid: &ObjectId, _op: OmapMutation) -> Result<(), StoreError> {
        Err(StoreError::Io("injected write failure".to_string()))
    }

    async fn omap_get_header(&self, oid: &ObjectId) -> Result<Vec<u8>, StoreError> {
        self.inner.omap_get_header(oid).await
    }

    async fn omap_get_vals(
        &self,
        oid: &ObjectId,
        start_after: &str,
        max: usize,
    ) -> Result<OmapPage, StoreError> {
        self.inner.omap_get_vals(oid, start_after, max).await
    }
}
