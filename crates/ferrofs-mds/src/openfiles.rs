//! The open file table: a durable per-rank index of open inodes.
//!
//! Every inode with client state is pinned by an anchor; anchors chain up
//! the directory tree so the whole ancestor path of an open inode can be
//! rebuilt after a failover. The table persists anchors into one omap
//! object per rank, using the object header as a commit marker: header
//! zero means a commit was interrupted and the object contents must be
//! discarded. On boot the table reloads the object and drives the inode
//! cache to reopen every recorded inode, directories first.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::anchor::{
    decode_anchor, decode_header, encode_anchor, encode_header, encode_key, parse_key, Anchor,
    DirtyFlags,
};
use crate::cache::InodeCache;
use crate::inode::MdsInode;
use crate::objecter::{ObjectId, ObjectStore, OmapMutation, StoreError};
use crate::types::{InodeNo, MdsRank, PoolMap};

/// Completion handle fired when an asynchronous table operation succeeds.
pub type Completion = oneshot::Sender<()>;

/// Fatal-error sink for failed object writes. The MDS is expected to fail
/// over in response; the table performs no retry and no rollback.
pub trait WriteErrorHandler: Send + Sync {
    /// Called once per failed commit.
    fn handle_write_error(&self, err: StoreError);
}

/// Tuning knobs for the open file table.
#[derive(Clone, Debug)]
pub struct OpenFileTableConfig {
    /// Per-sub-operation write size cap. A commit whose payload exceeds
    /// this is split into multiple concurrent object mutations.
    pub max_write_size: usize,
    /// Maximum omap values fetched per load page.
    pub load_page_size: usize,
}

impl Default for OpenFileTableConfig {
    fn default() -> Self {
        Self {
            max_write_size: 10 << 20,
            load_page_size: 1024,
        }
    }
}

/// One hop of a reconstructed ancestor path: the parent directory and the
/// entry name under it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InodeBackpointer {
    /// Parent directory inode.
    pub dirino: InodeNo,
    /// Entry name in the parent.
    pub d_name: String,
    /// Dentry version; unknown when reconstructed from anchors.
    pub version: u64,
}

/// Result of an ancestor walk over the loaded anchors.
#[derive(Clone, Debug)]
pub struct AncestorPath {
    /// Backpointers from the inode up to the highest known ancestor.
    pub ancestors: Vec<InodeBackpointer>,
    /// Authority of the first ancestor, when the prefetch driver has
    /// resolved it.
    pub auth_hint: Option<MdsRank>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum PrefetchState {
    Idle,
    DirInodes,
    FileInodes,
    Done,
}

struct TableState {
    anchor_map: HashMap<InodeNo, Anchor>,
    dirty_items: HashMap<InodeNo, DirtyFlags>,
    loaded_anchor_map: BTreeMap<InodeNo, Anchor>,
    committing_log_seq: u64,
    committed_log_seq: u64,
    num_pending_commit: u64,
    clear_on_commit: bool,
    load_started: bool,
    load_done: bool,
    waiting_for_load: Vec<Completion>,
    prefetch_state: PrefetchState,
    num_opening_inodes: u64,
    waiting_for_prefetch: Vec<Completion>,
}

impl TableState {
    fn new() -> Self {
        Self {
            anchor_map: HashMap::new(),
            dirty_items: HashMap::new(),
            loaded_anchor_map: BTreeMap::new(),
            committing_log_seq: 0,
            committed_log_seq: 0,
            num_pending_commit: 0,
            clear_on_commit: false,
            load_started: false,
            load_done: false,
            waiting_for_load: Vec::new(),
            prefetch_state: PrefetchState::Idle,
            num_opening_inodes: 0,
            waiting_for_prefetch: Vec::new(),
        }
    }

    /// Acquire a pin on `inode`, creating anchors up the parent chain. The
    /// climb stops at the first pre-existing anchor: its refcount already
    /// carries the contribution of everything below it.
    fn get_ref(&mut self, inode: &Arc<MdsInode>) {
        let mut cur = inode.clone();
        loop {
            if let Some(anchor) = self.anchor_map.get_mut(&cur.ino()) {
                assert!(cur.is_tracked(), "anchored inode {} not flagged tracked", cur.ino());
                assert!(anchor.nref > 0);
                anchor.nref += 1;
                break;
            }

            let parent = cur.primary_parent();
            let (dirino, d_name) = match &parent {
                Some(link) => (link.dir.ino(), link.name.clone()),
                None => (InodeNo::ZERO, String::new()),
            };
            self.anchor_map.insert(
                cur.ino(),
                Anchor::new(cur.ino(), dirino, d_name, cur.d_type(), 1),
            );
            cur.set_tracked(true);
            // keeps existing flags if the anchor died and came back this cycle
            self.dirty_items.entry(cur.ino()).or_insert(DirtyFlags::NEW);

            match parent {
                Some(link) => cur = link.dir,
                None => break,
            }
        }
    }

    /// Release a pin on `inode`, erasing anchors that drop to zero and
    /// propagating the release up the parent chain.
    fn put_ref(&mut self, inode: &Arc<MdsInode>) {
        let mut cur = inode.clone();
        loop {
            assert!(cur.is_tracked(), "put_ref on untracked inode {}", cur.ino());
            let Some(anchor) = self.anchor_map.get_mut(&cur.ino()) else {
                panic!("no anchor for tracked inode {}", cur.ino());
            };
            assert!(anchor.nref > 0);

            if anchor.nref > 1 {
                anchor.nref -= 1;
                break;
            }

            let parent = cur.primary_parent();
            match &parent {
                Some(link) => {
                    assert_eq!(anchor.dirino, link.dir.ino(), "anchor {} parent mismatch", cur.ino());
                    assert_eq!(anchor.d_name, link.name, "anchor {} name mismatch", cur.ino());
                }
                None => {
                    assert!(
                        anchor.dirino.is_zero() && anchor.d_name.is_empty(),
                        "anchor {} still points at parent {}",
                        cur.ino(),
                        anchor.dirino
                    );
                }
            }

            self.anchor_map.remove(&cur.ino());
            cur.set_tracked(false);

            match self.dirty_items.entry(cur.ino()) {
                // created and destroyed within one commit cycle: cancels out
                Entry::Occupied(entry) if entry.get().contains(DirtyFlags::NEW) => {
                    entry.remove();
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(entry) => {
                    entry.insert(DirtyFlags::NONE);
                }
            }

            match parent {
                Some(link) => cur = link.dir,
                None => break,
            }
        }
    }

    /// Snapshot the dirty set into size-bounded object mutations. Runs
    /// synchronously under the state lock, before any I/O is issued, so
    /// mutations racing with commit I/O land in the next commit.
    fn build_commit_ops(&mut self, log_seq: u64, op_prio: i32, max_write_size: usize) -> Vec<OmapMutation> {
        let mut batch = CommitBatcher::new(
            log_seq,
            op_prio,
            std::mem::replace(&mut self.clear_on_commit, false),
        );

        // the first commit after load diffs against the loaded snapshot to
        // avoid rewriting unchanged keys
        let first_commit = !self.loaded_anchor_map.is_empty();

        let dirty = std::mem::take(&mut self.dirty_items);
        for (ino, _flags) in dirty {
            let live = self.anchor_map.get(&ino);
            if first_commit {
                if let Some(loaded) = self.loaded_anchor_map.remove(&ino) {
                    if live == Some(&loaded) {
                        continue;
                    }
                }
            }
            match live {
                Some(anchor) => batch.update(encode_key(ino), encode_anchor(anchor)),
                None => batch.remove(encode_key(ino)),
            }
            if batch.over(max_write_size) {
                batch.flush(false);
            }
        }

        if first_commit {
            // keys reconciled above were removed from the loaded map; what
            // remains no longer exists in live state
            let stale = std::mem::take(&mut self.loaded_anchor_map);
            for (ino, _) in stale {
                batch.remove(encode_key(ino));
                if batch.over(max_write_size) {
                    batch.flush(false);
                }
            }
        }

        batch.finish()
    }
}

/// Accumulates omap updates and flushes them into sub-operations whenever
/// the running write size crosses the cap. The commit-marker protocol
/// lives here: header zero in the first sub-op when more follow, the real
/// sequence only in the last.
struct CommitBatcher {
    ops: Vec<OmapMutation>,
    to_update: BTreeMap<String, Vec<u8>>,
    to_remove: BTreeSet<String>,
    write_size: usize,
    first: bool,
    clear: bool,
    log_seq: u64,
    op_prio: i32,
}

impl CommitBatcher {
    fn new(log_seq: u64, op_prio: i32, clear: bool) -> Self {
        Self {
            ops: Vec::new(),
            to_update: BTreeMap::new(),
            to_remove: BTreeSet::new(),
            write_size: 0,
            first: true,
            clear,
            log_seq,
            op_prio,
        }
    }

    fn update(&mut self, key: String, value: Vec<u8>) {
        self.write_size += key.len() + 4 + value.len() + 4;
        self.to_update.insert(key, value);
    }

    fn remove(&mut self, key: String) {
        self.write_size += key.len() + 4;
        self.to_remove.insert(key);
    }

    fn over(&self, max_write_size: usize) -> bool {
        self.write_size >= max_write_size
    }

    fn flush(&mut self, last: bool) {
        let mut op = OmapMutation {
            priority: self.op_prio,
            ..Default::default()
        };
        if self.clear {
            op.clear = true;
            self.clear = false;
        }
        if last {
            op.set_header = Some(encode_header(self.log_seq));
        } else if self.first {
            // mark the object incomplete until the final sub-op lands
            op.set_header = Some(encode_header(0));
        }
        op.set = std::mem::take(&mut self.to_update);
        op.remove = std::mem::take(&mut self.to_remove);
        self.first = false;
        self.write_size = 0;
        self.ops.push(op);
    }

    fn finish(mut self) -> Vec<OmapMutation> {
        self.flush(true);
        self.ops
    }
}

struct Shared {
    state: Mutex<TableState>,
    store: Arc<dyn ObjectStore>,
    cache: Arc<dyn InodeCache>,
    rank: MdsRank,
    pools: PoolMap,
    errors: Arc<dyn WriteErrorHandler>,
    config: OpenFileTableConfig,
}

impl Shared {
    fn object_id(&self) -> ObjectId {
        ObjectId::new(format!("mds{}_openfiles", self.rank.as_i32()))
    }

    fn commit_finish(shared: &Arc<Shared>, result: Result<(), StoreError>, log_seq: u64, fin: Option<Completion>) {
        if let Err(err) = result {
            error!("open file table write for log seq {} failed: {}", log_seq, err);
            shared.errors.handle_write_error(err);
            return;
        }
        debug!("commit finish, log seq {}", log_seq);
        {
            let mut state = shared.state.lock().unwrap();
            assert!(log_seq <= state.committing_log_seq);
            assert!(state.num_pending_commit > 0);
            // a later-starting commit may finish first; never move backward
            if log_seq > state.committed_log_seq {
                state.committed_log_seq = log_seq;
            }
            state.num_pending_commit -= 1;
        }
        if let Some(fin) = fin {
            let _ = fin.send(());
        }
    }

    async fn load_task(shared: Arc<Shared>) {
        let oid = shared.object_id();
        let page_size = shared.config.load_page_size;
        let mut first = true;
        let mut start_after = String::new();

        loop {
            let header = if first {
                match shared.store.omap_get_header(&oid).await {
                    Ok(buf) => Some(buf),
                    Err(err) => {
                        warn!("open file table header read failed, will rewrite: {}", err);
                        Self::load_degraded(&shared, false);
                        return;
                    }
                }
            } else {
                None
            };
            let page = match shared.store.omap_get_vals(&oid, &start_after, page_size).await {
                Ok(page) => page,
                Err(err) => {
                    warn!("open file table read failed, will rewrite: {}", err);
                    Self::load_degraded(&shared, !first);
                    return;
                }
            };

            let mut state = shared.state.lock().unwrap();
            if let Some(buf) = header {
                let seq = match decode_header(&buf) {
                    Ok(seq) => seq,
                    Err(err) => {
                        warn!("corrupted open file table header, will rewrite: {}", err);
                        drop(state);
                        Self::load_degraded(&shared, true);
                        return;
                    }
                };
                state.committed_log_seq = seq;
                state.committing_log_seq = seq;
                if seq == 0 {
                    // a crash mid-commit left the object explicitly incomplete
                    info!("open file table is incomplete, will rewrite");
                    state.clear_on_commit = true;
                    Self::load_complete(state);
                    return;
                }
            }

            for (key, value) in &page.values {
                let Some(ino) = parse_key(key) else {
                    warn!("bad open file table key '{}', will rewrite", key);
                    drop(state);
                    Self::load_degraded(&shared, true);
                    return;
                };
                match decode_anchor(value) {
                    Ok(mut anchor) => {
                        assert_eq!(anchor.ino, ino, "anchor {} stored under key '{}'", anchor.ino, key);
                        anchor.auth = None;
                        state.loaded_anchor_map.insert(ino, anchor);
                    }
                    Err(err) => {
                        warn!("corrupted anchor under key '{}', will rewrite: {}", key, err);
                        drop(state);
                        Self::load_degraded(&shared, true);
                        return;
                    }
                }
            }

            match page.values.keys().next_back() {
                Some(last) if page.more => {
                    start_after = last.clone();
                    first = false;
                }
                _ => {
                    debug!("load complete, {} anchors", state.loaded_anchor_map.len());
                    Self::load_complete(state);
                    return;
                }
            }
        }
    }

    /// Read or decode failure: degrade to an empty recoverable state. The
    /// next commit clears the object and rewrites it from live state.
    fn load_degraded(shared: &Arc<Shared>, clear_map: bool) {
        let mut state = shared.state.lock().unwrap();
        state.clear_on_commit = true;
        if clear_map {
            state.loaded_anchor_map.clear();
        }
        Self::load_complete(state);
    }

    fn load_complete(mut state: MutexGuard<'_, TableState>) {
        state.load_done = true;
        let waiters = std::mem::take(&mut state.waiting_for_load);
        drop(state);
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    /// Run one prefetch phase over the loaded anchors, issuing opens for
    /// every inode the cache does not already hold. The counter starts at
    /// one and a matching synthetic completion closes the enumeration, so
    /// opens completing synchronously cannot advance the phase early.
    fn prefetch_phase(shared: &Arc<Shared>) {
        let (to_open, pool) = {
            let mut state = shared.state.lock().unwrap();
            debug!("prefetch phase {:?}", state.prefetch_state);
            assert_eq!(state.num_opening_inodes, 0);
            state.num_opening_inodes = 1;

            let dir_phase = match state.prefetch_state {
                PrefetchState::DirInodes => true,
                PrefetchState::FileInodes => false,
                other => unreachable!("prefetch phase {:?} cannot issue opens", other),
            };
            let pool = if dir_phase {
                shared.pools.metadata
            } else {
                shared.pools.first_data
            };

            let mut to_open = Vec::new();
            for (&ino, anchor) in state.loaded_anchor_map.iter_mut() {
                if anchor.d_type.is_dir() {
                    if !dir_phase {
                        continue;
                    }
                    // reserved system ranges encode their owner; no open needed
                    if let Some(owner) = ino.mdsdir_owner() {
                        anchor.auth = Some(owner);
                        continue;
                    }
                    if let Some(owner) = ino.stray_owner() {
                        anchor.auth = Some(owner);
                        continue;
                    }
                } else if dir_phase {
                    continue;
                }
                if shared.cache.contains(ino) {
                    continue;
                }
                to_open.push(ino);
            }
            state.num_opening_inodes += to_open.len() as u64;
            (to_open, pool)
        };

        for ino in to_open {
            let shared = shared.clone();
            tokio::spawn(async move {
                let auth = shared.cache.open_ino(ino, pool).await;
                Shared::open_ino_finish(&shared, ino, auth);
            });
        }

        // the synthetic completion matching the initial count of one
        Self::open_ino_finish(shared, InodeNo::ZERO, None);
    }

    fn open_ino_finish(shared: &Arc<Shared>, ino: InodeNo, auth: Option<MdsRank>) {
        enum Next {
            Nothing,
            Phase,
            Waiters(Vec<Completion>),
        }

        let mut forward = false;
        let next = {
            let mut state = shared.state.lock().unwrap();
            if !ino.is_zero() {
                if state.prefetch_state == PrefetchState::DirInodes {
                    if let Some(rank) = auth {
                        let Some(anchor) = state.loaded_anchor_map.get_mut(&ino) else {
                            panic!("prefetched inode {} missing from loaded anchors", ino);
                        };
                        anchor.auth = Some(rank);
                    }
                }
                forward = auth != Some(shared.rank);
            }

            assert!(state.num_opening_inodes > 0);
            state.num_opening_inodes -= 1;
            if state.num_opening_inodes == 0 {
                match state.prefetch_state {
                    PrefetchState::DirInodes => {
                        state.prefetch_state = PrefetchState::FileInodes;
                        Next::Phase
                    }
                    PrefetchState::FileInodes => {
                        state.prefetch_state = PrefetchState::Done;
                        Next::Waiters(std::mem::take(&mut state.waiting_for_prefetch))
                    }
                    other => unreachable!("open completion in phase {:?}", other),
                }
            } else {
                Next::Nothing
            }
        };

        if forward {
            shared.cache.prefetch_ino_complete(ino, auth);
        }

        match next {
            Next::Nothing => {}
            Next::Phase => Self::prefetch_phase(shared),
            Next::Waiters(waiters) => {
                debug!("prefetch complete");
                for waiter in waiters {
                    let _ = waiter.send(());
                }
            }
        }
    }
}

/// The open file table for one MDS rank.
///
/// All in-memory state lives behind one mutex; I/O completions re-acquire
/// it, so every state transition is serialized with the mutators. The
/// asynchronous operations (`commit`, `load`, `prefetch_inodes`) must be
/// called from within a tokio runtime.
pub struct OpenFileTable {
    shared: Arc<Shared>,
}

impl OpenFileTable {
    /// Creates the table for one rank. All external collaborators are
    /// injected here; the table keeps no process-wide state.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        cache: Arc<dyn InodeCache>,
        rank: MdsRank,
        pools: PoolMap,
        errors: Arc<dyn WriteErrorHandler>,
        config: OpenFileTableConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(TableState::new()),
                store,
                cache,
                rank,
                pools,
                errors,
                config,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.shared.state.lock().unwrap()
    }

    /// Begin tracking an inode: the inode cache has client state for it.
    pub fn add_inode(&self, inode: &Arc<MdsInode>) {
        debug!("add_inode {}", inode.ino());
        let mut state = self.lock();
        if !inode.is_dir() {
            assert!(
                !state.anchor_map.contains_key(&inode.ino()),
                "non-directory inode {} already anchored",
                inode.ino()
            );
        }
        state.get_ref(inode);
    }

    /// Stop tracking an inode.
    pub fn remove_inode(&self, inode: &Arc<MdsInode>) {
        debug!("remove_inode {}", inode.ino());
        let mut state = self.lock();
        if !inode.is_dir() {
            match state.anchor_map.get(&inode.ino()) {
                Some(anchor) => assert_eq!(
                    anchor.nref, 1,
                    "non-directory inode {} still pinned",
                    inode.ino()
                ),
                None => panic!("remove_inode on unanchored inode {}", inode.ino()),
            }
        }
        state.put_ref(inode);
    }

    /// A tracked, previously parentless inode gained a primary dentry.
    /// Re-anchors it under the new parent; the inode's own refcount is
    /// untouched, the pin merely moves onto the parent chain.
    pub fn notify_link(&self, inode: &Arc<MdsInode>) {
        debug!("notify_link {}", inode.ino());
        let link = inode
            .primary_parent()
            .unwrap_or_else(|| panic!("notify_link on inode {} with no parent", inode.ino()));
        let mut state = self.lock();
        {
            let Some(anchor) = state.anchor_map.get_mut(&inode.ino()) else {
                panic!("notify_link on unanchored inode {}", inode.ino());
            };
            assert!(anchor.nref > 0);
            assert!(
                anchor.dirino.is_zero() && anchor.d_name.is_empty(),
                "notify_link on inode {} that already has a parent",
                inode.ino()
            );
            anchor.dirino = link.dir.ino();
            anchor.d_name = link.name.clone();
        }
        state.dirty_items.entry(inode.ino()).or_insert(DirtyFlags::NONE);
        state.get_ref(&link.dir);
    }

    /// A tracked inode's primary dentry is about to go away. Must be
    /// called while the parent link is still current.
    pub fn notify_unlink(&self, inode: &Arc<MdsInode>) {
        debug!("notify_unlink {}", inode.ino());
        let link = inode
            .primary_parent()
            .unwrap_or_else(|| panic!("notify_unlink on inode {} with no parent", inode.ino()));
        let mut state = self.lock();
        {
            let Some(anchor) = state.anchor_map.get_mut(&inode.ino()) else {
                panic!("notify_unlink on unanchored inode {}", inode.ino());
            };
            assert!(anchor.nref > 0);
            assert_eq!(anchor.dirino, link.dir.ino(), "anchor {} parent mismatch", inode.ino());
            assert_eq!(anchor.d_name, link.name, "anchor {} name mismatch", inode.ino());
            anchor.dirino = InodeNo::ZERO;
            anchor.d_name.clear();
        }
        state.dirty_items.entry(inode.ino()).or_insert(DirtyFlags::NONE);
        state.put_ref(&link.dir);
    }

    /// Snapshot the current table state onto the backing object. Returns
    /// immediately; `fin` fires once every sub-operation has been
    /// acknowledged. `log_seq` must not move backward across calls.
    pub fn commit(&self, fin: Option<Completion>, log_seq: u64, op_prio: i32) {
        debug!("commit log seq {}", log_seq);
        let mutations = {
            let mut state = self.lock();
            assert!(
                log_seq >= state.committing_log_seq,
                "commit log seq moved backward: {} < {}",
                log_seq,
                state.committing_log_seq
            );
            state.committing_log_seq = log_seq;
            let ops = state.build_commit_ops(log_seq, op_prio, self.shared.config.max_write_size);
            state.num_pending_commit += 1;
            ops
        };

        let shared = self.shared.clone();
        let oid = self.shared.object_id();
        tokio::spawn(async move {
            let mut subs = JoinSet::new();
            for op in mutations {
                let store = shared.store.clone();
                let oid = oid.clone();
                subs.spawn(async move { store.mutate(&oid, op).await });
            }
            let mut result = Ok(());
            while let Some(joined) = subs.join_next().await {
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => result = Err(err),
                    Err(err) => result = Err(StoreError::Io(err.to_string())),
                }
            }
            Shared::commit_finish(&shared, result, log_seq, fin);
        });
    }

    /// Boot-time read of the backing object. Single-shot; calling it a
    /// second time is a caller error. Returns immediately; waiters and
    /// `fin` fire when the last page has been processed. Read or decode
    /// failures degrade to an empty loaded state with `clear_on_commit`
    /// armed, so the next commit rewrites the object from scratch.
    pub fn load(&self, fin: Option<Completion>) {
        debug!("load");
        {
            let mut state = self.lock();
            assert!(!state.load_started, "open file table loaded twice");
            state.load_started = true;
            if let Some(fin) = fin {
                state.waiting_for_load.push(fin);
            }
        }
        let shared = self.shared.clone();
        tokio::spawn(async move { Shared::load_task(shared).await });
    }

    /// Drive the inode cache to reopen every loaded anchor, directories
    /// first so file opens find their ancestors in cache. Returns true iff
    /// prefetch completed synchronously; otherwise completion is observable
    /// through [`OpenFileTable::wait_for_prefetch`]. If load has not
    /// finished yet, prefetch parks itself as a load waiter.
    pub fn prefetch_inodes(&self) -> bool {
        debug!("prefetch_inodes");
        let mut state = self.lock();
        assert!(
            state.prefetch_state == PrefetchState::Idle,
            "prefetch started twice"
        );
        state.prefetch_state = PrefetchState::DirInodes;

        if !state.load_done {
            let (tx, rx) = oneshot::channel();
            state.waiting_for_load.push(tx);
            let shared = self.shared.clone();
            tokio::spawn(async move {
                if rx.await.is_ok() {
                    Shared::prefetch_phase(&shared);
                }
            });
            return false;
        }
        drop(state);

        Shared::prefetch_phase(&self.shared);
        self.is_prefetched()
    }

    /// Registers a waiter fired when load completes (immediately if it
    /// already has).
    pub fn wait_for_load(&self, fin: Completion) {
        let mut state = self.lock();
        if state.load_done {
            drop(state);
            let _ = fin.send(());
        } else {
            state.waiting_for_load.push(fin);
        }
    }

    /// Registers a waiter fired when prefetch completes (immediately if it
    /// already has).
    pub fn wait_for_prefetch(&self, fin: Completion) {
        let mut state = self.lock();
        if state.prefetch_state == PrefetchState::Done {
            drop(state);
            let _ = fin.send(());
        } else {
            state.waiting_for_prefetch.push(fin);
        }
    }

    /// Walks the loaded anchors from `ino` toward the root, returning one
    /// backpointer per hop. `None` when the inode is not in the loaded map
    /// or has no recorded parent. The auth hint is the first ancestor's
    /// resolved authority, when known.
    pub fn get_ancestors(&self, ino: InodeNo) -> Option<AncestorPath> {
        let state = self.lock();
        let mut anchor = state.loaded_anchor_map.get(&ino)?;
        if anchor.dirino.is_zero() {
            return None;
        }

        let mut ancestors = Vec::new();
        let mut auth_hint = None;
        let mut first = true;
        loop {
            ancestors.push(InodeBackpointer {
                dirino: anchor.dirino,
                d_name: anchor.d_name.clone(),
                version: 0,
            });
            let Some(parent) = state.loaded_anchor_map.get(&anchor.dirino) else {
                break;
            };
            if first {
                auth_hint = parent.auth;
                first = false;
            }
            if parent.dirino.is_zero() {
                break;
            }
            anchor = parent;
        }
        Some(AncestorPath { ancestors, auth_hint })
    }

    /// Whether journaling still needs to emit an open event for this
    /// inode. False when the inode was journaled at or after the sequence
    /// the in-flight commit covers, or when its anchor is already
    /// persisted and clean.
    pub fn should_log_open(&self, inode: &MdsInode) -> bool {
        let state = self.lock();
        if inode.is_tracked() {
            if inode.last_journaled() >= state.committing_log_seq {
                return false;
            }
            if !state.dirty_items.contains_key(&inode.ino()) {
                return false;
            }
        }
        true
    }

    /// Whether any commit is still in flight.
    pub fn is_any_committing(&self) -> bool {
        self.lock().num_pending_commit > 0
    }

    /// Whether the boot-time load has completed.
    pub fn is_load_done(&self) -> bool {
        self.lock().load_done
    }

    /// Whether prefetch has reached its done state.
    pub fn is_prefetched(&self) -> bool {
        self.lock().prefetch_state == PrefetchState::Done
    }

    /// Highest log sequence a finished commit has recorded.
    pub fn committed_log_seq(&self) -> u64 {
        self.lock().committed_log_seq
    }

    /// Highest log sequence any commit has started with.
    pub fn committing_log_seq(&self) -> u64 {
        self.lock().committing_log_seq
    }
}
