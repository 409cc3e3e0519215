//! The slice of the in-memory inode object the open file table consumes.
//!
//! The inode cache owns these objects and keeps the parent link current as
//! dentries come and go; the table only reads the link and flips the
//! tracked bit.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::types::{DentryType, InodeNo};

const STATE_TRACKED: u32 = 1 << 0;

/// The primary parent link: the directory inode and entry name under which
/// an inode is currently linked.
#[derive(Clone)]
pub struct ParentLink {
    /// The parent directory inode.
    pub dir: Arc<MdsInode>,
    /// The entry name in the parent.
    pub name: String,
}

/// An in-memory inode object, shared between the inode cache and the open
/// file table.
pub struct MdsInode {
    ino: InodeNo,
    d_type: DentryType,
    state: AtomicU32,
    last_journaled: AtomicU64,
    parent: RwLock<Option<ParentLink>>,
}

impl MdsInode {
    /// Creates a new inode handle with no parent link.
    pub fn new(ino: InodeNo, d_type: DentryType) -> Arc<Self> {
        Arc::new(Self {
            ino,
            d_type,
            state: AtomicU32::new(0),
            last_journaled: AtomicU64::new(0),
            parent: RwLock::new(None),
        })
    }

    /// The inode number.
    pub fn ino(&self) -> InodeNo {
        self.ino
    }

    /// The file-type tag.
    pub fn d_type(&self) -> DentryType {
        self.d_type
    }

    /// Returns true if this inode is a directory.
    pub fn is_dir(&self) -> bool {
        self.d_type.is_dir()
    }

    /// Snapshot of the current primary parent link.
    pub fn primary_parent(&self) -> Option<ParentLink> {
        self.parent.read().unwrap().clone()
    }

    /// Sets the primary parent link. Called by the inode cache when the
    /// primary dentry is created.
    pub fn set_parent(&self, dir: &Arc<MdsInode>, name: &str) {
        *self.parent.write().unwrap() = Some(ParentLink {
            dir: dir.clone(),
            name: name.to_string(),
        });
    }

    /// Clears the primary parent link. Called by the inode cache when the
    /// primary dentry is removed.
    pub fn clear_parent(&self) {
        *self.parent.write().unwrap() = None;
    }

    /// Whether the open file table holds an anchor for this inode.
    pub fn is_tracked(&self) -> bool {
        self.state.load(Ordering::Acquire) & STATE_TRACKED != 0
    }

    pub(crate) fn set_tracked(&self, on: bool) {
        if on {
            self.state.fetch_or(STATE_TRACKED, Ordering::AcqRel);
        } else {
            self.state.fetch_and(!STATE_TRACKED, Ordering::AcqRel);
        }
    }

    /// The log sequence this inode was last journaled at.
    pub fn last_journaled(&self) -> u64 {
        self.last_journaled.load(Ordering::Acquire)
    }

    /// Records the log sequence of a journaled open event. Called by the
    /// journaling path.
    pub fn set_last_journaled(&self, seq: u64) {
        self.last_journaled.store(seq, Ordering::Release);
    }
}
