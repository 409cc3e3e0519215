//! Core identifier types for the metadata server.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of MDS ranks a cluster can hold. Reserved inode ranges
/// are sized from this.
pub const MAX_RANKS: u64 = 256;

/// Number of stray directories each rank owns.
pub const STRAYS_PER_RANK: u64 = 10;

const MDSDIR_OFFSET: u64 = MAX_RANKS;
const STRAY_OFFSET: u64 = 6 * MAX_RANKS;

/// An inode number.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InodeNo(u64);

impl InodeNo {
    /// Sentinel meaning "no inode": an anchor whose parent is unknown, or
    /// the synthetic completion the prefetch driver hands itself.
    pub const ZERO: InodeNo = InodeNo(0);

    /// Creates an InodeNo from a raw u64 value.
    pub const fn new(ino: u64) -> Self {
        InodeNo(ino)
    }

    /// Returns the raw u64 value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns true for the zero sentinel.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// If this inode is a per-MDS directory, the rank that owns it.
    pub fn mdsdir_owner(&self) -> Option<MdsRank> {
        if (MDSDIR_OFFSET..MDSDIR_OFFSET + MAX_RANKS).contains(&self.0) {
            Some(MdsRank::new((self.0 - MDSDIR_OFFSET) as i32))
        } else {
            None
        }
    }

    /// If this inode is a stray directory, the rank that owns it.
    pub fn stray_owner(&self) -> Option<MdsRank> {
        if (STRAY_OFFSET..STRAY_OFFSET + MAX_RANKS * STRAYS_PER_RANK).contains(&self.0) {
            Some(MdsRank::new(((self.0 - STRAY_OFFSET) / STRAYS_PER_RANK) as i32))
        } else {
            None
        }
    }
}

impl fmt::Display for InodeNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Identity of a metadata server instance within the cluster.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MdsRank(i32);

impl MdsRank {
    /// Creates an MdsRank from a raw zero-based rank number.
    pub const fn new(rank: i32) -> Self {
        MdsRank(rank)
    }

    /// Returns the raw rank number.
    pub fn as_i32(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for MdsRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a storage pool in the backing object store.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolId(i64);

impl PoolId {
    /// Creates a PoolId from a raw pool number.
    pub const fn new(pool: i64) -> Self {
        PoolId(pool)
    }

    /// Returns the raw pool number.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

/// The pools the table opens inodes against: directories resolve through
/// the metadata pool, files through the first data pool.
#[derive(Copy, Clone, Debug)]
pub struct PoolMap {
    /// Pool holding directory objects.
    pub metadata: PoolId,
    /// Pool holding the first stripe of file data.
    pub first_data: PoolId,
}

/// The file-type tag an anchor persists. The table only needs to tell
/// directories from everything else.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DentryType {
    /// A directory.
    Dir,
    /// Any non-directory inode.
    File,
}

impl DentryType {
    /// Returns true for directories.
    pub fn is_dir(&self) -> bool {
        matches!(self, DentryType::Dir)
    }
}
