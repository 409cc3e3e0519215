//! Collaborator trait for the MDS inode cache.
//!
//! The open file table drives the cache during recovery prefetch; the cache
//! implements this trait and otherwise owns the inode objects.

use async_trait::async_trait;

use crate::types::{InodeNo, MdsRank, PoolId};

/// The slice of the inode cache the open file table consumes.
#[async_trait]
pub trait InodeCache: Send + Sync {
    /// Whether the cache already holds the inode. Must be a quick query;
    /// implementations must not call back into the open file table.
    fn contains(&self, ino: InodeNo) -> bool;

    /// Asynchronously open the inode, resolving it through the given pool.
    /// Returns the rank found authoritative for it, or `None` when the
    /// inode could not be located.
    async fn open_ino(&self, ino: InodeNo, pool: PoolId) -> Option<MdsRank>;

    /// Recovery-pipeline hand-off: a prefetched inode resolved to another
    /// rank (or failed to resolve). Called once per such open.
    fn prefetch_ino_complete(&self, ino: InodeNo, auth: Option<MdsRank>);
}
