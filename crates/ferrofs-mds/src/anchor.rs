//! Anchor records: the per-inode breadcrumbs the open file table keeps in
//! memory and persists to the backing object.

use serde::{Deserialize, Serialize};

use crate::types::{DentryType, InodeNo, MdsRank};

/// One tracked inode plus its relationship to its parent directory.
///
/// `nref` and `auth` are in-memory bookkeeping and never reach the object;
/// equality compares the persisted image only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Anchor {
    /// Inode number; matches the omap key this anchor is stored under.
    pub ino: InodeNo,
    /// Parent directory inode, or zero when the inode has no known parent
    /// (root, or unlinked but still held open).
    pub dirino: InodeNo,
    /// Entry name in the parent; empty iff `dirino` is zero.
    pub d_name: String,
    /// Directory / non-directory tag.
    pub d_type: DentryType,
    /// Pin count: one for direct tracking plus one per anchored child.
    #[serde(skip)]
    pub nref: u32,
    /// Authoritative rank learned during prefetch.
    #[serde(skip)]
    pub auth: Option<MdsRank>,
}

impl Anchor {
    /// Creates a new anchor.
    pub fn new(ino: InodeNo, dirino: InodeNo, d_name: String, d_type: DentryType, nref: u32) -> Self {
        Self {
            ino,
            dirino,
            d_name,
            d_type,
            nref,
            auth: None,
        }
    }
}

impl PartialEq for Anchor {
    fn eq(&self, other: &Self) -> bool {
        self.ino == other.ino
            && self.dirino == other.dirino
            && self.d_name == other.d_name
            && self.d_type == other.d_type
    }
}

impl Eq for Anchor {}

/// Flag set attached to a dirty-map entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct DirtyFlags(u32);

impl DirtyFlags {
    /// No flags: the anchor merely differs from its persisted image.
    pub const NONE: DirtyFlags = DirtyFlags(0);
    /// Created since the last commit; nothing persisted yet.
    pub const NEW: DirtyFlags = DirtyFlags(0x1);

    /// Checks whether this flag set contains another.
    pub fn contains(&self, other: DirtyFlags) -> bool {
        (self.0 & other.0) != 0
    }
}

/// Encodes an inode number as its omap key: lowercase hex, no prefix, no
/// leading zeros.
pub fn encode_key(ino: InodeNo) -> String {
    format!("{:x}", ino.as_u64())
}

/// Parses an omap key back into an inode number, rejecting anything that
/// is not in canonical form.
pub fn parse_key(key: &str) -> Option<InodeNo> {
    if key.is_empty() || key.len() > 16 {
        return None;
    }
    if key.len() > 1 && key.starts_with('0') {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
        return None;
    }
    u64::from_str_radix(key, 16).ok().map(InodeNo::new)
}

/// Encodes the commit-marker header value.
pub fn encode_header(seq: u64) -> Vec<u8> {
    bincode::serialize(&seq).expect("u64 encoding is infallible")
}

/// Decodes the commit-marker header value.
pub fn decode_header(buf: &[u8]) -> Result<u64, bincode::Error> {
    bincode::deserialize(buf)
}

/// Encodes an anchor value for the omap.
pub fn encode_anchor(anchor: &Anchor) -> Vec<u8> {
    bincode::serialize(anchor).expect("anchor encoding is infallible")
}

/// Decodes an anchor value read back from the omap.
pub fn decode_anchor(buf: &[u8]) -> Result<Anchor, bincode::Error> {
    bincode::deserialize(buf)
}
