//! The conflict-resolver capability and the blob collector

use anyhow::Result;
use wiregit_core::{ObjectStore, Sha1Hash, TreeEntry};

/// Decides what a conflicting tree slot becomes.
///
/// Called with the entries from the two sides and the base (any of which
/// may be absent); returns the replacement entries to splice into the
/// merged tree. Resolvers may read and create objects in the store.
pub trait ConflictResolver {
    fn resolve(
        &mut self,
        store: &mut ObjectStore,
        parent_path: &str,
        entry_a: Option<&TreeEntry>,
        entry_b: Option<&TreeEntry>,
        entry_base: Option<&TreeEntry>,
    ) -> Result<Vec<TreeEntry>>;
}

/// First-pass resolver that records which blobs a textual resolution would
/// need, without producing any output.
///
/// The two-pass pattern exists because the first merge runs on trees whose
/// file blobs were filtered out of the fetch; this collector tells the
/// orchestrator what to fetch before the real merge.
#[derive(Debug, Default)]
pub struct BlobCollector {
    pub blob_hashes: Vec<Sha1Hash>,
}

impl BlobCollector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConflictResolver for BlobCollector {
    fn resolve(
        &mut self,
        _store: &mut ObjectStore,
        _parent_path: &str,
        entry_a: Option<&TreeEntry>,
        entry_b: Option<&TreeEntry>,
        entry_base: Option<&TreeEntry>,
    ) -> Result<Vec<TreeEntry>> {
        if let (Some(a), Some(b), Some(base)) = (entry_a, entry_b, entry_base) {
            if a.mode.is_file() && b.mode.is_file() && base.mode.is_file() {
                self.blob_hashes.extend([a.hash, b.hash, base.hash]);
            }
        }
        Ok(Vec::new())
    }
}
