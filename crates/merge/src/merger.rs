//! Three-way tree merge

use crate::differ::join;
use crate::resolver::ConflictResolver;
use anyhow::Result;
use std::collections::{BTreeSet, HashMap};
use wiregit_core::{FileMode, Object, ObjectStore, Sha1Hash, Tree, TreeEntry};

/// Outcome of a three-way tree merge.
#[derive(Debug, Clone, Default)]
pub struct MergeResult {
    /// Hash of the merged tree
    pub tree_hash: Sha1Hash,

    /// Tree hashes newly created by the merge itself (resolver-created
    /// blobs are tracked by the resolver, not here)
    pub new_hashes: Vec<Sha1Hash>,

    /// Paths taken from side A because only A changed them
    pub picked_a: Vec<String>,
    /// Paths taken from side B because only B changed them
    pub picked_b: Vec<String>,
    /// Paths where both sides made the identical change
    pub picked_both: Vec<String>,
    /// Paths handed to the conflict resolver
    pub conflicts: Vec<String>,
}

/// Merge `tree_a` and `tree_b` against their common `base`.
///
/// When one side is unchanged relative to the base the other side's tree is
/// returned as-is without creating any objects. Conflicting slots where
/// both sides are directories recurse; everything else goes through the
/// resolver.
pub fn merge_trees<R: ConflictResolver + ?Sized>(
    store: &mut ObjectStore,
    tree_a: Sha1Hash,
    tree_b: Sha1Hash,
    base: Option<Sha1Hash>,
    resolver: &mut R,
) -> Result<MergeResult> {
    if let Some(base) = base {
        if tree_a != base && tree_b == base {
            return Ok(MergeResult { tree_hash: tree_a, ..Default::default() });
        }
        if tree_a == base && tree_b != base {
            return Ok(MergeResult { tree_hash: tree_b, ..Default::default() });
        }
        if tree_a == base && tree_b == base {
            return Ok(MergeResult { tree_hash: base, ..Default::default() });
        }
    }
    if tree_a == tree_b {
        // Either one; they are the same tree.
        return Ok(MergeResult { tree_hash: tree_a, ..Default::default() });
    }

    let mut merger = TreeMerger { store, resolver, result: MergeResult::default() };
    let a = merger.store.tree(&tree_a)?.clone();
    let b = merger.store.tree(&tree_b)?.clone();
    let base_tree = match base {
        Some(hash) => Some(merger.store.tree(&hash)?.clone()),
        None => None,
    };
    let tree_hash = merger.merge("", &a, &b, base_tree.as_ref())?;
    let mut result = merger.result;
    result.tree_hash = tree_hash;
    Ok(result)
}

struct TreeMerger<'a, R: ?Sized> {
    store: &'a mut ObjectStore,
    resolver: &'a mut R,
    result: MergeResult,
}

impl<'a, R: ConflictResolver + ?Sized> TreeMerger<'a, R> {
    fn merge(
        &mut self,
        path: &str,
        tree_a: &Tree,
        tree_b: &Tree,
        base: Option<&Tree>,
    ) -> Result<Sha1Hash> {
        let entries_a: HashMap<&str, &TreeEntry> =
            tree_a.entries().iter().map(|e| (e.name.as_str(), e)).collect();
        let entries_b: HashMap<&str, &TreeEntry> =
            tree_b.entries().iter().map(|e| (e.name.as_str(), e)).collect();
        let entries_base: HashMap<&str, &TreeEntry> = base
            .map(|t| t.entries().iter().map(|e| (e.name.as_str(), e)).collect())
            .unwrap_or_default();
        let names: BTreeSet<&str> = entries_a
            .keys()
            .chain(entries_b.keys())
            .chain(entries_base.keys())
            .copied()
            .collect();

        let mut merged: Vec<TreeEntry> = Vec::new();
        for name in names {
            let a = entries_a.get(name).copied();
            let b = entries_b.get(name).copied();
            let entry_base = entries_base.get(name).copied();
            match classify(a, b, entry_base) {
                Classification::NoChange => {
                    if let Some(entry) = entry_base {
                        merged.push(entry.clone());
                    }
                }
                Classification::TakeA => {
                    self.result.picked_a.push(join(path, name));
                    if let Some(entry) = a {
                        merged.push(entry.clone());
                    }
                }
                Classification::TakeB => {
                    self.result.picked_b.push(join(path, name));
                    if let Some(entry) = b {
                        merged.push(entry.clone());
                    }
                }
                Classification::SameChange => {
                    self.result.picked_both.push(join(path, name));
                    if let Some(entry) = a {
                        merged.push(entry.clone());
                    }
                }
                Classification::Conflict => {
                    let a_dir = a.map(|e| e.mode == FileMode::Dir).unwrap_or(false);
                    let b_dir = b.map(|e| e.mode == FileMode::Dir).unwrap_or(false);
                    if a_dir && b_dir {
                        // Both sides are directories: recurse. A base entry
                        // that is not a directory acts as no base.
                        let (a, b) = match (a, b) {
                            (Some(a), Some(b)) => (a, b),
                            _ => unreachable!("both sides are directories"),
                        };
                        let sub_a = self.store.tree(&a.hash)?.clone();
                        let sub_b = self.store.tree(&b.hash)?.clone();
                        let sub_base = match entry_base {
                            Some(e) if e.mode == FileMode::Dir => {
                                Some(self.store.tree(&e.hash)?.clone())
                            }
                            _ => None,
                        };
                        let sub_hash =
                            self.merge(&join(path, name), &sub_a, &sub_b, sub_base.as_ref())?;
                        merged.push(TreeEntry {
                            name: name.to_string(),
                            mode: FileMode::Dir,
                            hash: sub_hash,
                        });
                    } else {
                        self.result.conflicts.push(join(path, name));
                        let replacements =
                            self.resolver.resolve(self.store, path, a, b, entry_base)?;
                        merged.extend(replacements);
                    }
                }
            }
        }

        let tree = Tree::from_entries(merged);
        let tree_hash = self.store.insert(Object::Tree(tree));
        self.result.new_hashes.push(tree_hash);
        Ok(tree_hash)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classification {
    NoChange,
    TakeA,
    TakeB,
    SameChange,
    Conflict,
}

fn classify(
    a: Option<&TreeEntry>,
    b: Option<&TreeEntry>,
    base: Option<&TreeEntry>,
) -> Classification {
    let a_changed = changed(a, base);
    let b_changed = changed(b, base);
    match (a_changed, b_changed) {
        (false, false) => Classification::NoChange,
        (true, false) => Classification::TakeA,
        (false, true) => Classification::TakeB,
        (true, true) => {
            if !changed(a, b) {
                Classification::SameChange
            } else {
                Classification::Conflict
            }
        }
    }
}

/// Whether two slots differ. Absent-vs-absent is unchanged; otherwise both
/// the mode and the hash must match.
fn changed(x: Option<&TreeEntry>, y: Option<&TreeEntry>) -> bool {
    match (x, y) {
        (None, None) => false,
        (Some(x), Some(y)) => x.mode != y.mode || x.hash != y.hash,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::BlobCollector;
    use wiregit_core::hash_bytes;

    fn blob(store: &mut ObjectStore, content: &[u8]) -> Sha1Hash {
        store.insert(Object::Blob(content.to_vec()))
    }

    fn tree(store: &mut ObjectStore, entries: Vec<TreeEntry>) -> Sha1Hash {
        store.insert(Object::Tree(Tree::from_entries(entries)))
    }

    #[test]
    fn test_classification_table() {
        let base = TreeEntry::file("f", hash_bytes(b"base"));
        let changed_a = TreeEntry::file("f", hash_bytes(b"a"));
        let changed_b = TreeEntry::file("f", hash_bytes(b"b"));

        assert_eq!(
            classify(Some(&base), Some(&base), Some(&base)),
            Classification::NoChange
        );
        assert_eq!(
            classify(Some(&changed_a), Some(&base), Some(&base)),
            Classification::TakeA
        );
        assert_eq!(
            classify(Some(&base), Some(&changed_b), Some(&base)),
            Classification::TakeB
        );
        assert_eq!(
            classify(Some(&changed_a), Some(&changed_a), Some(&base)),
            Classification::SameChange
        );
        assert_eq!(
            classify(Some(&changed_a), Some(&changed_b), Some(&base)),
            Classification::Conflict
        );
        // Deleted on one side only.
        assert_eq!(classify(None, Some(&base), Some(&base)), Classification::TakeA);
    }

    #[test]
    fn test_mode_change_is_a_change() {
        let file = TreeEntry::file("f", hash_bytes(b"x"));
        let exec = TreeEntry {
            name: "f".into(),
            mode: FileMode::Executable,
            hash: hash_bytes(b"x"),
        };
        assert!(changed(Some(&file), Some(&exec)));
    }

    #[test]
    fn test_short_circuit_b_unchanged() -> Result<()> {
        let mut store = ObjectStore::new();
        let b1 = blob(&mut store, b"v1");
        let b2 = blob(&mut store, b"v2");
        let base = tree(&mut store, vec![TreeEntry::file("f", b1)]);
        let side_a = tree(&mut store, vec![TreeEntry::file("f", b2)]);

        let mut collector = BlobCollector::new();
        let result = merge_trees(&mut store, side_a, base, Some(base), &mut collector)?;
        assert_eq!(result.tree_hash, side_a);
        assert!(result.new_hashes.is_empty());
        Ok(())
    }

    #[test]
    fn test_short_circuit_identity() -> Result<()> {
        let mut store = ObjectStore::new();
        let b = blob(&mut store, b"v");
        let t = tree(&mut store, vec![TreeEntry::file("f", b)]);
        let mut collector = BlobCollector::new();
        let result = merge_trees(&mut store, t, t, Some(t), &mut collector)?;
        assert_eq!(result.tree_hash, t);
        Ok(())
    }

    #[test]
    fn test_disjoint_edits_merge_cleanly() -> Result<()> {
        let mut store = ObjectStore::new();
        let f1 = blob(&mut store, b"one");
        let f1b = blob(&mut store, b"one changed");
        let f2 = blob(&mut store, b"two");
        let f2b = blob(&mut store, b"two changed");

        let base = tree(
            &mut store,
            vec![TreeEntry::file("a", f1), TreeEntry::file("b", f2)],
        );
        let side_a = tree(
            &mut store,
            vec![TreeEntry::file("a", f1b), TreeEntry::file("b", f2)],
        );
        let side_b = tree(
            &mut store,
            vec![TreeEntry::file("a", f1), TreeEntry::file("b", f2b)],
        );

        let mut collector = BlobCollector::new();
        let result = merge_trees(&mut store, side_a, side_b, Some(base), &mut collector)?;
        assert_eq!(result.picked_a, vec!["a".to_string()]);
        assert_eq!(result.picked_b, vec!["b".to_string()]);
        assert!(result.conflicts.is_empty());

        let merged = store.tree(&result.tree_hash)?;
        assert_eq!(merged.get("a").map(|e| e.hash), Some(f1b));
        assert_eq!(merged.get("b").map(|e| e.hash), Some(f2b));
        Ok(())
    }

    #[test]
    fn test_determinism() -> Result<()> {
        let mut store = ObjectStore::new();
        let f1 = blob(&mut store, b"one");
        let f1b = blob(&mut store, b"one changed");
        let f2 = blob(&mut store, b"two");
        let f2b = blob(&mut store, b"two changed");
        let base = tree(
            &mut store,
            vec![TreeEntry::file("a", f1), TreeEntry::file("b", f2)],
        );
        let side_a = tree(
            &mut store,
            vec![TreeEntry::file("a", f1b), TreeEntry::file("b", f2)],
        );
        let side_b = tree(
            &mut store,
            vec![TreeEntry::file("a", f1), TreeEntry::file("b", f2b)],
        );

        let mut c1 = BlobCollector::new();
        let r1 = merge_trees(&mut store, side_a, side_b, Some(base), &mut c1)?;
        let mut c2 = BlobCollector::new();
        let r2 = merge_trees(&mut store, side_a, side_b, Some(base), &mut c2)?;
        assert_eq!(r1.tree_hash, r2.tree_hash);
        Ok(())
    }

    #[test]
    fn test_both_sides_same_change() -> Result<()> {
        let mut store = ObjectStore::new();
        let old = blob(&mut store, b"old");
        let new = blob(&mut store, b"new");
        let base = tree(&mut store, vec![TreeEntry::file("f", old)]);
        let side_a = tree(&mut store, vec![TreeEntry::file("f", new)]);
        let side_b = tree(&mut store, vec![TreeEntry::file("f", new)]);

        // side_a and side_b are the same tree hash here, so defeat the
        // short-circuit with an extra untouched file on one side.
        let pad = blob(&mut store, b"pad");
        let base2 = tree(
            &mut store,
            vec![TreeEntry::file("f", old), TreeEntry::file("p", pad)],
        );
        let side_a2 = tree(
            &mut store,
            vec![TreeEntry::file("f", new), TreeEntry::file("p", pad)],
        );
        let _ = (side_a, side_b, base);

        let side_b2 = tree(
            &mut store,
            vec![TreeEntry::file("f", new), TreeEntry::file("p2", pad)],
        );
        let mut collector = BlobCollector::new();
        let result =
            merge_trees(&mut store, side_a2, side_b2, Some(base2), &mut collector)?;
        assert_eq!(result.picked_both, vec!["f".to_string()]);
        Ok(())
    }

    #[test]
    fn test_conflicting_directories_recurse() -> Result<()> {
        let mut store = ObjectStore::new();
        let old = blob(&mut store, b"old");
        let a_blob = blob(&mut store, b"from a");
        let b_blob = blob(&mut store, b"from b");
        let other = blob(&mut store, b"other");

        let base_sub = tree(
            &mut store,
            vec![TreeEntry::file("x", old), TreeEntry::file("y", old)],
        );
        let a_sub = tree(
            &mut store,
            vec![TreeEntry::file("x", a_blob), TreeEntry::file("y", old)],
        );
        let b_sub = tree(
            &mut store,
            vec![TreeEntry::file("x", old), TreeEntry::file("y", b_blob)],
        );

        let base_root = tree(
            &mut store,
            vec![TreeEntry::dir("d", base_sub), TreeEntry::file("top", other)],
        );
        let a_root = tree(
            &mut store,
            vec![TreeEntry::dir("d", a_sub), TreeEntry::file("top", other)],
        );
        let b_root = tree(
            &mut store,
            vec![TreeEntry::dir("d", b_sub), TreeEntry::file("top", other)],
        );

        let mut collector = BlobCollector::new();
        let result =
            merge_trees(&mut store, a_root, b_root, Some(base_root), &mut collector)?;
        assert_eq!(result.picked_a, vec!["d/x".to_string()]);
        assert_eq!(result.picked_b, vec!["d/y".to_string()]);
        assert!(result.conflicts.is_empty());

        let merged_root = store.tree(&result.tree_hash)?.clone();
        let sub_entry = merged_root.get("d").map(|e| e.hash).unwrap_or(Sha1Hash::ZERO);
        let merged_sub = store.tree(&sub_entry)?;
        assert_eq!(merged_sub.get("x").map(|e| e.hash), Some(a_blob));
        assert_eq!(merged_sub.get("y").map(|e| e.hash), Some(b_blob));
        // New trees: the subtree and the root.
        assert_eq!(result.new_hashes.len(), 2);
        Ok(())
    }

    #[test]
    fn test_file_conflict_reaches_resolver() -> Result<()> {
        let mut store = ObjectStore::new();
        let base_b = blob(&mut store, b"base");
        let a_b = blob(&mut store, b"a side");
        let b_b = blob(&mut store, b"b side");
        let base = tree(&mut store, vec![TreeEntry::file("f", base_b)]);
        let side_a = tree(&mut store, vec![TreeEntry::file("f", a_b)]);
        let side_b = tree(&mut store, vec![TreeEntry::file("f", b_b)]);

        let mut collector = BlobCollector::new();
        let result = merge_trees(&mut store, side_a, side_b, Some(base), &mut collector)?;
        assert_eq!(result.conflicts, vec!["f".to_string()]);
        assert_eq!(collector.blob_hashes, vec![a_b, b_b, base_b]);
        // The collector emits no entries, so the merged tree is empty.
        assert!(store.tree(&result.tree_hash)?.is_empty());
        Ok(())
    }
}
