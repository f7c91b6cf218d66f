//! Structural diff of two trees

use anyhow::Result;
use std::collections::{BTreeSet, HashMap};
use wiregit_core::{FileMode, ObjectStore, Sha1Hash, Tree, TreeEntry};

/// The blob hashes a path points at on each side of a diff.
///
/// The zero hash means the path has no file on that side (absent, or not a
/// regular file there).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobChange {
    pub before: Sha1Hash,
    pub after: Sha1Hash,
}

/// Diff two trees, producing a map from file path to the blob pair.
///
/// Only leaf files are recorded; directories are recursed into. When a file
/// on one side faces a directory on the other, the file is recorded against
/// the zero hash and the directory's files are recorded as one-sided.
pub fn diff_trees(
    store: &ObjectStore,
    tree1: &Tree,
    tree2: &Tree,
) -> Result<HashMap<String, BlobChange>> {
    let mut differ = TreeDiffer { store, modified: HashMap::new() };
    differ.diff("", tree1, tree2)?;
    Ok(differ.modified)
}

struct TreeDiffer<'a> {
    store: &'a ObjectStore,
    modified: HashMap<String, BlobChange>,
}

impl<'a> TreeDiffer<'a> {
    fn diff(&mut self, path: &str, tree1: &Tree, tree2: &Tree) -> Result<()> {
        let entries1: HashMap<&str, &TreeEntry> =
            tree1.entries().iter().map(|e| (e.name.as_str(), e)).collect();
        let entries2: HashMap<&str, &TreeEntry> =
            tree2.entries().iter().map(|e| (e.name.as_str(), e)).collect();
        let names: BTreeSet<&str> =
            entries1.keys().chain(entries2.keys()).copied().collect();

        for name in names {
            let entry1 = entries1.get(name).copied();
            let entry2 = entries2.get(name).copied();
            match (entry1, entry2) {
                (None, Some(entry2)) => self.one_sided(path, entry2, Side::Two)?,
                (Some(entry1), None) => self.one_sided(path, entry1, Side::One)?,
                (Some(entry1), Some(entry2)) => {
                    if entry1.hash == entry2.hash {
                        // Identical content, file or directory alike.
                        continue;
                    }
                    let file1 = entry1.mode.is_file();
                    let file2 = entry2.mode.is_file();
                    if file1 && file2 {
                        self.modified.insert(
                            join(path, name),
                            BlobChange { before: entry1.hash, after: entry2.hash },
                        );
                    } else if !file1 && file2 {
                        self.modified.insert(
                            join(path, name),
                            BlobChange { before: Sha1Hash::ZERO, after: entry2.hash },
                        );
                        self.one_sided(path, entry1, Side::One)?;
                    } else if file1 && !file2 {
                        self.modified.insert(
                            join(path, name),
                            BlobChange { before: entry1.hash, after: Sha1Hash::ZERO },
                        );
                        self.one_sided(path, entry2, Side::Two)?;
                    } else if entry1.mode == FileMode::Dir && entry2.mode == FileMode::Dir {
                        let sub1 = self.store.tree(&entry1.hash)?.clone();
                        let sub2 = self.store.tree(&entry2.hash)?.clone();
                        self.diff(&join(path, name), &sub1, &sub2)?;
                    }
                    // Symlink-vs-gitlink and similar non-file pairs carry no
                    // blobs to record.
                }
                (None, None) => unreachable!("name came from the union"),
            }
        }
        Ok(())
    }

    /// Record an entry that exists on only one side, descending directories
    /// to their leaf files.
    fn one_sided(&mut self, path: &str, entry: &TreeEntry, side: Side) -> Result<()> {
        if entry.mode.is_file() {
            let change = match side {
                Side::One => BlobChange { before: entry.hash, after: Sha1Hash::ZERO },
                Side::Two => BlobChange { before: Sha1Hash::ZERO, after: entry.hash },
            };
            self.modified.insert(join(path, &entry.name), change);
            return Ok(());
        }
        if entry.mode == FileMode::Dir {
            let subtree = self.store.tree(&entry.hash)?.clone();
            let subpath = join(path, &entry.name);
            for sub in subtree.entries() {
                self.one_sided(&subpath, sub, side)?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Side {
    One,
    Two,
}

pub(crate) fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}
