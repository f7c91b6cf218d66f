//! In-memory object storage for a single orchestrated operation

use crate::hash::Sha1Hash;
use crate::object::{Commit, Object};
use crate::tree::Tree;
use anyhow::Result;
use indexmap::IndexMap;

/// An in-memory mapping from hash to decoded object.
///
/// The store is owned by one operation and discarded afterwards; it is
/// filled from fetched packfiles plus any objects created locally (merged
/// trees, resolved blobs, new commits). Iteration follows insertion order,
/// and re-inserting an existing object is a no-op.
#[derive(Debug, Default)]
pub struct ObjectStore {
    objects: IndexMap<Sha1Hash, Object>,
}

impl ObjectStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object, returning its hash.
    ///
    /// Idempotent: inserting the same content twice keeps the first copy.
    pub fn insert(&mut self, object: Object) -> Sha1Hash {
        let hash = object.hash();
        self.objects.entry(hash).or_insert(object);
        hash
    }

    /// Whether an object with this hash is present
    pub fn contains(&self, hash: &Sha1Hash) -> bool {
        self.objects.contains_key(hash)
    }

    /// Look up an object by hash
    pub fn get(&self, hash: &Sha1Hash) -> Option<&Object> {
        self.objects.get(hash)
    }

    /// Look up a commit, failing if the hash is absent or not a commit
    pub fn commit(&self, hash: &Sha1Hash) -> Result<&Commit> {
        match self.get(hash) {
            Some(Object::Commit(c)) => Ok(c),
            Some(obj) => anyhow::bail!("object {} is a {}, expected a commit", hash, obj.kind()),
            None => anyhow::bail!("commit {} not found in the fetched packfile", hash),
        }
    }

    /// Look up a tree, failing if the hash is absent or not a tree
    pub fn tree(&self, hash: &Sha1Hash) -> Result<&Tree> {
        match self.get(hash) {
            Some(Object::Tree(t)) => Ok(t),
            Some(obj) => anyhow::bail!("object {} is a {}, expected a tree", hash, obj.kind()),
            None => anyhow::bail!("tree {} not found in the fetched packfile", hash),
        }
    }

    /// Look up a blob's content, failing if the hash is absent or not a blob
    pub fn blob(&self, hash: &Sha1Hash) -> Result<&[u8]> {
        match self.get(hash) {
            Some(Object::Blob(b)) => Ok(b),
            Some(obj) => anyhow::bail!("object {} is a {}, expected a blob", hash, obj.kind()),
            None => anyhow::bail!("blob {} not found in the fetched packfile", hash),
        }
    }

    /// The tree of a commit, resolved through the store
    pub fn tree_of(&self, commit_hash: &Sha1Hash) -> Result<Sha1Hash> {
        Ok(self.commit(commit_hash)?.tree)
    }

    /// Iterate over all objects in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&Sha1Hash, &Object)> {
        self.objects.iter()
    }

    /// Iterate over all commits in insertion order
    pub fn commits(&self) -> impl Iterator<Item = (&Sha1Hash, &Commit)> {
        self.objects.iter().filter_map(|(hash, obj)| match obj {
            Object::Commit(c) => Some((hash, c)),
            _ => None,
        })
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;
    use crate::tree::TreeEntry;

    #[test]
    fn test_insert_is_idempotent() {
        let mut store = ObjectStore::new();
        let h1 = store.insert(Object::Blob(b"same".to_vec()));
        let h2 = store.insert(Object::Blob(b"same".to_vec()));
        assert_eq!(h1, h2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_typed_getters() {
        let mut store = ObjectStore::new();
        let blob = store.insert(Object::Blob(b"content".to_vec()));
        let tree = store.insert(Object::Tree(Tree::from_entries(vec![TreeEntry::file(
            "f", blob,
        )])));

        assert_eq!(store.blob(&blob).unwrap(), b"content");
        assert_eq!(store.tree(&tree).unwrap().len(), 1);
        assert!(store.commit(&blob).is_err());
        assert!(store.tree(&hash_bytes(b"missing")).is_err());
    }

    #[test]
    fn test_iteration_follows_insertion_order() {
        let mut store = ObjectStore::new();
        let a = store.insert(Object::Blob(b"a".to_vec()));
        let b = store.insert(Object::Blob(b"b".to_vec()));
        let c = store.insert(Object::Blob(b"c".to_vec()));
        let order: Vec<Sha1Hash> = store.iter().map(|(h, _)| *h).collect();
        assert_eq!(order, vec![a, b, c]);
    }

    #[test]
    fn test_missing_commit_message_names_hash() {
        let store = ObjectStore::new();
        let missing = hash_bytes(b"nope");
        let err = store.commit(&missing).unwrap_err().to_string();
        assert!(err.contains(&missing.to_hex()));
    }
}
