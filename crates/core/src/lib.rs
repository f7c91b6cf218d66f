//! Git object model and in-memory storage for wiregit.
//!
//! This crate holds the pieces of Git that can live entirely in memory: the
//! SHA-1 object identifier, the commit/tree/blob object model with its
//! canonical encodings, an insertion-ordered object store, and a packfile
//! codec that moves objects between the store and the wire.

pub mod hash;
pub mod object;
pub mod pack;
pub mod store;
pub mod tree;

pub use hash::{hash_bytes, hash_object, Sha1Hash};
pub use object::{Commit, Object, ObjectKind, Signature};
pub use pack::{read_pack, write_pack};
pub use store::ObjectStore;
pub use tree::{FileMode, Tree, TreeEntry};
