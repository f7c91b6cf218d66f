//! Tree diffing and three-way merging over the in-memory object store.
//!
//! The merge engine is pure computation: it reads and writes objects in a
//! [`wiregit_core::ObjectStore`] and never touches the network. Conflicts
//! are delegated to a pluggable [`ConflictResolver`]; two implementations
//! ship here: a collector that records which blobs a real resolution would
//! need (so the caller can fetch them), and a textual diff3 resolver.

pub mod differ;
pub mod diff3;
pub mod merger;
pub mod resolver;
pub mod text;

pub use differ::{diff_trees, BlobChange};
pub use diff3::Diff3Resolver;
pub use merger::{merge_trees, MergeResult};
pub use resolver::{BlobCollector, ConflictResolver};
