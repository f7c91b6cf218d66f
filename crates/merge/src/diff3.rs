//! The diff3 conflict resolver

use crate::differ::join;
use crate::resolver::ConflictResolver;
use crate::text::{is_binary, merge_text};
use anyhow::Result;
use wiregit_core::{Object, ObjectStore, Sha1Hash, TreeEntry};

/// Resolves file-against-file conflicts with a textual three-way merge.
///
/// Anything else (binary content, or a conflict where one side is not a
/// regular file) keeps both sides under rejection-suffixed names. The four
/// outcome lists record what happened per path.
#[derive(Debug)]
pub struct Diff3Resolver {
    side_a_label: String,
    side_b_label: String,
    side_a_suffix: String,
    side_b_suffix: String,

    /// Paths merged cleanly into a new blob
    pub resolved_conflicts: Vec<String>,
    /// Paths merged with conflict markers left in the blob
    pub open_conflicts: Vec<String>,
    /// Paths whose content is binary; both sides kept
    pub binary_conflicts: Vec<String>,
    /// Paths where a side is not a regular file; both sides kept
    pub non_file_conflicts: Vec<String>,

    /// Blobs created by resolution
    pub new_hashes: Vec<Sha1Hash>,
}

impl Diff3Resolver {
    pub fn new(
        side_a_label: impl Into<String>,
        side_b_label: impl Into<String>,
        side_a_suffix: impl Into<String>,
        side_b_suffix: impl Into<String>,
    ) -> Self {
        Self {
            side_a_label: side_a_label.into(),
            side_b_label: side_b_label.into(),
            side_a_suffix: side_a_suffix.into(),
            side_b_suffix: side_b_suffix.into(),
            resolved_conflicts: Vec::new(),
            open_conflicts: Vec::new(),
            binary_conflicts: Vec::new(),
            non_file_conflicts: Vec::new(),
            new_hashes: Vec::new(),
        }
    }

    /// Whether any conflict survived resolution
    pub fn has_unresolved(&self) -> bool {
        !self.open_conflicts.is_empty()
            || !self.binary_conflicts.is_empty()
            || !self.non_file_conflicts.is_empty()
    }

    fn keep_both(
        &self,
        entry_a: Option<&TreeEntry>,
        entry_b: Option<&TreeEntry>,
    ) -> Vec<TreeEntry> {
        let mut kept = Vec::new();
        if let Some(a) = entry_a {
            let mut a = a.clone();
            a.name.push_str(&self.side_a_suffix);
            kept.push(a);
        }
        if let Some(b) = entry_b {
            let mut b = b.clone();
            b.name.push_str(&self.side_b_suffix);
            kept.push(b);
        }
        kept
    }
}

impl ConflictResolver for Diff3Resolver {
    fn resolve(
        &mut self,
        store: &mut ObjectStore,
        parent_path: &str,
        entry_a: Option<&TreeEntry>,
        entry_b: Option<&TreeEntry>,
        entry_base: Option<&TreeEntry>,
    ) -> Result<Vec<TreeEntry>> {
        // The textual path needs a regular file on every side; anything
        // else keeps both sides.
        let all_files = matches!(
            (entry_a, entry_b, entry_base),
            (Some(a), Some(b), Some(base))
                if a.mode.is_file() && b.mode.is_file() && base.mode.is_file()
        );
        if !all_files {
            if let Some(entry) = entry_a.or(entry_b) {
                self.non_file_conflicts.push(join(parent_path, &entry.name));
            }
            return Ok(self.keep_both(entry_a, entry_b));
        }
        let (a, b, base) = match (entry_a, entry_b, entry_base) {
            (Some(a), Some(b), Some(base)) => (a, b, base),
            _ => unreachable!("checked above"),
        };

        let content_a = store.blob(&a.hash)?.to_vec();
        let content_b = store.blob(&b.hash)?.to_vec();
        let content_base = store.blob(&base.hash)?.to_vec();

        if is_binary(&content_a) || is_binary(&content_b) || is_binary(&content_base) {
            self.binary_conflicts.push(join(parent_path, &a.name));
            return Ok(self.keep_both(entry_a, entry_b));
        }

        let merged = merge_text(
            &content_a,
            &content_base,
            &content_b,
            &self.side_a_label,
            &self.side_b_label,
        );
        let blob_hash = store.insert(Object::Blob(merged.content));
        self.new_hashes.push(blob_hash);
        if merged.conflicted {
            self.open_conflicts.push(join(parent_path, &a.name));
        } else {
            self.resolved_conflicts.push(join(parent_path, &a.name));
        }
        Ok(vec![TreeEntry { name: a.name.clone(), mode: a.mode, hash: blob_hash }])
    }
}
