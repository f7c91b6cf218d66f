//! Fetch file contents from a commit

use crate::common::{error_string, load_pack, parse_hash};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use wiregit_core::{FileMode, ObjectStore, Sha1Hash, Tree};
use wiregit_proto::{fetch_blob_none, fetch_blobs, FetchDebugInfo, RequestConfig, Transport};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetFilesArgs {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    pub commit_hash: String,
    #[serde(default)]
    pub file_paths: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetFilesOutput {
    /// Path to content for every requested file that exists
    pub files: BTreeMap<String, String>,
    pub fetch_debug_info: FetchDebugInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_fetch_debug_info: Option<FetchDebugInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Resolve the requested paths in the commit's tree and fetch their blobs.
///
/// Paths that do not name a regular file (absent, a directory, a path
/// through a file) are silently omitted from the result.
pub fn get_files(
    transport: &Transport,
    config: &RequestConfig,
    args: &GetFilesArgs,
) -> GetFilesOutput {
    let mut output = GetFilesOutput::default();
    if let Err(e) = run(transport, config, args, &mut output) {
        output.error = Some(error_string(&e));
    }
    output
}

fn run(
    transport: &Transport,
    config: &RequestConfig,
    args: &GetFilesArgs,
    output: &mut GetFilesOutput,
) -> Result<()> {
    let commit_hash = parse_hash("commitHash", &args.commit_hash)?;

    let (pack, debug_info) =
        fetch_blob_none(transport, &args.repo_url, &[commit_hash], 1, config)?;
    output.fetch_debug_info = debug_info;
    let mut store = ObjectStore::new();
    load_pack(&mut store, &pack)?;

    let root = store.tree_of(&commit_hash)?;
    let root = store.tree(&root)?.clone();
    let mut blobs: BTreeMap<String, Sha1Hash> = BTreeMap::new();
    for path in &args.file_paths {
        if let Some(hash) = lookup_blob(&store, &root, path)? {
            blobs.insert(path.clone(), hash);
        }
    }
    if blobs.is_empty() {
        return Ok(());
    }

    let wants: Vec<Sha1Hash> = blobs.values().copied().collect();
    let (pack, blob_debug_info) = fetch_blobs(transport, &args.repo_url, &wants, config)?;
    output.blob_fetch_debug_info = Some(blob_debug_info);
    load_pack(&mut store, &pack)?;

    for (path, hash) in blobs {
        let content = store.blob(&hash)?;
        output.files.insert(path, String::from_utf8_lossy(content).into_owned());
    }
    Ok(())
}

/// Walk one slash-separated path through the tree. Only regular and
/// executable files count; everything else reads as "not found".
fn lookup_blob(store: &ObjectStore, tree: &Tree, path: &str) -> Result<Option<Sha1Hash>> {
    let (first, rest) = match path.split_once('/') {
        Some((first, rest)) => (first, Some(rest)),
        None => (path, None),
    };
    let Some(entry) = tree.get(first) else {
        return Ok(None);
    };
    if entry.mode.is_file() {
        return Ok(if rest.is_none() { Some(entry.hash) } else { None });
    }
    if entry.mode == FileMode::Dir {
        if let Some(rest) = rest {
            let subtree = store.tree(&entry.hash)?;
            return lookup_blob(store, subtree, rest);
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiregit_core::{Object, TreeEntry};

    #[test]
    fn test_lookup_blob_paths() -> Result<()> {
        let mut store = ObjectStore::new();
        let blob = store.insert(Object::Blob(b"content".to_vec()));
        let sub = store.insert(Object::Tree(Tree::from_entries(vec![TreeEntry::file(
            "inner.txt",
            blob,
        )])));
        let root = Tree::from_entries(vec![
            TreeEntry::file("top.txt", blob),
            TreeEntry::dir("dir", sub),
        ]);

        assert_eq!(lookup_blob(&store, &root, "top.txt")?, Some(blob));
        assert_eq!(lookup_blob(&store, &root, "dir/inner.txt")?, Some(blob));
        assert_eq!(lookup_blob(&store, &root, "missing")?, None);
        // A path *through* a file is not found.
        assert_eq!(lookup_blob(&store, &root, "top.txt/x")?, None);
        // A directory itself is not a file.
        assert_eq!(lookup_blob(&store, &root, "dir")?, None);
        Ok(())
    }
}
