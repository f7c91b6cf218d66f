//! List paths modified between two commits

use crate::common::{error_string, load_pack, parse_hash};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use wiregit_core::ObjectStore;
use wiregit_merge::diff_trees;
use wiregit_proto::{fetch_blob_none, FetchDebugInfo, RequestConfig, Transport};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetModifiedFilesArgs {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    pub commit_hash1: String,
    pub commit_hash2: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetModifiedFilesOutput {
    /// Sorted paths of files that differ between the two commits
    pub files: Vec<String>,
    pub debug_info: FetchDebugInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Diff the trees of two commits without fetching any blobs.
pub fn get_modified_files(
    transport: &Transport,
    config: &RequestConfig,
    args: &GetModifiedFilesArgs,
) -> GetModifiedFilesOutput {
    let mut output = GetModifiedFilesOutput::default();
    if let Err(e) = run(transport, config, args, &mut output) {
        output.error = Some(error_string(&e));
    }
    output.files.sort();
    output
}

fn run(
    transport: &Transport,
    config: &RequestConfig,
    args: &GetModifiedFilesArgs,
    output: &mut GetModifiedFilesOutput,
) -> Result<()> {
    let hash1 = parse_hash("commitHash1", &args.commit_hash1)?;
    let hash2 = parse_hash("commitHash2", &args.commit_hash2)?;

    let (pack, debug_info) =
        fetch_blob_none(transport, &args.repo_url, &[hash1, hash2], 1, config)?;
    output.debug_info = debug_info;

    let mut store = ObjectStore::new();
    load_pack(&mut store, &pack)?;

    let tree1 = store.tree(&store.tree_of(&hash1)?)?.clone();
    let tree2 = store.tree(&store.tree_of(&hash2)?)?.clone();
    let modified = diff_trees(&store, &tree1, &tree2)?;
    output.files.extend(modified.into_keys());
    Ok(())
}
