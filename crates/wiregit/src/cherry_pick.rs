//! Squash cherry-pick: land one branch's cumulative change as a single
//! commit on another branch

use crate::common::{dedup_hashes, error_string, load_pack, new_signature, parse_hash};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use wiregit_core::{write_pack, Commit, Object, ObjectStore, Sha1Hash};
use wiregit_merge::{merge_trees, BlobCollector, Diff3Resolver, MergeResult};
use wiregit_proto::{
    fetch_blob_none, fetch_blobs, push, FetchDebugInfo, PushDebugInfo, RefUpdate,
    RequestConfig, Transport,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SquashCherryPickArgs {
    #[serde(rename = "repoURL")]
    pub repo_url: String,

    /// Head of the change being picked
    pub cherry_pick_from: String,
    /// Commit the squashed change lands on
    pub cherry_pick_to: String,
    /// Common ancestor used as the merge base
    pub cherry_pick_base: String,

    pub commit_message: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub author_email: String,
    /// RFC 3339; empty means now
    #[serde(default)]
    pub author_time: String,
    #[serde(default)]
    pub committer: String,
    #[serde(default)]
    pub committer_email: String,
    #[serde(default)]
    pub committer_time: String,

    /// Ref to update with the new commit
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// Ref that receives the commit instead when conflicts stay open
    #[serde(default)]
    pub conflict_ref: String,
    /// Compare-and-swap precondition on the updated ref; empty for none
    #[serde(default)]
    pub current_ref_hash: String,
    /// Fail without pushing when any conflict stays unresolved
    #[serde(default)]
    pub abort_on_conflict: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SquashCherryPickOutput {
    pub commit_hash: String,
    pub cherry_picked_files: Vec<String>,
    pub conflict_open_files: Vec<String>,
    pub conflict_resolved_files: Vec<String>,
    pub binary_conflict_files: Vec<String>,
    pub non_file_conflict_files: Vec<String>,
    pub fetch_debug_info: FetchDebugInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_fetch_debug_info: Option<FetchDebugInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_debug_info: Option<PushDebugInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Squash-cherry-pick `from`'s tree onto `to` and push the result.
///
/// The first fetch carries commits and trees only; blob content is pulled
/// on demand when the merge hits file conflicts, and a second merge pass
/// resolves them textually. With unresolved conflicts and a conflict ref
/// configured, the commit is pushed there instead of the primary ref.
pub fn squash_cherry_pick(
    transport: &Transport,
    config: &RequestConfig,
    args: &SquashCherryPickArgs,
) -> SquashCherryPickOutput {
    let mut output = SquashCherryPickOutput::default();
    if let Err(e) = run(transport, config, args, &mut output) {
        output.error = Some(error_string(&e));
    }
    output
}

fn run(
    transport: &Transport,
    config: &RequestConfig,
    args: &SquashCherryPickArgs,
    output: &mut SquashCherryPickOutput,
) -> Result<()> {
    let from = parse_hash("cherryPickFrom", &args.cherry_pick_from)?;
    let to = parse_hash("cherryPickTo", &args.cherry_pick_to)?;
    let base = parse_hash("cherryPickBase", &args.cherry_pick_base)?;
    let current_ref_hash = if args.current_ref_hash.is_empty() {
        None
    } else {
        Some(parse_hash("currentRefHash", &args.current_ref_hash)?)
    };
    let author = new_signature(&args.author, &args.author_email, &args.author_time)
        .map_err(|e| e.context("invalid author signature"))?;
    let committer =
        new_signature(&args.committer, &args.committer_email, &args.committer_time)
            .map_err(|e| e.context("invalid committer signature"))?;

    let (pack, fetch_debug) =
        fetch_blob_none(transport, &args.repo_url, &[from, base, to], 1, config)?;
    output.fetch_debug_info = fetch_debug;
    let mut store = ObjectStore::new();
    load_pack(&mut store, &pack)?;

    let tree_from = store.tree_of(&from)?;
    let tree_base = store.tree_of(&base)?;
    let tree_to = store.tree_of(&to)?;

    let mut collector = BlobCollector::new();
    let mut merge_result =
        merge_trees(&mut store, tree_from, tree_to, Some(tree_base), &mut collector)?;

    let mut resolver = Diff3Resolver::new("Cherry-pick content", "Base content", ".rej", "");
    if !merge_result.conflicts.is_empty() {
        if !collector.blob_hashes.is_empty() {
            let wants = dedup_hashes(collector.blob_hashes.iter().copied());
            let (pack, blob_debug) = fetch_blobs(transport, &args.repo_url, &wants, config)?;
            output.blob_fetch_debug_info = Some(blob_debug);
            load_pack(&mut store, &pack)?;
        }
        merge_result =
            merge_trees(&mut store, tree_from, tree_to, Some(tree_base), &mut resolver)?;
    }

    output.cherry_picked_files = merge_result.picked_a.clone();
    output.conflict_open_files = resolver.open_conflicts.clone();
    output.conflict_resolved_files = resolver.resolved_conflicts.clone();
    output.binary_conflict_files = resolver.binary_conflicts.clone();
    output.non_file_conflict_files = resolver.non_file_conflicts.clone();

    let has_conflict = resolver.has_unresolved();
    if args.abort_on_conflict && has_conflict {
        anyhow::bail!("conflict detected");
    }

    let commit_hash = build_commit(
        &mut store,
        &merge_result,
        to,
        args.commit_message.clone(),
        author,
        committer,
    );
    output.commit_hash = commit_hash.to_hex();

    let new_hashes = dedup_hashes(
        std::iter::once(commit_hash)
            .chain(merge_result.new_hashes.iter().copied())
            .chain(resolver.new_hashes.iter().copied()),
    );
    let packfile = write_pack(&store, &new_hashes)?;

    let dest_ref = if has_conflict && !args.conflict_ref.is_empty() {
        args.conflict_ref.clone()
    } else {
        args.ref_name.clone()
    };
    let update =
        RefUpdate { name: dest_ref, expected_old: current_ref_hash, new: commit_hash };
    let (push_debug, result) = push(transport, &args.repo_url, &packfile, &[update], config);
    output.push_debug_info = Some(push_debug);
    result?;
    Ok(())
}

fn build_commit(
    store: &mut ObjectStore,
    merge_result: &MergeResult,
    parent: Sha1Hash,
    message: String,
    author: wiregit_core::Signature,
    committer: wiregit_core::Signature,
) -> Sha1Hash {
    store.insert(Object::Commit(Commit {
        tree: merge_result.tree_hash,
        parents: vec![parent],
        author,
        committer,
        message,
    }))
}
