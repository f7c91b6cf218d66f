//! Backport: replay a list of commits, in order, onto a base commit

use crate::common::{dedup_hashes, error_string, load_pack, parse_hash};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use wiregit_core::{write_pack, Commit, Object, ObjectStore, Sha1Hash};
use wiregit_merge::{merge_trees, BlobCollector, Diff3Resolver};
use wiregit_proto::{
    fetch_blob_none, fetch_blobs, push, FetchDebugInfo, PushDebugInfo, RefUpdate,
    RequestConfig, Transport,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackportArgs {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    /// Commit the backports start from
    pub base_commit_hash: String,
    /// Commits to cherry-pick, applied in list order
    pub backport_commits: Vec<String>,
    /// Ref updated to the final tip
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// Compare-and-swap precondition; empty for none
    #[serde(default)]
    pub current_ref_hash: String,
}

/// Outcome of one cherry-picked commit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackportCommandResult {
    /// The replayed commit, empty when the pick conflicted
    pub commit_hash: String,
    pub conflict_resolved_files: Vec<String>,
    pub conflict_unresolved_files: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackportOutput {
    pub command_results: Vec<BackportCommandResult>,
    pub fetch_debug_infos: Vec<FetchDebugInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_debug_info: Option<PushDebugInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Sequentially cherry-pick the listed commits onto `base` and push the
/// final tip.
///
/// Fails fast: the first commit with unresolved conflicts aborts the whole
/// backport; earlier clean picks are reported but never pushed.
pub fn backport(
    transport: &Transport,
    config: &RequestConfig,
    args: &BackportArgs,
) -> BackportOutput {
    let mut output = BackportOutput::default();
    if let Err(e) = run(transport, config, args, &mut output) {
        output.error = Some(error_string(&e));
    }
    output
}

struct Backport<'a> {
    transport: &'a Transport,
    config: &'a RequestConfig,
    repo_url: &'a str,
    store: ObjectStore,
    new_hashes: Vec<Sha1Hash>,
}

fn run(
    transport: &Transport,
    config: &RequestConfig,
    args: &BackportArgs,
    output: &mut BackportOutput,
) -> Result<()> {
    let base = parse_hash("baseCommitHash", &args.base_commit_hash)?;
    let mut targets = Vec::new();
    for raw in &args.backport_commits {
        targets.push(parse_hash("backportCommits", raw)?);
    }
    let current_ref_hash = if args.current_ref_hash.is_empty() {
        None
    } else {
        Some(parse_hash("currentRefHash", &args.current_ref_hash)?)
    };

    let mut state = Backport {
        transport,
        config,
        repo_url: &args.repo_url,
        store: ObjectStore::new(),
        new_hashes: Vec::new(),
    };

    // Depth 2 so each target commit's parent tree is in the pack.
    let wants = dedup_hashes(std::iter::once(base).chain(targets.iter().copied()));
    let (pack, debug) = fetch_blob_none(transport, &args.repo_url, &wants, 2, config)?;
    output.fetch_debug_infos.push(debug);
    load_pack(&mut state.store, &pack)?;

    let mut current = base;
    for target in targets {
        let (result, next) = state.cherry_pick(current, target, output)?;
        let conflicted = !result.conflict_unresolved_files.is_empty();
        output.command_results.push(result);
        if conflicted {
            anyhow::bail!("conflict found");
        }
        current = next;
    }

    let packfile = write_pack(&state.store, &dedup_hashes(state.new_hashes))?;
    let update = RefUpdate {
        name: args.ref_name.clone(),
        expected_old: current_ref_hash,
        new: current,
    };
    let (push_debug, result) = push(transport, &args.repo_url, &packfile, &[update], config);
    output.push_debug_info = Some(push_debug);
    result?;
    Ok(())
}

impl<'a> Backport<'a> {
    /// Replay `target` on top of `current`, returning the per-commit result
    /// and the new tip. A conflicted pick returns with an empty commit hash.
    fn cherry_pick(
        &mut self,
        current: Sha1Hash,
        target: Sha1Hash,
        output: &mut BackportOutput,
    ) -> Result<(BackportCommandResult, Sha1Hash)> {
        let target_commit = self.store.commit(&target)?.clone();
        if target_commit.parents.len() != 1 {
            anyhow::bail!(
                "commit {} has {} parents, expected 1",
                target,
                target_commit.parents.len()
            );
        }
        let parent = target_commit.parents[0];
        let tree_target = target_commit.tree;
        let tree_current = self.store.tree_of(&current)?;
        let tree_parent = self.store.tree_of(&parent)?;

        let mut collector = BlobCollector::new();
        let mut merge_result = merge_trees(
            &mut self.store,
            tree_target,
            tree_current,
            Some(tree_parent),
            &mut collector,
        )?;

        let mut resolver = Diff3Resolver::new("Squash content", "Base content", ".rej", "");
        if !merge_result.conflicts.is_empty() {
            let missing: Vec<Sha1Hash> = dedup_hashes(collector.blob_hashes)
                .into_iter()
                .filter(|h| !self.store.contains(h))
                .collect();
            if !missing.is_empty() {
                let (pack, blob_debug) =
                    fetch_blobs(self.transport, self.repo_url, &missing, self.config)?;
                output.fetch_debug_infos.push(blob_debug);
                load_pack(&mut self.store, &pack)?;
            }
            merge_result = merge_trees(
                &mut self.store,
                tree_target,
                tree_current,
                Some(tree_parent),
                &mut resolver,
            )?;
        }

        let mut unresolved = Vec::new();
        unresolved.extend(resolver.open_conflicts.iter().cloned());
        unresolved.extend(resolver.binary_conflicts.iter().cloned());
        unresolved.extend(resolver.non_file_conflicts.iter().cloned());
        let mut result = BackportCommandResult {
            commit_hash: String::new(),
            conflict_resolved_files: resolver.resolved_conflicts.clone(),
            conflict_unresolved_files: unresolved,
        };
        if !result.conflict_unresolved_files.is_empty() {
            return Ok((result, current));
        }

        let new_commit = Commit {
            tree: merge_result.tree_hash,
            parents: vec![current],
            author: target_commit.author.clone(),
            committer: target_commit.committer.clone(),
            message: format!("{}\n\nBackported from {}", target_commit.message, target),
        };
        let new_hash = self.store.insert(Object::Commit(new_commit));
        result.commit_hash = new_hash.to_hex();
        self.new_hashes.push(new_hash);
        self.new_hashes.extend(merge_result.new_hashes);
        self.new_hashes.extend(resolver.new_hashes);
        Ok((result, new_hash))
    }
}
