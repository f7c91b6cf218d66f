//! Linear rebase of stacked branches

use crate::common::{dedup_hashes, error_string, load_pack, parse_hash};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use wiregit_core::{write_pack, Commit, Object, ObjectStore, Sha1Hash};
use wiregit_merge::{merge_trees, BlobCollector, Diff3Resolver};
use wiregit_proto::{
    fetch_blob_none, fetch_blobs, ls_refs, push, FetchDebugInfo, LsRefsDebugInfo,
    PushDebugInfo, RefUpdate, RequestConfig, Transport,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearRebaseArgs {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    /// Commit the stack is replayed onto
    pub destination_commit: String,
    /// The stacked branches, each with the commit its commits start after.
    /// Stacked means every branch's base is the head of the branch below.
    pub refs: Vec<LinearRebaseRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearRebaseRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub base_commit: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearRebaseResult {
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// New head of the branch after the rebase
    pub commit_hash: String,
    pub conflict_open_files: Vec<String>,
    pub conflict_resolved_files: Vec<String>,
    pub binary_conflict_files: Vec<String>,
    pub non_file_conflict_files: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearRebaseOutput {
    pub linear_rebase_results: Vec<LinearRebaseResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ls_refs_debug_info: Option<LsRefsDebugInfo>,
    pub fetch_debug_infos: Vec<FetchDebugInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_debug_info: Option<PushDebugInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Rebase a stack of branches onto a new destination and push every branch
/// atomically with its original head as the compare-and-swap value.
///
/// Any unresolved conflict aborts the whole rebase; nothing is pushed.
pub fn linear_rebase(
    transport: &Transport,
    config: &RequestConfig,
    args: &LinearRebaseArgs,
) -> LinearRebaseOutput {
    let mut output = LinearRebaseOutput::default();
    if let Err(e) = run(transport, config, args, &mut output) {
        output.error = Some(error_string(&e));
    }
    output
}

#[derive(Debug, Clone)]
struct Branch {
    ref_name: String,
    base: Sha1Hash,
    head: Sha1Hash,
    /// Branch commits, newest first, filled by the walk
    commits: Vec<Sha1Hash>,
}

fn run(
    transport: &Transport,
    config: &RequestConfig,
    args: &LinearRebaseArgs,
    output: &mut LinearRebaseOutput,
) -> Result<()> {
    let destination = parse_hash("destinationCommit", &args.destination_commit)?;

    // Resolve each ref's current head.
    let ref_names: Vec<String> = args.refs.iter().map(|r| r.ref_name.clone()).collect();
    let (resolved, ls_debug) = ls_refs(transport, &args.repo_url, &ref_names, config)?;
    output.ls_refs_debug_info = Some(ls_debug);
    let mut head_by_name: HashMap<&str, Sha1Hash> = HashMap::new();
    for info in &resolved {
        head_by_name.insert(info.name.as_str(), parse_hash("ref hash", &info.hash)?);
    }

    let mut branches = Vec::new();
    for r in &args.refs {
        let head = head_by_name
            .get(r.ref_name.as_str())
            .copied()
            .with_context(|| format!("ref {} not found in the repository", r.ref_name))?;
        branches.push(Branch {
            ref_name: r.ref_name.clone(),
            base: parse_hash("baseCommit", &r.base_commit)?,
            head,
            commits: Vec::new(),
        });
    }

    // Full history per branch: no depth limit, trees but no blobs.
    let mut wants = vec![destination];
    for branch in &branches {
        wants.push(branch.head);
        wants.push(branch.base);
    }
    let (pack, fetch_debug) =
        fetch_blob_none(transport, &args.repo_url, &dedup_hashes(wants), 0, config)?;
    output.fetch_debug_infos.push(fetch_debug);
    let mut store = ObjectStore::new();
    load_pack(&mut store, &pack)?;

    let mut branches = order_stack(branches)?;
    for branch in &mut branches {
        collect_branch_commits(&store, branch)?;
    }

    let mut rebaser = Rebaser {
        transport,
        config,
        repo_url: &args.repo_url,
        store,
        new_hashes: Vec::new(),
    };
    let mut next_destination = destination;
    let mut new_heads = Vec::new();
    for branch in &branches {
        let (result, outcome) = rebaser.rebase_branch(next_destination, branch, output);
        output.linear_rebase_results.push(result);
        next_destination = outcome
            .with_context(|| format!("failed to rebase branch {}", branch.ref_name))?;
        new_heads.push(next_destination);
    }

    let packfile = write_pack(&rebaser.store, &dedup_hashes(rebaser.new_hashes))?;
    let updates: Vec<RefUpdate> = branches
        .iter()
        .zip(&new_heads)
        .map(|(branch, &new_head)| RefUpdate {
            name: branch.ref_name.clone(),
            expected_old: Some(branch.head),
            new: new_head,
        })
        .collect();
    let (push_debug, result) = push(transport, &args.repo_url, &packfile, &updates, config);
    output.push_debug_info = Some(push_debug);
    result.context("failed to push rebased branches")?;
    Ok(())
}

/// Order branches root-to-leaf by following head-to-base links.
///
/// The stack must form a single chain: exactly one branch whose base is
/// nobody's head (the root), and at most one child per head. Duplicate
/// heads make the linkage ambiguous and are rejected.
fn order_stack(branches: Vec<Branch>) -> Result<Vec<Branch>> {
    let mut by_head: HashMap<Sha1Hash, usize> = HashMap::new();
    for (index, branch) in branches.iter().enumerate() {
        if by_head.insert(branch.head, index).is_some() {
            anyhow::bail!("two branches point at the same commit {}", branch.head);
        }
    }

    let mut roots =
        branches.iter().enumerate().filter(|(_, b)| !by_head.contains_key(&b.base));
    let root = match (roots.next(), roots.next()) {
        (Some((index, _)), None) => index,
        (Some(_), Some(_)) => anyhow::bail!("branches have multiple roots, not a stack"),
        (None, _) => anyhow::bail!("branches form a cycle, not a stack"),
    };

    let mut by_base: HashMap<Sha1Hash, usize> = HashMap::new();
    for (index, branch) in branches.iter().enumerate() {
        if by_base.insert(branch.base, index).is_some() {
            anyhow::bail!("two branches share the base {}", branch.base);
        }
    }

    let mut order = vec![root];
    while let Some(&child) = by_base.get(&branches[order[order.len() - 1]].head) {
        order.push(child);
    }
    if order.len() != branches.len() {
        anyhow::bail!("branches do not form a single stacked chain");
    }

    let mut slots: Vec<Option<Branch>> = branches.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|index| slots[index].take()).collect())
}

/// Walk a branch from head down to its base, newest first. Every commit on
/// the way must have exactly one parent.
fn collect_branch_commits(store: &ObjectStore, branch: &mut Branch) -> Result<()> {
    branch.commits.push(branch.head);
    let mut current = branch.head;
    loop {
        let commit = store.commit(&current)?;
        if commit.parents.len() != 1 {
            anyhow::bail!(
                "branch {} has a commit with {} parents",
                branch.ref_name,
                commit.parents.len()
            );
        }
        let parent = commit.parents[0];
        if parent == branch.base {
            return Ok(());
        }
        branch.commits.push(parent);
        current = parent;
    }
}

struct Rebaser<'a> {
    transport: &'a Transport,
    config: &'a RequestConfig,
    repo_url: &'a str,
    store: ObjectStore,
    new_hashes: Vec<Sha1Hash>,
}

impl<'a> Rebaser<'a> {
    /// Replay one branch's commits, oldest first, onto `destination`.
    fn rebase_branch(
        &mut self,
        mut destination: Sha1Hash,
        branch: &Branch,
        output: &mut LinearRebaseOutput,
    ) -> (LinearRebaseResult, Result<Sha1Hash>) {
        let mut result =
            LinearRebaseResult { ref_name: branch.ref_name.clone(), ..Default::default() };
        for &commit_hash in branch.commits.iter().rev() {
            match self.replay_commit(destination, commit_hash, &mut result, output) {
                Ok(new_hash) => {
                    result.commit_hash = new_hash.to_hex();
                    destination = new_hash;
                }
                Err(e) => {
                    let err = e.context(format!("failed to replay commit {}", commit_hash));
                    return (result, Err(err));
                }
            }
        }
        (result, Ok(destination))
    }

    fn replay_commit(
        &mut self,
        destination: Sha1Hash,
        commit_hash: Sha1Hash,
        result: &mut LinearRebaseResult,
        output: &mut LinearRebaseOutput,
    ) -> Result<Sha1Hash> {
        let commit = self.store.commit(&commit_hash)?.clone();
        let tree_commit = commit.tree;
        let tree_parent = self.store.tree_of(&commit.parents[0])?;
        let tree_destination = self.store.tree_of(&destination)?;

        let mut collector = BlobCollector::new();
        let mut merge_result = merge_trees(
            &mut self.store,
            tree_commit,
            tree_destination,
            Some(tree_parent),
            &mut collector,
        )?;

        let mut resolver = Diff3Resolver::new("Rebase content", "Base content", ".rej", "");
        if !merge_result.conflicts.is_empty() {
            if !collector.blob_hashes.is_empty() {
                let wants = dedup_hashes(collector.blob_hashes);
                let (pack, blob_debug) =
                    fetch_blobs(self.transport, self.repo_url, &wants, self.config)?;
                output.fetch_debug_infos.push(blob_debug);
                load_pack(&mut self.store, &pack)?;
            }
            merge_result = merge_trees(
                &mut self.store,
                tree_commit,
                tree_destination,
                Some(tree_parent),
                &mut resolver,
            )?;
        }

        result.conflict_open_files.extend(resolver.open_conflicts.iter().cloned());
        result
            .conflict_resolved_files
            .extend(resolver.resolved_conflicts.iter().cloned());
        result.binary_conflict_files.extend(resolver.binary_conflicts.iter().cloned());
        result
            .non_file_conflict_files
            .extend(resolver.non_file_conflicts.iter().cloned());
        if resolver.has_unresolved() {
            anyhow::bail!(
                "conflicts found: open files: {:?}, binary files: {:?}, non-file conflicts: {:?}",
                result.conflict_open_files,
                result.binary_conflict_files,
                result.non_file_conflict_files,
            );
        }

        let new_commit = Commit {
            tree: merge_result.tree_hash,
            parents: vec![destination],
            author: commit.author.clone(),
            committer: commit.committer.clone(),
            message: commit.message.clone(),
        };
        let new_hash = self.store.insert(Object::Commit(new_commit));
        self.new_hashes.push(new_hash);
        self.new_hashes.extend(merge_result.new_hashes);
        self.new_hashes.extend(resolver.new_hashes);
        Ok(new_hash)
    }
}
