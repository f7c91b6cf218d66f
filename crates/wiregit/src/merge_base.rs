//! Merge-base discovery with generation numbers

use crate::commits::parse_hashes;
use crate::common::{error_string, load_pack};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use wiregit_core::{ObjectStore, Sha1Hash};
use wiregit_proto::{fetch_commits, FetchDebugInfo, RequestConfig, Transport};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMergeBaseArgs {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    pub commit_hashes: Vec<String>,
}

/// A maximal common ancestor and its generation number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundMergeBase {
    pub commit_hash: String,
    pub generation: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMergeBaseOutput {
    pub merge_bases: Vec<FoundMergeBase>,
    pub fetch_debug_infos: Vec<FetchDebugInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Find every merge base of the given commits.
///
/// Fetches the full commit graph (`tree:0`, unbounded), assigns generation
/// numbers, intersects the reachability sets, and prunes common ancestors
/// that are reachable from another survivor.
pub fn get_merge_base(
    transport: &Transport,
    config: &RequestConfig,
    args: &GetMergeBaseArgs,
) -> GetMergeBaseOutput {
    let mut output = GetMergeBaseOutput::default();
    if let Err(e) = run(transport, config, args, &mut output) {
        output.error = Some(error_string(&e));
    }
    output
}

fn run(
    transport: &Transport,
    config: &RequestConfig,
    args: &GetMergeBaseArgs,
    output: &mut GetMergeBaseOutput,
) -> Result<()> {
    let commit_hashes = parse_hashes("commitHashes", &args.commit_hashes)?;
    if commit_hashes.is_empty() {
        anyhow::bail!("at least one commit hash is required");
    }

    let (pack, debug_info) =
        fetch_commits(transport, &args.repo_url, &commit_hashes, &[], None, config)?;
    output.fetch_debug_infos.push(debug_info);
    let mut store = ObjectStore::new();
    load_pack(&mut store, &pack)?;

    let generations = generation_numbers(&store)?;
    let bases = find_merge_bases(&store, &commit_hashes)?;

    let mut found: Vec<FoundMergeBase> = bases
        .into_iter()
        .map(|hash| FoundMergeBase {
            commit_hash: hash.to_hex(),
            generation: generations.get(&hash).copied().unwrap_or(0),
        })
        .collect();
    // Deepest first, hash as a tiebreak, for deterministic output.
    found.sort_by(|a, b| {
        b.generation.cmp(&a.generation).then_with(|| a.commit_hash.cmp(&b.commit_hash))
    });
    output.merge_bases = found;
    Ok(())
}

/// Generation numbers per commit-graph rules: roots are 1, every child is
/// one more than its deepest parent.
fn generation_numbers(store: &ObjectStore) -> Result<HashMap<Sha1Hash, usize>> {
    let mut pending_parents: HashMap<Sha1Hash, usize> = HashMap::new();
    let mut children: HashMap<Sha1Hash, Vec<Sha1Hash>> = HashMap::new();
    let mut roots: Vec<Sha1Hash> = Vec::new();
    for (&hash, commit) in store.commits() {
        // Parents beyond a shallow boundary are not in the store; treat
        // commits whose parents are all absent as roots of what we have.
        let present: Vec<Sha1Hash> =
            commit.parents.iter().copied().filter(|p| store.contains(p)).collect();
        pending_parents.insert(hash, present.len());
        if present.is_empty() {
            roots.push(hash);
        }
        for parent in present {
            children.entry(parent).or_default().push(hash);
        }
    }

    let mut generations: HashMap<Sha1Hash, usize> = HashMap::new();
    let mut queue: VecDeque<Sha1Hash> = VecDeque::new();
    for root in roots {
        generations.insert(root, 1);
        queue.push_back(root);
    }
    while let Some(current) = queue.pop_front() {
        let next = generations.get(&current).copied().unwrap_or(1) + 1;
        if let Some(kids) = children.get(&current) {
            for &child in kids {
                let slot = generations.entry(child).or_insert(0);
                if *slot < next {
                    *slot = next;
                }
                if let Some(remaining) = pending_parents.get_mut(&child) {
                    *remaining -= 1;
                    if *remaining == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }
    }
    Ok(generations)
}

fn find_merge_bases(store: &ObjectStore, heads: &[Sha1Hash]) -> Result<Vec<Sha1Hash>> {
    let mut common = reachable(store, heads[0])?;
    for &head in &heads[1..] {
        let reachable_from_head = reachable(store, head)?;
        common.retain(|hash| reachable_from_head.contains(hash));
    }

    // Prune non-maximal ancestors: anything reachable from another common
    // ancestor (other than itself) is not a merge base.
    let candidates: Vec<Sha1Hash> = common.iter().copied().collect();
    for candidate in candidates {
        if !common.contains(&candidate) {
            continue;
        }
        let below = reachable(store, candidate)?;
        for hash in below {
            if hash != candidate {
                common.remove(&hash);
            }
        }
    }
    Ok(common.into_iter().collect())
}

/// Every commit reachable from `start`, including itself. Commits past the
/// fetched boundary are skipped.
fn reachable(store: &ObjectStore, start: Sha1Hash) -> Result<HashSet<Sha1Hash>> {
    let mut seen: HashSet<Sha1Hash> = HashSet::new();
    let mut queue: VecDeque<Sha1Hash> = VecDeque::from([start]);
    while let Some(current) = queue.pop_front() {
        if !seen.insert(current) {
            continue;
        }
        match store.get(&current) {
            Some(wiregit_core::Object::Commit(commit)) => {
                queue.extend(commit.parents.iter().copied());
            }
            Some(_) => anyhow::bail!("object {} is not a commit", current),
            None => {
                // Outside the fetched graph.
                continue;
            }
        }
    }
    Ok(seen)
}
