//! Branching-point discovery with shallow-depth doubling

use crate::common::{error_string, load_pack, parse_hash};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use wiregit_core::{Object, ObjectStore, Sha1Hash};
use wiregit_proto::{fetch_commits, FetchDebugInfo, RequestConfig, Transport};

const DEFAULT_INITIAL_DEPTH: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetBranchingPointArgs {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    pub main_ref_hash: String,
    pub feature_ref_hash: String,
    /// Starting fetch depth; doubled until the walk succeeds. Zero means
    /// the default of 100. Negative means start by taking all the commits
    /// in a single unbounded fetch.
    #[serde(default)]
    pub initial_depth: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetBranchingPointOutput {
    pub branching_point_hash: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fetch_debug_infos: Vec<FetchDebugInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Walk the feature branch back to the first commit on main.
///
/// Fetches both heads commits-only at the current depth; when the walk
/// runs off the shallow boundary the depth doubles and the fetch restarts.
/// A negative initial depth skips the shallow loop and fetches the whole
/// history up front. The feature history must be strictly linear: merge
/// commits on main are tolerated, merge commits on the feature walk are an
/// error.
pub fn get_branching_point(
    transport: &Transport,
    config: &RequestConfig,
    args: &GetBranchingPointArgs,
) -> GetBranchingPointOutput {
    let mut output = GetBranchingPointOutput::default();
    match run(transport, config, args, &mut output) {
        Ok(found) => output.branching_point_hash = found.to_hex(),
        Err(e) => {
            output.branching_point_hash = Sha1Hash::ZERO.to_hex();
            output.error = Some(error_string(&e));
        }
    }
    output
}

#[derive(Debug)]
enum Walk {
    Found(Sha1Hash),
    NeedMoreCommits,
}

fn run(
    transport: &Transport,
    config: &RequestConfig,
    args: &GetBranchingPointArgs,
    output: &mut GetBranchingPointOutput,
) -> Result<Sha1Hash> {
    let main_head = parse_hash("mainRefHash", &args.main_ref_hash)?;
    let feature_head = parse_hash("featureRefHash", &args.feature_ref_hash)?;
    // None means unbounded: take all the commits in one fetch.
    let mut depth: Option<u32> = match args.initial_depth {
        d if d < 0 => None,
        0 => Some(DEFAULT_INITIAL_DEPTH),
        d => Some(u32::try_from(d).unwrap_or(u32::MAX)),
    };

    loop {
        let (pack, debug_info) = fetch_commits(
            transport,
            &args.repo_url,
            &[main_head, feature_head],
            &[],
            depth,
            config,
        )?;
        output.fetch_debug_infos.push(debug_info);

        let mut store = ObjectStore::new();
        load_pack(&mut store, &pack)?;

        match find_branching_point(&store, main_head, feature_head)? {
            Walk::Found(hash) => return Ok(hash),
            Walk::NeedMoreCommits => match depth {
                Some(d) => {
                    tracing::debug!(depth = d, "hit shallow boundary, doubling depth");
                    depth = Some(d * 2);
                }
                None => {
                    // The whole history was fetched; a missing commit
                    // cannot be fixed by fetching deeper.
                    anyhow::bail!(
                        "feature history references a commit the remote did not send"
                    );
                }
            },
        }
    }
}

fn find_branching_point(
    store: &ObjectStore,
    main_head: Sha1Hash,
    feature_head: Sha1Hash,
) -> Result<Walk> {
    let main_reachable = reachable(store, main_head);
    let mut current = feature_head;
    loop {
        let Some(object) = store.get(&current) else {
            // Ran off the shallow clone boundary.
            return Ok(Walk::NeedMoreCommits);
        };
        let Object::Commit(commit) = object else {
            anyhow::bail!("object {} is not a commit", current);
        };
        match commit.parents.len() {
            0 => anyhow::bail!("feature branch has an independent history"),
            1 => {}
            _ => anyhow::bail!("feature branch has a merge commit"),
        }
        let parent = commit.parents[0];
        if main_reachable.contains(&parent) {
            return Ok(Walk::Found(parent));
        }
        current = parent;
    }
}

/// Reachability over the fetched subgraph; the shallow boundary simply
/// stops the walk.
fn reachable(store: &ObjectStore, start: Sha1Hash) -> HashSet<Sha1Hash> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([start]);
    while let Some(current) = queue.pop_front() {
        if !seen.insert(current) {
            continue;
        }
        if let Some(Object::Commit(commit)) = store.get(&current) {
            queue.extend(commit.parents.iter().copied());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use wiregit_core::{Commit, Signature, Tree};

    fn commit(store: &mut ObjectStore, parents: Vec<Sha1Hash>, n: u32) -> Sha1Hash {
        let tree = store.insert(Object::Tree(Tree::new()));
        let sig = Signature {
            name: "t".into(),
            email: "t@x".into(),
            when: FixedOffset::east_opt(0)
                .unwrap()
                .timestamp_opt(1700000000 + n as i64, 0)
                .single()
                .unwrap(),
        };
        store.insert(Object::Commit(Commit {
            tree,
            parents,
            author: sig.clone(),
            committer: sig,
            message: format!("c{}", n),
        }))
    }

    #[test]
    fn test_walk_finds_branch_point() -> Result<()> {
        let mut store = ObjectStore::new();
        let base = commit(&mut store, vec![], 0);
        let fork = commit(&mut store, vec![base], 1);
        let main2 = commit(&mut store, vec![fork], 2);
        let feat1 = commit(&mut store, vec![fork], 3);
        let feat2 = commit(&mut store, vec![feat1], 4);

        match find_branching_point(&store, main2, feat2)? {
            Walk::Found(hash) => assert_eq!(hash, fork),
            Walk::NeedMoreCommits => panic!("expected a result"),
        }
        Ok(())
    }

    #[test]
    fn test_walk_hits_shallow_boundary() -> Result<()> {
        let mut store = ObjectStore::new();
        // Feature parent chain references a commit that is not in the
        // store, as after a too-shallow fetch.
        let missing = wiregit_core::hash_bytes(b"beyond the boundary");
        let feat = commit(&mut store, vec![missing], 1);
        let main = commit(&mut store, vec![], 2);

        match find_branching_point(&store, main, feat)? {
            Walk::NeedMoreCommits => Ok(()),
            Walk::Found(_) => panic!("expected a boundary miss"),
        }
    }

    #[test]
    fn test_merge_commit_on_feature_rejected() {
        let mut store = ObjectStore::new();
        let base = commit(&mut store, vec![], 0);
        let a = commit(&mut store, vec![base], 1);
        let b = commit(&mut store, vec![base], 2);
        let merge = commit(&mut store, vec![a, b], 3);

        let err = find_branching_point(&store, base, merge).unwrap_err();
        assert!(err.to_string().contains("merge commit"));
    }

    #[test]
    fn test_independent_history_rejected() {
        let mut store = ObjectStore::new();
        let main = commit(&mut store, vec![], 0);
        let lone = commit(&mut store, vec![], 1);
        let feat = commit(&mut store, vec![lone], 2);

        let err = find_branching_point(&store, main, feat).unwrap_err();
        assert!(err.to_string().contains("independent history"));
    }

    #[test]
    fn test_merge_on_main_tolerated() -> Result<()> {
        let mut store = ObjectStore::new();
        let base = commit(&mut store, vec![], 0);
        let m1 = commit(&mut store, vec![base], 1);
        let m2 = commit(&mut store, vec![base], 2);
        let main_merge = commit(&mut store, vec![m1, m2], 3);
        let feat = commit(&mut store, vec![m2], 4);

        match find_branching_point(&store, main_merge, feat)? {
            Walk::Found(hash) => assert_eq!(hash, m2),
            Walk::NeedMoreCommits => panic!("expected a result"),
        }
        Ok(())
    }
}
