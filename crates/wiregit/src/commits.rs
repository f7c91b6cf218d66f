//! Fetch commit metadata

use crate::common::{error_string, load_pack, parse_hash};
use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use wiregit_core::{ObjectStore, Sha1Hash, Signature};
use wiregit_proto::{fetch_commits, FetchDebugInfo, RequestConfig, Transport};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCommitsArgs {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    #[serde(default)]
    pub want_commit_hashes: Vec<String>,
    #[serde(default)]
    pub have_commit_hashes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSignature {
    pub name: String,
    pub email: String,
    pub timestamp: DateTime<FixedOffset>,
}

impl From<&Signature> for CommitSignature {
    fn from(sig: &Signature) -> Self {
        Self { name: sig.name.clone(), email: sig.email.clone(), timestamp: sig.when }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub hash: String,
    pub author: CommitSignature,
    pub committer: CommitSignature,
    pub message: String,
    pub tree_hash: String,
    pub parent_hashes: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCommitsOutput {
    pub commits: Vec<CommitInfo>,
    pub debug_info: FetchDebugInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fetch the wanted commits (minus the haves) with a `tree:0` filter and
/// return their parsed metadata.
pub fn get_commits(
    transport: &Transport,
    config: &RequestConfig,
    args: &GetCommitsArgs,
) -> GetCommitsOutput {
    let mut output = GetCommitsOutput::default();
    if let Err(e) = run(transport, config, args, &mut output) {
        output.error = Some(error_string(&e));
    }
    output
}

fn run(
    transport: &Transport,
    config: &RequestConfig,
    args: &GetCommitsArgs,
    output: &mut GetCommitsOutput,
) -> Result<()> {
    let wants = parse_hashes("wantCommitHashes", &args.want_commit_hashes)?;
    let haves = parse_hashes("haveCommitHashes", &args.have_commit_hashes)?;

    let (pack, debug_info) =
        fetch_commits(transport, &args.repo_url, &wants, &haves, None, config)?;
    output.debug_info = debug_info;

    let mut store = ObjectStore::new();
    load_pack(&mut store, &pack)?;
    for (hash, commit) in store.commits() {
        output.commits.push(CommitInfo {
            hash: hash.to_hex(),
            author: (&commit.author).into(),
            committer: (&commit.committer).into(),
            message: commit.message.clone(),
            tree_hash: commit.tree.to_hex(),
            parent_hashes: commit.parents.iter().map(|p| p.to_hex()).collect(),
        });
    }
    Ok(())
}

pub(crate) fn parse_hashes(field: &str, values: &[String]) -> Result<Vec<Sha1Hash>> {
    values.iter().map(|v| parse_hash(field, v)).collect()
}
