//! Modified files with per-pattern content match counts

use crate::common::{error_string, load_pack, parse_hash};
use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use wiregit_core::{ObjectStore, Sha1Hash};
use wiregit_merge::{diff_trees, BlobChange};
use wiregit_proto::{fetch_blob_none, fetch_blobs, FetchDebugInfo, RequestConfig, Transport};

/// A named filter over modified files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedFilePattern {
    /// Glob patterns over the file path. A leading `!` negates; the last
    /// matching pattern decides.
    #[serde(default)]
    pub file_path_patterns: Vec<String>,

    /// Optional regular expression counted in the file content on both
    /// sides. Without it, presence on each side is reported as 0/1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_content_pattern: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetModifiedFilesRegexpMatchesArgs {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    pub commit_hash1: String,
    pub commit_hash2: String,
    #[serde(default)]
    pub patterns: BTreeMap<String, ModifiedFilePattern>,
}

/// How a path changed between the two commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModificationStatus {
    Added,
    Deleted,
    Modified,
}

/// Match counts on each side of the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternMatch {
    pub before: usize,
    pub after: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedFile {
    pub path: String,
    pub status: ModificationStatus,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub matches: BTreeMap<String, PatternMatch>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetModifiedFilesRegexpMatchesOutput {
    pub files: Vec<ModifiedFile>,
    pub fetch_debug_info: FetchDebugInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_fetch_debug_info: Option<FetchDebugInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Diff two commits, fetch the changed blobs, and report per-file pattern
/// match counts.
pub fn get_modified_files_regexp_matches(
    transport: &Transport,
    config: &RequestConfig,
    args: &GetModifiedFilesRegexpMatchesArgs,
) -> GetModifiedFilesRegexpMatchesOutput {
    let mut output = GetModifiedFilesRegexpMatchesOutput::default();
    if let Err(e) = run(transport, config, args, &mut output) {
        output.error = Some(error_string(&e));
    }
    output.files.sort_by(|a, b| a.path.cmp(&b.path));
    output
}

struct CompiledPattern {
    path_patterns: Vec<(bool, GlobMatcher)>,
    content: Option<Regex>,
}

fn compile(patterns: &BTreeMap<String, ModifiedFilePattern>) -> Result<BTreeMap<String, CompiledPattern>> {
    let mut compiled = BTreeMap::new();
    for (name, pattern) in patterns {
        let mut path_patterns = Vec::new();
        for raw in &pattern.file_path_patterns {
            let (negated, glob) = match raw.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, raw.as_str()),
            };
            let matcher = Glob::new(glob)
                .with_context(|| format!("invalid path pattern {:?} in {:?}", raw, name))?
                .compile_matcher();
            path_patterns.push((negated, matcher));
        }
        let content = pattern
            .file_content_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .with_context(|| format!("invalid content pattern in {:?}", name))?;
        compiled.insert(name.clone(), CompiledPattern { path_patterns, content });
    }
    Ok(compiled)
}

fn run(
    transport: &Transport,
    config: &RequestConfig,
    args: &GetModifiedFilesRegexpMatchesArgs,
    output: &mut GetModifiedFilesRegexpMatchesOutput,
) -> Result<()> {
    let hash1 = parse_hash("commitHash1", &args.commit_hash1)?;
    let hash2 = parse_hash("commitHash2", &args.commit_hash2)?;
    let patterns = compile(&args.patterns)?;

    let (pack, debug_info) =
        fetch_blob_none(transport, &args.repo_url, &[hash1, hash2], 1, config)?;
    output.fetch_debug_info = debug_info;
    let mut store = ObjectStore::new();
    load_pack(&mut store, &pack)?;

    let tree1 = store.tree(&store.tree_of(&hash1)?)?.clone();
    let tree2 = store.tree(&store.tree_of(&hash2)?)?.clone();
    let modified = diff_trees(&store, &tree1, &tree2)?;

    let wants: BTreeSet<Sha1Hash> = modified
        .values()
        .flat_map(|c| [c.before, c.after])
        .filter(|h| !h.is_zero())
        .collect();
    if !wants.is_empty() {
        let wants: Vec<Sha1Hash> = wants.into_iter().collect();
        let (pack, blob_debug) = fetch_blobs(transport, &args.repo_url, &wants, config)?;
        output.blob_fetch_debug_info = Some(blob_debug);
        load_pack(&mut store, &pack)?;
    }

    for (path, change) in modified {
        output.files.push(match_file(&store, &patterns, path, change)?);
    }
    Ok(())
}

fn match_file(
    store: &ObjectStore,
    patterns: &BTreeMap<String, CompiledPattern>,
    path: String,
    change: BlobChange,
) -> Result<ModifiedFile> {
    let status = match (change.before.is_zero(), change.after.is_zero()) {
        (true, _) => ModificationStatus::Added,
        (_, true) => ModificationStatus::Deleted,
        _ => ModificationStatus::Modified,
    };
    let before = if change.before.is_zero() {
        None
    } else {
        Some(store.blob(&change.before).with_context(|| format!("reading {}", path))?)
    };
    let after = if change.after.is_zero() {
        None
    } else {
        Some(store.blob(&change.after).with_context(|| format!("reading {}", path))?)
    };

    let mut matches = BTreeMap::new();
    for (name, pattern) in patterns {
        if !matches_path(&pattern.path_patterns, &path) {
            continue;
        }
        let counts = match &pattern.content {
            None => PatternMatch {
                before: usize::from(before.is_some()),
                after: usize::from(after.is_some()),
            },
            Some(regex) => PatternMatch {
                before: before.map(|c| regex.find_iter(c).count()).unwrap_or(0),
                after: after.map(|c| regex.find_iter(c).count()).unwrap_or(0),
            },
        };
        if counts.before == 0 && counts.after == 0 {
            continue;
        }
        matches.insert(name.clone(), counts);
    }
    Ok(ModifiedFile { path, status, matches })
}

/// Last matching glob wins; `!` patterns exclude.
fn matches_path(patterns: &[(bool, GlobMatcher)], path: &str) -> bool {
    for (negated, matcher) in patterns.iter().rev() {
        if matcher.is_match(path) {
            return !negated;
        }
    }
    false
}
