//! Protocol-level tests against a local repository over `file://`:
//! ls-refs, the three fetch variants, and a receive-pack push, each
//! exercised through the real `git` binary in stateless-RPC mode.

use anyhow::Result;
use chrono::{FixedOffset, TimeZone};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use wiregit_core::{
    read_pack, write_pack, Commit, Object, ObjectStore, Sha1Hash, Signature, Tree,
    TreeEntry,
};
use wiregit_proto::{
    fetch_blob_none, fetch_blobs, fetch_commits, ls_refs, push, RefUpdate, RequestConfig,
    Transport,
};

macro_rules! require_git {
    () => {
        if Command::new("git").arg("--version").output().is_err() {
            eprintln!("skipping: git binary not available");
            return Ok(());
        }
    };
}

struct Remote {
    _tmp: TempDir,
    dir: PathBuf,
}

impl Remote {
    fn new() -> Result<Self> {
        let tmp = TempDir::new()?;
        let dir = tmp.path().to_path_buf();
        let remote = Self { _tmp: tmp, dir };
        remote.git(&["init", "--quiet", "--initial-branch=main"])?;
        remote.git(&["config", "user.name", "wiregit-test"])?;
        remote.git(&["config", "user.email", "wiregit-test@nonexistent"])?;
        remote.git(&["config", "receive.denyCurrentBranch", "ignore"])?;
        Ok(remote)
    }

    fn url(&self) -> String {
        format!("file://{}", self.dir.display())
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        git_in(&self.dir, args)
    }

    fn commit_file(&self, name: &str, content: &str) -> Result<Sha1Hash> {
        std::fs::write(self.dir.join(name), content)?;
        self.git(&["add", name])?;
        self.git(&["commit", "-q", "-m", &format!("Write {}", name)])?;
        Sha1Hash::from_hex(self.git(&["rev-parse", "HEAD"])?.trim())
    }
}

fn git_in(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git").args(args).current_dir(dir).output()?;
    if !output.status.success() {
        anyhow::bail!("git {:?} failed: {}", args, String::from_utf8_lossy(&output.stderr));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn setup() -> (Transport, RequestConfig) {
    (Transport::new(), RequestConfig::default())
}

#[test]
fn test_ls_refs_over_file_transport() -> Result<()> {
    require_git!();
    let remote = Remote::new()?;
    let head = remote.commit_file("file.txt", "content\n")?;
    remote.git(&["branch", "side"])?;
    let (transport, config) = setup();

    let (refs, _debug) =
        ls_refs(&transport, &remote.url(), &["refs/heads/".to_string()], &config)?;
    let names: Vec<&str> = refs.iter().map(|r| r.name.as_str()).collect();
    assert!(names.contains(&"refs/heads/main"));
    assert!(names.contains(&"refs/heads/side"));
    let main = refs.iter().find(|r| r.name == "refs/heads/main").unwrap();
    assert_eq!(main.hash, head.to_hex());
    Ok(())
}

#[test]
fn test_commits_only_fetch_filters_trees() -> Result<()> {
    require_git!();
    let remote = Remote::new()?;
    remote.commit_file("one.txt", "1\n")?;
    let head = remote.commit_file("two.txt", "2\n")?;
    let (transport, config) = setup();

    let (pack, debug) =
        fetch_commits(&transport, &remote.url(), &[head], &[], None, &config)?;
    assert_eq!(debug.packfile_size, pack.len());

    let mut store = ObjectStore::new();
    read_pack(&pack, &mut store)?;

    // Both commits are present; the tree:0 filter kept trees and blobs out.
    let head_commit = store.commit(&head)?;
    assert_eq!(head_commit.parents.len(), 1);
    assert!(store.commit(&head_commit.parents[0]).is_ok());
    assert!(store.tree(&head_commit.tree).is_err());
    Ok(())
}

#[test]
fn test_blob_none_fetch_has_trees_without_blobs() -> Result<()> {
    require_git!();
    let remote = Remote::new()?;
    let head = remote.commit_file("file.txt", "blob content\n")?;
    let (transport, config) = setup();

    let (pack, _debug) = fetch_blob_none(&transport, &remote.url(), &[head], 1, &config)?;
    let mut store = ObjectStore::new();
    read_pack(&pack, &mut store)?;

    let tree_hash = store.commit(&head)?.tree;
    let tree = store.tree(&tree_hash)?;
    let entry = tree.get("file.txt").expect("file entry");
    // The tree references the blob, but blob:none kept the blob itself out.
    assert!(store.blob(&entry.hash).is_err());

    // A blobs-only fetch backfills exactly that object.
    let wanted = entry.hash;
    let (blob_pack, _debug) = fetch_blobs(&transport, &remote.url(), &[wanted], &config)?;
    read_pack(&blob_pack, &mut store)?;
    assert_eq!(store.blob(&wanted)?, b"blob content\n");
    Ok(())
}

#[test]
fn test_shallow_fetch_cuts_history() -> Result<()> {
    require_git!();
    let remote = Remote::new()?;
    remote.commit_file("f.txt", "1\n")?;
    remote.commit_file("f.txt", "2\n")?;
    let head = remote.commit_file("f.txt", "3\n")?;
    let (transport, config) = setup();

    let (pack, _debug) =
        fetch_commits(&transport, &remote.url(), &[head], &[], Some(2), &config)?;
    let mut store = ObjectStore::new();
    read_pack(&pack, &mut store)?;

    // Depth 2: head and its parent, but not the grandparent.
    let parent = store.commit(&head)?.parents[0];
    let grandparent = store.commit(&parent)?.parents[0];
    assert!(store.get(&grandparent).is_none());
    Ok(())
}

#[test]
fn test_push_creates_ref_with_new_objects() -> Result<()> {
    require_git!();
    let remote = Remote::new()?;
    let head = remote.commit_file("file.txt", "base\n")?;
    let (transport, config) = setup();

    // Build a child commit entirely in memory.
    let mut store = ObjectStore::new();
    let blob = store.insert(Object::Blob(b"pushed from memory\n".to_vec()));
    let tree =
        store.insert(Object::Tree(Tree::from_entries(vec![TreeEntry::file("greeting.txt", blob)])));
    let when =
        FixedOffset::east_opt(0).unwrap().timestamp_opt(1700000000, 0).single().unwrap();
    let signature = Signature {
        name: "wiregit-test".into(),
        email: "wiregit-test@nonexistent".into(),
        when,
    };
    let commit = store.insert(Object::Commit(Commit {
        tree,
        parents: vec![head],
        author: signature.clone(),
        committer: signature,
        message: "In-memory commit\n".into(),
    }));
    let pack = write_pack(&store, &[commit, tree, blob])?;

    let update = RefUpdate {
        name: "refs/heads/synth".to_string(),
        expected_old: Some(Sha1Hash::ZERO),
        new: commit,
    };
    let (debug, result) = push(&transport, &remote.url(), &pack, &[update], &config);
    result?;
    assert_eq!(debug.unpack_status.as_deref(), Some("ok"));
    assert_eq!(debug.command_statuses.len(), 1);
    assert_eq!(debug.command_statuses[0].status, "ok");

    assert_eq!(
        remote.git(&["rev-parse", "refs/heads/synth"])?.trim(),
        commit.to_hex()
    );
    assert_eq!(remote.git(&["show", "refs/heads/synth:greeting.txt"])?, "pushed from memory\n");
    Ok(())
}

#[test]
fn test_push_rejects_stale_expected_old() -> Result<()> {
    require_git!();
    let remote = Remote::new()?;
    let first = remote.commit_file("file.txt", "v1\n")?;
    let second = remote.commit_file("file.txt", "v2\n")?;
    let (transport, config) = setup();

    let empty_pack = write_pack(&ObjectStore::new(), &[])?;
    let update = RefUpdate {
        name: "refs/heads/main".to_string(),
        // main is at `second`; expecting `first` must fail.
        expected_old: Some(first),
        new: first,
    };
    let (_debug, result) = push(&transport, &remote.url(), &empty_pack, &[update], &config);
    assert!(result.is_err());
    assert_eq!(remote.git(&["rev-parse", "refs/heads/main"])?.trim(), second.to_hex());
    Ok(())
}
