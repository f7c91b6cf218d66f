//! wiregit command line front end
//!
//! Every subcommand maps to one library operation: flags in, a JSON
//! document out. A non-empty `error` field in the output also makes the
//! process exit non-zero, so scripted callers can check either.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use wiregit::{RequestConfig, RequestDecorator, Transport};

mod auth;

use auth::AuthDecorator;

/// Composite Git history operations against a remote repository
#[derive(Parser)]
#[command(name = "wiregit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// Optional authorization header sent on every HTTP request
    #[arg(long, global = true)]
    authz_header: Option<String>,

    /// Optional HTTP Basic Auth user
    #[arg(long, global = true)]
    basic_authz_user: Option<String>,

    /// Optional HTTP Basic Auth password
    #[arg(long, global = true)]
    basic_authz_password: Option<String>,

    /// Per-attempt fetch timeout in seconds
    #[arg(long, global = true)]
    fetch_timeout: Option<u64>,

    /// Whole-push timeout in seconds
    #[arg(long, global = true)]
    push_timeout: Option<u64>,

    /// Additional fetch attempts after the first failure
    #[arg(long, global = true, default_value_t = 0)]
    fetch_retry_count: u32,

    /// Output file path; '-' means stdout
    #[arg(long, global = true, default_value = "-")]
    output_file: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List remote refs matching prefixes
    LsRefs {
        #[arg(long)]
        repo_url: String,
        /// Ref prefix, repeatable (e.g. refs/heads/)
        #[arg(long = "ref-prefix")]
        ref_prefixes: Vec<String>,
    },
    /// Fetch commit metadata
    GetCommits {
        #[arg(long)]
        repo_url: String,
        #[arg(long, value_delimiter = ',')]
        want_commit_hashes: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        have_commit_hashes: Vec<String>,
    },
    /// Fetch file contents from a commit
    GetFiles {
        #[arg(long)]
        repo_url: String,
        #[arg(long)]
        commit_hash: String,
        #[arg(long, value_delimiter = ',')]
        file_paths: Vec<String>,
    },
    /// List files modified between two commits
    GetModifiedFiles {
        #[arg(long)]
        repo_url: String,
        #[arg(long)]
        commit_hash1: String,
        #[arg(long)]
        commit_hash2: String,
    },
    /// Modified files with per-pattern content match counts
    GetModifiedFilesRegexpMatches {
        #[arg(long)]
        repo_url: String,
        #[arg(long)]
        commit_hash1: String,
        #[arg(long)]
        commit_hash2: String,
        /// Patterns as a JSON object: {"name": {"filePathPatterns": [...],
        /// "fileContentPattern": "..."}}
        #[arg(long, default_value = "{}")]
        patterns: String,
    },
    /// Find merge bases of a set of commits
    GetMergeBase {
        #[arg(long)]
        repo_url: String,
        #[arg(long, value_delimiter = ',')]
        commit_hashes: Vec<String>,
    },
    /// Find where a feature branch forked off main
    GetBranchingPoint {
        #[arg(long)]
        repo_url: String,
        #[arg(long)]
        main_ref_hash: String,
        #[arg(long)]
        feature_ref_hash: String,
        /// Initial fetch depth (default 100), doubled until found; -1
        /// fetches all commits up front
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        initial_depth: i64,
    },
    /// Squash-cherry-pick a branch onto another as a single commit
    SquashCherryPick {
        #[arg(long)]
        repo_url: String,
        #[arg(long)]
        cherry_pick_from: String,
        #[arg(long)]
        cherry_pick_to: String,
        /// The merge base; changes from here to cherry-pick-from apply
        /// onto cherry-pick-to
        #[arg(long)]
        cherry_pick_base: String,
        #[arg(long)]
        commit_message: String,
        #[arg(long, default_value = "")]
        author: String,
        #[arg(long, default_value = "")]
        author_email: String,
        /// RFC 3339 (e.g. 2024-01-01T00:00:00Z); empty means now
        #[arg(long, default_value = "")]
        author_time: String,
        #[arg(long, default_value = "")]
        committer: String,
        #[arg(long, default_value = "")]
        committer_email: String,
        #[arg(long, default_value = "")]
        committer_time: String,
        /// Ref to push (e.g. refs/heads/foobar)
        #[arg(long = "ref")]
        ref_name: String,
        /// Ref pushed instead when conflicts stay open
        #[arg(long, default_value = "")]
        conflict_ref: String,
        /// Compare-and-swap: expected current hash of the ref
        #[arg(long, default_value = "")]
        current_ref_hash: String,
        /// Fail without pushing on unresolved conflicts
        #[arg(long)]
        abort_on_conflict: bool,
    },
    /// Sequentially cherry-pick commits onto a base
    Backport {
        #[arg(long)]
        repo_url: String,
        #[arg(long)]
        base_commit_hash: String,
        /// Commits to pick, in order
        #[arg(long, value_delimiter = ',')]
        backport_commits: Vec<String>,
        #[arg(long = "ref")]
        ref_name: String,
        #[arg(long, default_value = "")]
        current_ref_hash: String,
    },
    /// Rebase a stack of branches onto a new destination
    LinearRebase {
        #[arg(long)]
        repo_url: String,
        #[arg(long)]
        destination_commit: String,
        /// Branch with its base, as <ref>:<base-commit>; repeatable
        #[arg(long = "ref")]
        refs: Vec<String>,
    },
    /// Atomically update refs without any new objects
    UpdateRefs {
        #[arg(long)]
        repo_url: String,
        /// Update as <ref>:<old-hash>:<new-hash>; empty old-hash means
        /// unconditional, the zero hash means "must not exist"; repeatable
        #[arg(long = "ref-update")]
        ref_updates: Vec<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = RequestConfig {
        fetch_timeout: cli.common.fetch_timeout.map(Duration::from_secs),
        push_timeout: cli.common.push_timeout.map(Duration::from_secs),
        fetch_retry_count: cli.common.fetch_retry_count,
    };
    let decorator = AuthDecorator::from_flags(
        cli.common.authz_header.clone(),
        cli.common.basic_authz_user.clone(),
        cli.common.basic_authz_password.clone(),
    );
    let transport = match decorator {
        Some(decorator) => {
            Transport::with_decorator(Arc::new(decorator) as Arc<dyn RequestDecorator>)
        }
        None => Transport::new(),
    };

    let failed = match cli.command {
        Commands::LsRefs { repo_url, ref_prefixes } => {
            let output = wiregit::ls_refs(
                &transport,
                &config,
                &wiregit::LsRefsArgs { repo_url, ref_prefixes },
            );
            write_json(&cli.common.output_file, &output)?;
            output.error.is_some()
        }
        Commands::GetCommits { repo_url, want_commit_hashes, have_commit_hashes } => {
            let output = wiregit::get_commits(
                &transport,
                &config,
                &wiregit::GetCommitsArgs { repo_url, want_commit_hashes, have_commit_hashes },
            );
            write_json(&cli.common.output_file, &output)?;
            output.error.is_some()
        }
        Commands::GetFiles { repo_url, commit_hash, file_paths } => {
            let output = wiregit::get_files(
                &transport,
                &config,
                &wiregit::GetFilesArgs { repo_url, commit_hash, file_paths },
            );
            write_json(&cli.common.output_file, &output)?;
            output.error.is_some()
        }
        Commands::GetModifiedFiles { repo_url, commit_hash1, commit_hash2 } => {
            let output = wiregit::get_modified_files(
                &transport,
                &config,
                &wiregit::GetModifiedFilesArgs { repo_url, commit_hash1, commit_hash2 },
            );
            write_json(&cli.common.output_file, &output)?;
            output.error.is_some()
        }
        Commands::GetModifiedFilesRegexpMatches {
            repo_url,
            commit_hash1,
            commit_hash2,
            patterns,
        } => {
            let patterns: BTreeMap<String, wiregit::ModifiedFilePattern> =
                serde_json::from_str(&patterns).context("invalid --patterns JSON")?;
            let output = wiregit::get_modified_files_regexp_matches(
                &transport,
                &config,
                &wiregit::GetModifiedFilesRegexpMatchesArgs {
                    repo_url,
                    commit_hash1,
                    commit_hash2,
                    patterns,
                },
            );
            write_json(&cli.common.output_file, &output)?;
            output.error.is_some()
        }
        Commands::GetMergeBase { repo_url, commit_hashes } => {
            let output = wiregit::get_merge_base(
                &transport,
                &config,
                &wiregit::GetMergeBaseArgs { repo_url, commit_hashes },
            );
            write_json(&cli.common.output_file, &output)?;
            output.error.is_some()
        }
        Commands::GetBranchingPoint {
            repo_url,
            main_ref_hash,
            feature_ref_hash,
            initial_depth,
        } => {
            let output = wiregit::get_branching_point(
                &transport,
                &config,
                &wiregit::GetBranchingPointArgs {
                    repo_url,
                    main_ref_hash,
                    feature_ref_hash,
                    initial_depth,
                },
            );
            write_json(&cli.common.output_file, &output)?;
            output.error.is_some()
        }
        Commands::SquashCherryPick {
            repo_url,
            cherry_pick_from,
            cherry_pick_to,
            cherry_pick_base,
            commit_message,
            author,
            author_email,
            author_time,
            committer,
            committer_email,
            committer_time,
            ref_name,
            conflict_ref,
            current_ref_hash,
            abort_on_conflict,
        } => {
            let output = wiregit::squash_cherry_pick(
                &transport,
                &config,
                &wiregit::SquashCherryPickArgs {
                    repo_url,
                    cherry_pick_from,
                    cherry_pick_to,
                    cherry_pick_base,
                    commit_message,
                    author,
                    author_email,
                    author_time,
                    committer,
                    committer_email,
                    committer_time,
                    ref_name,
                    conflict_ref,
                    current_ref_hash,
                    abort_on_conflict,
                },
            );
            write_json(&cli.common.output_file, &output)?;
            output.error.is_some()
        }
        Commands::Backport {
            repo_url,
            base_commit_hash,
            backport_commits,
            ref_name,
            current_ref_hash,
        } => {
            let output = wiregit::backport(
                &transport,
                &config,
                &wiregit::BackportArgs {
                    repo_url,
                    base_commit_hash,
                    backport_commits,
                    ref_name,
                    current_ref_hash,
                },
            );
            write_json(&cli.common.output_file, &output)?;
            output.error.is_some()
        }
        Commands::LinearRebase { repo_url, destination_commit, refs } => {
            let refs = refs
                .iter()
                .map(|raw| parse_rebase_ref(raw))
                .collect::<Result<Vec<_>>>()?;
            let output = wiregit::linear_rebase(
                &transport,
                &config,
                &wiregit::LinearRebaseArgs { repo_url, destination_commit, refs },
            );
            write_json(&cli.common.output_file, &output)?;
            output.error.is_some()
        }
        Commands::UpdateRefs { repo_url, ref_updates } => {
            let ref_update_commands = ref_updates
                .iter()
                .map(|raw| parse_ref_update(raw))
                .collect::<Result<Vec<_>>>()?;
            let output = wiregit::update_refs(
                &transport,
                &config,
                &wiregit::UpdateRefsArgs { repo_url, ref_update_commands },
            );
            write_json(&cli.common.output_file, &output)?;
            output.error.is_some()
        }
    };

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

/// `<ref>:<base-commit>` (colons cannot appear in ref names)
fn parse_rebase_ref(raw: &str) -> Result<wiregit::LinearRebaseRef> {
    let (ref_name, base_commit) = raw
        .split_once(':')
        .with_context(|| format!("expected <ref>:<base-commit>, got {:?}", raw))?;
    Ok(wiregit::LinearRebaseRef {
        ref_name: ref_name.to_string(),
        base_commit: base_commit.to_string(),
    })
}

/// `<ref>:<old-hash>:<new-hash>`, old-hash possibly empty
fn parse_ref_update(raw: &str) -> Result<wiregit::RefUpdateCommand> {
    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() != 3 {
        anyhow::bail!("expected <ref>:<old-hash>:<new-hash>, got {:?}", raw);
    }
    Ok(wiregit::RefUpdateCommand {
        ref_name: parts[0].to_string(),
        old_hash: parts[1].to_string(),
        new_hash: parts[2].to_string(),
    })
}

fn write_json<T: Serialize>(output_path: &str, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    if output_path == "-" {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
    } else {
        std::fs::write(output_path, format!("{}\n", json))
            .with_context(|| format!("failed to write {}", output_path))?;
    }
    Ok(())
}
