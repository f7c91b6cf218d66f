//! Composite Git history operations against a remote repository.
//!
//! Every operation here is a fetch→compute→push pipeline executed entirely
//! in memory: commits, trees, and (only when needed) blobs are pulled with
//! partial-clone filters, the history surgery happens in an object store
//! that lives for the duration of the call, and the outcome lands on the
//! remote as one atomic ref update. There is no working tree, no local
//! `.git`, and no persistent state.
//!
//! Operations take a [`Transport`], a [`RequestConfig`], and a plain
//! argument record; they return an output record carrying results, opaque
//! debug telemetry, and (instead of a panic or a bare `Err`) an error
//! message alongside whatever partial results were produced.

mod common;

pub mod backport;
pub mod branching_point;
pub mod cherry_pick;
pub mod commits;
pub mod files;
pub mod ls_refs;
pub mod merge_base;
pub mod modified_files;
pub mod rebase;
pub mod regexp_matches;
pub mod update_refs;

pub use backport::{backport, BackportArgs, BackportCommandResult, BackportOutput};
pub use branching_point::{
    get_branching_point, GetBranchingPointArgs, GetBranchingPointOutput,
};
pub use cherry_pick::{squash_cherry_pick, SquashCherryPickArgs, SquashCherryPickOutput};
pub use commits::{get_commits, CommitInfo, GetCommitsArgs, GetCommitsOutput};
pub use files::{get_files, GetFilesArgs, GetFilesOutput};
pub use ls_refs::{ls_refs, LsRefsArgs, LsRefsOutput};
pub use merge_base::{get_merge_base, FoundMergeBase, GetMergeBaseArgs, GetMergeBaseOutput};
pub use modified_files::{get_modified_files, GetModifiedFilesArgs, GetModifiedFilesOutput};
pub use rebase::{linear_rebase, LinearRebaseArgs, LinearRebaseOutput, LinearRebaseRef};
pub use regexp_matches::{
    get_modified_files_regexp_matches, GetModifiedFilesRegexpMatchesArgs,
    GetModifiedFilesRegexpMatchesOutput, ModificationStatus, ModifiedFile,
    ModifiedFilePattern, PatternMatch,
};
pub use update_refs::{update_refs, RefUpdateCommand, UpdateRefsArgs, UpdateRefsOutput};

pub use wiregit_core::Sha1Hash;
pub use wiregit_proto::{
    FetchDebugInfo, LsRefsDebugInfo, PushDebugInfo, RefInfo, RequestConfig,
    RequestDecorator, Transport,
};
