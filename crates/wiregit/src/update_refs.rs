//! Stateless atomic ref updates

use crate::common::{error_string, parse_hash};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use wiregit_core::{write_pack, ObjectStore};
use wiregit_proto::{PushDebugInfo, RefUpdate, RequestConfig, Transport};

/// One requested ref update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefUpdateCommand {
    /// Reference name to update, e.g. `refs/heads/main`
    pub ref_name: String,

    /// Expected current hash. An empty string updates unconditionally; the
    /// zero hash requires the ref to not exist yet. Note that at the
    /// transport level every update is a force update; fast-forward checks
    /// are the caller's job.
    #[serde(default)]
    pub old_hash: String,

    /// Hash the ref should point at afterwards
    pub new_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRefsArgs {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    pub ref_update_commands: Vec<RefUpdateCommand>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRefsOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_debug_info: Option<PushDebugInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Apply the given ref updates in one atomic push.
///
/// The wire protocol requires a packfile section even for pure ref
/// operations, so an empty (zero-object) pack is sent.
pub fn update_refs(
    transport: &Transport,
    config: &RequestConfig,
    args: &UpdateRefsArgs,
) -> UpdateRefsOutput {
    let mut output = UpdateRefsOutput::default();
    if let Err(e) = run(transport, config, args, &mut output) {
        output.error = Some(error_string(&e));
    }
    output
}

fn run(
    transport: &Transport,
    config: &RequestConfig,
    args: &UpdateRefsArgs,
    output: &mut UpdateRefsOutput,
) -> Result<()> {
    let mut updates = Vec::new();
    for command in &args.ref_update_commands {
        let expected_old = if command.old_hash.is_empty() {
            None
        } else {
            Some(parse_hash("oldHash", &command.old_hash)?)
        };
        updates.push(RefUpdate {
            name: command.ref_name.clone(),
            expected_old,
            new: parse_hash("newHash", &command.new_hash)?,
        });
    }

    let empty_pack = write_pack(&ObjectStore::new(), &[])?;
    let (debug, result) =
        wiregit_proto::push(transport, &args.repo_url, &empty_pack, &updates, config);
    output.push_debug_info = Some(debug);
    result?;
    Ok(())
}
