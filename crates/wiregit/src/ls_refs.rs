//! List remote refs

use crate::common::error_string;
use serde::{Deserialize, Serialize};
use wiregit_proto::{LsRefsDebugInfo, RefInfo, RequestConfig, Transport};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LsRefsArgs {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    #[serde(default)]
    pub ref_prefixes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LsRefsOutput {
    pub refs: Vec<RefInfo>,
    pub debug_info: LsRefsDebugInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// List refs matching the requested prefixes.
pub fn ls_refs(transport: &Transport, config: &RequestConfig, args: &LsRefsArgs) -> LsRefsOutput {
    match wiregit_proto::ls_refs(transport, &args.repo_url, &args.ref_prefixes, config) {
        Ok((refs, debug_info)) => LsRefsOutput { refs, debug_info, error: None },
        Err(e) => LsRefsOutput {
            refs: Vec::new(),
            debug_info: LsRefsDebugInfo::default(),
            error: Some(error_string(&e.into())),
        },
    }
}
