//! Protocol v2 `fetch` variants
//!
//! Three request shapes cover everything the orchestrators need:
//!
//! | Variant | Filter | Depth |
//! |---|---|---|
//! | commits-only | `tree:0` | optional `deepen` |
//! | blob-none | `blob:none` | `deepen D` (omitted when zero) |
//! | blobs-only | none | none |
//!
//! Responses carry the packfile in sideband-64k framing inside the
//! `packfile` section; `shallow-info` is acknowledged and discarded.

use crate::config::RequestConfig;
use crate::error::WireError;
use crate::pktline::{parse_sideband, Band, Packet, PktReader};
use crate::request::encode_v2_request;
use crate::transport::{ResponseHeaders, Transport};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use wiregit_core::Sha1Hash;

/// Telemetry captured from one fetch round trip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchDebugInfo {
    pub response_headers: ResponseHeaders,
    /// Size of the fetched packfile in bytes
    pub packfile_size: usize,
}

/// Fetch commit objects only (`filter tree:0`), optionally shallow.
pub fn fetch_commits(
    transport: &Transport,
    repo_url: &str,
    wants: &[Sha1Hash],
    haves: &[Sha1Hash],
    depth: Option<u32>,
    config: &RequestConfig,
) -> Result<(Vec<u8>, FetchDebugInfo), WireError> {
    let mut args = want_have_args(wants, haves);
    args.push("no-progress".to_string());
    if let Some(depth) = depth {
        args.push(format!("deepen {}", depth));
    }
    args.push("filter tree:0".to_string());
    args.push("done".to_string());
    fetch_packfile(transport, repo_url, &encode_v2_request("fetch", &[], &args), config)
}

/// Fetch commits and trees but no blobs (`filter blob:none`).
///
/// A `depth` of zero means unbounded history.
pub fn fetch_blob_none(
    transport: &Transport,
    repo_url: &str,
    wants: &[Sha1Hash],
    depth: u32,
    config: &RequestConfig,
) -> Result<(Vec<u8>, FetchDebugInfo), WireError> {
    let mut args = want_have_args(wants, &[]);
    args.push("no-progress".to_string());
    if depth > 0 {
        args.push(format!("deepen {}", depth));
    }
    args.push("filter blob:none".to_string());
    args.push("done".to_string());
    fetch_packfile(transport, repo_url, &encode_v2_request("fetch", &[], &args), config)
}

/// Fetch specific objects with no filter; used to pull conflict blobs.
pub fn fetch_blobs(
    transport: &Transport,
    repo_url: &str,
    wants: &[Sha1Hash],
    config: &RequestConfig,
) -> Result<(Vec<u8>, FetchDebugInfo), WireError> {
    let mut args = want_have_args(wants, &[]);
    args.push("no-progress".to_string());
    args.push("done".to_string());
    fetch_packfile(transport, repo_url, &encode_v2_request("fetch", &[], &args), config)
}

fn want_have_args(wants: &[Sha1Hash], haves: &[Sha1Hash]) -> Vec<String> {
    let mut args: Vec<String> = wants.iter().map(|h| format!("want {}", h)).collect();
    args.extend(haves.iter().map(|h| format!("have {}", h)));
    args
}

fn fetch_packfile(
    transport: &Transport,
    repo_url: &str,
    body: &[u8],
    config: &RequestConfig,
) -> Result<(Vec<u8>, FetchDebugInfo), WireError> {
    transport.call_upload_pack(repo_url, body, config, |headers, data| {
        let packfile = parse_fetch_response(data)?;
        let debug = FetchDebugInfo {
            response_headers: headers.clone(),
            packfile_size: packfile.len(),
        };
        Ok((packfile, debug))
    })
}

/// Walk the v2 fetch response sections, concatenating band-1 payloads of the
/// `packfile` section.
fn parse_fetch_response(data: &[u8]) -> Result<Vec<u8>, WireError> {
    let mut reader = PktReader::new(Cursor::new(data));
    let mut packfile = Vec::new();
    let mut in_packfile = false;
    loop {
        match reader.read_packet()? {
            None | Some(Packet::Flush) | Some(Packet::ResponseEnd) => break,
            Some(Packet::Delim) => continue,
            Some(Packet::Data(payload)) => {
                if in_packfile {
                    let (band, content) = parse_sideband(&payload)?;
                    match band {
                        Band::Data => packfile.extend_from_slice(content),
                        Band::Progress => {
                            tracing::debug!(
                                progress = %String::from_utf8_lossy(content).trim_end(),
                                "remote progress"
                            );
                        }
                        Band::Error => {
                            return Err(WireError::Remote(
                                String::from_utf8_lossy(content).trim_end().to_string(),
                            ));
                        }
                    }
                    continue;
                }
                match payload.as_slice() {
                    b"packfile\n" => in_packfile = true,
                    b"shallow-info\n" => {}
                    line if line.starts_with(b"shallow ")
                        || line.starts_with(b"unshallow ") => {}
                    other => {
                        return Err(WireError::Section(
                            String::from_utf8_lossy(other).trim_end().to_string(),
                        ));
                    }
                }
            }
        }
    }
    Ok(packfile)
}
