//! Receive-pack push session
//!
//! Two round trips: the reference advertisement, then the command list and
//! packfile. Every push requests the `atomic` capability so the server
//! applies all ref updates or none of them.

use crate::config::RequestConfig;
use crate::error::WireError;
use crate::pktline::{self, Packet, PktReader};
use crate::transport::{ResponseHeaders, Transport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::time::{Duration, Instant};
use wiregit_core::Sha1Hash;

const AGENT: &str = concat!("agent=wiregit/", env!("CARGO_PKG_VERSION"));

/// One requested ref update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    /// Full ref name, e.g. `refs/heads/main`
    pub name: String,

    /// Expected current value. `None` updates unconditionally (the
    /// advertised value is used as the old side); the zero hash demands
    /// that the ref not exist yet.
    pub expected_old: Option<Sha1Hash>,

    /// Value the ref should point at after the push
    pub new: Sha1Hash,
}

/// Per-command status reported by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushCommandStatus {
    pub name: String,
    pub status: String,
}

/// Telemetry captured from a push session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushDebugInfo {
    pub ref_adv_response_headers: ResponseHeaders,
    pub push_response_headers: ResponseHeaders,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unpack_status: Option<String>,
    pub command_statuses: Vec<PushCommandStatus>,
    pub packfile_size: usize,
}

/// Push a packfile and a set of atomic ref updates.
///
/// The debug record is returned alongside the outcome so callers can report
/// what the server said even when the push failed.
pub fn push(
    transport: &Transport,
    repo_url: &str,
    packfile: &[u8],
    updates: &[RefUpdate],
    config: &RequestConfig,
) -> (PushDebugInfo, Result<(), WireError>) {
    let mut debug = PushDebugInfo { packfile_size: packfile.len(), ..Default::default() };
    let result = run_session(transport, repo_url, packfile, updates, config, &mut debug);
    (debug, result)
}

fn run_session(
    transport: &Transport,
    repo_url: &str,
    packfile: &[u8],
    updates: &[RefUpdate],
    config: &RequestConfig,
    debug: &mut PushDebugInfo,
) -> Result<(), WireError> {
    let deadline = config.push_timeout.map(|t| Instant::now() + t);

    let (headers, advertisement) =
        transport.receive_pack_advertisement(repo_url, remaining(deadline, config)?)?;
    debug.ref_adv_response_headers = headers;
    let advertised = parse_advertisement(&advertisement)?;

    let mut body = encode_commands(updates, &advertised);
    body.extend_from_slice(packfile);

    let (headers, response) =
        transport.receive_pack(repo_url, body, remaining(deadline, config)?)?;
    debug.push_response_headers = headers;
    parse_report_status(&response, debug)
}

/// Encode the command list. The first command carries the capability
/// string; the old side of each command is the explicit expectation, the
/// advertised value, or the zero hash, in that order.
fn encode_commands(
    updates: &[RefUpdate],
    advertised: &BTreeMap<String, Sha1Hash>,
) -> Vec<u8> {
    let mut body = Vec::new();
    for (index, update) in updates.iter().enumerate() {
        let old = update
            .expected_old
            .or_else(|| advertised.get(&update.name).copied())
            .unwrap_or(Sha1Hash::ZERO);
        let mut line = format!("{} {} {}", old, update.new, update.name);
        if index == 0 {
            line.push('\0');
            line.push_str(&format!("report-status atomic {}", AGENT));
        }
        pktline::write_data(&mut body, line.as_bytes());
    }
    pktline::write_flush(&mut body);
    body
}

fn remaining(
    deadline: Option<Instant>,
    config: &RequestConfig,
) -> Result<Option<Duration>, WireError> {
    match deadline {
        None => Ok(None),
        Some(deadline) => {
            let now = Instant::now();
            if now >= deadline {
                return Err(WireError::Timeout(config.push_timeout.unwrap_or_default()));
            }
            Ok(Some(deadline - now))
        }
    }
}

/// Parse a v0 receive-pack reference advertisement into a name-to-hash map.
///
/// Handles both the raw subprocess form and the smart-HTTP form with its
/// `# service=git-receive-pack` preamble.
fn parse_advertisement(data: &[u8]) -> Result<BTreeMap<String, Sha1Hash>, WireError> {
    let mut reader = PktReader::new(Cursor::new(data));
    let mut refs = BTreeMap::new();
    let mut in_preamble = false;
    let mut seen_any = false;
    loop {
        match reader.read_packet()? {
            None | Some(Packet::ResponseEnd) => break,
            Some(Packet::Flush) => {
                if in_preamble {
                    in_preamble = false;
                    continue;
                }
                break;
            }
            Some(Packet::Delim) => continue,
            Some(Packet::Data(payload)) => {
                if !seen_any && payload.starts_with(b"# service=") {
                    in_preamble = true;
                    seen_any = true;
                    continue;
                }
                seen_any = true;
                if in_preamble {
                    continue;
                }
                // "<hash> <ref>\0<capabilities>\n" on the first line,
                // "<hash> <ref>\n" afterwards.
                let line = payload.split(|&b| b == 0).next().unwrap_or(&payload);
                let line = String::from_utf8_lossy(line);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let Some((hash, name)) = line.split_once(' ') else {
                    return Err(WireError::RefLine(line.to_string()));
                };
                if name == "capabilities^{}" {
                    // Placeholder advertisement from an empty repository.
                    continue;
                }
                let hash = Sha1Hash::from_hex(hash)
                    .map_err(|_| WireError::RefLine(line.to_string()))?;
                refs.insert(name.to_string(), hash);
            }
        }
    }
    Ok(refs)
}

fn parse_report_status(data: &[u8], debug: &mut PushDebugInfo) -> Result<(), WireError> {
    let mut reader = PktReader::new(Cursor::new(data));
    loop {
        match reader.read_packet()? {
            None | Some(Packet::Flush) | Some(Packet::ResponseEnd) => break,
            Some(Packet::Delim) => continue,
            Some(Packet::Data(payload)) => {
                let line = String::from_utf8_lossy(&payload);
                let line = line.trim_end();
                if let Some(status) = line.strip_prefix("unpack ") {
                    debug.unpack_status = Some(status.to_string());
                } else if let Some(rest) = line.strip_prefix("ok ") {
                    debug.command_statuses.push(PushCommandStatus {
                        name: rest.to_string(),
                        status: "ok".to_string(),
                    });
                } else if let Some(rest) = line.strip_prefix("ng ") {
                    let (name, reason) = rest.split_once(' ').unwrap_or((rest, "rejected"));
                    debug.command_statuses.push(PushCommandStatus {
                        name: name.to_string(),
                        status: reason.to_string(),
                    });
                }
            }
        }
    }

    if let Some(status) = &debug.unpack_status {
        if status != "ok" {
            return Err(WireError::PushRejected(format!("unpack {}", status)));
        }
    }
    let failures: Vec<String> = debug
        .command_statuses
        .iter()
        .filter(|s| s.status != "ok")
        .map(|s| format!("{}: {}", s.name, s.status))
        .collect();
    if !failures.is_empty() {
        return Err(WireError::PushRejected(failures.join("; ")));
    }
    Ok(())
}
