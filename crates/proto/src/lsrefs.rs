//! The protocol v2 `ls-refs` command

use crate::config::RequestConfig;
use crate::error::WireError;
use crate::pktline::{Packet, PktReader};
use crate::request::encode_v2_request;
use crate::transport::{ResponseHeaders, Transport};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// One advertised reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefInfo {
    /// Ref name, e.g. `refs/heads/main`
    pub name: String,

    /// Hash the ref points at. The server sends the literal placeholder
    /// `unborn` for a symbolic ref whose target does not exist yet, so this
    /// stays a string rather than a parsed hash.
    pub hash: String,

    /// For annotated tags, the hash of the peeled target object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peeled_hash: Option<String>,

    /// For symbolic refs, the name of the target ref
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbolic_target: Option<String>,
}

/// Telemetry captured from an ls-refs round trip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LsRefsDebugInfo {
    pub response_headers: ResponseHeaders,
}

/// List remote refs matching the given prefixes.
///
/// Always requests `symrefs` and `peel` so symbolic targets and peeled tag
/// hashes come back in the same round trip.
pub fn ls_refs(
    transport: &Transport,
    repo_url: &str,
    ref_prefixes: &[String],
    config: &RequestConfig,
) -> Result<(Vec<RefInfo>, LsRefsDebugInfo), WireError> {
    let mut args: Vec<String> =
        ref_prefixes.iter().map(|p| format!("ref-prefix {}", p)).collect();
    args.push("symrefs".to_string());
    args.push("peel".to_string());
    let body = encode_v2_request("ls-refs", &[], &args);

    transport.call_upload_pack(repo_url, &body, config, |headers, data| {
        let refs = parse_ls_refs_response(data)?;
        let debug = LsRefsDebugInfo { response_headers: headers.clone() };
        Ok((refs, debug))
    })
}

fn parse_ls_refs_response(data: &[u8]) -> Result<Vec<RefInfo>, WireError> {
    let mut reader = PktReader::new(Cursor::new(data));
    let mut refs = Vec::new();
    let mut in_server_info = false;
    loop {
        match reader.read_packet()? {
            None | Some(Packet::ResponseEnd) => break,
            Some(Packet::Flush) => {
                // A capability advertisement block ends with its own flush;
                // the real response follows it.
                if in_server_info {
                    in_server_info = false;
                    continue;
                }
                break;
            }
            Some(Packet::Delim) => continue,
            Some(Packet::Data(payload)) => {
                if payload == b"version 2\n" {
                    in_server_info = true;
                    continue;
                }
                if in_server_info {
                    continue;
                }
                refs.push(parse_ref_line(&payload)?);
            }
        }
    }
    Ok(refs)
}

fn parse_ref_line(payload: &[u8]) -> Result<RefInfo, WireError> {
    let line = String::from_utf8_lossy(payload);
    let line = line.trim();
    let parts: Vec<&str> = line.split(' ').collect();
    if parts.len() < 2 {
        return Err(WireError::RefLine(line.to_string()));
    }
    let mut info = RefInfo {
        name: parts[1].to_string(),
        hash: parts[0].to_string(),
        peeled_hash: None,
        symbolic_target: None,
    };
    if parts.len() == 3 {
        if let Some(target) = parts[2].strip_prefix("symref-target:") {
            info.symbolic_target = Some(target.to_string());
        } else if let Some(peeled) = parts[2].strip_prefix("peeled:") {
            info.peeled_hash = Some(peeled.to_string());
        } else {
            return Err(WireError::RefLine(line.to_string()));
        }
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pktline;

    fn response(lines: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        for line in lines {
            pktline::write_data(&mut out, format!("{}\n", line).as_bytes());
        }
        pktline::write_flush(&mut out);
        out
    }

    #[test]
    fn test_parse_plain_refs() -> Result<(), WireError> {
        let hash = "a".repeat(40);
        let data = response(&[
            &format!("{} refs/heads/main", hash),
            &format!("{} refs/heads/dev", hash),
        ]);
        let refs = parse_ls_refs_response(&data)?;
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].name, "refs/heads/main");
        assert_eq!(refs[0].hash, hash);
        Ok(())
    }

    #[test]
    fn test_parse_suffixes() -> Result<(), WireError> {
        let hash = "b".repeat(40);
        let data = response(&[
            &format!("{} HEAD symref-target:refs/heads/main", hash),
            &format!("{} refs/tags/v1 peeled:{}", hash, "c".repeat(40)),
        ]);
        let refs = parse_ls_refs_response(&data)?;
        assert_eq!(refs[0].symbolic_target.as_deref(), Some("refs/heads/main"));
        assert_eq!(refs[1].peeled_hash.as_deref(), Some(&"c".repeat(40)[..]));
        Ok(())
    }

    #[test]
    fn test_parse_unborn_head() -> Result<(), WireError> {
        let data = response(&["unborn HEAD symref-target:refs/heads/main"]);
        let refs = parse_ls_refs_response(&data)?;
        assert_eq!(refs[0].hash, "unborn");
        Ok(())
    }

    #[test]
    fn test_invalid_line_rejected() {
        let data = response(&["justonetoken"]);
        let err = parse_ls_refs_response(&data).unwrap_err();
        assert!(matches!(err, WireError::RefLine(_)));
    }

    #[test]
    fn test_unknown_suffix_rejected() {
        let hash = "d".repeat(40);
        let data = response(&[&format!("{} refs/heads/x wat:this", hash)]);
        assert!(parse_ls_refs_response(&data).is_err());
    }

    #[test]
    fn test_server_info_block_skipped() -> Result<(), WireError> {
        let hash = "e".repeat(40);
        let mut data = Vec::new();
        pktline::write_data(&mut data, b"version 2\n");
        pktline::write_data(&mut data, b"agent=git/2.44\n");
        pktline::write_data(&mut data, b"ls-refs\n");
        pktline::write_flush(&mut data);
        pktline::write_data(&mut data, format!("{} refs/heads/main\n", hash).as_bytes());
        pktline::write_flush(&mut data);
        let refs = parse_ls_refs_response(&data)?;
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name, "refs/heads/main");
        Ok(())
    }
}
