//! Protocol v2 request encoding
//!
//! A v2 request is a `command=<name>` pkt-line, zero or more capability
//! lines, a delimiter, zero or more argument lines, and a flush.

use crate::pktline;

/// Encode a protocol v2 command request.
pub fn encode_v2_request(command: &str, capabilities: &[&str], args: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    pktline::write_data(&mut out, format!("command={}\n", command).as_bytes());
    for cap in capabilities {
        pktline::write_data(&mut out, format!("{}\n", cap).as_bytes());
    }
    pktline::write_delim(&mut out);
    for arg in args {
        pktline::write_data(&mut out, format!("{}\n", arg).as_bytes());
    }
    pktline::write_flush(&mut out);
    out
}
