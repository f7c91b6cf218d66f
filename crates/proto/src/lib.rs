//! Git smart-transport wire client.
//!
//! Speaks Git protocol v2 (`git-upload-pack`) and the receive-pack push
//! protocol over HTTP or a local `git` subprocess, without a working tree or
//! an on-disk repository. The crate is organized wire-up: pkt-line framing,
//! then the transport dispatch, then the protocol operations built on top.

pub mod config;
pub mod error;
pub mod fetch;
pub mod lsrefs;
pub mod pktline;
pub mod push;
pub mod request;
pub mod transport;

pub use config::RequestConfig;
pub use error::WireError;
pub use fetch::{fetch_blob_none, fetch_blobs, fetch_commits, FetchDebugInfo};
pub use lsrefs::{ls_refs, LsRefsDebugInfo, RefInfo};
pub use push::{push, PushCommandStatus, PushDebugInfo, RefUpdate};
pub use transport::{RequestDecorator, ResponseHeaders, Transport};
