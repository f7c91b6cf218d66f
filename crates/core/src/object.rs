//! Commit objects, signatures, and the tagged object variant

use crate::hash::{hash_object, Sha1Hash};
use crate::tree::Tree;
use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, TimeZone};
use serde::{Deserialize, Serialize};

/// The kind tag of a Git object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
}

impl ObjectKind {
    /// The kind name used in loose object headers
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Commit => "commit",
            ObjectKind::Tree => "tree",
            ObjectKind::Blob => "blob",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An author or committer identity with its timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub when: DateTime<FixedOffset>,
}

impl Signature {
    /// Render in commit-header form: `Name <email> <epoch> <±HHMM>`
    fn encode(&self) -> String {
        let offset_secs = self.when.offset().local_minus_utc();
        let sign = if offset_secs < 0 { '-' } else { '+' };
        let abs = offset_secs.unsigned_abs();
        format!(
            "{} <{}> {} {}{:02}{:02}",
            self.name,
            self.email,
            self.when.timestamp(),
            sign,
            abs / 3600,
            (abs % 3600) / 60,
        )
    }

    /// Parse the commit-header form
    fn decode(s: &str) -> Result<Self> {
        let (rest, tz) = s
            .rsplit_once(' ')
            .ok_or_else(|| anyhow::anyhow!("malformed signature: {:?}", s))?;
        let (ident, epoch) = rest
            .rsplit_once(' ')
            .ok_or_else(|| anyhow::anyhow!("malformed signature: {:?}", s))?;
        let epoch: i64 = epoch
            .parse()
            .with_context(|| format!("invalid signature timestamp in {:?}", s))?;

        let tz_bytes = tz.as_bytes();
        if tz_bytes.len() != 5 || (tz_bytes[0] != b'+' && tz_bytes[0] != b'-') {
            anyhow::bail!("invalid signature timezone {:?}", tz);
        }
        let hours: i32 = tz[1..3].parse()?;
        let minutes: i32 = tz[3..5].parse()?;
        let mut offset_secs = hours * 3600 + minutes * 60;
        if tz_bytes[0] == b'-' {
            offset_secs = -offset_secs;
        }
        let offset = FixedOffset::east_opt(offset_secs)
            .ok_or_else(|| anyhow::anyhow!("timezone offset out of range: {:?}", tz))?;
        let when = offset
            .timestamp_opt(epoch, 0)
            .single()
            .ok_or_else(|| anyhow::anyhow!("timestamp out of range: {}", epoch))?;

        let (name, email) = match (ident.find('<'), ident.rfind('>')) {
            (Some(lt), Some(gt)) if lt < gt => {
                (ident[..lt].trim_end().to_string(), ident[lt + 1..gt].to_string())
            }
            _ => anyhow::bail!("malformed signature identity: {:?}", ident),
        };
        Ok(Signature { name, email, when })
    }
}

/// A commit object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: Sha1Hash,
    pub parents: Vec<Sha1Hash>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

impl Commit {
    /// Encode to the Git commit wire payload
    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::new();
        out.push_str(&format!("tree {}\n", self.tree));
        for parent in &self.parents {
            out.push_str(&format!("parent {}\n", parent));
        }
        out.push_str(&format!("author {}\n", self.author.encode()));
        out.push_str(&format!("committer {}\n", self.committer.encode()));
        out.push('\n');
        out.push_str(&self.message);
        out.into_bytes()
    }

    /// Decode a Git commit wire payload.
    ///
    /// Unknown header fields (`gpgsig`, `encoding`, continuation lines) are
    /// skipped; only tree, parents, author, and committer are retained.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data).context("commit payload is not UTF-8")?;
        let (header, message) = text
            .split_once("\n\n")
            .map(|(h, m)| (h, m.to_string()))
            .unwrap_or((text.trim_end_matches('\n'), String::new()));

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;
        for line in header.lines() {
            if line.starts_with(' ') {
                // Continuation of a multi-line field such as gpgsig.
                continue;
            }
            let Some((field, value)) = line.split_once(' ') else {
                continue;
            };
            match field {
                "tree" => tree = Some(Sha1Hash::from_hex(value)?),
                "parent" => parents.push(Sha1Hash::from_hex(value)?),
                "author" => author = Some(Signature::decode(value)?),
                "committer" => committer = Some(Signature::decode(value)?),
                _ => {}
            }
        }
        Ok(Commit {
            tree: tree.ok_or_else(|| anyhow::anyhow!("commit has no tree header"))?,
            parents,
            author: author.ok_or_else(|| anyhow::anyhow!("commit has no author header"))?,
            committer: committer
                .ok_or_else(|| anyhow::anyhow!("commit has no committer header"))?,
            message,
        })
    }
}

/// A decoded Git object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Commit(Commit),
    Tree(Tree),
    Blob(Vec<u8>),
}

impl Object {
    /// The kind tag of this object
    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Commit(_) => ObjectKind::Commit,
            Object::Tree(_) => ObjectKind::Tree,
            Object::Blob(_) => ObjectKind::Blob,
        }
    }

    /// Encode to the wire payload (the bytes after the loose header)
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Object::Commit(c) => c.encode(),
            Object::Tree(t) => t.encode(),
            Object::Blob(b) => b.clone(),
        }
    }

    /// Decode a wire payload of the given kind
    pub fn decode(kind: ObjectKind, payload: &[u8]) -> Result<Self> {
        match kind {
            ObjectKind::Commit => Ok(Object::Commit(Commit::decode(payload)?)),
            ObjectKind::Tree => Ok(Object::Tree(Tree::decode(payload)?)),
            ObjectKind::Blob => Ok(Object::Blob(payload.to_vec())),
        }
    }

    /// The object's content hash
    pub fn hash(&self) -> Sha1Hash {
        hash_object(self.kind().as_str(), &self.encode())
    }
}
