//! Git tree objects: entries, modes, canonical ordering, and the wire codec

use crate::hash::Sha1Hash;
use anyhow::Result;

/// Entry mode inside a tree, as stored on the wire in octal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// Regular file (100644)
    Regular,
    /// Executable file (100755)
    Executable,
    /// Symbolic link (120000)
    Symlink,
    /// Directory (40000)
    Dir,
    /// Submodule commit reference (160000)
    Gitlink,
}

impl FileMode {
    /// Parse a mode from its octal wire representation.
    ///
    /// Classifies by value rather than exact string so that legacy modes
    /// written by old Git versions (e.g. `100664`) still decode.
    pub fn from_octal(s: &str) -> Result<Self> {
        let value = u32::from_str_radix(s, 8)
            .map_err(|e| anyhow::anyhow!("invalid tree entry mode {:?}: {}", s, e))?;
        match value & 0o170000 {
            0o040000 => Ok(FileMode::Dir),
            0o120000 => Ok(FileMode::Symlink),
            0o160000 => Ok(FileMode::Gitlink),
            0o100000 => {
                if value & 0o111 != 0 {
                    Ok(FileMode::Executable)
                } else {
                    Ok(FileMode::Regular)
                }
            }
            _ => anyhow::bail!("unsupported tree entry mode {:?}", s),
        }
    }

    /// The canonical octal string Git writes for this mode.
    ///
    /// Note that directories are written as `40000`, not `040000`.
    pub fn as_octal(&self) -> &'static str {
        match self {
            FileMode::Regular => "100644",
            FileMode::Executable => "100755",
            FileMode::Symlink => "120000",
            FileMode::Dir => "40000",
            FileMode::Gitlink => "160000",
        }
    }

    /// Whether this mode is a regular or executable file
    pub fn is_file(&self) -> bool {
        matches!(self, FileMode::Regular | FileMode::Executable)
    }
}

/// A single named entry in a tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Entry name (one path component, no slashes)
    pub name: String,
    /// Entry mode
    pub mode: FileMode,
    /// Hash of the blob, subtree, or gitlinked commit
    pub hash: Sha1Hash,
}

impl TreeEntry {
    /// Create a regular file entry
    pub fn file(name: impl Into<String>, hash: Sha1Hash) -> Self {
        Self { name: name.into(), mode: FileMode::Regular, hash }
    }

    /// Create a directory entry
    pub fn dir(name: impl Into<String>, hash: Sha1Hash) -> Self {
        Self { name: name.into(), mode: FileMode::Dir, hash }
    }

    /// The byte key Git sorts tree entries by: the name, with a trailing
    /// `/` appended for directories.
    fn sort_key(&self) -> Vec<u8> {
        let mut key = self.name.clone().into_bytes();
        if self.mode == FileMode::Dir {
            key.push(b'/');
        }
        key
    }
}

/// A Git tree: an ordered sequence of uniquely-named entries.
///
/// Entries are kept in canonical Git order so that encoding a tree always
/// produces the same bytes (and therefore the same hash) regardless of how
/// it was assembled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from entries, re-sorting them into canonical order
    pub fn from_entries(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Self { entries }
    }

    /// The entries in canonical order
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// Look up an entry by name
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the tree has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode to the Git tree wire payload:
    /// `<mode> <name>\0<20-byte hash>` per entry, in canonical order.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            out.extend_from_slice(entry.mode.as_octal().as_bytes());
            out.push(b' ');
            out.extend_from_slice(entry.name.as_bytes());
            out.push(0);
            out.extend_from_slice(entry.hash.as_bytes());
        }
        out
    }

    /// Decode a Git tree wire payload
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut entries = Vec::new();
        let mut rest = data;
        while !rest.is_empty() {
            let space = rest
                .iter()
                .position(|&b| b == b' ')
                .ok_or_else(|| anyhow::anyhow!("tree entry missing mode terminator"))?;
            let mode = FileMode::from_octal(std::str::from_utf8(&rest[..space])?)?;
            rest = &rest[space + 1..];

            let nul = rest
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| anyhow::anyhow!("tree entry missing name terminator"))?;
            let name = std::str::from_utf8(&rest[..nul])?.to_string();
            rest = &rest[nul + 1..];

            if rest.len() < 20 {
                anyhow::bail!("tree entry truncated: missing hash for {:?}", name);
            }
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&rest[..20]);
            rest = &rest[20..];

            entries.push(TreeEntry { name, mode, hash: Sha1Hash::from_bytes(hash) });
        }
        // Wire order is already canonical; keep it as-is.
        Ok(Self { entries })
    }
}
