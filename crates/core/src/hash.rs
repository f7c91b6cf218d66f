//! SHA-1 object identifiers for Git content-addressed storage

use anyhow::Result;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};

/// A SHA-1 hash (20 bytes) identifying a Git object.
///
/// The all-zero value is reserved: it means "no object" in tree diffs and
/// "ref must not exist" in ref update commands.
#[derive(Copy, Clone, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Sha1Hash([u8; 20]);

impl Sha1Hash {
    /// The reserved zero hash.
    pub const ZERO: Sha1Hash = Sha1Hash([0u8; 20]);

    /// Create a new Sha1Hash from bytes
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get the hash as a byte slice
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Whether this is the reserved zero hash
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Convert to a 40-character lowercase hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 40-character hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != 40 {
            anyhow::bail!(
                "invalid hash length: expected 40 hex characters, got {}",
                s.len()
            );
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| anyhow::anyhow!("invalid hash {:?}: {}", s, e))?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Debug for Sha1Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sha1Hash({})", self.to_hex())
    }
}

impl std::fmt::Display for Sha1Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for Sha1Hash {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for Sha1Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Sha1Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Sha1Hash::from_hex(&s).map_err(D::Error::custom)
    }
}

/// Hash raw bytes using SHA-1
pub fn hash_bytes(data: &[u8]) -> Sha1Hash {
    let mut hasher = Sha1::new();
    hasher.update(data);
    finalize(hasher)
}

/// Hash a Git object in its canonical loose format: `<kind> <size>\0<payload>`.
///
/// This produces the exact same hash as `git hash-object -t <kind>`.
pub fn hash_object(kind: &str, payload: &[u8]) -> Sha1Hash {
    let mut hasher = Sha1::new();
    hasher.update(kind.as_bytes());
    hasher.update(b" ");
    hasher.update(payload.len().to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(payload);
    finalize(hasher)
}

fn finalize(hasher: Sha1) -> Sha1Hash {
    let result = hasher.finalize();
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&result);
    Sha1Hash::from_bytes(bytes)
}

/// Incremental hasher for streaming data (packfile checksums)
pub struct IncrementalHasher {
    inner: Sha1,
}

impl IncrementalHasher {
    /// Create a new incremental hasher
    pub fn new() -> Self {
        Self { inner: Sha1::new() }
    }

    /// Update the hash with more data
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalize and return the hash
    pub fn finalize(self) -> Sha1Hash {
        finalize(self.inner)
    }
}

impl Default for IncrementalHasher {
    fn default() -> Self {
        Self::new()
    }
}
