//! Shared plumbing for the operation pipelines

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use wiregit_core::{read_pack, ObjectStore, Sha1Hash, Signature};

/// Parse a 40-hex commit hash argument, naming the field on failure.
pub(crate) fn parse_hash(field: &str, value: &str) -> Result<Sha1Hash> {
    Sha1Hash::from_hex(value).with_context(|| format!("invalid {}", field))
}

/// Read a fetched packfile into the store.
pub(crate) fn load_pack(store: &mut ObjectStore, pack: &[u8]) -> Result<()> {
    read_pack(pack, store).context("failed to parse packfile")?;
    Ok(())
}

/// Build a signature from caller-supplied parts. An empty timestamp means
/// "now"; otherwise RFC 3339.
pub(crate) fn new_signature(name: &str, email: &str, timestamp: &str) -> Result<Signature> {
    let when = if timestamp.is_empty() {
        Utc::now().fixed_offset()
    } else {
        DateTime::parse_from_rfc3339(timestamp)
            .with_context(|| format!("invalid timestamp {:?}", timestamp))?
    };
    Ok(Signature { name: name.to_string(), email: email.to_string(), when })
}

/// Flatten an error chain into the single message string the output
/// records carry.
pub(crate) fn error_string(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}

/// Drop duplicate hashes, keeping first-seen order.
pub(crate) fn dedup_hashes(hashes: impl IntoIterator<Item = Sha1Hash>) -> Vec<Sha1Hash> {
    let mut seen = std::collections::HashSet::new();
    hashes.into_iter().filter(|h| seen.insert(*h)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hash_names_field() {
        let err = parse_hash("cherryPickFrom", "nope").unwrap_err();
        assert!(format!("{:#}", err).contains("cherryPickFrom"));
    }

    #[test]
    fn test_signature_rfc3339() -> Result<()> {
        let sig = new_signature("a", "a@x", "2024-05-01T10:00:00+09:00")?;
        assert_eq!(sig.when.timestamp(), 1714525200);
        assert_eq!(sig.when.offset().local_minus_utc(), 9 * 3600);
        Ok(())
    }

    #[test]
    fn test_signature_empty_timestamp_is_now() -> Result<()> {
        let before = Utc::now().timestamp();
        let sig = new_signature("a", "a@x", "")?;
        assert!(sig.when.timestamp() >= before);
        Ok(())
    }

    #[test]
    fn test_signature_bad_timestamp() {
        assert!(new_signature("a", "a@x", "yesterday").is_err());
    }
}
