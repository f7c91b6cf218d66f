//! Packfile codec: reading packs into the object store, writing packs out
//!
//! Input packs may contain non-delta entries plus ofs-delta and ref-delta
//! entries (gitformat-pack(5)); output packs are always non-delta, which is
//! valid for any conforming receiver.

use crate::hash::{hash_bytes, IncrementalHasher, Sha1Hash};
use crate::object::{Object, ObjectKind};
use crate::store::ObjectStore;
use anyhow::{Context, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::io::{Read, Write};

const PACK_SIGNATURE: &[u8; 4] = b"PACK";

/// Parse a packfile and insert every contained object into the store.
///
/// Returns the number of objects read. The trailing SHA-1 checksum is
/// verified. Ref-delta bases may live in the pack itself or already in the
/// store (from an earlier fetch).
pub fn read_pack(data: &[u8], store: &mut ObjectStore) -> Result<u32> {
    if data.len() < 12 + 20 {
        anyhow::bail!("packfile too short: {} bytes", data.len());
    }
    if &data[0..4] != PACK_SIGNATURE {
        anyhow::bail!("invalid packfile signature");
    }
    let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    if version != 2 && version != 3 {
        anyhow::bail!("unsupported packfile version {}", version);
    }
    let object_count = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

    let body_len = data.len() - 20;
    let mut trailer = [0u8; 20];
    trailer.copy_from_slice(&data[body_len..]);
    let expected = Sha1Hash::from_bytes(trailer);
    let actual = hash_bytes(&data[..body_len]);
    if actual != expected {
        anyhow::bail!("packfile checksum mismatch: expected {}, got {}", expected, actual);
    }

    // Pack offset of each decoded entry, for ofs-delta base lookups.
    let mut by_offset: HashMap<usize, (ObjectKind, Vec<u8>)> = HashMap::new();
    let mut offset = 12usize;

    for index in 0..object_count {
        let entry_offset = offset;
        let (kind, payload) = read_entry(data, body_len, &mut offset, entry_offset, &by_offset, store)
            .with_context(|| format!("unpacking object {}/{}", index + 1, object_count))?;
        store.insert(Object::decode(kind, &payload)?);
        by_offset.insert(entry_offset, (kind, payload));
    }
    Ok(object_count)
}

fn read_entry(
    data: &[u8],
    body_len: usize,
    offset: &mut usize,
    entry_offset: usize,
    by_offset: &HashMap<usize, (ObjectKind, Vec<u8>)>,
    store: &ObjectStore,
) -> Result<(ObjectKind, Vec<u8>)> {
    // n-byte type-and-length header: 3-bit type, (n-1)*7+4-bit length.
    let mut byte = next_byte(data, body_len, offset)?;
    let type_id = (byte >> 4) & 0b111;
    let mut size = (byte & 0x0f) as usize;
    let mut shift = 4u32;
    while byte & 0x80 != 0 {
        byte = next_byte(data, body_len, offset)?;
        size |= ((byte & 0x7f) as usize) << shift;
        shift += 7;
    }

    match type_id {
        1 | 2 | 3 => {
            let kind = match type_id {
                1 => ObjectKind::Commit,
                2 => ObjectKind::Tree,
                _ => ObjectKind::Blob,
            };
            let payload = inflate(data, body_len, offset, size)?;
            Ok((kind, payload))
        }
        // Annotated tags are out of scope for this client; no fetch we
        // issue can produce one.
        4 => anyhow::bail!("tag objects are not supported"),
        6 => {
            // ofs-delta: negative offset to the base entry.
            let mut byte = next_byte(data, body_len, offset)?;
            let mut base_rel = (byte & 0x7f) as usize;
            while byte & 0x80 != 0 {
                byte = next_byte(data, body_len, offset)?;
                base_rel = ((base_rel + 1) << 7) | (byte & 0x7f) as usize;
            }
            let base_offset = entry_offset
                .checked_sub(base_rel)
                .ok_or_else(|| anyhow::anyhow!("ofs-delta offset underflow"))?;
            let delta = inflate(data, body_len, offset, size)?;
            let (kind, base) = by_offset
                .get(&base_offset)
                .ok_or_else(|| anyhow::anyhow!("ofs-delta base at offset {} not found", base_offset))?;
            Ok((*kind, apply_delta(base, &delta)?))
        }
        7 => {
            // ref-delta: 20-byte base hash, resolved through the store.
            if *offset + 20 > body_len {
                anyhow::bail!("packfile truncated in ref-delta base hash");
            }
            let mut base_hash = [0u8; 20];
            base_hash.copy_from_slice(&data[*offset..*offset + 20]);
            *offset += 20;
            let base_hash = Sha1Hash::from_bytes(base_hash);
            let delta = inflate(data, body_len, offset, size)?;
            let base = store
                .get(&base_hash)
                .ok_or_else(|| anyhow::anyhow!("ref-delta base {} not found", base_hash))?;
            Ok((base.kind(), apply_delta(&base.encode(), &delta)?))
        }
        other => anyhow::bail!("unknown pack object type {}", other),
    }
}

fn next_byte(data: &[u8], body_len: usize, offset: &mut usize) -> Result<u8> {
    if *offset >= body_len {
        anyhow::bail!("packfile truncated in entry header");
    }
    let byte = data[*offset];
    *offset += 1;
    Ok(byte)
}

/// Inflate one zlib stream, advancing `offset` past its compressed bytes
fn inflate(data: &[u8], body_len: usize, offset: &mut usize, expected_size: usize) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(&data[*offset..body_len]);
    let mut out = Vec::with_capacity(expected_size);
    decoder.read_to_end(&mut out).context("inflating pack entry")?;
    if out.len() != expected_size {
        anyhow::bail!("pack entry size mismatch: header says {}, got {}", expected_size, out.len());
    }
    *offset += decoder.total_in() as usize;
    Ok(out)
}

/// Apply a git delta (copy/insert instruction stream) to a base payload
fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let mut pos = 0usize;
    let base_size = read_delta_size(delta, &mut pos)?;
    if base_size != base.len() {
        anyhow::bail!("delta base size mismatch: header says {}, actual {}", base_size, base.len());
    }
    let target_size = read_delta_size(delta, &mut pos)?;

    let mut out = Vec::with_capacity(target_size);
    while pos < delta.len() {
        let cmd = delta[pos];
        pos += 1;
        if cmd & 0x80 != 0 {
            // Copy from base.
            let mut copy_off = 0usize;
            let mut copy_len = 0usize;
            for (i, bit) in [0x01u8, 0x02, 0x04, 0x08].iter().enumerate() {
                if cmd & bit != 0 {
                    copy_off |= (*delta
                        .get(pos)
                        .ok_or_else(|| anyhow::anyhow!("delta truncated in copy offset"))?
                        as usize)
                        << (8 * i);
                    pos += 1;
                }
            }
            for (i, bit) in [0x10u8, 0x20, 0x40].iter().enumerate() {
                if cmd & bit != 0 {
                    copy_len |= (*delta
                        .get(pos)
                        .ok_or_else(|| anyhow::anyhow!("delta truncated in copy length"))?
                        as usize)
                        << (8 * i);
                    pos += 1;
                }
            }
            if copy_len == 0 {
                copy_len = 0x10000;
            }
            let end = copy_off
                .checked_add(copy_len)
                .filter(|&end| end <= base.len())
                .ok_or_else(|| anyhow::anyhow!("delta copy out of bounds"))?;
            out.extend_from_slice(&base[copy_off..end]);
        } else if cmd > 0 {
            // Insert literal bytes.
            let n = cmd as usize;
            if pos + n > delta.len() {
                anyhow::bail!("delta insert runs past end of delta");
            }
            out.extend_from_slice(&delta[pos..pos + n]);
            pos += n;
        } else {
            anyhow::bail!("reserved delta instruction byte 0");
        }
    }
    if out.len() != target_size {
        anyhow::bail!("delta result size mismatch: expected {}, got {}", target_size, out.len());
    }
    Ok(out)
}

fn read_delta_size(delta: &[u8], pos: &mut usize) -> Result<usize> {
    let mut value = 0usize;
    let mut shift = 0u32;
    loop {
        let byte = *delta
            .get(*pos)
            .ok_or_else(|| anyhow::anyhow!("delta truncated in size varint"))?;
        *pos += 1;
        value |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

/// Encode the given objects as a version-2 pack with non-delta entries.
///
/// An empty hash list produces the well-formed zero-object pack that pure
/// ref updates require.
pub fn write_pack(store: &ObjectStore, hashes: &[Sha1Hash]) -> Result<Vec<u8>> {
    let mut pack = Vec::new();
    pack.extend_from_slice(PACK_SIGNATURE);
    pack.extend_from_slice(&2u32.to_be_bytes());
    pack.extend_from_slice(&(hashes.len() as u32).to_be_bytes());

    for hash in hashes {
        let object = store
            .get(hash)
            .ok_or_else(|| anyhow::anyhow!("object {} not in store, cannot pack", hash))?;
        let payload = object.encode();
        let type_id: u8 = match object.kind() {
            ObjectKind::Commit => 1,
            ObjectKind::Tree => 2,
            ObjectKind::Blob => 3,
        };
        write_entry_header(&mut pack, type_id, payload.len());
        let mut encoder = ZlibEncoder::new(&mut pack, Compression::default());
        encoder.write_all(&payload).context("deflating pack entry")?;
        encoder.finish().context("deflating pack entry")?;
    }

    let mut hasher = IncrementalHasher::new();
    hasher.update(&pack);
    pack.extend_from_slice(hasher.finalize().as_bytes());
    Ok(pack)
}

fn write_entry_header(pack: &mut Vec<u8>, type_id: u8, size: usize) {
    let mut first = (type_id << 4) | (size & 0x0f) as u8;
    let mut remaining = size >> 4;
    if remaining > 0 {
        first |= 0x80;
    }
    pack.push(first);
    while remaining > 0 {
        let mut byte = (remaining & 0x7f) as u8;
        remaining >>= 7;
        if remaining > 0 {
            byte |= 0x80;
        }
        pack.push(byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Commit, Signature};
    use crate::tree::{Tree, TreeEntry};
    use chrono::{FixedOffset, TimeZone};

    fn test_signature() -> Signature {
        Signature {
            name: "tester".into(),
            email: "tester@example.com".into(),
            when: FixedOffset::east_opt(0).unwrap().timestamp_opt(1700000000, 0).single().unwrap(),
        }
    }

    #[test]
    fn test_roundtrip_mixed_objects() -> Result<()> {
        let mut store = ObjectStore::new();
        let blob = store.insert(Object::Blob(b"file contents\n".to_vec()));
        let tree =
            store.insert(Object::Tree(Tree::from_entries(vec![TreeEntry::file("f", blob)])));
        let commit = store.insert(Object::Commit(Commit {
            tree,
            parents: vec![],
            author: test_signature(),
            committer: test_signature(),
            message: "initial\n".into(),
        }));

        let pack = write_pack(&store, &[commit, tree, blob])?;

        let mut restored = ObjectStore::new();
        assert_eq!(read_pack(&pack, &mut restored)?, 3);
        assert_eq!(restored.blob(&blob)?, b"file contents\n");
        assert_eq!(restored.tree(&tree)?.len(), 1);
        assert_eq!(restored.commit(&commit)?.message, "initial\n");
        Ok(())
    }

    #[test]
    fn test_empty_pack() -> Result<()> {
        let store = ObjectStore::new();
        let pack = write_pack(&store, &[])?;
        // Header (12 bytes) plus trailing checksum (20 bytes).
        assert_eq!(pack.len(), 32);
        let mut restored = ObjectStore::new();
        assert_eq!(read_pack(&pack, &mut restored)?, 0);
        assert!(restored.is_empty());
        Ok(())
    }

    #[test]
    fn test_corrupted_checksum_rejected() -> Result<()> {
        let mut store = ObjectStore::new();
        let blob = store.insert(Object::Blob(b"x".to_vec()));
        let mut pack = write_pack(&store, &[blob])?;
        let last = pack.len() - 1;
        pack[last] ^= 0xff;
        let mut restored = ObjectStore::new();
        assert!(read_pack(&pack, &mut restored).is_err());
        Ok(())
    }

    #[test]
    fn test_ref_delta_entry() -> Result<()> {
        // Hand-assemble a pack with one ref-delta entry whose base is
        // already in the store, the way a thin pack from a server arrives.
        let mut store = ObjectStore::new();
        let base_content = b"hello world".to_vec();
        let base_hash = store.insert(Object::Blob(base_content.clone()));

        // Delta: copy "world" (offset 6, len 5) then insert "!".
        let mut delta = Vec::new();
        delta.push(11); // base size
        delta.push(6); // target size
        delta.push(0x80 | 0x01 | 0x10);
        delta.push(6);
        delta.push(5);
        delta.push(1);
        delta.push(b'!');

        let mut pack = Vec::new();
        pack.extend_from_slice(b"PACK");
        pack.extend_from_slice(&2u32.to_be_bytes());
        pack.extend_from_slice(&1u32.to_be_bytes());
        write_entry_header(&mut pack, 7, delta.len());
        pack.extend_from_slice(base_hash.as_bytes());
        let mut encoder = ZlibEncoder::new(&mut pack, Compression::default());
        encoder.write_all(&delta)?;
        encoder.finish()?;
        let mut hasher = IncrementalHasher::new();
        hasher.update(&pack);
        let checksum = hasher.finalize();
        pack.extend_from_slice(checksum.as_bytes());

        assert_eq!(read_pack(&pack, &mut store)?, 1);
        let result_hash = crate::hash::hash_object("blob", b"world!");
        assert_eq!(store.blob(&result_hash)?, b"world!");
        Ok(())
    }

    #[test]
    fn test_ofs_delta_entry() -> Result<()> {
        // A pack with a base blob followed by an ofs-delta against it.
        let base = b"aaaaabbbbb".to_vec();
        let mut delta = Vec::new();
        delta.push(10); // base size
        delta.push(5); // target size
        delta.push(0x80 | 0x01 | 0x10); // copy
        delta.push(5); // offset 5
        delta.push(5); // len 5

        let mut pack = Vec::new();
        pack.extend_from_slice(b"PACK");
        pack.extend_from_slice(&2u32.to_be_bytes());
        pack.extend_from_slice(&2u32.to_be_bytes());

        let base_entry_offset = pack.len();
        write_entry_header(&mut pack, 3, base.len());
        let mut encoder = ZlibEncoder::new(&mut pack, Compression::default());
        encoder.write_all(&base)?;
        encoder.finish()?;

        let delta_entry_offset = pack.len();
        write_entry_header(&mut pack, 6, delta.len());
        // Single-byte negative offset back to the base entry.
        let rel = delta_entry_offset - base_entry_offset;
        assert!(rel < 0x80);
        pack.push(rel as u8);
        let mut encoder = ZlibEncoder::new(&mut pack, Compression::default());
        encoder.write_all(&delta)?;
        encoder.finish()?;

        let mut hasher = IncrementalHasher::new();
        hasher.update(&pack);
        let checksum = hasher.finalize();
        pack.extend_from_slice(checksum.as_bytes());

        let mut store = ObjectStore::new();
        assert_eq!(read_pack(&pack, &mut store)?, 2);
        let result_hash = crate::hash::hash_object("blob", b"bbbbb");
        assert_eq!(store.blob(&result_hash)?, b"bbbbb");
        Ok(())
    }

    #[test]
    fn test_delta_apply_insert_only() -> Result<()> {
        let mut delta = Vec::new();
        delta.push(0); // base size
        delta.push(5); // target size
        delta.push(5);
        delta.extend_from_slice(b"hello");
        assert_eq!(apply_delta(b"", &delta)?, b"hello");
        Ok(())
    }

    #[test]
    fn test_delta_size_varint() -> Result<()> {
        // 300 = 0b100101100 -> 0xAC 0x02
        let data = [0xacu8, 0x02];
        let mut pos = 0;
        assert_eq!(read_delta_size(&data, &mut pos)?, 300);
        assert_eq!(pos, 2);
        Ok(())
    }

    #[test]
    fn test_write_pack_unknown_hash_fails() {
        let store = ObjectStore::new();
        assert!(write_pack(&store, &[hash_bytes(b"missing")]).is_err());
    }
}
