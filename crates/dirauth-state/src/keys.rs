//! Storage key layout: `{bucket}:{hex(uvarint epoch)}:{hex(id)}`.

use dirauth_core::epoch::{decode_uvarint, epoch_field};
use dirauth_core::PublicKey;

pub const DESCRIPTORS_BUCKET: &str = "k_descriptors";
pub const DOCUMENTS_BUCKET: &str = "k_documents";
pub const AUTHORITIES_BUCKET: &str = "k_authorities";
pub const EPOCH_INFO_KEY: &[u8] = b"k_epoch";

const SEPARATOR: u8 = b':';

pub fn storage_key(bucket: &str, id: &[u8], epoch: u64) -> Vec<u8> {
    let mut key = bucket_prefix(bucket, epoch);
    key.extend_from_slice(hex::encode(id).as_bytes());
    key
}

/// Prefix shared by every key of `bucket` for `epoch`
pub fn bucket_prefix(bucket: &str, epoch: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(bucket.len() + 18);
    key.extend_from_slice(bucket.as_bytes());
    key.push(SEPARATOR);
    key.extend_from_slice(hex::encode(epoch_field(epoch)).as_bytes());
    key.push(SEPARATOR);
    key
}

/// Inverse of [`storage_key`]
pub fn unpack_storage_key(key: &[u8]) -> Option<(Vec<u8>, u64)> {
    let first = key.iter().position(|b| *b == SEPARATOR)?;
    let last = key.iter().rposition(|b| *b == SEPARATOR)?;
    if last <= first {
        return None;
    }
    let epoch_raw = hex::decode(&key[first + 1..last]).ok()?;
    let (epoch, _) = decode_uvarint(&epoch_raw)?;
    let id = hex::decode(&key[last + 1..]).ok()?;
    Some((id, epoch))
}

pub fn descriptor_key(identity: &PublicKey, epoch: u64) -> Vec<u8> {
    storage_key(DESCRIPTORS_BUCKET, identity.as_bytes(), epoch)
}

pub fn document_key(epoch: u64) -> Vec<u8> {
    storage_key(DOCUMENTS_BUCKET, &epoch_field(epoch), epoch)
}

pub fn authority_key(identity: &PublicKey) -> Vec<u8> {
    storage_key(AUTHORITIES_BUCKET, identity.as_bytes(), 0)
}

pub fn authorities_prefix() -> Vec<u8> {
    bucket_prefix(AUTHORITIES_BUCKET, 0)
}
