//! Varint helpers and the 16-byte epoch bookkeeping record.

use crate::error::CoreError;

pub const GENESIS_EPOCH: u64 = 1;
pub const EPOCH_RECORD_LEN: usize = 16;
const HALF: usize = EPOCH_RECORD_LEN / 2;

/// Unsigned LEB128 encoding
pub fn encode_uvarint(mut value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
    out
}

/// Returns the value and the number of bytes read
pub fn decode_uvarint(buf: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    for (i, byte) in buf.iter().enumerate().take(10) {
        let low = u64::from(byte & 0x7f);
        if i == 9 && *byte > 1 {
            return None;
        }
        value |= low << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

/// Zigzag signed varint
pub fn encode_varint(value: i64) -> Vec<u8> {
    encode_uvarint(((value << 1) ^ (value >> 63)) as u64)
}

pub fn decode_varint(buf: &[u8]) -> Option<(i64, usize)> {
    let (raw, read) = decode_uvarint(buf)?;
    Some((((raw >> 1) as i64) ^ -((raw & 1) as i64), read))
}

/// `uvarint(epoch)` zero-padded to at least eight bytes, as used in storage keys
pub fn epoch_field(epoch: u64) -> Vec<u8> {
    let mut out = encode_uvarint(epoch);
    if out.len() < HALF {
        out.resize(HALF, 0);
    }
    out
}

/// Current epoch and the block height at which it started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochRecord {
    pub epoch: u64,
    pub start_height: u64,
}

impl EpochRecord {
    pub fn genesis() -> Self {
        EpochRecord {
            epoch: GENESIS_EPOCH,
            start_height: 0,
        }
    }

    pub fn encode(&self) -> Result<[u8; EPOCH_RECORD_LEN], CoreError> {
        let start = i64::try_from(self.start_height)
            .map_err(|_| CoreError::Serialization("start height out of range".to_string()))?;
        let epoch = encode_uvarint(self.epoch);
        let start = encode_varint(start);
        if epoch.len() > HALF || start.len() > HALF {
            return Err(CoreError::Serialization(
                "epoch record field exceeds eight bytes".to_string(),
            ));
        }
        let mut out = [0u8; EPOCH_RECORD_LEN];
        out[..epoch.len()].copy_from_slice(&epoch);
        out[HALF..HALF + start.len()].copy_from_slice(&start);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        if bytes.len() != EPOCH_RECORD_LEN {
            return Err(CoreError::Deserialization(format!(
                "epoch record has {} bytes, expected {}",
                bytes.len(),
                EPOCH_RECORD_LEN
            )));
        }
        let (epoch, _) = decode_uvarint(&bytes[..HALF])
            .ok_or_else(|| CoreError::Deserialization("bad epoch varint".to_string()))?;
        let (start, _) = decode_varint(&bytes[HALF..])
            .ok_or_else(|| CoreError::Deserialization("bad start height varint".to_string()))?;
        let start_height = u64::try_from(start)
            .map_err(|_| CoreError::Deserialization("negative start height".to_string()))?;
        Ok(EpochRecord {
            epoch,
            start_height,
        })
    }
}
