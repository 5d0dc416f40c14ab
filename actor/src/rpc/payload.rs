// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Call payloads
//!
//! Arguments and return values are serialized with bincode, independently of the envelope.
//! The first byte of a payload tells how the rest is stored: `b'0'` raw, `b'1'` zstd
//! compressed. Compression kicks in when the raw prefixed payload is larger than the threshold.
//!

use crate::Error;

use serde::{Serialize, de::DeserializeOwned};

/// Default compression threshold in bytes.
pub const DEFAULT_COMPRESS_THRESHOLD: usize = 256;

const RAW: u8 = b'0';
const COMPRESSED: u8 = b'1';
const ZSTD_LEVEL: i32 = 0;

/// Serializes `value`, compressing it above `threshold` bytes.
pub fn encode<T>(value: &T, threshold: usize) -> Result<Vec<u8>, Error>
where
    T: Serialize + ?Sized,
{
    let raw = bincode::serialize(value)
        .map_err(|e| Error::Payload(format!("serialize: {}", e)))?;
    if raw.len() + 1 <= threshold {
        let mut payload = Vec::with_capacity(raw.len() + 1);
        payload.push(RAW);
        payload.extend_from_slice(&raw);
        return Ok(payload);
    }

    let compressed = zstd::stream::encode_all(raw.as_slice(), ZSTD_LEVEL)
        .map_err(|e| Error::Payload(format!("compress: {}", e)))?;
    let mut payload = Vec::with_capacity(compressed.len() + 1);
    payload.push(COMPRESSED);
    payload.extend_from_slice(&compressed);
    Ok(payload)
}

/// Restores a value written by [`encode`].
pub fn decode<T>(payload: &[u8]) -> Result<T, Error>
where
    T: DeserializeOwned,
{
    let value = match payload.split_first() {
        Some((&RAW, raw)) => bincode::deserialize(raw),
        Some((&COMPRESSED, compressed)) => {
            let raw = zstd::stream::decode_all(compressed)
                .map_err(|e| Error::Payload(format!("decompress: {}", e)))?;
            bincode::deserialize(&raw)
        }
        Some((prefix, _)) => {
            return Err(Error::Payload(format!(
                "unknown payload prefix {}",
                prefix
            )));
        }
        None => return Err(Error::Payload("empty payload".to_owned())),
    };
    value.map_err(|e| Error::Payload(format!("deserialize: {}", e)))
}
