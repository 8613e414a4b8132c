// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Value encoding for the shared tier
//!
//! The local tier holds decoded `serde_json::Value`s; only shared-tier
//! round trips go through a codec. Decoding never fails outward: a payload
//! that cannot be decoded with its recorded codec degrades to a string of
//! its bytes so readers get data instead of an error.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzLevel;
use serde_json::Value;
use std::io::{Read, Write};

use super::config::Compression;
use super::error::CacheError;

/// Payloads above this size are compressed/decompressed on the blocking
/// pool so the event loop never stalls on CPU-bound codec work.
const OFFLOAD_THRESHOLD_BYTES: usize = 16 * 1024;

/// Encode a value with the given codec
pub fn encode(value: &Value, compression: Compression) -> Result<Vec<u8>, CacheError> {
    match compression {
        Compression::None | Compression::Json => {
            serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))
        }
        Compression::Gzip => {
            let json =
                serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
            let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
            encoder
                .write_all(&json)
                .and_then(|_| encoder.finish())
                .map_err(|e| CacheError::Serialization(e.to_string()))
        }
        Compression::Binary => {
            // Value cannot drive bincode's non-self-describing
            // deserializer directly, so Binary frames the JSON bytes.
            let json =
                serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
            bincode::serialize(&json).map_err(|e| CacheError::Serialization(e.to_string()))
        }
    }
}

/// Decode a payload with the codec it was written with
///
/// A payload that does not parse under its codec is returned as a lossy
/// UTF-8 string value rather than an error.
pub fn decode(payload: &[u8], compression: Compression) -> Value {
    let decoded = match compression {
        Compression::None | Compression::Json => serde_json::from_slice(payload).ok(),
        Compression::Gzip => {
            let mut decoder = GzDecoder::new(payload);
            let mut json = Vec::new();
            decoder
                .read_to_end(&mut json)
                .ok()
                .and_then(|_| serde_json::from_slice(&json).ok())
        }
        Compression::Binary => bincode::deserialize::<Vec<u8>>(payload)
            .ok()
            .and_then(|json| serde_json::from_slice(&json).ok()),
    };

    decoded.unwrap_or_else(|| {
        log::warn!(
            "cache payload failed to decode as {:?} ({} bytes), degrading to raw string",
            compression,
            payload.len()
        );
        Value::String(String::from_utf8_lossy(payload).into_owned())
    })
}

/// Encode, dispatching large gzip payloads to the blocking pool
pub async fn encode_async(value: Value, compression: Compression) -> Result<Vec<u8>, CacheError> {
    if compression == Compression::Gzip && estimated_size(&value) > OFFLOAD_THRESHOLD_BYTES {
        tokio::task::spawn_blocking(move || encode(&value, compression))
            .await
            .map_err(|e| CacheError::Serialization(e.to_string()))?
    } else {
        encode(&value, compression)
    }
}

/// Decode, dispatching large gzip payloads to the blocking pool
pub async fn decode_async(payload: Vec<u8>, compression: Compression) -> Value {
    if compression == Compression::Gzip && payload.len() > OFFLOAD_THRESHOLD_BYTES {
        match tokio::task::spawn_blocking(move || decode(&payload, compression)).await {
            Ok(value) => value,
            Err(e) => {
                log::warn!("blocking decode task failed: {}", e);
                Value::Null
            }
        }
    } else {
        decode(&payload, compression)
    }
}

fn estimated_size(value: &Value) -> usize {
    match value {
        Value::String(s) => s.len(),
        Value::Array(items) => items.iter().map(estimated_size).sum::<usize>() + items.len(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| k.len() + estimated_size(v))
            .sum::<usize>(),
        _ => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_round_trip() {
        let value = json!({"symbol": "BTCUSDT", "price": 61234.5});
        let bytes = encode(&value, Compression::Json).unwrap();
        assert_eq!(decode(&bytes, Compression::Json), value);
    }

    #[test]
    fn gzip_round_trip_and_shrinks_repetitive_payloads() {
        let text = "order book level ".repeat(500);
        let value = json!({ "depth": text });
        let plain = encode(&value, Compression::Json).unwrap();
        let packed = encode(&value, Compression::Gzip).unwrap();
        assert!(packed.len() < plain.len());
        assert_eq!(decode(&packed, Compression::Gzip), value);
    }

    #[test]
    fn binary_round_trip() {
        let value = json!([1, 2, 3, {"k": "v"}]);
        let bytes = encode(&value, Compression::Binary).unwrap();
        assert_eq!(decode(&bytes, Compression::Binary), value);
    }

    #[test]
    fn garbage_degrades_to_string_instead_of_failing() {
        let decoded = decode(b"not-json-at-all", Compression::Json);
        assert_eq!(decoded, Value::String("not-json-at-all".to_string()));
    }
}
