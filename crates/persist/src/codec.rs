//! Byte-level encodings shared by the store: CBOR and JSON payloads, zstd
//! compression and SHA-256 file hashes.

use crate::StoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};

/// zstd level used for every file the store writes.
const ZSTD_LEVEL: i32 = 3;

pub(crate) fn cbor_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::CborEncode(e.to_string()))?;
    Ok(buf)
}

pub(crate) fn cbor_deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(data).map_err(|e| StoreError::CborDecode(e.to_string()))
}

pub(crate) fn zstd_compress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), ZSTD_LEVEL)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub(crate) fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// CBOR, then zstd.
pub(crate) fn encode_cbor<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    zstd_compress(&cbor_serialize(value)?)
}

pub(crate) fn decode_cbor<T: DeserializeOwned>(data: &[u8]) -> Result<T, StoreError> {
    cbor_deserialize(&zstd_decompress(data)?)
}

/// JSON, then zstd. Used for the history so a decompressed file stays
/// readable by hand.
pub(crate) fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    zstd_compress(&serde_json::to_vec(value)?)
}

pub(crate) fn decode_json<T: DeserializeOwned>(data: &[u8]) -> Result<T, StoreError> {
    Ok(serde_json::from_slice(&zstd_decompress(data)?)?)
}
