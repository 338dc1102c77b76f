//! Canonical serialization for deterministic digests.
//!
//! Table fingerprints and policy parameter hashes are xxh64 digests of the
//! value's JSON form. All hashed types keep their maps in `BTreeMap`s, so the
//! JSON (and therefore the digest) depends only on content.

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Serialize a value to canonical JSON bytes.
///
/// Only used on types whose maps have integer or string keys, for which
/// `serde_json` serialization cannot fail.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("canonical serialization of map-keyed value failed")
}

/// Compute the canonical digest of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    xxh64(&to_canonical_bytes(value), 0)
}

/// Compute the canonical digest as a 16-character hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}
