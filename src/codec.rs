//! Overlap table decoding and encoding.
//!
//! Tables are stored as a tagged document with three top-level fields:
//!
//! ```text
//! {
//!   "version": 1,
//!   "pre_entries": {
//!     "<pre id>": {
//!       "post_side_counterparts": [
//!         { "id": 100, "overlap_size": 1000, "can_spawn": true,
//!           "pre_side_supports": [ { "id": 1, "intersection_size": 700 } ] }
//!       ],
//!       "pre_side_neighbors": [2, 3]
//!     }
//!   },
//!   "post_entries": { "<post id>": { "neighbors": [101] } }
//! }
//! ```
//!
//! Like any tagged message, absent fields take their zero value and unknown
//! fields are skipped. A document without `version` therefore reads as
//! version 0 and fails the version gate, not the structural decode.
//!
//! Objects keep the `.pb.spawn` name used by existing table generators, but
//! only this JSON document is readable. Binary protobuf blobs under that name
//! fail with [`TableError::Decode`] and must be re-exported as JSON first.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::types::{OverlapTable, PostCandidate, PreSideSupport, SegmentId};
use crate::SPAWN_TABLE_VERSION;

/// Error raised while loading a table. Both variants are fatal for the request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    /// The bytes do not parse as an overlap table.
    #[error("Failed to decode overlap table: {detail}")]
    Decode {
        /// Parser diagnostic.
        detail: String,
    },
    /// The table parsed but declares a version this build does not read.
    #[error("Unsupported overlap table version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version declared by the table.
        found: u32,
        /// The only version this build supports.
        expected: u32,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireTable {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    pre_entries: BTreeMap<SegmentId, WirePreEntry>,
    #[serde(default)]
    post_entries: BTreeMap<SegmentId, WirePostEntry>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WirePreEntry {
    #[serde(default)]
    post_side_counterparts: Vec<WirePostSegment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pre_side_neighbors: Vec<SegmentId>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WirePostSegment {
    id: SegmentId,
    #[serde(default)]
    overlap_size: u64,
    #[serde(default)]
    can_spawn: bool,
    #[serde(default)]
    pre_side_supports: Vec<WirePreSupport>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WirePreSupport {
    id: SegmentId,
    #[serde(default)]
    intersection_size: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WirePostEntry {
    #[serde(default)]
    neighbors: Vec<SegmentId>,
}

impl From<WirePostSegment> for PostCandidate {
    fn from(wire: WirePostSegment) -> Self {
        Self {
            id: wire.id,
            overlap_size: wire.overlap_size,
            can_spawn: wire.can_spawn,
            pre_side_supports: wire
                .pre_side_supports
                .into_iter()
                .map(|s| PreSideSupport::new(s.id, s.intersection_size))
                .collect(),
        }
    }
}

impl From<&PostCandidate> for WirePostSegment {
    fn from(candidate: &PostCandidate) -> Self {
        Self {
            id: candidate.id,
            overlap_size: candidate.overlap_size,
            can_spawn: candidate.can_spawn,
            pre_side_supports: candidate
                .pre_side_supports
                .iter()
                .map(|s| WirePreSupport {
                    id: s.pre_id,
                    intersection_size: s.intersection_size,
                })
                .collect(),
        }
    }
}

const BINARY_TABLE_DETAIL: &str =
    "expected a JSON table document; binary protobuf tables are not supported";

/// First non-whitespace byte opens a JSON object.
fn looks_like_document(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'{')
}

/// Decode table bytes and check the version.
///
/// The version gate runs right after structural decode, before any caller
/// can start resolving against the table.
pub fn load(bytes: &[u8]) -> Result<OverlapTable, TableError> {
    if !looks_like_document(bytes) {
        return Err(TableError::Decode {
            detail: BINARY_TABLE_DETAIL.to_string(),
        });
    }

    let wire: WireTable = serde_json::from_slice(bytes).map_err(|e| TableError::Decode {
        detail: e.to_string(),
    })?;

    if wire.version != SPAWN_TABLE_VERSION {
        return Err(TableError::UnsupportedVersion {
            found: wire.version,
            expected: SPAWN_TABLE_VERSION,
        });
    }

    let mut pre_to_post = BTreeMap::new();
    let mut pre_adjacency = BTreeMap::new();
    for (pre_id, entry) in wire.pre_entries {
        if !entry.post_side_counterparts.is_empty() {
            let candidates: Vec<PostCandidate> = entry
                .post_side_counterparts
                .into_iter()
                .map(PostCandidate::from)
                .collect();
            pre_to_post.insert(pre_id, candidates);
        }
        if !entry.pre_side_neighbors.is_empty() {
            pre_adjacency.insert(pre_id, entry.pre_side_neighbors);
        }
    }

    let post_adjacency: BTreeMap<SegmentId, Vec<SegmentId>> = wire
        .post_entries
        .into_iter()
        .filter(|(_, entry)| !entry.neighbors.is_empty())
        .map(|(post_id, entry)| (post_id, entry.neighbors))
        .collect();

    debug!(
        pre_entries = pre_to_post.len(),
        post_entries = post_adjacency.len(),
        bytes = bytes.len(),
        "Overlap table loaded"
    );

    Ok(OverlapTable::from_parts(
        wire.version,
        pre_to_post,
        post_adjacency,
        pre_adjacency,
    ))
}

/// Encode a table in the stored form read by [`load`].
pub fn encode(table: &OverlapTable) -> Vec<u8> {
    let mut pre_entries: BTreeMap<SegmentId, WirePreEntry> = BTreeMap::new();
    for (pre_id, candidates) in table.pre_to_post() {
        pre_entries.entry(*pre_id).or_default().post_side_counterparts =
            candidates.iter().map(WirePostSegment::from).collect();
    }
    for (pre_id, neighbors) in table.pre_adjacency() {
        pre_entries.entry(*pre_id).or_default().pre_side_neighbors = neighbors.clone();
    }

    let post_entries = table
        .post_adjacency()
        .iter()
        .map(|(post_id, neighbors)| {
            (
                *post_id,
                WirePostEntry {
                    neighbors: neighbors.clone(),
                },
            )
        })
        .collect();

    let wire = WireTable {
        version: table.version(),
        pre_entries,
        post_entries,
    };
    crate::canonical::to_canonical_bytes(&wire)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OverlapTableBuilder;

    fn id(raw: u32) -> SegmentId {
        SegmentId::new(raw)
    }

    #[test]
    fn test_load_example_document() {
        let bytes = br#"{
            "version": 1,
            "pre_entries": {
                "1": {
                    "post_side_counterparts": [
                        { "id": 100, "overlap_size": 1000, "can_spawn": true,
                          "pre_side_supports": [ { "id": 1, "intersection_size": 700 } ] }
                    ],
                    "pre_side_neighbors": [2]
                }
            },
            "post_entries": { "100": { "neighbors": [101] } }
        }"#;

        let table = load(bytes).unwrap();
        assert_eq!(table.version(), 1);

        let candidates = table.candidates_for(id(1));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, id(100));
        assert_eq!(candidates[0].overlap_size, 1000);
        assert!(candidates[0].can_spawn);
        assert_eq!(candidates[0].pre_side_supports, vec![PreSideSupport::new(id(1), 700)]);

        assert_eq!(table.post_neighbors(id(100)), &[id(101)]);
        assert_eq!(table.pre_neighbors(id(1)), &[id(2)]);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let err = load(b"\x08\x01\x12\x00not a table").unwrap_err();
        assert!(matches!(err, TableError::Decode { .. }));

        let err = load(br#"{"version": "one"}"#).unwrap_err();
        assert!(matches!(err, TableError::Decode { .. }));
    }

    #[test]
    fn test_load_names_binary_tables() {
        // version = 1, one pre entry keyed 1 with an empty body.
        let protobuf = b"\x08\x01\x12\x04\x08\x01\x12\x00";
        match load(protobuf).unwrap_err() {
            TableError::Decode { detail } => assert!(detail.contains("protobuf")),
            other => panic!("expected decode error, got {other:?}"),
        }

        match load(b"").unwrap_err() {
            TableError::Decode { detail } => assert!(detail.contains("JSON")),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_rejects_unsupported_version() {
        let err = load(br#"{"version": 2, "pre_entries": {}}"#).unwrap_err();
        assert_eq!(
            err,
            TableError::UnsupportedVersion {
                found: 2,
                expected: 1
            }
        );
        assert!(err.to_string().contains("version 2"));
    }

    #[test]
    fn test_missing_version_reads_as_zero() {
        let err = load(br#"{"pre_entries": {}}"#).unwrap_err();
        assert_eq!(
            err,
            TableError::UnsupportedVersion {
                found: 0,
                expected: 1
            }
        );
    }

    #[test]
    fn test_empty_counterpart_lists_are_absent() {
        let bytes = br#"{"version": 1, "pre_entries": {"5": {"post_side_counterparts": []}}}"#;
        let table = load(bytes).unwrap();
        assert!(!table.contains_pre(id(5)));
        assert_eq!(table.num_pre_entries(), 0);
    }

    #[test]
    fn test_unknown_fields_are_skipped() {
        let bytes = br#"{"version": 1, "generator": "v3", "pre_entries": {}}"#;
        assert!(load(bytes).is_ok());
    }

    #[test]
    fn test_encode_then_load_preserves_table() {
        let table = OverlapTableBuilder::new()
            .candidate(1u32, PostCandidate::new(id(100), 1000, true).with_support(id(1), 700))
            .candidate(1u32, PostCandidate::new(id(101), 50, false).with_support(id(1), 50))
            .candidate(2u32, PostCandidate::new(id(101), 50, true).with_support(id(1), 50))
            .post_edge(100u32, 101u32)
            .pre_edge(1u32, 2u32)
            .build();

        let loaded = load(&encode(&table)).unwrap();
        assert_eq!(loaded, table);
        assert_eq!(loaded.fingerprint(), table.fingerprint());
    }
}
