//! The decoded overlap table.
//!
//! An `OverlapTable` describes, for one pair of neighboring volumes, which
//! post-side segments each pre-side segment overlaps and how the post-side
//! segments touch each other. Tables are built once (by [`crate::codec::load`]
//! or [`OverlapTableBuilder`]) and are read-only afterwards, so a single
//! instance can be shared across concurrent resolve calls.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::segment::SegmentId;
use crate::canonical::canonical_hash_hex;
use crate::SPAWN_TABLE_VERSION;

/// Voxel count shared between one pre-side segment and one post-side segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreSideSupport {
    /// The supporting pre-side segment.
    pub pre_id: SegmentId,
    /// Voxels shared by `pre_id` and the post-side segment.
    pub intersection_size: u64,
}

impl PreSideSupport {
    /// Create a new support record.
    pub fn new(pre_id: SegmentId, intersection_size: u64) -> Self {
        Self {
            pre_id,
            intersection_size,
        }
    }
}

/// A post-side segment overlapping some pre-side segment.
///
/// The same post-side segment is listed once under every pre-side segment it
/// overlaps. Size fields are identical across those copies; `can_spawn` may
/// differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCandidate {
    /// Post-side segment ID.
    pub id: SegmentId,
    /// Total overlap footprint of the post-side segment.
    pub overlap_size: u64,
    /// False for segments that must never be proposed (background, dust,
    /// segments truncated by the volume boundary).
    pub can_spawn: bool,
    /// Per-pre-segment intersections with this post-side segment.
    pub pre_side_supports: Vec<PreSideSupport>,
}

impl PostCandidate {
    /// Create a candidate without supports.
    pub fn new(id: SegmentId, overlap_size: u64, can_spawn: bool) -> Self {
        Self {
            id,
            overlap_size,
            can_spawn,
            pre_side_supports: Vec::new(),
        }
    }

    /// Add a pre-side support (builder style).
    pub fn with_support(mut self, pre_id: SegmentId, intersection_size: u64) -> Self {
        self.pre_side_supports
            .push(PreSideSupport::new(pre_id, intersection_size));
        self
    }

    /// Sum of intersections contributed by selected pre-side segments.
    ///
    /// Saturates instead of overflowing on garbage input.
    pub fn accumulated_support(&self, selection: &BTreeSet<SegmentId>) -> u64 {
        self.pre_side_supports
            .iter()
            .filter(|s| selection.contains(&s.pre_id))
            .fold(0u64, |acc, s| acc.saturating_add(s.intersection_size))
    }
}

/// Decoded, versioned overlap table between a pre-side and a post-side volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlapTable {
    version: u32,
    pre_to_post: BTreeMap<SegmentId, Vec<PostCandidate>>,
    post_adjacency: BTreeMap<SegmentId, Vec<SegmentId>>,
    pre_adjacency: BTreeMap<SegmentId, Vec<SegmentId>>,
}

impl OverlapTable {
    pub(crate) fn from_parts(
        version: u32,
        pre_to_post: BTreeMap<SegmentId, Vec<PostCandidate>>,
        post_adjacency: BTreeMap<SegmentId, Vec<SegmentId>>,
        pre_adjacency: BTreeMap<SegmentId, Vec<SegmentId>>,
    ) -> Self {
        Self {
            version,
            pre_to_post,
            post_adjacency,
            pre_adjacency,
        }
    }

    /// Table format version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Post-side candidates of a pre-side segment (empty if it overlaps nothing).
    pub fn candidates_for(&self, pre_id: SegmentId) -> &[PostCandidate] {
        self.pre_to_post
            .get(&pre_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Post-side neighbors of a post-side segment.
    pub fn post_neighbors(&self, post_id: SegmentId) -> &[SegmentId] {
        self.post_adjacency
            .get(&post_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Pre-side neighbors of a pre-side segment.
    pub fn pre_neighbors(&self, pre_id: SegmentId) -> &[SegmentId] {
        self.pre_adjacency
            .get(&pre_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether the pre-side segment has an entry.
    pub fn contains_pre(&self, pre_id: SegmentId) -> bool {
        self.pre_to_post.contains_key(&pre_id)
    }

    /// The full pre → post mapping.
    pub fn pre_to_post(&self) -> &BTreeMap<SegmentId, Vec<PostCandidate>> {
        &self.pre_to_post
    }

    /// The full post-side adjacency.
    pub fn post_adjacency(&self) -> &BTreeMap<SegmentId, Vec<SegmentId>> {
        &self.post_adjacency
    }

    /// The full pre-side adjacency.
    pub fn pre_adjacency(&self) -> &BTreeMap<SegmentId, Vec<SegmentId>> {
        &self.pre_adjacency
    }

    /// Number of pre-side entries.
    pub fn num_pre_entries(&self) -> usize {
        self.pre_to_post.len()
    }

    /// Deterministic content digest (xxh64 of the canonical JSON form).
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(self)
    }
}

/// Builder for overlap tables.
///
/// Used by fixtures, tests and benches; production tables come from
/// [`crate::codec::load`].
#[derive(Debug, Clone)]
pub struct OverlapTableBuilder {
    version: u32,
    pre_to_post: BTreeMap<SegmentId, Vec<PostCandidate>>,
    post_adjacency: BTreeMap<SegmentId, Vec<SegmentId>>,
    pre_adjacency: BTreeMap<SegmentId, Vec<SegmentId>>,
}

impl OverlapTableBuilder {
    /// Start a table with the supported version.
    pub fn new() -> Self {
        Self {
            version: SPAWN_TABLE_VERSION,
            pre_to_post: BTreeMap::new(),
            post_adjacency: BTreeMap::new(),
            pre_adjacency: BTreeMap::new(),
        }
    }

    /// Override the version (for exercising the version gate).
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Append a post-side candidate to a pre-side segment's list.
    pub fn candidate(mut self, pre_id: impl Into<SegmentId>, candidate: PostCandidate) -> Self {
        self.pre_to_post
            .entry(pre_id.into())
            .or_default()
            .push(candidate);
        self
    }

    /// Add an undirected post-side adjacency edge.
    pub fn post_edge(mut self, a: impl Into<SegmentId>, b: impl Into<SegmentId>) -> Self {
        let (a, b) = (a.into(), b.into());
        self.post_adjacency.entry(a).or_default().push(b);
        self.post_adjacency.entry(b).or_default().push(a);
        self
    }

    /// Add a directed post-side adjacency entry (`from` lists `to`).
    pub fn post_neighbor(mut self, from: impl Into<SegmentId>, to: impl Into<SegmentId>) -> Self {
        self.post_adjacency
            .entry(from.into())
            .or_default()
            .push(to.into());
        self
    }

    /// Add an undirected pre-side adjacency edge.
    pub fn pre_edge(mut self, a: impl Into<SegmentId>, b: impl Into<SegmentId>) -> Self {
        let (a, b) = (a.into(), b.into());
        self.pre_adjacency.entry(a).or_default().push(b);
        self.pre_adjacency.entry(b).or_default().push(a);
        self
    }

    /// Finish the table.
    pub fn build(self) -> OverlapTable {
        OverlapTable::from_parts(
            self.version,
            self.pre_to_post,
            self.post_adjacency,
            self.pre_adjacency,
        )
    }
}

impl Default for OverlapTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}
