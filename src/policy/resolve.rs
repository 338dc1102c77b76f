//! Resolve policy: match ratio and grouping strategy.
//!
//! ## Float Normalization for Deterministic Hashing
//!
//! `match_ratio` is quantized to an integer (×1e6, rounded) before hashing so
//! that `params_hash` does not depend on float formatting.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::canonical::canonical_hash_hex;
use crate::DEFAULT_MATCH_RATIO;

/// Quantization factor for float normalization.
const FLOAT_QUANTIZATION_FACTOR: f64 = 1_000_000.0;

/// Lowest match ratio callers may request.
pub const MIN_MATCH_RATIO: f64 = 0.5;

/// Highest match ratio callers may request.
pub const MAX_MATCH_RATIO: f64 = 1.0;

/// How candidates are partitioned into spawn groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingStrategy {
    /// Connected components of the collected post-side candidates over the
    /// post-side adjacency graph.
    PostAdjacency,
    /// Connected components of the selected pre-side segments over the
    /// pre-side adjacency graph, each enumerating its own post-side candidates.
    ///
    /// Can partition differently from `PostAdjacency` wherever the two sides'
    /// adjacency disagrees.
    PreAdjacency,
}

impl Default for GroupingStrategy {
    fn default() -> Self {
        Self::PostAdjacency
    }
}

impl fmt::Display for GroupingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PostAdjacency => write!(f, "post_adjacency"),
            Self::PreAdjacency => write!(f, "pre_adjacency"),
        }
    }
}

/// Error for policy values outside the caller contract.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    /// Match ratio outside [0.5, 1.0] (or not a number).
    #[error("match_ratio {0} outside [0.5, 1.0]")]
    MatchRatioOutOfRange(f64),
}

#[derive(Debug, Clone, Serialize)]
struct QuantizedResolveParams {
    match_ratio: i64,
    grouping: GroupingStrategy,
}

/// Parameters of a resolve call.
///
/// The resolver uses `match_ratio` as a plain multiplier and never validates
/// it. Enforcing the [0.5, 1.0] contract is the caller's job, via
/// [`ResolvePolicy::check_match_ratio`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvePolicy {
    /// Fraction of a post-side segment's overlap the selection must cover.
    pub match_ratio: f64,
    /// Partitioning strategy.
    #[serde(default)]
    pub grouping: GroupingStrategy,
}

impl ResolvePolicy {
    /// Post-side-adjacency policy with the given ratio.
    pub fn new(match_ratio: f64) -> Self {
        Self {
            match_ratio,
            grouping: GroupingStrategy::PostAdjacency,
        }
    }

    /// Replace the grouping strategy.
    pub fn with_grouping(mut self, grouping: GroupingStrategy) -> Self {
        self.grouping = grouping;
        self
    }

    /// Check the documented [0.5, 1.0] range.
    pub fn check_match_ratio(&self) -> Result<(), PolicyError> {
        check_match_ratio(self.match_ratio)
    }

    /// Digest of the quantized parameters, for correlating logs.
    pub fn params_hash(&self) -> String {
        canonical_hash_hex(&QuantizedResolveParams {
            match_ratio: (self.match_ratio * FLOAT_QUANTIZATION_FACTOR).round() as i64,
            grouping: self.grouping,
        })
    }
}

impl Default for ResolvePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_RATIO)
    }
}

/// Check a match ratio against the [0.5, 1.0] caller contract.
pub fn check_match_ratio(match_ratio: f64) -> Result<(), PolicyError> {
    if (MIN_MATCH_RATIO..=MAX_MATCH_RATIO).contains(&match_ratio) {
        Ok(())
    } else {
        Err(PolicyError::MatchRatioOutOfRange(match_ratio))
    }
}
