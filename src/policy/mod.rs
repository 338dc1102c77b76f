//! Resolve policy and scoring.

pub mod resolve;
pub mod scoring;

pub use resolve::{
    check_match_ratio, GroupingStrategy, PolicyError, ResolvePolicy, MAX_MATCH_RATIO,
    MIN_MATCH_RATIO,
};
pub use scoring::{match_score, required_size, BestMatch, BestMatchTracker};
