//! Core types for the spawn resolver.

pub mod segment;
pub mod table;

pub use segment::SegmentId;
pub use table::{OverlapTable, OverlapTableBuilder, PostCandidate, PreSideSupport};
