//! # spawn-resolver
//!
//! Deterministic spawn-candidate resolution over precomputed overlap tables.
//!
//! Two adjacent segmentation volumes are stitched together by an offline
//! generator that records, for every pre-side segment, the post-side segments
//! it overlaps. Given a user's selection of pre-side segments, the resolver
//! answers one question:
//!
//! > Which post-side segments should be spawned, and grouped how?
//!
//! ## Pipeline
//!
//! ```text
//! TableKey → TableSource (HTTP / memory) → CachedTableSource → codec::load
//!                                                                  ↓
//!                   selection + ResolvePolicy → SpawnResolver → spawn groups
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same table + same selection + same ratio → identical output
//! - Groups appear in discovery order (ascending selected pre-ID, then list order)
//! - Score ties go to the first candidate encountered
//!
//! ## Example
//!
//! ```
//! use std::collections::BTreeSet;
//! use spawn_resolver::{resolve, OverlapTableBuilder, PostCandidate, SegmentId};
//!
//! let table = OverlapTableBuilder::new()
//!     .candidate(
//!         1u32,
//!         PostCandidate::new(SegmentId::new(100), 1000, true)
//!             .with_support(SegmentId::new(1), 700),
//!     )
//!     .build();
//!
//! let selection: BTreeSet<SegmentId> = [SegmentId::new(1)].into_iter().collect();
//! let groups = resolve(&table, &selection, 0.6);
//! assert_eq!(groups.len(), 1);
//! assert_eq!(groups[0][&SegmentId::new(100)], 1000);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod canonical;
pub mod codec;
pub mod config;
pub mod policy;
pub mod resolver;
pub mod store;
pub mod types;

#[cfg(feature = "service")]
pub mod service;

// Re-exports
pub use cache::{CacheConfig, CacheStats, CachedTableSource};
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes};
pub use codec::{encode, load, TableError};
pub use config::{ConfigError, LogFormat, ServiceConfig};
pub use policy::{check_match_ratio, GroupingStrategy, PolicyError, ResolvePolicy};
pub use resolver::{resolve, Resolution, SpawnGroup, SpawnResolver};
pub use store::{load_table, InMemoryTableSource, LoadError, TableKey, TableSource};
#[cfg(feature = "http")]
pub use store::HttpTableSource;
pub use types::{OverlapTable, OverlapTableBuilder, PostCandidate, PreSideSupport, SegmentId};

/// The only overlap table version this crate reads.
pub const SPAWN_TABLE_VERSION: u32 = 1;

/// Match ratio applied when the caller does not supply one.
pub const DEFAULT_MATCH_RATIO: f64 = 0.6;
