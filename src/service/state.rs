//! Shared service state.

use std::sync::Arc;

use crate::cache::{CacheConfig, CachedTableSource};
use crate::config::ServiceConfig;
use crate::store::TableSource;

/// Shared service state.
///
/// Holds the cached table source and the ratio applied when a request omits
/// `match_ratio`.
pub struct ServiceState<S: TableSource + 'static> {
    /// Table source with the byte cache in front of it.
    pub tables: Arc<CachedTableSource<S>>,
    default_match_ratio: f64,
}

impl<S: TableSource + 'static> ServiceState<S> {
    /// Create service state around an origin.
    pub fn new(origin: S, cache: CacheConfig, default_match_ratio: f64) -> Self {
        Self {
            tables: Arc::new(CachedTableSource::with_config(origin, cache)),
            default_match_ratio,
        }
    }

    /// Create service state from a loaded configuration.
    pub fn from_config(origin: S, config: &ServiceConfig) -> Self {
        Self::new(origin, config.cache.clone(), config.default_match_ratio)
    }

    /// Ratio used when a request omits one.
    pub fn default_match_ratio(&self) -> f64 {
        self.default_match_ratio
    }
}

impl<S: TableSource + 'static> Clone for ServiceState<S> {
    fn clone(&self) -> Self {
        Self {
            tables: Arc::clone(&self.tables),
            default_match_ratio: self.default_match_ratio,
        }
    }
}
