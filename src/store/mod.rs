//! Table sources: where overlap table bytes come from.

pub mod memory;

#[cfg(feature = "http")]
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::{self, TableError};
use crate::types::OverlapTable;

/// Object name suffix of stored overlap tables.
pub const TABLE_OBJECT_SUFFIX: &str = ".pb.spawn";

/// Storage key of the overlap table for one (pre, post) volume pair.
///
/// Tables are stored next to the pre-side volume and named after the
/// post-side chunk: `{pre_path}{post_chunk}.pb.spawn`, where `post_chunk` is
/// the last path component of `post_path`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableKey {
    /// Storage bucket.
    pub bucket: String,
    /// Path prefix of the pre-side volume (normally ends with `/`).
    pub pre_path: String,
    /// Path prefix of the post-side volume.
    pub post_path: String,
}

impl TableKey {
    /// Create a key.
    pub fn new(
        bucket: impl Into<String>,
        pre_path: impl Into<String>,
        post_path: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            pre_path: pre_path.into(),
            post_path: post_path.into(),
        }
    }

    /// Last component of the normalized post-side path.
    ///
    /// Empty and `.` components are skipped and `..` removes the component
    /// before it, so `a/b/..` names chunk `a`.
    pub fn post_chunk(&self) -> &str {
        let mut parts: Vec<&str> = Vec::new();
        for part in self.post_path.split('/') {
            match part {
                "" | "." => {}
                ".." if parts.last().is_some_and(|last| *last != "..") => {
                    parts.pop();
                }
                _ => parts.push(part),
            }
        }
        parts.last().copied().unwrap_or("")
    }

    /// Object name within the bucket.
    pub fn object_name(&self) -> String {
        format!("{}{}{}", self.pre_path, self.post_chunk(), TABLE_OBJECT_SUFFIX)
    }

    /// Full URL below a storage base URL.
    pub fn url(&self, base_url: &str) -> String {
        format!(
            "{}/{}/{}",
            base_url.trim_end_matches('/'),
            self.bucket,
            self.object_name()
        )
    }

    /// Bucket-qualified name, used as the cache key.
    pub fn cache_key(&self) -> String {
        format!("{}/{}", self.bucket, self.object_name())
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cache_key())
    }
}

/// Trait for table byte sources.
///
/// A source only fetches; decoding is [`crate::codec::load`]'s job.
#[async_trait]
pub trait TableSource: Send + Sync {
    /// Error type for fetch operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch the raw table bytes for a key.
    async fn fetch(&self, key: &TableKey) -> Result<Vec<u8>, Self::Error>;
}

/// Error from [`load_table`].
#[derive(Debug, thiserror::Error)]
pub enum LoadError<E: std::error::Error + 'static> {
    /// The source could not deliver the bytes.
    #[error("Failed to fetch overlap table {key}: {source}")]
    Fetch {
        /// Bucket-qualified object name.
        key: String,
        /// Underlying source error.
        #[source]
        source: E,
    },
    /// The bytes did not decode into a supported table.
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Fetch and decode the table for a key.
pub async fn load_table<S>(source: &S, key: &TableKey) -> Result<OverlapTable, LoadError<S::Error>>
where
    S: TableSource + ?Sized,
{
    let bytes = source.fetch(key).await.map_err(|source| LoadError::Fetch {
        key: key.cache_key(),
        source,
    })?;
    Ok(codec::load(&bytes)?)
}

pub use memory::InMemoryTableSource;

#[cfg(feature = "http")]
pub use http::HttpTableSource;
