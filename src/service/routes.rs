//! Axum routes for the spawn resolver service.

use axum::{
    extract::{Json, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crate::cache::CacheStats;
use crate::codec::{self, TableError};
use crate::policy::{check_match_ratio, ResolvePolicy};
use crate::resolver::{Resolution, SpawnResolver};
use crate::store::{HttpTableSource, LoadError, TableKey, TableSource};
use crate::types::SegmentId;
use crate::SPAWN_TABLE_VERSION;

use super::middleware::{metrics_middleware, record_resolve_metrics};
use super::state::ServiceState;

/// Service state over object storage.
pub type AppState = ServiceState<HttpTableSource>;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to resolve spawn groups for a pre-side selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSeedsRequest {
    /// Storage bucket holding the overlap table.
    pub bucket: String,
    /// Path prefix of the pre-side volume.
    pub path_pre: String,
    /// Path prefix of the post-side volume.
    pub path_post: String,
    /// Selected pre-segment IDs. Duplicates collapse.
    pub segments: Vec<SegmentId>,
    /// Threshold fraction; the service default applies when absent.
    #[serde(default)]
    pub match_ratio: Option<f64>,
}

impl GetSeedsRequest {
    fn validate(&self) -> Result<(), ErrorResponse> {
        if !bucket_pattern().is_match(&self.bucket) {
            return Err(ErrorResponse::new(
                StatusCode::BAD_REQUEST,
                "INVALID_BUCKET",
                "Invalid bucket name",
            )
            .with_details(self.bucket.clone()));
        }
        for (field, value) in [("path_pre", &self.path_pre), ("path_post", &self.path_post)] {
            if value.trim().is_empty() {
                return Err(ErrorResponse::new(
                    StatusCode::BAD_REQUEST,
                    "INVALID_PATH",
                    format!("{field} must not be empty"),
                ));
            }
            if value.split('/').any(|part| part == "..") {
                return Err(ErrorResponse::new(
                    StatusCode::BAD_REQUEST,
                    "INVALID_PATH",
                    format!("{field} must not contain '..' components"),
                )
                .with_details(value.clone()));
            }
        }
        Ok(())
    }

    fn table_key(&self) -> TableKey {
        TableKey::new(&self.bucket, &self.path_pre, &self.path_post)
    }
}

fn bucket_pattern() -> &'static regex_lite::Regex {
    static BUCKET: OnceLock<regex_lite::Regex> = OnceLock::new();
    BUCKET.get_or_init(|| {
        regex_lite::Regex::new(r"^[a-z0-9][a-z0-9._-]{1,220}[a-z0-9]$")
            .expect("bucket pattern is valid")
    })
}

/// Service health response (detailed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "healthy" while the process serves requests.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Overlap table version this build accepts.
    pub table_version: u32,
    /// Ratio applied when a request omits one.
    pub default_match_ratio: f64,
    /// Table cache statistics, absent when caching is disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStatsDto>,
}

/// Serializable cache statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsDto {
    /// Current entries.
    pub len: usize,
    /// Capacity.
    pub cap: usize,
    /// Hits since start.
    pub hits: u64,
    /// Misses since start.
    pub misses: u64,
    /// Failed stores since start.
    pub store_failures: u64,
}

impl From<CacheStats> for CacheStatsDto {
    fn from(stats: CacheStats) -> Self {
        Self {
            len: stats.len,
            cap: stats.cap,
            hits: stats.hits,
            misses: stats.misses,
            store_failures: stats.store_failures,
        }
    }
}

/// Simple liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    /// Always "alive".
    pub status: String,
}

/// Structured error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub error: String,
    /// Additional error details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip)]
    status: u16,
}

impl ErrorResponse {
    /// Create a new error response with status, code and message.
    pub fn new(status: StatusCode, code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            error: error.into(),
            details: None,
            status: status.as_u16(),
        }
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// HTTP status this error is served with.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn from_load_error<E: std::error::Error + 'static>(err: LoadError<E>) -> Self {
        match err {
            LoadError::Fetch { key, source } => Self::new(
                StatusCode::BAD_GATEWAY,
                "TABLE_FETCH_FAILED",
                format!("Failed to fetch overlap table {key}"),
            )
            .with_details(source.to_string()),
            LoadError::Table(e) => Self::from_table_error(e),
        }
    }

    fn from_table_error(err: TableError) -> Self {
        match err {
            TableError::Decode { detail } => Self::new(
                StatusCode::BAD_REQUEST,
                "TABLE_DECODE_FAILED",
                "Failed to decode overlap table",
            )
            .with_details(detail),
            e @ TableError::UnsupportedVersion { .. } => Self::new(
                StatusCode::BAD_REQUEST,
                "TABLE_VERSION_UNSUPPORTED",
                e.to_string(),
            ),
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        tracing::warn!(
            code = %self.code,
            error = %self.error,
            details = ?self.details,
            "Request error"
        );
        (self.status(), Json(self)).into_response()
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Resolve spawn groups for a selection against the (pre, post) table.
async fn get_seeds_handler<S: TableSource + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
    Json(request): Json<GetSeedsRequest>,
) -> Result<Json<Vec<BTreeMap<SegmentId, u64>>>, ErrorResponse> {
    let start = Instant::now();
    request.validate()?;

    let match_ratio = request.match_ratio.unwrap_or(state.default_match_ratio());
    check_match_ratio(match_ratio).map_err(|e| {
        ErrorResponse::new(StatusCode::BAD_REQUEST, "INVALID_MATCH_RATIO", e.to_string())
    })?;

    let key = request.table_key();
    let bytes = state.tables.fetch(&key).await.map_err(|source| {
        ErrorResponse::from_load_error(LoadError::Fetch {
            key: key.cache_key(),
            source,
        })
    })?;

    let selection: BTreeSet<SegmentId> = request.segments.iter().copied().collect();
    let selected = selection.len();
    let policy = ResolvePolicy::new(match_ratio);

    // Decoding and resolving are CPU-bound; keep them off the async workers.
    let resolution = tokio::task::spawn_blocking(move || -> Result<Resolution, TableError> {
        let table = codec::load(&bytes)?;
        Ok(SpawnResolver::new(policy).resolve(&table, &selection))
    })
    .await
    .map_err(|e| {
        ErrorResponse::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "Resolution task failed",
        )
        .with_details(e.to_string())
    })?
    .map_err(ErrorResponse::from_table_error)?;

    record_resolve_metrics(
        selected,
        resolution.candidate_count,
        resolution.groups.len(),
        resolution.dropped_groups,
        start.elapsed().as_millis() as u64,
    );

    Ok(Json(resolution.into_segment_maps()))
}

/// Health check endpoint (detailed).
async fn health_handler<S: TableSource + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        table_version: SPAWN_TABLE_VERSION,
        default_match_ratio: state.default_match_ratio(),
        cache: state.tables.cache_stats().map(Into::into),
    })
}

/// Liveness probe endpoint.
///
/// Does NOT check dependencies.
async fn liveness_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
    })
}

// ============================================================================
// Router Construction
// ============================================================================

/// Create the Axum router for the spawn resolver service.
pub fn create_router<S: TableSource + 'static>(state: ServiceState<S>) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/get_seeds", post(get_seeds_handler::<S>))
        .route("/health", get(health_handler::<S>))
        .route("/health/live", get(liveness_handler))
        .layer(middleware::from_fn(metrics_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::store::InMemoryTableSource;
    use crate::types::{OverlapTableBuilder, PostCandidate};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn table_key() -> TableKey {
        TableKey::new("zfish", "chunks/a/", "chunks/b/")
    }

    fn example_table_bytes() -> Vec<u8> {
        let table = OverlapTableBuilder::new()
            .candidate(
                1u32,
                PostCandidate::new(SegmentId::new(100), 1000, true)
                    .with_support(SegmentId::new(1), 700),
            )
            .build();
        codec::encode(&table)
    }

    fn router_with(bytes: Option<Vec<u8>>) -> Router {
        let mut origin = InMemoryTableSource::new();
        if let Some(bytes) = bytes {
            origin.insert(table_key(), bytes);
        }
        create_router(ServiceState::new(origin, CacheConfig::default(), 0.6))
    }

    async fn post_json(router: Router, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/get_seeds")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn seeds_body(segments: &[u32], match_ratio: Option<f64>) -> serde_json::Value {
        serde_json::json!({
            "bucket": "zfish",
            "path_pre": "chunks/a/",
            "path_post": "chunks/b/",
            "segments": segments,
            "match_ratio": match_ratio,
        })
    }

    #[tokio::test]
    async fn test_get_seeds_example() {
        let router = router_with(Some(example_table_bytes()));
        let (status, body) = post_json(router, seeds_body(&[1], Some(0.6))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([{"100": 1000}]));
    }

    #[tokio::test]
    async fn test_get_seeds_uses_default_ratio() {
        let router = router_with(Some(example_table_bytes()));
        let (status, body) = post_json(router, seeds_body(&[1], None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([{"100": 1000}]));
    }

    #[tokio::test]
    async fn test_get_seeds_empty_selection_is_success() {
        let router = router_with(Some(example_table_bytes()));
        let (status, body) = post_json(router, seeds_body(&[], None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_get_seeds_rejects_bad_input() {
        let router = router_with(Some(example_table_bytes()));
        let (status, body) = post_json(router.clone(), seeds_body(&[1], Some(0.2))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_MATCH_RATIO");

        let mut bad_bucket = seeds_body(&[1], None);
        bad_bucket["bucket"] = "Not A Bucket".into();
        let (status, body) = post_json(router.clone(), bad_bucket).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_BUCKET");

        let mut empty_path = seeds_body(&[1], None);
        empty_path["path_post"] = "".into();
        let (status, body) = post_json(router, empty_path).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_PATH");
    }

    #[tokio::test]
    async fn test_get_seeds_rejects_parent_path_components() {
        let router = router_with(Some(example_table_bytes()));

        // "chunks/b/x/.." would otherwise name the same object as "chunks/b/".
        let mut body = seeds_body(&[1], None);
        body["path_post"] = "chunks/b/x/..".into();
        let (status, response) = post_json(router.clone(), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["code"], "INVALID_PATH");
        assert_eq!(response["details"], "chunks/b/x/..");

        let mut body = seeds_body(&[1], None);
        body["path_pre"] = "../chunks/a/".into();
        let (status, response) = post_json(router, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["code"], "INVALID_PATH");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_get_seeds_concurrent_requests() {
        let router = router_with(Some(example_table_bytes()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let router = router.clone();
                tokio::spawn(async move { post_json(router, seeds_body(&[1], Some(0.6))).await })
            })
            .collect();

        for handle in handles {
            let (status, body) = handle.await.unwrap();
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, serde_json::json!([{"100": 1000}]));
        }
    }

    #[test]
    fn test_table_errors_map_to_statuses() {
        let err = ErrorResponse::from_table_error(TableError::UnsupportedVersion {
            found: 3,
            expected: 1,
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "TABLE_VERSION_UNSUPPORTED");

        let err = ErrorResponse::from_table_error(TableError::Decode {
            detail: "eof".to_string(),
        });
        assert_eq!(err.code, "TABLE_DECODE_FAILED");
        assert_eq!(err.details.as_deref(), Some("eof"));
    }

    #[tokio::test]
    async fn test_get_seeds_table_errors() {
        let (status, body) = post_json(router_with(None), seeds_body(&[1], None)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "TABLE_FETCH_FAILED");

        let router = router_with(Some(b"not a table".to_vec()));
        let (status, body) = post_json(router, seeds_body(&[1], None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "TABLE_DECODE_FAILED");
        assert!(body["details"].is_string());

        let router = router_with(Some(br#"{"version": 2}"#.to_vec()));
        let (status, body) = post_json(router, seeds_body(&[1], None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "TABLE_VERSION_UNSUPPORTED");
        assert!(body["error"].as_str().unwrap().contains('2'));
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let router = router_with(None);

        let response = router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: HealthResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(health.table_version, 1);
        assert_eq!(health.cache.unwrap().cap, 256);

        let response = router
            .oneshot(Request::get("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
