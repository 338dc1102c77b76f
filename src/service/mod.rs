//! Spawn Resolver REST Service
//!
//! Exposes the resolver over HTTP, loading overlap tables from object storage
//! through the table cache.
//!
//! ## Endpoints
//!
//! - `POST /get_seeds` - Resolve spawn groups for a pre-side selection
//! - `GET /health` - Detailed service health check
//! - `GET /health/live` - Liveness probe

pub mod middleware;
pub mod routes;
pub mod state;

pub use middleware::{metrics_middleware, record_resolve_metrics};
pub use routes::{create_router, AppState, ErrorResponse, GetSeedsRequest};
pub use state::ServiceState;
