//! HTTP API routes and handlers.
//!
//! Endpoints are organized by domain:
//! - `devices` - Per-device mode, battery and cached metadata
//! - `scan` - Scan coordinator status
//! - `health` - Service health checks
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::AppState;

pub mod devices;
pub mod error;
pub mod health;
pub mod openapi;
pub mod scan;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                          - Health check
/// /swagger-ui                      - Swagger UI
/// /api
/// ├── /devices/{address}/mode      - Operation mode
/// ├── /devices/{address}/battery   - Battery level
/// ├── /devices/{address}/metadata  - Cached advertisement record
/// ├── /scan                        - Scan coordinator status
/// └── /openapi.json                - OpenAPI specification
/// ```
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .nest("/devices", devices::router())
                .route("/scan", get(scan::get_scan_status)),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", openapi::ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
