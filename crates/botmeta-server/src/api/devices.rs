//! Device metadata API endpoints.
//!
//! These endpoints are thin adapters over the metadata facade. Mode and
//! battery queries always answer immediately: when nothing is cached they
//! return the default and start a background scan, so pollers should simply
//! ask again on their next cycle.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use botmeta_core::{is_valid_mac_address, DeviceAddress, MetadataRecord, OperationMode};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Longest scan a caller may request, in milliseconds.
pub const MAX_SCAN_BUDGET_MS: u64 = 60_000;

/// Creates the devices router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{address}/mode", get(get_operation_mode))
        .route("/{address}/battery", get(get_battery_level))
        .route("/{address}/metadata", get(get_cached_metadata))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Scan budget for a query that misses the cache.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ScanBudgetQuery {
    /// How long a triggered scan listens, in milliseconds (1-60000).
    /// Defaults to the configured budget.
    #[param(example = 5000)]
    pub scan_ms: Option<u64>,
}

/// Operation mode response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "address": "AA:BB:CC:DD:EE:FF",
    "mode": "switch",
    "cached": true
}))]
pub struct OperationModeResponse {
    /// Device address.
    #[schema(example = "AA:BB:CC:DD:EE:FF")]
    pub address: String,

    /// Operation mode; `switch` when unknown.
    pub mode: OperationMode,

    /// Whether the answer came from an observed advertisement rather than the default.
    #[schema(example = true)]
    pub cached: bool,
}

/// Battery level response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "address": "AA:BB:CC:DD:EE:FF",
    "battery": 80,
    "cached": true
}))]
pub struct BatteryLevelResponse {
    /// Device address.
    #[schema(example = "AA:BB:CC:DD:EE:FF")]
    pub address: String,

    /// Battery level in percent; the configured default when unknown.
    #[schema(example = 80)]
    pub battery: u8,

    /// Whether the answer came from an observed advertisement rather than the default.
    #[schema(example = true)]
    pub cached: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get a bot's operation mode.
#[utoipa::path(
    get,
    path = "/api/devices/{address}/mode",
    tag = "devices",
    operation_id = "getOperationMode",
    summary = "Get a bot's operation mode",
    description = "Returns the cached operation mode. On a cache miss returns \
        `switch` with `cached: false` and starts a background scan; query \
        again after the scan budget has elapsed.",
    params(
        ("address" = String, Path, description = "Device address; MAC addresses are matched case-insensitively", example = "AA:BB:CC:DD:EE:FF"),
        ScanBudgetQuery
    ),
    responses(
        (status = 200, description = "Mode returned (possibly the default)", body = OperationModeResponse),
        (status = 400, description = "Blank address or invalid scan budget", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn get_operation_mode(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<ScanBudgetQuery>,
) -> ApiResult<Json<OperationModeResponse>> {
    let address = parse_address(&address)?;
    let budget = scan_budget(&state, &query)?;

    let record = state.metadata().query_metadata(&address, budget);

    Ok(Json(OperationModeResponse {
        address: address.to_string(),
        mode: record
            .as_ref()
            .map_or(OperationMode::Switch, MetadataRecord::operation_mode),
        cached: record.is_some(),
    }))
}

/// Get a bot's battery level.
#[utoipa::path(
    get,
    path = "/api/devices/{address}/battery",
    tag = "devices",
    operation_id = "getBatteryLevel",
    summary = "Get a bot's battery level",
    description = "Returns the cached battery level. On a cache miss returns \
        the configured default with `cached: false` and starts a background scan.",
    params(
        ("address" = String, Path, description = "Device address; MAC addresses are matched case-insensitively", example = "AA:BB:CC:DD:EE:FF"),
        ScanBudgetQuery
    ),
    responses(
        (status = 200, description = "Battery level returned (possibly the default)", body = BatteryLevelResponse),
        (status = 400, description = "Blank address or invalid scan budget", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn get_battery_level(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<ScanBudgetQuery>,
) -> ApiResult<Json<BatteryLevelResponse>> {
    let address = parse_address(&address)?;
    let budget = scan_budget(&state, &query)?;

    let metadata = state.metadata();
    let record = metadata.query_metadata(&address, budget);

    Ok(Json(BatteryLevelResponse {
        address: address.to_string(),
        battery: record
            .as_ref()
            .map_or(metadata.default_battery_level(), MetadataRecord::battery_level),
        cached: record.is_some(),
    }))
}

/// Get the cached advertisement record for a device.
#[utoipa::path(
    get,
    path = "/api/devices/{address}/metadata",
    tag = "devices",
    operation_id = "getCachedMetadata",
    summary = "Get cached device metadata",
    description = "Returns the full cached record without starting a scan.",
    params(
        ("address" = String, Path, description = "Device address; MAC addresses are matched case-insensitively", example = "AA:BB:CC:DD:EE:FF")
    ),
    responses(
        (status = 200, description = "Cached record", body = MetadataRecord),
        (status = 400, description = "Blank address", body = crate::api::error::ErrorResponse),
        (status = 404, description = "Nothing cached for this device", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn get_cached_metadata(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<MetadataRecord>> {
    let address = parse_address(&address)?;
    state
        .metadata()
        .cached_metadata(&address)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound {
            error_code: "metadata_not_cached".to_string(),
            message: format!("No metadata cached for device {address}"),
        })
}

/// Device addresses are opaque; MAC addresses are upper-cased to match the
/// form BlueZ reports them in.
fn parse_address(raw: &str) -> ApiResult<DeviceAddress> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest {
            error_code: "invalid_address".to_string(),
            message: "device address must not be empty".to_string(),
        });
    }
    if is_valid_mac_address(trimmed) {
        Ok(DeviceAddress::new(trimmed.to_ascii_uppercase()))
    } else {
        Ok(DeviceAddress::new(trimmed))
    }
}

fn scan_budget(state: &AppState, query: &ScanBudgetQuery) -> ApiResult<Duration> {
    match query.scan_ms {
        None => Ok(state.config().scan.default_budget()),
        Some(ms) if (1..=MAX_SCAN_BUDGET_MS).contains(&ms) => Ok(Duration::from_millis(ms)),
        Some(ms) => Err(ApiError::BadRequest {
            error_code: "invalid_scan_budget".to_string(),
            message: format!("scan_ms must be between 1 and {MAX_SCAN_BUDGET_MS}, got {ms}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_upper_cases_mac() {
        let address = parse_address("aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(address.as_str(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_parse_address_keeps_opaque_ids() {
        assert_eq!(parse_address("AA:BB:CC").unwrap().as_str(), "AA:BB:CC");
        assert_eq!(parse_address("bot-1").unwrap().as_str(), "bot-1");
    }

    #[test]
    fn test_parse_address_rejects_blank() {
        assert!(matches!(
            parse_address("   "),
            Err(ApiError::BadRequest { .. })
        ));
    }

    #[test]
    fn test_mode_response_serialization() {
        let response = OperationModeResponse {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            mode: OperationMode::Press,
            cached: true,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"mode\":\"press\""));
    }
}
