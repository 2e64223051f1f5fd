//! OpenAPI specification generation for the botmeta API.
//!
//! The document is served through Swagger UI at `/api/openapi.json` and
//! written to disk by the `gen-openapi` binary.

use botmeta_core::{MetadataRecord, OperationMode, ServiceData};
use utoipa::OpenApi;

use super::devices::{BatteryLevelResponse, OperationModeResponse};
use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::scan::{ActiveScanResponse, ScanStatusResponse};

/// Returns the OpenAPI specification as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> serde_json::Result<String> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for botmeta.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "botmeta API",
        version = "0.1.0",
        description = r#"
# botmeta API

botmeta answers questions about SwitchBot Bot devices from their Bluetooth LE
advertisements.

## Overview

Bots broadcast their operation mode and battery level in every advertisement.
botmeta keeps the most recent advertisement per device for a short time and
answers from that cache:

1. **Mode**: whether the bot is in `switch` or `press` mode
2. **Battery**: battery level in percent

## Query semantics

Queries never block on Bluetooth. When a device has nothing cached the answer is
a default (`switch`, or the configured battery level) with `cached: false`, and
a scan is started in the background. Only one scan runs at a time; queries that
miss while it runs share it. Poll again after the scan budget to get the
observed value.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local botmeta server")
    ),
    tags(
        (
            name = "system",
            description = "Health checks"
        ),
        (
            name = "devices",
            description = "Per-device mode, battery and cached advertisement data"
        ),
        (
            name = "scan",
            description = "Bluetooth scan coordinator status"
        )
    ),
    paths(
        super::health::health_check,
        super::devices::get_operation_mode,
        super::devices::get_battery_level,
        super::devices::get_cached_metadata,
        super::scan::get_scan_status,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            OperationMode,
            OperationModeResponse,
            BatteryLevelResponse,
            MetadataRecord,
            ServiceData,
            ActiveScanResponse,
            ScanStatusResponse,
        )
    )
)]
pub struct ApiDoc;
