//! Scan status API endpoint.

use axum::extract::State;
use axum::Json;
use botmeta_core::ScanSession;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::AppState;

/// The scan session currently running.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActiveScanResponse {
    /// Session id.
    pub id: Uuid,

    /// Address whose cache miss started the scan.
    #[schema(example = "AA:BB:CC:DD:EE:FF")]
    pub address: String,

    /// When the scan started (RFC 3339, UTC).
    #[schema(example = "2025-01-15T03:30:00+00:00")]
    pub started_at_utc: String,

    /// How long the scan listens, in milliseconds.
    #[schema(example = 5000)]
    pub budget_ms: u64,
}

impl From<ScanSession> for ActiveScanResponse {
    fn from(session: ScanSession) -> Self {
        Self {
            id: session.id,
            address: session.address.to_string(),
            started_at_utc: session.started_at.to_rfc3339(),
            budget_ms: u64::try_from(session.budget.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Scan coordinator status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "scanning": false,
    "active": null,
    "completed_sessions": 12,
    "failed_sessions": 0,
    "cached_devices": 3,
    "bluetooth_available": true,
    "uptime_secs": 3600
}))]
pub struct ScanStatusResponse {
    /// Whether a scan is running.
    pub scanning: bool,

    /// The running scan, if any.
    #[schema(nullable)]
    pub active: Option<ActiveScanResponse>,

    /// Scans that finished cleanly since startup.
    pub completed_sessions: u64,

    /// Scans that failed since startup.
    pub failed_sessions: u64,

    /// Cache entries, including expired ones awaiting the next sweep.
    pub cached_devices: usize,

    /// Whether a real Bluetooth adapter backs the scans.
    pub bluetooth_available: bool,

    /// Server uptime in seconds.
    pub uptime_secs: u64,
}

/// Get scan coordinator status.
#[utoipa::path(
    get,
    path = "/api/scan",
    tag = "scan",
    operation_id = "getScanStatus",
    summary = "Get scan status",
    description = "Reports whether a scan is running and how many have \
        completed or failed since startup.",
    responses(
        (status = 200, description = "Current status", body = ScanStatusResponse)
    )
)]
pub async fn get_scan_status(State(state): State<AppState>) -> Json<ScanStatusResponse> {
    let metadata = state.metadata();
    let coordinator = metadata.coordinator();
    let active = coordinator.current_session().map(ActiveScanResponse::from);

    Json(ScanStatusResponse {
        scanning: active.is_some(),
        active,
        completed_sessions: coordinator.completed_sessions(),
        failed_sessions: coordinator.failed_sessions(),
        cached_devices: metadata.cache().len(),
        bluetooth_available: state.bluetooth_available(),
        uptime_secs: state.uptime_secs(),
    })
}
