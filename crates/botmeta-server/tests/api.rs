//! HTTP behaviour of the botmeta API against a mock radio.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use botmeta_core::{
    advertisement_channel, BotmetaConfig, MetadataService, MockScanDriver, RawAdvertisement,
};
use botmeta_server::api::create_router;
use botmeta_server::state::AppState;
use serde_json::Value;

const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

fn setup() -> (TestServer, AppState, MockScanDriver) {
    let config = BotmetaConfig::default();
    let (tx, rx) = advertisement_channel(config.service.channel_capacity);
    let driver = MockScanDriver::with_sender(tx);
    let metadata = MetadataService::start(&config, Arc::new(driver.clone()), rx).unwrap();
    let state = AppState::from_parts(config, metadata, false);
    let server = TestServer::new(create_router(state.clone())).unwrap();
    (server, state, driver)
}

fn press_mode_advertisement() -> RawAdvertisement {
    serde_json::from_value(serde_json::json!({
        "id": "aabbccddeeff",
        "address": ADDRESS,
        "rssi": -58,
        "serviceData": {
            "model": "H",
            "modelName": "WoHand",
            "modelFriendlyName": "Bot",
            "battery": 64,
            "mode": false
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let (server, _state, _driver) = setup();

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["bluetooth_available"], false);
}

#[tokio::test]
async fn unknown_device_answers_defaults_and_starts_scan() {
    let (server, _state, driver) = setup();

    let mode: Value = server
        .get(&format!("/api/devices/{ADDRESS}/mode"))
        .add_query_param("scan_ms", 20)
        .await
        .json();
    assert_eq!(mode["mode"], "switch");
    assert_eq!(mode["cached"], false);

    let battery: Value = server
        .get(&format!("/api/devices/{ADDRESS}/battery"))
        .add_query_param("scan_ms", 20)
        .await
        .json();
    assert_eq!(battery["battery"], 100);
    assert_eq!(battery["cached"], false);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(driver.start_count(), 1);
}

#[tokio::test]
async fn cached_advertisement_is_served() {
    let (server, state, driver) = setup();
    state
        .metadata()
        .on_advertisement_received(Some(press_mode_advertisement()));

    let mode: Value = server
        .get("/api/devices/aa:bb:cc:dd:ee:ff/mode")
        .await
        .json();
    assert_eq!(mode["address"], ADDRESS);
    assert_eq!(mode["mode"], "press");
    assert_eq!(mode["cached"], true);

    let battery: Value = server
        .get(&format!("/api/devices/{ADDRESS}/battery"))
        .await
        .json();
    assert_eq!(battery["battery"], 64);

    let record: Value = server
        .get(&format!("/api/devices/{ADDRESS}/metadata"))
        .await
        .json();
    assert_eq!(record["service_data"]["model_name"], "WoHand");

    assert_eq!(driver.start_count(), 0);
}

#[tokio::test]
async fn metadata_for_unknown_device_is_not_found() {
    let (server, _state, driver) = setup();

    let response = server.get(&format!("/api/devices/{ADDRESS}/metadata")).await;
    response.assert_status(StatusCode::NOT_FOUND);

    let body: Value = response.json();
    assert_eq!(body["error"], "metadata_not_cached");
    assert_eq!(driver.start_count(), 0);
}

#[tokio::test]
async fn blank_address_is_rejected() {
    let (server, _state, driver) = setup();

    let response = server.get("/api/devices/%20%20/mode").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_address");
    assert_eq!(driver.start_count(), 0);
}

#[tokio::test]
async fn non_mac_address_is_accepted_verbatim() {
    let (server, state, _driver) = setup();
    let mut advertisement = press_mode_advertisement();
    advertisement.address = Some("AA:BB:CC".to_string());
    state.metadata().on_advertisement_received(Some(advertisement));

    let battery: Value = server.get("/api/devices/AA:BB:CC/battery").await.json();
    assert_eq!(battery["address"], "AA:BB:CC");
    assert_eq!(battery["battery"], 64);
    assert_eq!(battery["cached"], true);
}

#[tokio::test]
async fn out_of_range_scan_budget_is_rejected() {
    let (server, _state, _driver) = setup();

    for scan_ms in [0_u64, 60_001] {
        let response = server
            .get(&format!("/api/devices/{ADDRESS}/battery"))
            .add_query_param("scan_ms", scan_ms)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let body: Value = response.json();
        assert_eq!(body["error"], "invalid_scan_budget");
    }
}

#[tokio::test]
async fn scan_status_tracks_session() {
    let (server, _state, _driver) = setup();

    server
        .get(&format!("/api/devices/{ADDRESS}/mode"))
        .add_query_param("scan_ms", 30)
        .await
        .assert_status_ok();

    let during: Value = server.get("/api/scan").await.json();
    assert_eq!(during["scanning"], true);
    assert_eq!(during["active"]["address"], ADDRESS);
    assert_eq!(during["active"]["budget_ms"], 30);

    tokio::time::sleep(Duration::from_millis(100)).await;

    let after: Value = server.get("/api/scan").await.json();
    assert_eq!(after["scanning"], false);
    assert!(after["active"].is_null());
    assert_eq!(after["completed_sessions"], 1);
    assert_eq!(after["failed_sessions"], 0);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let (server, _state, _driver) = setup();

    let response = server.get("/api/openapi.json").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["info"]["title"], "botmeta API");
}
