//! Shared types and OpenAPI schemas.
//!
//! This module contains the metadata model shared by the decoder, the cache
//! and the query facade, plus the loosely-typed [`RawAdvertisement`] shape a
//! scan driver reports before validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Opaque identifier of a BLE device, used as the cache key.
///
/// The address is kept exactly as supplied; two addresses are the same
/// device only if their strings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String, example = "AA:BB:CC:DD:EE:FF")]
pub struct DeviceAddress(String);

impl DeviceAddress {
    /// Wrap an address string.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The address string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for DeviceAddress {
    fn from(address: String) -> Self {
        Self::new(address)
    }
}

/// Operation mode of a SwitchBot Bot.
///
/// In switch mode the bot behaves like a toggle with on/off states. In press
/// mode it has no state and performs a single momentary press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    /// Toggle with on/off states.
    Switch,
    /// Momentary press.
    Press,
}

impl OperationMode {
    /// Map the advertised mode flag (`true` = switch mode) to a mode.
    #[must_use]
    pub const fn from_switch_flag(is_switch_mode: bool) -> Self {
        if is_switch_mode {
            Self::Switch
        } else {
            Self::Press
        }
    }

    /// Wire name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Switch => "switch",
            Self::Press => "press",
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated service data carried in a device advertisement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "model": "H",
    "model_name": "WoHand",
    "model_friendly_name": "Bot",
    "battery": 80,
    "mode": true
}))]
pub struct ServiceData {
    /// Single-character model identifier (e.g. `H` for the Bot).
    #[schema(example = "H")]
    pub model: String,

    /// Model name as reported by the device.
    #[schema(example = "WoHand")]
    pub model_name: String,

    /// Human-readable model name.
    #[schema(example = "Bot")]
    pub model_friendly_name: String,

    /// Battery level in percent (1-100).
    #[schema(example = 80)]
    pub battery: u8,

    /// `true` in switch mode, `false` in press mode, absent when not advertised.
    #[schema(example = true)]
    pub mode: Option<bool>,
}

/// A decoded advertisement for a single device.
///
/// Records are only produced by [`crate::decoder::decode`] and are never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MetadataRecord {
    /// Device identifier reported by the scan driver.
    #[schema(example = "aabbccddeeff")]
    pub id: String,

    /// Device address.
    pub address: DeviceAddress,

    /// Received signal strength in dBm.
    #[schema(example = -60)]
    pub rssi: i16,

    /// Validated service data.
    pub service_data: ServiceData,
}

impl MetadataRecord {
    /// Operation mode of the device, defaulting to switch mode when the
    /// advertisement did not carry one.
    #[must_use]
    pub fn operation_mode(&self) -> OperationMode {
        OperationMode::from_switch_flag(self.service_data.mode.unwrap_or(true))
    }

    /// Battery level in percent.
    #[must_use]
    pub const fn battery_level(&self) -> u8 {
        self.service_data.battery
    }
}

/// Advertisement as reported by a scan driver, before validation.
///
/// Every field is optional so that partial or foreign advertisements can be
/// represented and rejected by the decoder rather than failing to parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAdvertisement {
    /// Device identifier.
    pub id: Option<String>,

    /// Device address.
    pub address: Option<String>,

    /// Signal strength in dBm.
    #[serde(alias = "signalStrength")]
    pub rssi: Option<i16>,

    /// Unvalidated service data.
    pub service_data: Option<RawServiceData>,
}

/// Unvalidated service data from an advertisement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawServiceData {
    /// Model identifier.
    pub model: Option<String>,

    /// Model name.
    pub model_name: Option<String>,

    /// Human-readable model name.
    pub model_friendly_name: Option<String>,

    /// Battery level; kept wide so out-of-range values can be rejected.
    pub battery: Option<i64>,

    /// Switch (`true`) or press (`false`) mode.
    pub mode: Option<bool>,
}
