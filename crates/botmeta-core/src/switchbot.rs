//! SwitchBot advertisement payload parsing.
//!
//! SwitchBot devices broadcast their state as BLE service data. This module
//! turns that byte payload into [`RawServiceData`] so scan drivers can hand
//! the decoder the same shape regardless of where the bytes came from.

use uuid::{uuid, Uuid};

use crate::types::{RawAdvertisement, RawServiceData};

/// 128-bit service UUID used by older SwitchBot firmware.
pub const SWITCHBOT_SERVICE_UUID: Uuid = uuid!("cba20d00-224d-11e6-9fb8-0002a5d5c51b");

/// 16-bit service UUID (0xFD3D) used by current SwitchBot firmware.
pub const SWITCHBOT_SERVICE_UUID_16: Uuid = uuid!("0000fd3d-0000-1000-8000-00805f9b34fb");

/// All service UUIDs a SwitchBot device may advertise its state under.
pub const SWITCHBOT_SERVICE_UUIDS: [Uuid; 2] = [SWITCHBOT_SERVICE_UUID, SWITCHBOT_SERVICE_UUID_16];

/// Model byte of the SwitchBot Bot.
pub const BOT_MODEL: char = 'H';

/// Parse a SwitchBot service data payload.
///
/// Returns `None` for payloads that are too short or belong to a model this
/// crate does not understand.
///
/// Bot layout:
///
/// ```text
/// byte 0  bit 0-6  model ('H')
/// byte 1  bit 7    mode (1 = switch, 0 = press)
/// byte 2  bit 0-6  battery percent
/// ```
#[must_use]
pub fn parse_service_data(payload: &[u8]) -> Option<RawServiceData> {
    let [model_byte, flags, battery, ..] = *payload else {
        return None;
    };

    let model = char::from(model_byte & 0x7f);
    match model {
        BOT_MODEL => Some(RawServiceData {
            model: Some(model.to_string()),
            model_name: Some("WoHand".to_string()),
            model_friendly_name: Some("Bot".to_string()),
            battery: Some(i64::from(battery & 0x7f)),
            mode: Some(flags & 0x80 != 0),
        }),
        _ => None,
    }
}

/// Build a [`RawAdvertisement`] from the pieces a BLE stack reports.
///
/// The device id is the address with separators removed, lower-cased.
#[must_use]
pub fn advertisement_from_payload(
    address: &str,
    rssi: Option<i16>,
    payload: &[u8],
) -> Option<RawAdvertisement> {
    let service_data = parse_service_data(payload)?;
    Some(RawAdvertisement {
        id: Some(address.replace(':', "").to_ascii_lowercase()),
        address: Some(address.to_string()),
        rssi,
        service_data: Some(service_data),
    })
}
