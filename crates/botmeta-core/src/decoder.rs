//! Advertisement validation.
//!
//! Turns a [`RawAdvertisement`] reported by a scan driver into a
//! [`MetadataRecord`], or explains why it cannot. Decoding is pure: it reads
//! nothing but its input and never panics.

use thiserror::Error;

use crate::types::{DeviceAddress, MetadataRecord, RawAdvertisement, RawServiceData, ServiceData};

/// Why an advertisement was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The advertisement lacks a structural field (`id`, `address`, `rssi`).
    #[error("advertisement is missing required field `{0}`")]
    MissingField(&'static str),

    /// The advertisement carries no service data at all.
    #[error("advertisement carries no service data")]
    MissingServiceData,

    /// A required service data field is absent or empty.
    #[error("service data field `{0}` is missing or empty")]
    EmptyServiceField(&'static str),

    /// The battery level is not a percentage.
    #[error("battery level {0} is outside 1-100")]
    BatteryOutOfRange(i64),
}

/// Outcome of decoding a single advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A valid record.
    Valid(MetadataRecord),
    /// Input was present but not a usable advertisement.
    Invalid(DecodeError),
    /// No input at all.
    Absent,
}

impl Decoded {
    /// The decoded record, if any.
    #[must_use]
    pub fn into_record(self) -> Option<MetadataRecord> {
        match self {
            Self::Valid(record) => Some(record),
            Self::Invalid(_) | Self::Absent => None,
        }
    }
}

/// Decode a raw advertisement.
///
/// `mode` is carried through unchanged; defaults are applied by the query
/// layer, not here.
#[must_use]
pub fn decode(raw: Option<&RawAdvertisement>) -> Decoded {
    let Some(raw) = raw else {
        return Decoded::Absent;
    };
    match decode_advertisement(raw) {
        Ok(record) => Decoded::Valid(record),
        Err(err) => Decoded::Invalid(err),
    }
}

fn decode_advertisement(raw: &RawAdvertisement) -> Result<MetadataRecord, DecodeError> {
    let id = non_empty(raw.id.as_deref()).ok_or(DecodeError::MissingField("id"))?;
    let address = non_empty(raw.address.as_deref()).ok_or(DecodeError::MissingField("address"))?;
    let rssi = raw.rssi.ok_or(DecodeError::MissingField("rssi"))?;
    let service_data = raw
        .service_data
        .as_ref()
        .ok_or(DecodeError::MissingServiceData)?;

    Ok(MetadataRecord {
        id: id.to_string(),
        address: DeviceAddress::new(address),
        rssi,
        service_data: decode_service_data(service_data)?,
    })
}

fn decode_service_data(raw: &RawServiceData) -> Result<ServiceData, DecodeError> {
    let model = required(raw.model.as_deref(), "model")?;
    let model_name = required(raw.model_name.as_deref(), "modelName")?;
    let model_friendly_name = required(raw.model_friendly_name.as_deref(), "modelFriendlyName")?;

    // Zero counts as missing, same as an absent field.
    let battery = match raw.battery {
        None | Some(0) => return Err(DecodeError::EmptyServiceField("battery")),
        Some(level) => u8::try_from(level)
            .ok()
            .filter(|level| *level <= 100)
            .ok_or(DecodeError::BatteryOutOfRange(level))?,
    };

    Ok(ServiceData {
        model: model.to_string(),
        model_name: model_name.to_string(),
        model_friendly_name: model_friendly_name.to_string(),
        battery,
        mode: raw.mode,
    })
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, DecodeError> {
    non_empty(value).ok_or(DecodeError::EmptyServiceField(field))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
