//! Unified error type for the botmeta core library.
//!
//! [`BotmetaError`] covers the failures that can stop the service from
//! starting: invalid configuration, no Tokio runtime, or no usable Bluetooth
//! adapter. Each module keeps its own specific error type (`ConfigError`,
//! `ScanError`, `DecodeError`) for internal use.
//!
//! Note that queries never return these: a cache miss, a failed scan or a
//! malformed advertisement all degrade to default answers.
//!
//! # Example
//!
//! ```rust
//! use botmeta_core::error::{BotmetaError, Result};
//!
//! fn require_runtime() -> Result<()> {
//!     tokio::runtime::Handle::try_current().map_err(|_| BotmetaError::RuntimeUnavailable)?;
//!     Ok(())
//! }
//! let err = require_runtime().unwrap_err();
//! assert_eq!(err.error_code(), "RUNTIME_UNAVAILABLE");
//! ```

use thiserror::Error;

use crate::bluetooth::ScanError;
use crate::config::ConfigError;

/// The unified error type for service setup.
#[derive(Debug, Error)]
pub enum BotmetaError {
    /// The Bluetooth driver could not be opened.
    #[error("Bluetooth unavailable: {0}")]
    Bluetooth(#[from] ScanError),

    /// The configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The service was constructed outside a Tokio runtime.
    #[error("No Tokio runtime available. Start the metadata service from within an async context.")]
    RuntimeUnavailable,
}

/// A specialized [`Result`] type for botmeta operations.
pub type Result<T> = std::result::Result<T, BotmetaError>;

impl BotmetaError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Bluetooth(ScanError::AdapterNotFound) => "BLUETOOTH_ADAPTER_NOT_FOUND",
            Self::Bluetooth(ScanError::AdapterPoweredOff) => "BLUETOOTH_ADAPTER_POWERED_OFF",
            Self::Bluetooth(_) => "BLUETOOTH_SCAN_FAILED",
            Self::Config(ConfigError::NotFound(_)) => "CONFIG_NOT_FOUND",
            Self::Config(
                ConfigError::ValidationError { .. } | ConfigError::MultipleValidationErrors(_),
            ) => "CONFIG_VALIDATION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::RuntimeUnavailable => "RUNTIME_UNAVAILABLE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bluetooth_error_codes() {
        assert_eq!(
            BotmetaError::from(ScanError::AdapterNotFound).error_code(),
            "BLUETOOTH_ADAPTER_NOT_FOUND"
        );
        assert_eq!(
            BotmetaError::from(ScanError::AdapterPoweredOff).error_code(),
            "BLUETOOTH_ADAPTER_POWERED_OFF"
        );

        let err = BotmetaError::from(ScanError::SessionInitFailed {
            message: "no dbus".into(),
        });
        assert_eq!(err.error_code(), "BLUETOOTH_SCAN_FAILED");
        assert!(err.to_string().contains("no dbus"));
    }

    #[test]
    fn test_config_validation_errors() {
        let err: BotmetaError = ConfigError::MultipleValidationErrors(vec![
            ConfigError::ValidationError {
                field: "cache.ttl_secs",
                message: "must be positive".into(),
            },
            ConfigError::ValidationError {
                field: "service.channel_capacity",
                message: "must be positive".into(),
            },
        ])
        .into();

        assert_eq!(err.error_code(), "CONFIG_VALIDATION_ERROR");
        assert!(matches!(err, BotmetaError::Config(_)));
    }

    #[test]
    fn test_config_not_found_code() {
        let err = BotmetaError::from(ConfigError::NotFound("/etc/botmeta/config.toml".into()));
        assert_eq!(err.error_code(), "CONFIG_NOT_FOUND");
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<BotmetaError>();
        assert_sync::<BotmetaError>();
    }
}
