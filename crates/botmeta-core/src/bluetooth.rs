//! Bluetooth Low Energy scan drivers.
//!
//! This module provides:
//! - The [`ScanDriver`] contract the scan coordinator drives
//! - The advertisement channel drivers publish discovered devices on
//! - A BlueZ-backed driver (feature `bluetooth`) and an in-memory mock

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::switchbot::BOT_MODEL;
use crate::types::RawAdvertisement;

#[cfg(feature = "bluetooth")]
mod bluez;
mod mock;

#[cfg(feature = "bluetooth")]
pub use bluez::BluerScanDriver;
pub use mock::{FailOn, MockOperation, MockScanDriver};

/// Default capacity of the advertisement channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Sending half of the advertisement channel, held by a driver.
pub type AdvertisementSender = mpsc::Sender<RawAdvertisement>;

/// Receiving half of the advertisement channel, drained by the ingestion task.
pub type AdvertisementReceiver = mpsc::Receiver<RawAdvertisement>;

/// Create a bounded advertisement channel.
///
/// # Panics
///
/// Panics if `capacity` is zero.
#[must_use]
pub fn advertisement_channel(capacity: usize) -> (AdvertisementSender, AdvertisementReceiver) {
    mpsc::channel(capacity)
}

/// Errors raised by a scan driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// No Bluetooth adapter is present.
    #[error("no Bluetooth adapter found")]
    AdapterNotFound,

    /// The adapter exists but is powered off.
    #[error("Bluetooth adapter is powered off")]
    AdapterPoweredOff,

    /// The Bluetooth daemon session could not be opened.
    #[error("failed to open Bluetooth session: {message}")]
    SessionInitFailed {
        /// Underlying error message.
        message: String,
    },

    /// Starting discovery failed.
    #[error("failed to start scan: {message}")]
    StartFailed {
        /// Underlying error message.
        message: String,
    },

    /// Stopping discovery failed.
    #[error("failed to stop scan: {message}")]
    StopFailed {
        /// Underlying error message.
        message: String,
    },

    /// Any other driver failure.
    #[error("scan driver error: {message}")]
    Internal {
        /// Underlying error message.
        message: String,
    },
}

/// Which advertisements a scan should report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanFilter {
    /// Only report devices of this model; `None` reports every SwitchBot model.
    pub model: Option<char>,
}

impl Default for ScanFilter {
    fn default() -> Self {
        Self {
            model: Some(BOT_MODEL),
        }
    }
}

impl ScanFilter {
    /// Filter reporting every model.
    #[must_use]
    pub const fn any_model() -> Self {
        Self { model: None }
    }

    /// Whether a device with `model` passes this filter.
    #[must_use]
    pub fn accepts(&self, model: Option<&str>) -> bool {
        match (self.model, model) {
            (None, _) => true,
            (Some(wanted), Some(model)) => model.chars().eq(std::iter::once(wanted)),
            (Some(_), None) => false,
        }
    }
}

/// A passive scan session provider.
///
/// The coordinator calls `start_scan`, `wait` and `stop_scan` in sequence.
/// Advertisements seen while scanning are pushed to the driver's
/// [`AdvertisementSender`], not returned from these calls.
#[async_trait]
pub trait ScanDriver: Send + Sync + std::fmt::Debug {
    /// Begin listening for advertisements matching `filter`.
    async fn start_scan(&self, filter: &ScanFilter) -> Result<(), ScanError>;

    /// Keep listening for `duration`.
    async fn wait(&self, duration: Duration) -> Result<(), ScanError> {
        tokio::time::sleep(duration).await;
        Ok(())
    }

    /// Stop listening.
    async fn stop_scan(&self) -> Result<(), ScanError>;
}
