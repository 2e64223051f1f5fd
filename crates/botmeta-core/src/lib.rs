//! # botmeta-core
//!
//! Metadata acquisition and caching for SwitchBot Bot BLE devices.
//!
//! This crate answers "what mode is this bot in, how full is its battery"
//! from recently observed advertisements, and schedules a bounded passive
//! scan when nothing is known yet. It provides:
//! - A pure advertisement decoder
//! - A TTL cache with background expiry sweeps
//! - A single-flight scan coordinator that can never get stuck active
//! - A non-blocking query facade
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`types`] - Device address, metadata record and raw advertisement shapes
//! - [`decoder`] - Raw advertisement validation
//! - [`switchbot`] - SwitchBot service data payload parsing
//! - [`cache`] - Time-bounded metadata cache
//! - [`bluetooth`] - Scan driver contract, BlueZ driver and mock driver
//! - [`scan`] - Single-flight scan coordination
//! - [`service`] - Query facade and advertisement ingestion
//! - [`config`] - Configuration loading, saving, and validation
//! - [`error`] - Unified error types for the crate
//!
//! ## Data flow
//!
//! ```text
//! query ──▶ MetadataService ──hit──▶ answer
//!                 │miss
//!                 ▼
//!          ScanCoordinator ──▶ ScanDriver ──advertisements──▶ channel
//!                                                               │
//!          MetadataCache ◀── decode ◀── ingestion task ◀────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod bluetooth;
pub mod cache;
pub mod config;
pub mod decoder;
pub mod error;
pub mod scan;
pub mod service;
pub mod switchbot;
pub mod types;

// Re-export primary types for convenience
#[cfg(feature = "bluetooth")]
pub use bluetooth::BluerScanDriver;
pub use bluetooth::{
    advertisement_channel, AdvertisementReceiver, AdvertisementSender, FailOn, MockOperation,
    MockScanDriver, ScanDriver, ScanError, ScanFilter,
};
pub use cache::MetadataCache;
pub use crate::config::{
    default_config_path, is_valid_mac_address, BotmetaConfig, CacheConfig, ConfigError,
    ConfigResult, ScanConfig, ServerConfig, ServiceConfig,
};
pub use decoder::{decode, DecodeError, Decoded};
pub use error::{BotmetaError, Result};
pub use scan::{ScanCoordinator, ScanOutcome, ScanSession, ScanState, ScanTrigger};
pub use service::{IngestOutcome, MetadataService, DEFAULT_BATTERY_LEVEL};
pub use types::{
    DeviceAddress, MetadataRecord, OperationMode, RawAdvertisement, RawServiceData, ServiceData,
};
