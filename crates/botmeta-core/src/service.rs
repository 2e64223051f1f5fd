//! Metadata query facade.
//!
//! Queries are non-blocking reads with an out-of-band write path: a query
//! answers from the cache when it can, and otherwise returns a fallback
//! right away while scheduling a background scan. Advertisements found by
//! that scan reach the cache through the ingestion task, so a later query
//! (typically the caller's next poll) sees the real value.
//!
//! No query ever fails. Missing or stale data degrades to defaults.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::bluetooth::{AdvertisementReceiver, ScanDriver, ScanFilter};
use crate::cache::MetadataCache;
use crate::config::BotmetaConfig;
use crate::decoder::{decode, Decoded};
use crate::error::{BotmetaError, Result};
use crate::scan::{ScanCoordinator, ScanTrigger};
use crate::types::{DeviceAddress, MetadataRecord, OperationMode, RawAdvertisement};

/// Battery level reported when nothing is known about a device.
pub const DEFAULT_BATTERY_LEVEL: u8 = 100;

/// What happened to an ingested advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The record was stored.
    Cached,
    /// A live record already existed for the address; the new one was dropped.
    Duplicate,
    /// The advertisement was absent or invalid.
    Rejected,
}

/// Public entry point for device metadata.
#[derive(Debug)]
pub struct MetadataService {
    cache: Arc<MetadataCache>,
    coordinator: Arc<ScanCoordinator>,
    default_battery_level: u8,
    tasks: Vec<JoinHandle<()>>,
}

impl MetadataService {
    /// Assemble a service from existing parts, without background tasks.
    ///
    /// Use [`MetadataService::start`] for a fully wired service.
    #[must_use]
    pub fn new(
        cache: Arc<MetadataCache>,
        coordinator: Arc<ScanCoordinator>,
        default_battery_level: u8,
    ) -> Self {
        Self {
            cache,
            coordinator,
            default_battery_level,
            tasks: Vec::new(),
        }
    }

    /// Build a service from configuration and start its background tasks:
    /// the cache sweeper and the advertisement ingestion loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or this is not
    /// called from within a Tokio runtime.
    pub fn start(
        config: &BotmetaConfig,
        driver: Arc<dyn ScanDriver>,
        advertisements: AdvertisementReceiver,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| BotmetaError::RuntimeUnavailable)?;

        let cache = Arc::new(MetadataCache::new(config.cache.ttl()));
        let filter = ScanFilter {
            model: config.scan.model(),
        };
        let coordinator = Arc::new(ScanCoordinator::new(driver, filter, runtime.clone()));

        let sweeper = cache.spawn_sweeper(config.cache.check_period());
        let ingestion = runtime.spawn(ingest_loop(Arc::clone(&cache), advertisements));

        info!(
            ttl_secs = config.cache.ttl_secs,
            check_period_secs = config.cache.check_period_secs,
            "Metadata service started"
        );

        Ok(Self {
            cache,
            coordinator,
            default_battery_level: config.service.default_battery_level,
            tasks: vec![sweeper, ingestion],
        })
    }

    /// Operation mode of the device at `address`.
    ///
    /// Returns the cached mode (switch when the advertisement did not carry
    /// one). On a cache miss returns [`OperationMode::Switch`] and schedules
    /// a scan of at most `scan_budget`.
    pub fn query_operation_mode(
        &self,
        address: &DeviceAddress,
        scan_budget: Duration,
    ) -> OperationMode {
        info!(%address, "Getting operation mode for device");
        self.query_metadata(address, scan_budget)
            .map_or(OperationMode::Switch, |record| record.operation_mode())
    }

    /// Battery level of the device at `address`, in percent.
    ///
    /// On a cache miss returns the configured default level and schedules a
    /// scan of at most `scan_budget`.
    pub fn query_battery_level(&self, address: &DeviceAddress, scan_budget: Duration) -> u8 {
        info!(%address, "Getting battery level for device");
        self.query_metadata(address, scan_budget)
            .map_or(self.default_battery_level, |record| record.battery_level())
    }

    /// Cached record for `address`, without triggering a scan.
    #[must_use]
    pub fn cached_metadata(&self, address: &DeviceAddress) -> Option<MetadataRecord> {
        self.cache.get(address)
    }

    /// Ingest one advertisement reported by a scan driver.
    pub fn on_advertisement_received(&self, raw: Option<RawAdvertisement>) -> IngestOutcome {
        ingest(&self.cache, raw.as_ref())
    }

    /// Start a task that ingests every advertisement from `advertisements`
    /// until the channel closes.
    pub fn spawn_ingestion(&self, advertisements: AdvertisementReceiver) -> JoinHandle<()> {
        tokio::spawn(ingest_loop(Arc::clone(&self.cache), advertisements))
    }

    /// The underlying cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// The underlying scan coordinator.
    #[must_use]
    pub const fn coordinator(&self) -> &Arc<ScanCoordinator> {
        &self.coordinator
    }

    /// Battery level returned on a cache miss.
    #[must_use]
    pub const fn default_battery_level(&self) -> u8 {
        self.default_battery_level
    }

    /// Cached record for `address`, scheduling a scan of at most
    /// `scan_budget` on a miss.
    ///
    /// Callers that need both the answer and whether it was observed should
    /// derive both from this single read.
    pub fn query_metadata(
        &self,
        address: &DeviceAddress,
        scan_budget: Duration,
    ) -> Option<MetadataRecord> {
        let record = self.cache.get(address);
        if record.is_none() {
            match self.coordinator.ensure_scanning(address, scan_budget) {
                ScanTrigger::Started(session_id) => info!(
                    %address,
                    %session_id,
                    "No metadata cached for device, scanning"
                ),
                ScanTrigger::AlreadyScanning => {
                    debug!(%address, "No metadata cached for device, scan already running");
                }
            }
        }
        record
    }
}

impl Drop for MetadataService {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn ingest(cache: &MetadataCache, raw: Option<&RawAdvertisement>) -> IngestOutcome {
    let record = match decode(raw) {
        Decoded::Valid(record) => record,
        Decoded::Invalid(reason) => {
            error!(%reason, "Scanned advertisement is not valid");
            return IngestOutcome::Rejected;
        }
        Decoded::Absent => {
            debug!("Empty advertisement ignored");
            return IngestOutcome::Rejected;
        }
    };

    let address = record.address.clone();
    if cache.put(address.clone(), record) {
        info!(%address, "Found device metadata during scan, caching");
        IngestOutcome::Cached
    } else {
        IngestOutcome::Duplicate
    }
}

async fn ingest_loop(cache: Arc<MetadataCache>, mut advertisements: AdvertisementReceiver) {
    while let Some(raw) = advertisements.recv().await {
        ingest(&cache, Some(&raw));
    }
    debug!("Advertisement channel closed, ingestion stopped");
}
