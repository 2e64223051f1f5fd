//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Instant;

use botmeta_core::{
    advertisement_channel, AdvertisementSender, BotmetaConfig, MetadataService, MockScanDriver,
    ScanDriver,
};
use tracing::{error, info};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: BotmetaConfig,
    metadata: MetadataService,
    bluetooth_available: bool,
    started_at: Instant,
}

impl AppState {
    /// Create application state with the platform scan driver.
    ///
    /// Falls back to the mock driver when no Bluetooth adapter can be
    /// opened; queries then keep answering with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata service cannot be started.
    pub async fn new(config: BotmetaConfig) -> anyhow::Result<Self> {
        let (sender, receiver) = advertisement_channel(config.service.channel_capacity);
        let (driver, bluetooth_available) = scan_driver(sender).await;
        let metadata = MetadataService::start(&config, driver, receiver).map_err(|e| {
            error!(code = e.error_code(), error = %e, "Failed to start metadata service");
            e
        })?;
        Ok(Self::from_parts(config, metadata, bluetooth_available))
    }

    /// Create application state around an already started service.
    #[must_use]
    pub fn from_parts(
        config: BotmetaConfig,
        metadata: MetadataService,
        bluetooth_available: bool,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                metadata,
                bluetooth_available,
                started_at: Instant::now(),
            }),
        }
    }

    /// Loaded configuration.
    #[must_use]
    pub fn config(&self) -> &BotmetaConfig {
        &self.inner.config
    }

    /// Metadata query facade.
    #[must_use]
    pub fn metadata(&self) -> &MetadataService {
        &self.inner.metadata
    }

    /// Whether a real Bluetooth adapter backs the scans.
    #[must_use]
    pub fn bluetooth_available(&self) -> bool {
        self.inner.bluetooth_available
    }

    /// Seconds since the state was created.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }
}

#[cfg(all(feature = "bluetooth", not(feature = "mock-bluetooth")))]
async fn scan_driver(sender: AdvertisementSender) -> (Arc<dyn ScanDriver>, bool) {
    match botmeta_core::BluerScanDriver::new(sender.clone()).await {
        Ok(driver) => {
            info!("Using BlueZ scan driver");
            (Arc::new(driver), true)
        }
        Err(e) => {
            let e = botmeta_core::BotmetaError::from(e);
            tracing::warn!(
                code = e.error_code(),
                error = %e,
                "Falling back to mock scan driver"
            );
            (Arc::new(MockScanDriver::with_sender(sender)), false)
        }
    }
}

#[cfg(any(not(feature = "bluetooth"), feature = "mock-bluetooth"))]
#[allow(clippy::unused_async)]
async fn scan_driver(sender: AdvertisementSender) -> (Arc<dyn ScanDriver>, bool) {
    info!("Using mock scan driver");
    (Arc::new(MockScanDriver::with_sender(sender)), false)
}
