//! BlueZ scan driver (Linux only, via `bluer`).

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bluer::{
    Adapter, AdapterEvent, Address, DeviceEvent, DeviceProperty, DiscoveryFilter,
    DiscoveryTransport, Session,
};
use futures::stream::SelectAll;
use futures::{pin_mut, Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{AdvertisementSender, ScanDriver, ScanError, ScanFilter};
use crate::switchbot::{advertisement_from_payload, SWITCHBOT_SERVICE_UUIDS};
use crate::types::RawAdvertisement;

/// Passive LE scanner backed by the system Bluetooth daemon.
///
/// Discovery runs in a background task that forwards SwitchBot
/// advertisements to the channel, both for newly found devices and for
/// service data updates of devices BlueZ already knows. Stopping the scan
/// drops the discovery stream, which ends discovery in BlueZ.
pub struct BluerScanDriver {
    _session: Session,
    adapter: Adapter,
    sender: AdvertisementSender,
    discovery: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for BluerScanDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BluerScanDriver")
            .field("adapter", &self.adapter.name())
            .finish_non_exhaustive()
    }
}

impl BluerScanDriver {
    /// Open a session on the default adapter, powering it on if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if BlueZ is unreachable, no adapter exists, or the
    /// adapter cannot be powered on.
    pub async fn new(sender: AdvertisementSender) -> Result<Self, ScanError> {
        let session = Session::new()
            .await
            .map_err(|e| ScanError::SessionInitFailed {
                message: e.to_string(),
            })?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(|_| ScanError::AdapterNotFound)?;

        let powered = adapter.is_powered().await.map_err(internal)?;
        if !powered {
            info!(adapter = adapter.name(), "Powering on Bluetooth adapter");
            adapter
                .set_powered(true)
                .await
                .map_err(|_| ScanError::AdapterPoweredOff)?;
        }

        Ok(Self {
            _session: session,
            adapter,
            sender,
            discovery: Mutex::new(None),
        })
    }

    fn discovery(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.discovery.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ScanDriver for BluerScanDriver {
    async fn start_scan(&self, filter: &ScanFilter) -> Result<(), ScanError> {
        let discovery_filter = DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            uuids: SWITCHBOT_SERVICE_UUIDS.into_iter().collect(),
            duplicate_data: false,
            ..DiscoveryFilter::default()
        };
        self.adapter
            .set_discovery_filter(discovery_filter)
            .await
            .map_err(|e| ScanError::StartFailed {
                message: e.to_string(),
            })?;

        let events = self
            .adapter
            .discover_devices()
            .await
            .map_err(|e| ScanError::StartFailed {
                message: e.to_string(),
            })?;

        let task = tokio::spawn(forward_advertisements(
            self.adapter.clone(),
            events,
            self.sender.clone(),
            *filter,
        ));
        if let Some(previous) = self.discovery().replace(task) {
            previous.abort();
        }

        debug!(adapter = self.adapter.name(), "BLE discovery started");
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), ScanError> {
        match self.discovery().take() {
            Some(task) => {
                task.abort();
                debug!(adapter = self.adapter.name(), "BLE discovery stopped");
            }
            None => warn!("stop_scan called without an active discovery"),
        }
        Ok(())
    }
}

async fn forward_advertisements(
    adapter: Adapter,
    events: impl Stream<Item = AdapterEvent>,
    sender: AdvertisementSender,
    filter: ScanFilter,
) {
    pin_mut!(events);
    let mut device_changes = SelectAll::new();

    loop {
        let address = tokio::select! {
            Some(event) = events.next() => {
                let AdapterEvent::DeviceAdded(address) = event else {
                    continue;
                };
                // Devices BlueZ already knows report fresh advertisements as
                // property changes, not as new devices.
                match adapter.device(address) {
                    Ok(device) => match device.events().await {
                        Ok(changes) => {
                            device_changes.push(Box::pin(
                                changes.map(move |change| (address, change)),
                            ));
                        }
                        Err(e) => debug!(%address, error = %e, "Failed to watch device"),
                    },
                    Err(e) => debug!(%address, error = %e, "Failed to open device"),
                }
                address
            }
            Some((address, change)) = device_changes.next() => {
                if !carries_advertisement(&change) {
                    continue;
                }
                address
            }
            else => break,
        };

        if !forward(&adapter, address, &sender, filter).await {
            debug!("Advertisement channel closed, ending discovery");
            break;
        }
    }
}

/// Whether a device change means new service data was advertised.
const fn carries_advertisement(change: &DeviceEvent) -> bool {
    matches!(
        change,
        DeviceEvent::PropertyChanged(DeviceProperty::ServiceData(_))
    )
}

/// Read and forward one device's advertisement. Returns `false` once the
/// channel is closed.
async fn forward(
    adapter: &Adapter,
    address: Address,
    sender: &AdvertisementSender,
    filter: ScanFilter,
) -> bool {
    match read_advertisement(adapter, address).await {
        Ok(Some(advertisement)) => {
            let model = advertisement
                .service_data
                .as_ref()
                .and_then(|s| s.model.as_deref());
            !filter.accepts(model) || sender.send(advertisement).await.is_ok()
        }
        Ok(None) => true,
        Err(e) => {
            debug!(%address, error = %e, "Failed to read device advertisement");
            true
        }
    }
}

async fn read_advertisement(
    adapter: &Adapter,
    address: Address,
) -> bluer::Result<Option<RawAdvertisement>> {
    let device = adapter.device(address)?;
    let Some(service_data) = device.service_data().await? else {
        return Ok(None);
    };
    let Some(payload) = SWITCHBOT_SERVICE_UUIDS
        .iter()
        .find_map(|uuid| service_data.get(uuid))
    else {
        return Ok(None);
    };
    let rssi = device.rssi().await?;
    Ok(advertisement_from_payload(&address.to_string(), rssi, payload))
}

#[allow(clippy::needless_pass_by_value)]
fn internal(err: bluer::Error) -> ScanError {
    ScanError::Internal {
        message: err.to_string(),
    }
}
