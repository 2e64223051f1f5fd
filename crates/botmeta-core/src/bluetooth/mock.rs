//! In-memory scan driver for tests and hardware-less runs.
//!
//! The mock records every call, can be told to fail the next invocation of
//! any step, and publishes queued advertisements when a scan starts.
//!
//! # Example
//!
//! ```
//! use botmeta_core::bluetooth::{FailOn, MockScanDriver, ScanDriver, ScanFilter};
//!
//! # tokio_test::block_on(async {
//! let driver = MockScanDriver::new();
//! driver.fail_next(FailOn::StartScan);
//!
//! assert!(driver.start_scan(&ScanFilter::default()).await.is_err());
//! assert!(driver.start_scan(&ScanFilter::default()).await.is_ok());
//! assert_eq!(driver.start_count(), 2);
//! # });
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{AdvertisementSender, ScanDriver, ScanError, ScanFilter};
use crate::types::RawAdvertisement;

/// Driver step the mock should fail on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    /// Fail the next `start_scan`.
    StartScan,
    /// Fail the next `wait`.
    Wait,
    /// Fail the next `stop_scan`.
    StopScan,
}

/// Recorded driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    /// `start_scan` was called with this filter.
    StartScan {
        /// Filter passed by the coordinator.
        filter: ScanFilter,
    },
    /// `wait` was called with this duration.
    Wait {
        /// Requested duration.
        duration: Duration,
    },
    /// `stop_scan` was called.
    StopScan,
}

/// Scan driver that never touches a radio.
///
/// Cloning shares state, so a test can keep a handle while the coordinator
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct MockScanDriver {
    inner: Arc<Mutex<MockInner>>,
}

#[derive(Debug, Default)]
struct MockInner {
    sender: Option<AdvertisementSender>,
    pending: Vec<RawAdvertisement>,
    fail_on: Vec<FailOn>,
    operations: Vec<MockOperation>,
}

impl MockScanDriver {
    /// Create a mock with no advertisement channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that publishes advertisements on `sender`.
    #[must_use]
    pub fn with_sender(sender: AdvertisementSender) -> Self {
        let driver = Self::default();
        driver.lock().sender = Some(sender);
        driver
    }

    /// Queue an advertisement to publish on the next `start_scan`.
    pub fn queue_advertisement(&self, advertisement: RawAdvertisement) {
        self.lock().pending.push(advertisement);
    }

    /// Make the next call of `step` fail.
    pub fn fail_next(&self, step: FailOn) {
        self.lock().fail_on.push(step);
    }

    /// All recorded calls, oldest first.
    #[must_use]
    pub fn operations(&self) -> Vec<MockOperation> {
        self.lock().operations.clone()
    }

    /// Number of `start_scan` calls.
    #[must_use]
    pub fn start_count(&self) -> usize {
        self.count(|op| matches!(op, MockOperation::StartScan { .. }))
    }

    /// Number of `stop_scan` calls.
    #[must_use]
    pub fn stop_count(&self) -> usize {
        self.count(|op| matches!(op, MockOperation::StopScan))
    }

    fn count(&self, predicate: impl Fn(&MockOperation) -> bool) -> usize {
        self.lock().operations.iter().filter(|op| predicate(op)).count()
    }

    fn record(&self, operation: MockOperation, step: FailOn) -> Result<(), ScanError> {
        let mut inner = self.lock();
        inner.operations.push(operation);
        if let Some(index) = inner.fail_on.iter().position(|s| *s == step) {
            inner.fail_on.remove(index);
            return Err(ScanError::Internal {
                message: format!("mock failure on {step:?}"),
            });
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, MockInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ScanDriver for MockScanDriver {
    async fn start_scan(&self, filter: &ScanFilter) -> Result<(), ScanError> {
        self.record(MockOperation::StartScan { filter: *filter }, FailOn::StartScan)?;

        let (sender, pending) = {
            let mut inner = self.lock();
            (inner.sender.clone(), std::mem::take(&mut inner.pending))
        };
        if let Some(sender) = sender {
            for advertisement in pending {
                if sender.try_send(advertisement).is_err() {
                    debug!("Mock advertisement dropped, channel full or closed");
                }
            }
        }
        Ok(())
    }

    async fn wait(&self, duration: Duration) -> Result<(), ScanError> {
        self.record(MockOperation::Wait { duration }, FailOn::Wait)?;
        tokio::time::sleep(duration).await;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), ScanError> {
        self.record(MockOperation::StopScan, FailOn::StopScan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::advertisement_channel;

    #[tokio::test(start_paused = true)]
    async fn test_records_calls_in_order() {
        let driver = MockScanDriver::new();
        driver.start_scan(&ScanFilter::default()).await.unwrap();
        driver.wait(Duration::from_millis(10)).await.unwrap();
        driver.stop_scan().await.unwrap();

        assert_eq!(
            driver.operations(),
            vec![
                MockOperation::StartScan {
                    filter: ScanFilter::default()
                },
                MockOperation::Wait {
                    duration: Duration::from_millis(10)
                },
                MockOperation::StopScan,
            ]
        );
    }

    #[tokio::test]
    async fn test_fail_next_fails_once() {
        let driver = MockScanDriver::new();
        driver.fail_next(FailOn::StopScan);

        assert!(driver.stop_scan().await.is_err());
        assert!(driver.stop_scan().await.is_ok());
        assert_eq!(driver.stop_count(), 2);
    }

    #[tokio::test]
    async fn test_queued_advertisements_are_published_on_start() {
        let (tx, mut rx) = advertisement_channel(4);
        let driver = MockScanDriver::with_sender(tx);
        driver.queue_advertisement(RawAdvertisement {
            address: Some("AA:BB:CC".to_string()),
            ..RawAdvertisement::default()
        });

        driver.start_scan(&ScanFilter::default()).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.address.as_deref(), Some("AA:BB:CC"));
        assert_eq!(driver.start_count(), 1);
    }
}
