//! Single-flight scan coordination.
//!
//! The radio can only run one discovery session at a time. The
//! [`ScanCoordinator`] owns that resource: a request while a session is
//! active is absorbed, never queued. A session always runs for its full
//! budget and the coordinator always returns to idle afterwards, whether the
//! driver succeeded, failed or panicked.
//!
//! ```text
//!   Idle ──ensure_scanning──▶ Active ──start/wait/stop done or failed──▶ Idle
//!                              │
//!                              └─ensure_scanning─▶ (no-op)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::bluetooth::{ScanDriver, ScanError, ScanFilter};
use crate::types::DeviceAddress;

/// A running scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSession {
    /// Unique session id.
    pub id: Uuid,
    /// Address whose cache miss triggered the scan.
    pub address: DeviceAddress,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// How long the session listens.
    pub budget: Duration,
}

/// Coordinator state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScanState {
    /// No scan running.
    #[default]
    Idle,
    /// A scan is running.
    Active(ScanSession),
}

/// Result of [`ScanCoordinator::ensure_scanning`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTrigger {
    /// A new session was started in the background.
    Started(Uuid),
    /// A session was already running; nothing was done.
    AlreadyScanning,
}

/// Result of [`ScanCoordinator::run_scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The session ran its full budget and stopped cleanly.
    Completed(Uuid),
    /// A driver step failed; the coordinator is idle again.
    Failed(ScanError),
    /// A session was already running.
    Skipped,
}

/// Owns the single scan session.
#[derive(Debug)]
pub struct ScanCoordinator {
    driver: Arc<dyn ScanDriver>,
    filter: ScanFilter,
    state: Arc<Mutex<ScanState>>,
    runtime: Handle,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Resets the coordinator to idle when dropped.
///
/// Moved into the session future, so the reset happens on completion,
/// failure, panic, or if the future is dropped before it ever runs.
struct ActiveGuard {
    state: Arc<Mutex<ScanState>>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        *lock(&self.state) = ScanState::Idle;
    }
}

impl ScanCoordinator {
    /// Create an idle coordinator that spawns sessions on `runtime`.
    #[must_use]
    pub fn new(driver: Arc<dyn ScanDriver>, filter: ScanFilter, runtime: Handle) -> Self {
        Self {
            driver,
            filter,
            state: Arc::new(Mutex::new(ScanState::Idle)),
            runtime,
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Start a background scan unless one is already running.
    ///
    /// Returns immediately; discovered devices arrive through the driver's
    /// advertisement channel, not through this call.
    pub fn ensure_scanning(
        self: &Arc<Self>,
        address: &DeviceAddress,
        budget: Duration,
    ) -> ScanTrigger {
        let Some((session, guard)) = self.try_activate(address, budget) else {
            debug!(%address, "Scan already in progress, request absorbed");
            return ScanTrigger::AlreadyScanning;
        };

        let id = session.id;
        drop(self.spawn_session(session, guard));
        ScanTrigger::Started(id)
    }

    /// Run a scan and wait for it to finish.
    ///
    /// The session still runs on the coordinator's runtime, so dropping the
    /// returned future (for example on a timeout) stops the wait, not the
    /// scan: the driver is always stopped before the coordinator goes idle.
    pub async fn run_scan(
        self: &Arc<Self>,
        address: &DeviceAddress,
        budget: Duration,
    ) -> ScanOutcome {
        let Some((session, guard)) = self.try_activate(address, budget) else {
            return ScanOutcome::Skipped;
        };

        match self.spawn_session(session, guard).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "Scan session task did not complete");
                ScanOutcome::Failed(ScanError::Internal {
                    message: e.to_string(),
                })
            }
        }
    }

    /// Whether a session is running.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        matches!(*lock(&self.state), ScanState::Active(_))
    }

    /// The running session, if any.
    #[must_use]
    pub fn current_session(&self) -> Option<ScanSession> {
        match &*lock(&self.state) {
            ScanState::Active(session) => Some(session.clone()),
            ScanState::Idle => None,
        }
    }

    /// Sessions that finished cleanly.
    #[must_use]
    pub fn completed_sessions(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Sessions that ended with a driver failure.
    #[must_use]
    pub fn failed_sessions(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn spawn_session(
        self: &Arc<Self>,
        session: ScanSession,
        guard: ActiveGuard,
    ) -> JoinHandle<ScanOutcome> {
        let coordinator = Arc::clone(self);
        self.runtime
            .spawn(async move { coordinator.drive(session, guard).await })
    }

    fn try_activate(
        &self,
        address: &DeviceAddress,
        budget: Duration,
    ) -> Option<(ScanSession, ActiveGuard)> {
        let mut state = lock(&self.state);
        if matches!(*state, ScanState::Active(_)) {
            return None;
        }

        let session = ScanSession {
            id: Uuid::now_v7(),
            address: address.clone(),
            started_at: Utc::now(),
            budget,
        };
        *state = ScanState::Active(session.clone());
        drop(state);

        let guard = ActiveGuard {
            state: Arc::clone(&self.state),
        };
        Some((session, guard))
    }

    async fn drive(&self, session: ScanSession, guard: ActiveGuard) -> ScanOutcome {
        let span = info_span!("scan", session_id = %session.id, address = %session.address);
        async move {
            info!(
                budget_ms = u64::try_from(session.budget.as_millis()).unwrap_or(u64::MAX),
                "Scanning for device metadata"
            );
            let result = self.scan_steps(session.budget).await;
            drop(guard);

            match result {
                Ok(()) => {
                    self.completed.fetch_add(1, Ordering::Relaxed);
                    info!("Finished scanning for device metadata");
                    ScanOutcome::Completed(session.id)
                }
                Err(e) => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    error!(error = %e, "Scanning for device metadata failed");
                    ScanOutcome::Failed(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn scan_steps(&self, budget: Duration) -> Result<(), ScanError> {
        self.driver.start_scan(&self.filter).await?;
        let waited = self.driver.wait(budget).await;
        // Stop even if the wait failed.
        let stopped = self.driver.stop_scan().await;
        waited.and(stopped)
    }
}

fn lock(state: &Mutex<ScanState>) -> MutexGuard<'_, ScanState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::{FailOn, MockOperation, MockScanDriver};

    const BUDGET: Duration = Duration::from_secs(5);

    fn coordinator(driver: &MockScanDriver) -> Arc<ScanCoordinator> {
        Arc::new(ScanCoordinator::new(
            Arc::new(driver.clone()),
            ScanFilter::default(),
            Handle::current(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_scan_drives_start_wait_stop() {
        let driver = MockScanDriver::new();
        let coordinator = coordinator(&driver);

        let outcome = coordinator.run_scan(&"AA:BB:CC".into(), BUDGET).await;

        assert!(matches!(outcome, ScanOutcome::Completed(_)));
        assert_eq!(
            driver.operations(),
            vec![
                MockOperation::StartScan {
                    filter: ScanFilter::default()
                },
                MockOperation::Wait { duration: BUDGET },
                MockOperation::StopScan,
            ]
        );
        assert!(!coordinator.is_scanning());
        assert_eq!(coordinator.completed_sessions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_scanning_is_single_flight() {
        let driver = MockScanDriver::new();
        let coordinator = coordinator(&driver);

        let first = coordinator.ensure_scanning(&"AA:BB:CC".into(), BUDGET);
        let second = coordinator.ensure_scanning(&"DD:EE:FF".into(), BUDGET);

        assert!(matches!(first, ScanTrigger::Started(_)));
        assert_eq!(second, ScanTrigger::AlreadyScanning);
        assert!(coordinator.is_scanning());
        assert_eq!(
            coordinator.current_session().map(|s| s.address),
            Some(DeviceAddress::from("AA:BB:CC"))
        );

        tokio::time::sleep(BUDGET + Duration::from_millis(1)).await;

        assert_eq!(driver.start_count(), 1);
        assert_eq!(driver.stop_count(), 1);
        assert!(!coordinator.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_scan_skips_while_active() {
        let driver = MockScanDriver::new();
        let coordinator = coordinator(&driver);

        coordinator.ensure_scanning(&"AA:BB:CC".into(), BUDGET);
        let outcome = coordinator.run_scan(&"AA:BB:CC".into(), BUDGET).await;

        assert_eq!(outcome, ScanOutcome::Skipped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_run_scan_still_stops_before_next_session() {
        let driver = MockScanDriver::new();
        let coordinator = coordinator(&driver);
        let address = DeviceAddress::from("AA:BB:CC");

        let waited =
            tokio::time::timeout(Duration::from_secs(1), coordinator.run_scan(&address, BUDGET))
                .await;
        assert!(waited.is_err());

        assert!(coordinator.is_scanning());
        assert_eq!(
            coordinator.ensure_scanning(&address, BUDGET),
            ScanTrigger::AlreadyScanning
        );

        tokio::time::sleep(BUDGET).await;

        assert!(!coordinator.is_scanning());
        assert_eq!(driver.start_count(), 1);
        assert_eq!(driver.stop_count(), 1);

        assert!(matches!(
            coordinator.ensure_scanning(&address, BUDGET),
            ScanTrigger::Started(_)
        ));
        tokio::time::sleep(BUDGET * 2).await;
        assert_eq!(driver.start_count(), driver.stop_count());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_failure_still_stops_and_resets() {
        let driver = MockScanDriver::new();
        driver.fail_next(FailOn::Wait);
        let coordinator = coordinator(&driver);

        let outcome = coordinator.run_scan(&"AA:BB:CC".into(), BUDGET).await;

        assert!(matches!(outcome, ScanOutcome::Failed(_)));
        assert_eq!(driver.stop_count(), 1);
        assert!(!coordinator.is_scanning());
        assert_eq!(coordinator.failed_sessions(), 1);

        let retry = coordinator.run_scan(&"AA:BB:CC".into(), BUDGET).await;
        assert!(matches!(retry, ScanOutcome::Completed(_)));
        assert_eq!(driver.start_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_resets_without_stop() {
        let driver = MockScanDriver::new();
        driver.fail_next(FailOn::StartScan);
        let coordinator = coordinator(&driver);

        let outcome = coordinator.run_scan(&"AA:BB:CC".into(), BUDGET).await;

        assert!(matches!(outcome, ScanOutcome::Failed(ScanError::Internal { .. })));
        assert_eq!(driver.stop_count(), 0);
        assert!(!coordinator.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_failure_resets_to_idle() {
        let driver = MockScanDriver::new();
        driver.fail_next(FailOn::StopScan);
        let coordinator = coordinator(&driver);

        coordinator.ensure_scanning(&"AA:BB:CC".into(), BUDGET);
        tokio::time::sleep(BUDGET * 2).await;

        assert!(!coordinator.is_scanning());
        assert!(matches!(
            coordinator.ensure_scanning(&"AA:BB:CC".into(), BUDGET),
            ScanTrigger::Started(_)
        ));
    }

    #[derive(Debug)]
    struct PanickingDriver;

    #[async_trait::async_trait]
    impl ScanDriver for PanickingDriver {
        async fn start_scan(&self, _filter: &ScanFilter) -> Result<(), ScanError> {
            panic!("radio driver bug");
        }

        async fn stop_scan(&self) -> Result<(), ScanError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_panic_does_not_leave_coordinator_active() {
        let coordinator = Arc::new(ScanCoordinator::new(
            Arc::new(PanickingDriver),
            ScanFilter::default(),
            Handle::current(),
        ));

        coordinator.ensure_scanning(&"AA:BB:CC".into(), BUDGET);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!coordinator.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_scan_reports_driver_panic_as_failure() {
        let coordinator = Arc::new(ScanCoordinator::new(
            Arc::new(PanickingDriver),
            ScanFilter::default(),
            Handle::current(),
        ));

        let outcome = coordinator.run_scan(&"AA:BB:CC".into(), BUDGET).await;

        assert!(matches!(outcome, ScanOutcome::Failed(ScanError::Internal { .. })));
        assert!(!coordinator.is_scanning());
        assert_eq!(coordinator.failed_sessions(), 1);
    }
}
