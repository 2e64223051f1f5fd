//! Time-bounded metadata cache.
//!
//! Entries are keyed by [`DeviceAddress`] and expire a fixed TTL after they
//! were inserted. Expired entries are invisible to readers immediately and
//! are physically removed by [`MetadataCache::sweep`], which a background
//! task runs on a fixed period.
//!
//! Writes are first-write-wins: while an address has a live entry, further
//! records for it are dropped. The cache hands out owned clones only, so a
//! caller can never mutate shared state through a returned record.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::types::{DeviceAddress, MetadataRecord};

/// Default time-to-live of a cache entry.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Default interval between expiry sweeps.
pub const DEFAULT_CHECK_PERIOD: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct CacheEntry {
    record: MetadataRecord,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe metadata cache with per-entry expiry.
#[derive(Debug)]
pub struct MetadataCache {
    ttl: Duration,
    entries: RwLock<HashMap<DeviceAddress, CacheEntry>>,
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl MetadataCache {
    /// Create an empty cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Time-to-live applied to new entries.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a copy of the live record for `address`.
    #[must_use]
    pub fn get(&self, address: &DeviceAddress) -> Option<MetadataRecord> {
        let now = Instant::now();
        self.read()
            .get(address)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.record.clone())
    }

    /// Whether a live entry exists for `address`.
    #[must_use]
    pub fn has(&self, address: &DeviceAddress) -> bool {
        let now = Instant::now();
        self.read()
            .get(address)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Insert `record` unless a live entry already exists for `address`.
    ///
    /// Returns `true` when the record was stored. A dropped duplicate does
    /// not extend the existing entry's lifetime.
    pub fn put(&self, address: DeviceAddress, record: MetadataRecord) -> bool {
        let now = Instant::now();
        let entry = CacheEntry {
            record,
            expires_at: now + self.ttl,
        };

        match self.write().entry(address) {
            Entry::Occupied(mut occupied) if occupied.get().is_expired(now) => {
                occupied.insert(entry);
                true
            }
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                true
            }
        }
    }

    /// Remove the entry for `address`, returning its record if it was live.
    pub fn evict(&self, address: &DeviceAddress) -> Option<MetadataRecord> {
        let now = Instant::now();
        self.write()
            .remove(address)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.record)
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Number of stored entries, including expired ones not yet swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Remove expired entries and return how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Spawn a task that sweeps this cache every `period`.
    ///
    /// The task only holds a weak reference and ends once the cache is
    /// dropped. Must be called from within a Tokio runtime; `period` must be
    /// non-zero.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let evicted = cache.sweep();
                if evicted > 0 {
                    debug!(evicted, remaining = cache.len(), "Evicted expired metadata");
                }
            }
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<DeviceAddress, CacheEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<DeviceAddress, CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ServiceData;

    const TTL: Duration = Duration::from_secs(30);

    fn record(address: &str, battery: u8) -> MetadataRecord {
        MetadataRecord {
            id: address.replace(':', "").to_lowercase(),
            address: DeviceAddress::from(address),
            rssi: -60,
            service_data: ServiceData {
                model: "H".to_string(),
                model_name: "WoHand".to_string(),
                model_friendly_name: "Bot".to_string(),
                battery,
                mode: Some(true),
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_then_get_returns_equal_record() {
        let cache = MetadataCache::new(TTL);
        let addr = DeviceAddress::from("AA:BB:CC");
        let rec = record("AA:BB:CC", 80);

        assert!(cache.put(addr.clone(), rec.clone()));
        assert_eq!(cache.get(&addr), Some(rec));
        assert!(cache.has(&addr));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_write_wins() {
        let cache = MetadataCache::new(TTL);
        let addr = DeviceAddress::from("AA:BB:CC");
        let first = record("AA:BB:CC", 80);

        assert!(cache.put(addr.clone(), first.clone()));
        assert!(!cache.put(addr.clone(), record("AA:BB:CC", 20)));
        assert_eq!(cache.get(&addr), Some(first));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_does_not_refresh_ttl() {
        let cache = MetadataCache::new(TTL);
        let addr = DeviceAddress::from("AA:BB:CC");

        cache.put(addr.clone(), record("AA:BB:CC", 80));
        tokio::time::advance(TTL / 2).await;
        cache.put(addr.clone(), record("AA:BB:CC", 70));
        tokio::time::advance(TTL / 2).await;

        assert!(cache.get(&addr).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_invisible_before_sweep() {
        let cache = MetadataCache::new(TTL);
        let addr = DeviceAddress::from("AA:BB:CC");
        cache.put(addr.clone(), record("AA:BB:CC", 80));

        tokio::time::advance(TTL).await;

        assert!(cache.get(&addr).is_none());
        assert!(!cache.has(&addr));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_can_be_replaced() {
        let cache = MetadataCache::new(TTL);
        let addr = DeviceAddress::from("AA:BB:CC");
        cache.put(addr.clone(), record("AA:BB:CC", 80));

        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        let fresh = record("AA:BB:CC", 65);

        assert!(cache.put(addr.clone(), fresh.clone()));
        assert_eq!(cache.get(&addr), Some(fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired_entries() {
        let cache = MetadataCache::new(TTL);
        cache.put(DeviceAddress::from("AA:AA:AA"), record("AA:AA:AA", 80));
        tokio::time::advance(Duration::from_secs(20)).await;
        cache.put(DeviceAddress::from("BB:BB:BB"), record("BB:BB:BB", 80));
        tokio::time::advance(Duration::from_secs(15)).await;

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.has(&DeviceAddress::from("BB:BB:BB")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper_evicts_after_ttl() {
        let cache = Arc::new(MetadataCache::new(TTL));
        let sweeper = cache.spawn_sweeper(Duration::from_secs(5));
        cache.put(DeviceAddress::from("AA:BB:CC"), record("AA:BB:CC", 80));

        tokio::time::sleep(TTL + Duration::from_secs(6)).await;

        assert!(cache.is_empty());
        sweeper.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_when_cache_dropped() {
        let cache = Arc::new(MetadataCache::new(TTL));
        let sweeper = cache.spawn_sweeper(Duration::from_secs(1));
        drop(cache);

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(sweeper.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_and_clear() {
        let cache = MetadataCache::new(TTL);
        let addr = DeviceAddress::from("AA:BB:CC");
        let rec = record("AA:BB:CC", 80);
        cache.put(addr.clone(), rec.clone());
        cache.put(DeviceAddress::from("DD:EE:FF"), record("DD:EE:FF", 50));

        assert_eq!(cache.evict(&addr), Some(rec));
        assert!(cache.evict(&addr).is_none());

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_returned_records_are_copies() {
        let cache = MetadataCache::new(TTL);
        let addr = DeviceAddress::from("AA:BB:CC");
        cache.put(addr.clone(), record("AA:BB:CC", 80));

        let mut copy = cache.get(&addr).unwrap();
        copy.service_data.battery = 1;

        assert_eq!(cache.get(&addr).unwrap().service_data.battery, 80);
    }

    fn writer_record(writer: u8) -> MetadataRecord {
        let mut rec = record("AA:BB:CC", writer);
        rec.id = format!("writer-{writer}");
        rec
    }

    #[test]
    fn test_concurrent_put_get_sweep_on_one_key() {
        let cache = MetadataCache::new(Duration::from_secs(3600));
        let addr = DeviceAddress::from("AA:BB:CC");
        let stored = std::sync::atomic::AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for writer in 1..=4_u8 {
                let (cache, addr, stored) = (&cache, &addr, &stored);
                scope.spawn(move || {
                    for _ in 0..500 {
                        if cache.put(addr.clone(), writer_record(writer)) {
                            stored.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        }
                    }
                });
            }
            for _ in 0..4 {
                let (cache, addr) = (&cache, &addr);
                scope.spawn(move || {
                    for _ in 0..500 {
                        if let Some(rec) = cache.get(addr) {
                            let writer = rec.service_data.battery;
                            assert_eq!(rec.id, format!("writer-{writer}"));
                            assert_eq!(rec, writer_record(writer));
                        }
                    }
                });
            }
            let cache = &cache;
            scope.spawn(move || {
                for _ in 0..500 {
                    assert_eq!(cache.sweep(), 0);
                }
            });
        });

        assert_eq!(stored.into_inner(), 1);
        assert!(cache.get(&addr).is_some());
    }

    #[test]
    fn test_concurrent_put_and_sweep_of_expiring_key() {
        let cache = MetadataCache::new(Duration::ZERO);
        let addr = DeviceAddress::from("AA:BB:CC");

        std::thread::scope(|scope| {
            for writer in 1..=4_u8 {
                let (cache, addr) = (&cache, &addr);
                scope.spawn(move || {
                    for _ in 0..500 {
                        cache.put(addr.clone(), writer_record(writer));
                        if let Some(rec) = cache.get(addr) {
                            let writer = rec.service_data.battery;
                            assert_eq!(rec, writer_record(writer));
                        }
                    }
                });
            }
            let cache = &cache;
            scope.spawn(move || {
                for _ in 0..500 {
                    cache.sweep();
                }
            });
        });

        cache.sweep();
        assert!(cache.is_empty());
    }
}
