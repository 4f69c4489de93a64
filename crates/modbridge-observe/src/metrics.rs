//! Metrics collection for proxy caches.

use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Collects request and creation metrics for one proxy cache.
#[derive(Default)]
pub struct CacheMetrics {
    /// Request counters.
    requests: RwLock<RequestMetrics>,
    /// Lifecycle counters.
    lifecycle: RwLock<LifecycleMetrics>,
    /// Timing metrics.
    timing: RwLock<CreationTiming>,
}

impl CacheMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request served from the cache.
    pub fn record_hit(&self) {
        self.requests.write().hits += 1;
    }

    /// Record a request that had to create a proxy.
    pub fn record_miss(&self) {
        self.requests.write().misses += 1;
    }

    /// Record a rejected or failed request.
    pub fn record_failure(&self) {
        self.requests.write().failures += 1;
    }

    /// Record a successful proxy creation.
    pub fn record_creation(&self, duration: Duration) {
        self.lifecycle.write().creations += 1;

        let mut timing = self.timing.write();
        timing.total_creation_time += duration;
        if duration > timing.slowest_creation {
            timing.slowest_creation = duration;
        }
    }

    /// Record a successful generator bootstrap.
    pub fn record_bootstrap(&self, duration: Duration) {
        self.lifecycle.write().bootstraps += 1;
        self.timing.write().total_bootstrap_time += duration;
    }

    /// Record a cache reset.
    pub fn record_reset(&self, entries_cleared: usize) {
        let mut lifecycle = self.lifecycle.write();
        lifecycle.resets += 1;
        lifecycle.entries_released += entries_cleared as u64;
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            requests: self.requests.read().clone(),
            lifecycle: self.lifecycle.read().clone(),
            timing: self.timing.read().clone(),
        }
    }

    /// Reset all metrics.
    pub fn clear(&self) {
        *self.requests.write() = RequestMetrics::default();
        *self.lifecycle.write() = LifecycleMetrics::default();
        *self.timing.write() = CreationTiming::default();
    }
}

impl std::fmt::Debug for CacheMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheMetrics")
            .field("requests", &*self.requests.read())
            .field("lifecycle", &*self.lifecycle.read())
            .finish()
    }
}

/// Snapshot of collected metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheMetricsSnapshot {
    /// Request counters.
    pub requests: RequestMetrics,
    /// Lifecycle counters.
    pub lifecycle: LifecycleMetrics,
    /// Timing metrics.
    pub timing: CreationTiming,
}

impl CacheMetricsSnapshot {
    /// Fraction of successful requests served from the cache.
    pub fn hit_ratio(&self) -> f64 {
        let served = self.requests.hits + self.lifecycle.creations;
        if served == 0 {
            0.0
        } else {
            self.requests.hits as f64 / served as f64
        }
    }
}

/// Request counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetrics {
    /// Requests answered from the cache.
    pub hits: u64,
    /// Requests that started a creation.
    pub misses: u64,
    /// Requests that returned no proxy.
    pub failures: u64,
}

/// Generator and cache lifecycle counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleMetrics {
    /// Proxies created and cached.
    pub creations: u64,
    /// Successful generator loads.
    pub bootstraps: u64,
    /// Calls to reset.
    pub resets: u64,
    /// Proxies released by resets.
    pub entries_released: u64,
}

/// Timing metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreationTiming {
    /// Total time spent creating proxies.
    #[serde(with = "duration_serde")]
    pub total_creation_time: Duration,
    /// Slowest single creation.
    #[serde(with = "duration_serde")]
    pub slowest_creation: Duration,
    /// Total time spent loading the generator.
    #[serde(with = "duration_serde")]
    pub total_bootstrap_time: Duration,
}

/// Custom serde for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_nanos() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos))
    }
}
