//! Per-provider run statistics

use crate::error::LookupError;
use crate::provider::LookupResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Lookup statistics for one provider run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderStats {
    /// Total lookups issued
    pub lookups: u64,

    /// Lookups answered with a status
    pub confirmed: u64,

    /// Lookups answered with "not found"
    pub not_found: u64,

    /// Lookups that failed for any other reason (timeouts included)
    pub failures: u64,

    /// Lookups that hit the timeout
    pub timeouts: u64,

    /// Average lookup latency
    pub avg_latency_ms: f64,

    /// Slowest lookup
    pub max_latency_ms: f64,
}

impl ProviderStats {
    /// Share of lookups that produced a confirmed answer (status or not found)
    pub fn resolution_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            (self.confirmed + self.not_found) as f64 / self.lookups as f64
        }
    }
}

/// Collects lookup outcomes while a provider's fan-out is in flight
pub struct MetricsCollector {
    stats: Arc<RwLock<ProviderStats>>,
    total_latency_ms: Arc<RwLock<f64>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(RwLock::new(ProviderStats::default())),
            total_latency_ms: Arc::new(RwLock::new(0.0)),
        }
    }

    /// Record one lookup outcome and its latency
    pub async fn record_lookup(&self, outcome: &LookupResult, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1000.0;

        let mut total = self.total_latency_ms.write().await;
        *total += latency_ms;

        let mut stats = self.stats.write().await;
        stats.lookups += 1;

        match outcome {
            Ok(_) => stats.confirmed += 1,
            Err(LookupError::NotFound) => stats.not_found += 1,
            Err(LookupError::Timeout(_)) => {
                stats.failures += 1;
                stats.timeouts += 1;
            }
            Err(_) => stats.failures += 1,
        }

        stats.avg_latency_ms = *total / stats.lookups as f64;
        if latency_ms > stats.max_latency_ms {
            stats.max_latency_ms = latency_ms;
        }
    }

    /// Current statistics
    pub async fn snapshot(&self) -> ProviderStats {
        self.stats.read().await.clone()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
