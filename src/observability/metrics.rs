//! Metrics registry
//!
//! - Counters only, monotonic
//! - Thread-safe, lock-free
//! - Owned by a validator; exact values, Relaxed ordering

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters of one validator.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Message types compiled (successfully or not)
    compilations: AtomicU64,
    /// Message types whose compilation failed
    compile_failures: AtomicU64,
    /// Compiled-rule lookups served from the cache
    cache_hits: AtomicU64,
    /// Validation calls
    validations: AtomicU64,
    /// Violations reported
    violations: AtomicU64,
    /// Evaluation faults encountered
    faults: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_compilations(&self) {
        self.compilations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_compile_failures(&self) {
        self.compile_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_validations(&self) {
        self.validations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_violations(&self, count: u64) {
        self.violations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_faults(&self, count: u64) {
        self.faults.fetch_add(count, Ordering::Relaxed);
    }

    /// Number of message types compiled so far
    pub fn compilations(&self) -> u64 {
        self.compilations.load(Ordering::Relaxed)
    }

    pub fn validations(&self) -> u64 {
        self.validations.load(Ordering::Relaxed)
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            compilations: self.compilations.load(Ordering::Relaxed),
            compile_failures: self.compile_failures.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            validations: self.validations.load(Ordering::Relaxed),
            violations: self.violations.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }

    /// Current snapshot as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub compilations: u64,
    pub compile_failures: u64,
    pub cache_hits: u64,
    pub validations: u64,
    pub violations: u64,
    pub faults: u64,
}
