//! Per-bridge call counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated lock-free from every invoking thread
#[derive(Debug, Default)]
pub struct Counters {
    requests: AtomicU64,
    exceptions: AtomicU64,
    malformed: AtomicU64,
    arguments: AtomicU64,
    rejected: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_exception(&self) {
        self.exceptions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// A request that never reached the handler because its arguments failed to build
    #[inline]
    pub fn record_argument_failure(&self) {
        self.arguments.fetch_add(1, Ordering::Relaxed);
    }

    /// A call turned away before any handler was resolved
    #[inline]
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BridgeStats {
        BridgeStats {
            requests: self.requests.load(Ordering::Relaxed),
            exceptions: self.exceptions.load(Ordering::Relaxed),
            malformed_results: self.malformed.load(Ordering::Relaxed),
            argument_failures: self.arguments.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a bridge's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Requests handed to the Python handler
    pub requests: u64,
    /// Of those, how many raised
    pub exceptions: u64,
    /// Of those, how many returned an unusable value
    pub malformed_results: u64,
    /// Of those, how many failed before the handler was called
    pub argument_failures: u64,
    /// Calls refused because no handler was resolved yet
    pub rejected: u64,
}

impl BridgeStats {
    pub fn failures(&self) -> u64 {
        self.exceptions + self.malformed_results + self.argument_failures
    }
}
