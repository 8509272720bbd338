//! Per-provider health tracking and circuit breaking.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use tsearch_core::models::ProviderHealth;

/// Process-lived health state for every provider ever queried. A single
/// mutex guards the whole map; critical sections never sleep.
#[derive(Default)]
pub struct HealthRegistry {
    inner: Mutex<HashMap<String, ProviderHealth>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` when healthy, `Some(health snapshot)` when blocked
    /// and the block has not yet expired.
    pub fn check_blocked(&self, provider: &str) -> Option<ProviderHealth> {
        let now = Utc::now();
        let mut map = self.inner.lock().unwrap();
        let health = map
            .entry(provider.to_string())
            .or_insert_with(|| ProviderHealth::new(provider));
        if health.is_available(now) {
            None
        } else {
            Some(health.clone())
        }
    }

    pub fn record_success(&self, provider: &str) {
        let now = Utc::now();
        let mut map = self.inner.lock().unwrap();
        map.entry(provider.to_string())
            .or_insert_with(|| ProviderHealth::new(provider))
            .record_success(now);
    }

    pub fn record_failure(&self, provider: &str, error: impl Into<String>) {
        let now = Utc::now();
        let mut map = self.inner.lock().unwrap();
        map.entry(provider.to_string())
            .or_insert_with(|| ProviderHealth::new(provider))
            .record_failure(now, error);
    }

    pub fn snapshot(&self, provider: &str) -> Option<ProviderHealth> {
        self.inner.lock().unwrap().get(provider).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_three_failures_and_recovers() {
        let registry = HealthRegistry::new();
        registry.record_failure("piratebay", "timeout");
        registry.record_failure("piratebay", "timeout");
        assert!(registry.check_blocked("piratebay").is_none());
        registry.record_failure("piratebay", "timeout");
        assert!(registry.check_blocked("piratebay").is_some());
    }

    #[test]
    fn success_clears_block() {
        let registry = HealthRegistry::new();
        for _ in 0..3 {
            registry.record_failure("x", "timeout");
        }
        assert!(registry.check_blocked("x").is_some());
        registry.record_success("x");
        assert!(registry.check_blocked("x").is_none());
    }
}
