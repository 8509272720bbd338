//! Per-provider health and the two-state circuit breaker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderStatus {
    Healthy,
    Blocked,
}

/// Rolling health state for one provider. `consecutive_failures` drives the
/// exponential block-out duration; a single success resets it to zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub provider: String,
    pub status: ProviderStatus,
    pub consecutive_failures: u32,
    pub blocked_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl ProviderHealth {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            status: ProviderStatus::Healthy,
            consecutive_failures: 0,
            blocked_until: None,
            last_error: None,
            last_success_at: None,
        }
    }

    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        match (self.status, self.blocked_until) {
            (ProviderStatus::Blocked, Some(until)) => now >= until,
            (ProviderStatus::Blocked, None) => false,
            (ProviderStatus::Healthy, _) => true,
        }
    }

    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures = 0;
        self.status = ProviderStatus::Healthy;
        self.blocked_until = None;
        self.last_error = None;
        self.last_success_at = Some(now);
    }

    /// Blocks the provider for `exp_block(consecutive_failures)` once
    /// failures reach the trip threshold of 3.
    pub fn record_failure(&mut self, now: DateTime<Utc>, error: impl Into<String>) {
        self.consecutive_failures += 1;
        self.last_error = Some(error.into());
        if self.consecutive_failures >= 3 {
            self.status = ProviderStatus::Blocked;
            self.blocked_until = Some(now + chrono::Duration::seconds(exp_block_secs(self.consecutive_failures)));
        }
    }
}

/// `min(2min * 2^(n-3), 15min)` in seconds, for n >= 3; 0 below threshold.
pub fn exp_block_secs(consecutive_failures: u32) -> i64 {
    if consecutive_failures < 3 {
        return 0;
    }
    let base = 120i64;
    let exponent = (consecutive_failures - 3).min(10) as u32;
    let scaled = base.saturating_mul(1i64 << exponent);
    scaled.min(900)
}
