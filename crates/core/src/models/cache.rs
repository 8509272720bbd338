//! Two-tier cache entry and popularity tracking models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::request::SearchRequest;
use super::response::SearchResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheFreshness {
    Fresh,
    Stale,
    Expired,
}

/// A stored response keyed by query fingerprint, with fresh/stale/expired
/// thresholds evaluated relative to `stored_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntry {
    pub key: String,
    pub response: SearchResponse,
    pub stored_at: DateTime<Utc>,
    pub fresh_ttl_secs: i64,
    pub stale_ttl_secs: i64,
    /// The request and resolved provider set that produced `response`,
    /// kept so a stale hit or warmer tick can redo the same search.
    pub request: SearchRequest,
    pub provider_names: Vec<String>,
}

impl CachedEntry {
    /// `< fresh_ttl` => Fresh, `< stale_ttl` => Stale (serve + background
    /// refresh), else Expired.
    pub fn freshness(&self, now: DateTime<Utc>) -> CacheFreshness {
        let age = (now - self.stored_at).num_seconds().max(0);
        if age < self.fresh_ttl_secs {
            CacheFreshness::Fresh
        } else if age < self.stale_ttl_secs {
            CacheFreshness::Stale
        } else {
            CacheFreshness::Expired
        }
    }
}

/// Tracks how often a query fingerprint has been requested, to prioritize
/// warmer refresh order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopularEntry {
    pub key: String,
    pub hit_count: u64,
    pub last_requested_at: DateTime<Utc>,
}

impl PopularEntry {
    pub fn record_hit(&mut self, now: DateTime<Utc>) {
        self.hit_count += 1;
        self.last_requested_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::request::{RankingProfile, SearchFilters, SortKey, SortOrder};
    use crate::models::response::SearchResponse;

    fn entry(age_secs: i64) -> CachedEntry {
        CachedEntry {
            key: "k".to_string(),
            response: SearchResponse::empty(),
            stored_at: Utc::now() - chrono::Duration::seconds(age_secs),
            fresh_ttl_secs: 300,
            stale_ttl_secs: 900,
            request: SearchRequest::new(
                "k",
                50,
                0,
                SortKey::Relevance,
                SortOrder::Desc,
                RankingProfile::default(),
                SearchFilters::default(),
                false,
            )
            .unwrap(),
            provider_names: Vec::new(),
        }
    }

    #[test]
    fn freshness_tiers() {
        assert_eq!(entry(10).freshness(Utc::now()), CacheFreshness::Fresh);
        assert_eq!(entry(500).freshness(Utc::now()), CacheFreshness::Stale);
        assert_eq!(entry(1000).freshness(Utc::now()), CacheFreshness::Expired);
    }
}
