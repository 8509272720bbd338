//! Two-tier response cache, popularity tracking and the background
//! warmer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use tsearch_core::domain::CacheBackend;
use tsearch_core::models::{CacheFreshness, CachedEntry, PopularEntry, SearchRequest, SearchResponse};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub fresh_ttl_secs: i64,
    pub stale_multiplier: i64,
    pub max_entries: usize,
    pub max_popular: usize,
    pub warm_interval: Duration,
    pub warm_concurrency: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fresh_ttl_secs: 6 * 3600,
            stale_multiplier: 3,
            max_entries: 400,
            max_popular: 200,
            warm_interval: Duration::from_secs(300),
            warm_concurrency: 3,
        }
    }
}

pub enum Lookup {
    Fresh(SearchResponse),
    Stale {
        response: SearchResponse,
        should_refresh: bool,
        request: SearchRequest,
        provider_names: Vec<String>,
    },
    Miss,
}

/// Anything the warmer (and a stale-hit revalidation) can ask to redo a
/// cached search. Implemented by the aggregator; kept as a trait here to
/// avoid a dependency cycle.
#[async_trait]
pub trait PopularQueryRefresher: Send + Sync {
    async fn refresh(&self, request: SearchRequest, provider_names: &[String]) -> tsearch_core::error::Result<SearchResponse>;
}

/// In-process authoritative cache. An optional external [`CacheBackend`]
/// is best-effort and only consulted/populated on top of the in-process
/// map, never in place of it.
pub struct CacheStore {
    entries: Mutex<HashMap<String, CachedEntry>>,
    popular: Mutex<HashMap<String, PopularEntry>>,
    refresh_inflight: Mutex<std::collections::HashSet<String>>,
    config: CacheConfig,
    backend: Option<Arc<dyn CacheBackend>>,
}

impl CacheStore {
    pub fn new(config: CacheConfig, backend: Option<Arc<dyn CacheBackend>>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            popular: Mutex::new(HashMap::new()),
            refresh_inflight: Mutex::new(std::collections::HashSet::new()),
            config,
            backend,
        }
    }

    /// Fresh hit clones and returns; stale hit clones, returns, and signals
    /// at most one concurrent revalidation per key (the once-guard).
    pub async fn lookup(&self, key: &str) -> Lookup {
        let now = Utc::now();
        {
            let entries = self.entries.lock().unwrap();
            if let Some(entry) = entries.get(key) {
                return self.classify(entry, now, key);
            }
        }
        if let Some(backend) = &self.backend {
            if let Ok(Some(entry)) = backend.get(key).await {
                let classified = self.classify(&entry, now, key);
                self.entries.lock().unwrap().insert(key.to_string(), entry);
                return classified;
            }
        }
        Lookup::Miss
    }

    fn classify(&self, entry: &CachedEntry, now: chrono::DateTime<Utc>, key: &str) -> Lookup {
        match entry.freshness(now) {
            CacheFreshness::Fresh => Lookup::Fresh(entry.response.clone()),
            CacheFreshness::Stale => {
                let mut inflight = self.refresh_inflight.lock().unwrap();
                let should_refresh = inflight.insert(key.to_string());
                Lookup::Stale {
                    response: entry.response.clone(),
                    should_refresh,
                    request: entry.request.clone(),
                    provider_names: entry.provider_names.clone(),
                }
            }
            CacheFreshness::Expired => Lookup::Miss,
        }
    }

    /// Clears the once-guard without invalidating the stale entry. Only
    /// the task that actually ran the revalidation (success or failure)
    /// should call this.
    pub fn clear_refresh_guard(&self, key: &str) {
        self.refresh_inflight.lock().unwrap().remove(key);
    }

    pub async fn store(&self, key: String, response: SearchResponse, request: SearchRequest, provider_names: Vec<String>) {
        let now = Utc::now();
        let entry = CachedEntry {
            key: key.clone(),
            response,
            stored_at: now,
            fresh_ttl_secs: self.config.fresh_ttl_secs,
            stale_ttl_secs: self.config.fresh_ttl_secs * self.config.stale_multiplier,
            request,
            provider_names,
        };
        self.refresh_inflight.lock().unwrap().remove(&key);
        {
            let mut entries = self.entries.lock().unwrap();
            entries.insert(key.clone(), entry.clone());
            self.evict_locked(&mut entries, now);
        }
        if let Some(backend) = &self.backend {
            if let Err(err) = backend.put(entry).await {
                warn!("external cache backend write failed: {err}");
            }
        }
    }

    fn evict_locked(&self, entries: &mut HashMap<String, CachedEntry>, now: chrono::DateTime<Utc>) {
        if entries.len() <= self.config.max_entries {
            return;
        }
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| matches!(e.freshness(now), CacheFreshness::Expired))
            .map(|(k, _)| k.clone())
            .collect();
        for k in expired {
            entries.remove(&k);
            if entries.len() <= self.config.max_entries {
                return;
            }
        }
        let mut by_age: Vec<(String, chrono::DateTime<Utc>)> =
            entries.iter().map(|(k, e)| (k.clone(), e.stored_at)).collect();
        by_age.sort_by_key(|(_, stored_at)| *stored_at);
        for (k, _) in by_age {
            if entries.len() <= self.config.max_entries {
                break;
            }
            entries.remove(&k);
        }
    }

    /// Only first-page requests (offset 0) are recorded.
    pub fn record_popularity(&self, key: &str, offset: u32) {
        if offset != 0 {
            return;
        }
        let now = Utc::now();
        let mut popular = self.popular.lock().unwrap();
        popular
            .entry(key.to_string())
            .and_modify(|p| p.record_hit(now))
            .or_insert_with(|| PopularEntry {
                key: key.to_string(),
                hit_count: 1,
                last_requested_at: now,
            });
        if popular.len() > self.config.max_popular {
            let mut by_rank: Vec<(String, u64, chrono::DateTime<Utc>)> = popular
                .iter()
                .map(|(k, v)| (k.clone(), v.hit_count, v.last_requested_at))
                .collect();
            by_rank.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)));
            while popular.len() > self.config.max_popular {
                if let Some((k, _, _)) = by_rank.first() {
                    popular.remove(k);
                    by_rank.remove(0);
                } else {
                    break;
                }
            }
        }
    }

    fn top_popular(&self, limit: usize) -> Vec<PopularEntry> {
        let popular = self.popular.lock().unwrap();
        let mut entries: Vec<PopularEntry> = popular.values().cloned().collect();
        entries.sort_by(|a, b| {
            b.hit_count
                .cmp(&a.hit_count)
                .then(b.last_requested_at.cmp(&a.last_requested_at))
        });
        entries.truncate(limit);
        entries
    }

    fn is_warm_candidate(&self, key: &str, now: chrono::DateTime<Utc>, half_interval: chrono::Duration) -> bool {
        let entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) => {
                if matches!(entry.freshness(now), CacheFreshness::Fresh) {
                    return false;
                }
                now - entry.stored_at < half_interval
            }
            None => true,
        }
    }

    /// One warmer tick: refreshes up to `warm_concurrency` popular, stale
    /// queries whose cache wasn't warmed within the past half-interval.
    pub async fn warm_tick(self: &Arc<Self>, top_n: usize, refresher: Arc<dyn PopularQueryRefresher>) {
        let now = Utc::now();
        let half_interval = chrono::Duration::milliseconds(self.config.warm_interval.as_millis() as i64 / 2);
        let candidates: Vec<CachedEntry> = self
            .top_popular(top_n)
            .into_iter()
            .map(|p| p.key)
            .filter(|k| self.is_warm_candidate(k, now, half_interval))
            .filter_map(|k| self.entries.lock().unwrap().get(&k).cloned())
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.config.warm_concurrency));
        let mut handles = Vec::new();
        for entry in candidates {
            let permit = semaphore.clone().acquire_owned().await.unwrap();
            let refresher = refresher.clone();
            let store = self.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                debug!("warming cache key {}", entry.key);
                match refresher.refresh(entry.request.clone(), &entry.provider_names).await {
                    Ok(response) => {
                        store.store(entry.key.clone(), response, entry.request, entry.provider_names).await;
                    }
                    Err(err) => warn!("warmer refresh failed for {}: {err}", entry.key),
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tsearch_core::models::{RankingProfile, SearchFilters, SortKey, SortOrder};

    fn response() -> SearchResponse {
        SearchResponse::empty()
    }

    fn request(query: &str) -> SearchRequest {
        SearchRequest::new(
            query,
            50,
            0,
            SortKey::Relevance,
            SortOrder::Desc,
            RankingProfile::default(),
            SearchFilters::default(),
            false,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn fresh_then_stale_then_expired() {
        let mut config = CacheConfig::default();
        config.fresh_ttl_secs = 0;
        config.stale_multiplier = 1;
        let store = CacheStore::new(config, None);
        store.store("k".to_string(), response(), request("k"), vec!["p".to_string()]).await;
        match store.lookup("k").await {
            Lookup::Stale { should_refresh, .. } => assert!(should_refresh),
            _ => panic!("expected stale on zero fresh ttl"),
        }
    }

    #[tokio::test]
    async fn stale_refresh_guard_fires_once() {
        let mut config = CacheConfig::default();
        config.fresh_ttl_secs = 0;
        config.stale_multiplier = 100;
        let store = CacheStore::new(config, None);
        store.store("k".to_string(), response(), request("k"), vec!["p".to_string()]).await;
        let first = matches!(store.lookup("k").await, Lookup::Stale { should_refresh: true, .. });
        let second = matches!(store.lookup("k").await, Lookup::Stale { should_refresh: false, .. });
        assert!(first);
        assert!(second);
    }

    #[tokio::test]
    async fn popularity_only_recorded_for_first_page() {
        let store = CacheStore::new(CacheConfig::default(), None);
        store.record_popularity("k", 0);
        store.record_popularity("k", 10);
        assert_eq!(store.top_popular(10)[0].hit_count, 1);
    }

    #[tokio::test]
    async fn eviction_respects_cap() {
        let mut config = CacheConfig::default();
        config.max_entries = 2;
        let store = CacheStore::new(config, None);
        store.store("a".to_string(), response(), request("a"), Vec::new()).await;
        store.store("b".to_string(), response(), request("b"), Vec::new()).await;
        store.store("c".to_string(), response(), request("c"), Vec::new()).await;
        assert!(store.entries.lock().unwrap().len() <= 2);
    }

    struct CountingRefresher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PopularQueryRefresher for CountingRefresher {
        async fn refresh(&self, _request: SearchRequest, _provider_names: &[String]) -> tsearch_core::error::Result<SearchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SearchResponse::empty())
        }
    }

    #[tokio::test]
    async fn warm_tick_refreshes_stale_popular_keys() {
        let store = Arc::new(CacheStore::new(CacheConfig::default(), None));
        let stale_entry = CachedEntry {
            key: "k".to_string(),
            response: response(),
            stored_at: Utc::now() - chrono::Duration::seconds(100),
            fresh_ttl_secs: 50,
            stale_ttl_secs: 1000,
            request: request("k"),
            provider_names: vec!["p".to_string()],
        };
        store.entries.lock().unwrap().insert("k".to_string(), stale_entry);
        store.record_popularity("k", 0);

        let refresher = Arc::new(CountingRefresher { calls: AtomicUsize::new(0) });
        store.warm_tick(10, refresher.clone()).await;

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }
}
