//! The search aggregator: fan-out, merge, rank, filter, paginate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use tsearch_core::domain::{CatalogClient, SearchProvider};
use tsearch_core::error::{Error, Result};
use tsearch_core::models::{
    resolve_provider_aliases, EnrichedResult, ProviderOutcome, RankingProfile, SearchFilters,
    SearchRequest, SearchResponse, SortKey, SortOrder,
};
use tsearch_core::retry::{retry_with_backoff, RetryConfig, RetryPolicy};
use tsearch_parsing::dubbing::detect_dubbing;
use tsearch_parsing::metadata::{parse_title, title_dedupe_key};
use tsearch_parsing::quality::{classify_content_type, parse_quality};
use tsearch_parsing::ranking::{compare_for_sort, compute_relevance, RankingInput, TieBreakFields};

use crate::cache::{CacheStore, Lookup, PopularQueryRefresher};
use crate::filter::apply_filters;
use crate::health::HealthRegistry;
use crate::merge::{build_merged_entry, dedupe_key, to_enriched, MergeMap};

const MIN_RESULTS_BEFORE_EXPANSION: usize = 5;

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub fanout_concurrency: usize,
    pub retry: RetryConfig,
    pub operation_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            fanout_concurrency: 10,
            retry: RetryConfig::default(),
            operation_timeout: Duration::from_secs(15),
        }
    }
}

pub struct Aggregator {
    providers: HashMap<String, Arc<dyn SearchProvider>>,
    health: Arc<HealthRegistry>,
    cache: Option<Arc<CacheStore>>,
    catalog: Option<Arc<dyn CatalogClient>>,
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(
        providers: Vec<Arc<dyn SearchProvider>>,
        health: Arc<HealthRegistry>,
        cache: Option<Arc<CacheStore>>,
        catalog: Option<Arc<dyn CatalogClient>>,
        config: AggregatorConfig,
    ) -> Self {
        let providers = providers.into_iter().map(|p| (p.name().to_string(), p)).collect();
        Self { providers, health, cache, catalog, config }
    }

    /// Resolves a provider selector: empty ⇒ all,
    /// sorted by name; otherwise case-folded lookup honoring aliases.
    pub fn resolve_providers(&self, selector: &[String]) -> Result<Vec<Arc<dyn SearchProvider>>> {
        if selector.is_empty() {
            let mut names: Vec<&String> = self.providers.keys().collect();
            names.sort();
            return Ok(names.into_iter().map(|n| self.providers[n].clone()).collect());
        }
        let mut seen = std::collections::HashSet::new();
        let mut resolved = Vec::new();
        for raw in selector {
            let canonical = resolve_provider_aliases(raw);
            let provider = self
                .providers
                .get(&canonical)
                .ok_or_else(|| Error::UnknownProvider { name: raw.clone() })?;
            if seen.insert(canonical.clone()) {
                resolved.push(provider.clone());
            }
        }
        if resolved.is_empty() {
            return Err(Error::NoProviders);
        }
        Ok(resolved)
    }

    fn cache_key(&self, req: &SearchRequest, providers: &[Arc<dyn SearchProvider>]) -> String {
        let mut names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
        names.sort();
        format!(
            "tsearch:cache:{}|{}|{}|{}",
            req.query.to_lowercase(),
            names.join(","),
            req.filters.normalized_tokens(),
            req.ranking_profile.fingerprint()
        )
    }

    #[instrument(skip(self, req))]
    pub async fn search(self: &Arc<Self>, req: SearchRequest, provider_names: &[String]) -> Result<SearchResponse> {
        let providers = self.resolve_providers(provider_names)?;
        let provider_names_resolved: Vec<String> = providers.iter().map(|p| p.name().to_string()).collect();

        let use_cache = self.cache.is_some() && !req.no_cache;
        let cache_key = self.cache_key(&req, &providers);

        if use_cache {
            if let Some(cache) = &self.cache {
                match cache.lookup(&cache_key).await {
                    Lookup::Fresh(response) => {
                        cache.record_popularity(&cache_key, req.offset);
                        return Ok(response);
                    }
                    Lookup::Stale { response, should_refresh, request: stale_request, provider_names: stale_providers } => {
                        cache.record_popularity(&cache_key, req.offset);
                        if should_refresh {
                            let this = self.clone();
                            let cache = cache.clone();
                            let cache_key = cache_key.clone();
                            tokio::spawn(async move {
                                let outcome = this.refresh(stale_request.clone(), &stale_providers).await;
                                match outcome {
                                    Ok(fresh) => cache.store(cache_key.clone(), fresh, stale_request, stale_providers).await,
                                    Err(err) => warn!("stale-cache revalidation failed for {cache_key}: {err}"),
                                }
                                cache.clear_refresh_guard(&cache_key);
                            });
                        }
                        return Ok(response);
                    }
                    Lookup::Miss => {}
                }
            }
        }

        let response = self.execute(&req, &providers).await?;

        if use_cache {
            if let Some(cache) = &self.cache {
                cache.store(cache_key.clone(), response.clone(), req.clone(), provider_names_resolved).await;
                cache.record_popularity(&cache_key, req.offset);
            }
        }

        Ok(response)
    }

    pub async fn search_stream(
        self: Arc<Self>,
        req: SearchRequest,
        provider_names: Vec<String>,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<SearchResponse>> {
        let providers = self.resolve_providers(&provider_names)?;
        let (tx, rx) = mpsc::channel(providers.len().max(1) + 1);

        tokio::spawn(async move {
            let merge = Arc::new(MergeMap::new());
            let query_parsed = parse_title(&req.query);
            let semaphore = Arc::new(Semaphore::new(self.config.fanout_concurrency));
            let mut statuses: Vec<ProviderOutcome> = Vec::new();

            for provider in &providers {
                if cancel.is_cancelled() {
                    break;
                }
                let outcome = self.query_one(provider.clone(), &req, &query_parsed, &merge, semaphore.clone()).await;
                statuses.push(outcome);
                let snapshot = self.build_response(&req, &merge, statuses.clone(), false, false);
                let _ = tx.try_send(snapshot);
            }

            self.enrich_from_catalog(&query_parsed, &merge).await;

            let final_response = self.build_response(&req, &merge, statuses, false, true);
            let _ = tx.send(final_response).await;
        });

        Ok(rx)
    }

    async fn execute(&self, req: &SearchRequest, providers: &[Arc<dyn SearchProvider>]) -> Result<SearchResponse> {
        let merge = Arc::new(MergeMap::new());
        let query_parsed = parse_title(&req.query);
        let semaphore = Arc::new(Semaphore::new(self.config.fanout_concurrency));

        let mut handles = Vec::new();
        for provider in providers {
            let provider = provider.clone();
            let merge = merge.clone();
            let semaphore = semaphore.clone();
            let req = req.clone();
            let query_parsed = query_parsed.clone();
            let this = self.clone_refs();
            handles.push(tokio::spawn(async move {
                this.query_one(provider, &req, &query_parsed, &merge, semaphore).await
            }));
        }

        let mut statuses = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(outcome) => statuses.push(outcome),
                Err(err) => warn!("provider task panicked: {err}"),
            }
        }

        let query_expanded = self.maybe_expand(req, &query_parsed, &merge, &mut statuses).await;

        self.enrich_from_catalog(&query_parsed, &merge).await;

        let response = self.build_response(req, &merge, statuses, query_expanded, true);

        if response.all_providers_failed() {
            warn!("all providers failed for query {:?}", req.query);
        }

        Ok(response)
    }

    /// Clones the fields needed by a spawned task without cloning the
    /// whole aggregator (providers map stays shared via Arc fields only).
    fn clone_refs(&self) -> AggregatorRefs {
        AggregatorRefs {
            health: self.health.clone(),
            retry: self.config.retry.clone(),
        }
    }

    async fn query_one(
        &self,
        provider: Arc<dyn SearchProvider>,
        req: &SearchRequest,
        query_parsed: &tsearch_parsing::metadata::ParsedTitle,
        merge: &Arc<MergeMap>,
        semaphore: Arc<Semaphore>,
    ) -> ProviderOutcome {
        AggregatorRefs { health: self.health.clone(), retry: self.config.retry.clone() }
            .query_one(provider, req, query_parsed, merge, semaphore)
            .await
    }

    async fn maybe_expand(
        &self,
        req: &SearchRequest,
        query_parsed: &tsearch_parsing::metadata::ParsedTitle,
        merge: &Arc<MergeMap>,
        statuses: &mut Vec<ProviderOutcome>,
    ) -> bool {
        if merge.len() >= MIN_RESULTS_BEFORE_EXPANSION {
            return false;
        }
        if !req.ranking_profile.wants_russian() {
            return false;
        }
        let has_cyrillic = req.query.chars().any(|c| ('\u{0400}'..='\u{04FF}').contains(&c));
        if has_cyrillic && req.query.to_lowercase().contains("russian") {
            return false;
        }

        let zero_item_providers: Vec<String> = statuses
            .iter()
            .filter(|s| s.error.is_none() && s.result_count == 0 && s.provider != "rutracker")
            .map(|s| s.provider.clone())
            .collect();
        if zero_item_providers.is_empty() {
            return false;
        }

        let mut any_expanded = false;
        for name in zero_item_providers {
            let Some(provider) = self.providers.get(&name).cloned() else { continue };
            let expanded_query = if name == "1337x" {
                if has_cyrillic {
                    format!("{} russian", transliterate_for_expansion(&req.query))
                } else {
                    format!("{} russian", req.query)
                }
            } else {
                format!("{} rus", req.query)
            };
            any_expanded = true;
            let semaphore = Arc::new(Semaphore::new(1));
            let mut expanded_req = req.clone();
            expanded_req.query = expanded_query;
            let outcome = self
                .query_one(provider, &expanded_req, query_parsed, merge, semaphore)
                .await;
            statuses.retain(|s| s.provider != name);
            statuses.push(outcome);
        }
        any_expanded
    }

    /// Issues a single catalog multi-search per call (not per result) and
    /// backfills only the fields providers left empty. Silently skipped
    /// when no catalog client is configured or the merge is empty; a
    /// catalog error is logged and otherwise ignored, since enrichment is
    /// a best-effort addition and must never fail the whole search.
    async fn enrich_from_catalog(&self, query_parsed: &tsearch_parsing::metadata::ParsedTitle, merge: &Arc<MergeMap>) {
        let Some(catalog) = &self.catalog else { return };
        if merge.is_empty() {
            return;
        }
        match catalog.multi_search(&query_parsed.normalized).await {
            Ok(Some(hit)) => merge.apply_catalog_hit(&hit),
            Ok(None) => {}
            Err(err) => warn!("catalog enrichment failed for {:?}: {err}", query_parsed.normalized),
        }
    }

    fn build_response(
        &self,
        req: &SearchRequest,
        merge: &Arc<MergeMap>,
        statuses: Vec<ProviderOutcome>,
        query_expanded: bool,
        _final: bool,
    ) -> SearchResponse {
        let enriched: Vec<EnrichedResult> = merge.snapshot().into_iter().map(to_enriched).collect();

        let filtered = apply_filters(enriched, &req.filters);
        let total_matched = filtered.len();

        let mut sortable: Vec<(TieBreakFields, String, i64, EnrichedResult)> = filtered
            .into_iter()
            .map(|item| {
                let fields = TieBreakFields {
                    relevance: item.enrichment.relevance_score,
                    seeders: item.result.seeders,
                    leechers: item.result.leechers,
                    published_at: item.result.published_at,
                    has_info_hash: item.result.info_hash.len() == 40,
                    has_magnet: item.result.magnet_uri.is_some(),
                    enrichment_richness: crate::merge::enrichment_richness(&item.enrichment),
                };
                let name = item.result.title.to_lowercase();
                let size = item.result.size_bytes;
                (fields, name, size, item)
            })
            .collect();

        sortable.sort_by(|a, b| {
            compare_for_sort(req.sort_by, req.sort_order, (&a.0, &a.1, a.2), (&b.0, &b.1, b.2))
        });

        let start = (req.offset as usize).min(total_matched);
        let end = (start + req.limit as usize).min(total_matched);
        let page: Vec<EnrichedResult> = sortable
            .into_iter()
            .skip(start)
            .take(end.saturating_sub(start))
            .map(|(_, _, _, item)| item)
            .collect();

        SearchResponse {
            results: page,
            total_matched,
            providers: statuses,
            served_from_cache: false,
            partial: false,
            query_expanded,
        }
    }
}

fn transliterate_for_expansion(query: &str) -> String {
    parse_title(query).tokens.into_iter().collect::<Vec<_>>().join(" ")
}

/// Small bundle cloned into spawned provider tasks so the whole
/// aggregator (and its providers map) doesn't need to be `Clone`.
struct AggregatorRefs {
    health: Arc<HealthRegistry>,
    retry: RetryConfig,
}

impl AggregatorRefs {
    async fn query_one(
        &self,
        provider: Arc<dyn SearchProvider>,
        req: &SearchRequest,
        query_parsed: &tsearch_parsing::metadata::ParsedTitle,
        merge: &Arc<MergeMap>,
        semaphore: Arc<Semaphore>,
    ) -> ProviderOutcome {
        let name = provider.name().to_string();
        let start = Instant::now();

        if let Some(health) = self.health.check_blocked(&name) {
            let blocked_until = health.blocked_until.map(|d| d.to_rfc3339()).unwrap_or_default();
            return ProviderOutcome {
                provider: name,
                result_count: 0,
                error: Some(format!(
                    "circuit open until {blocked_until}: {}",
                    health.last_error.unwrap_or_default()
                )),
                duration_ms: start.elapsed().as_millis() as u64,
                served_from_cache: false,
            };
        }

        let _permit = semaphore.acquire_owned().await.ok();
        let fetch_limit = req.fetch_limit(provider.is_torznab_style());
        let retry = self.retry.clone();
        let filters = req.filters.clone();
        let query = req.query.clone();
        let provider_for_retry = provider.clone();

        let result = retry_with_backoff(retry, RetryPolicy::Transient, &name, move || {
            let provider = provider_for_retry.clone();
            let query = query.clone();
            let filters = filters.clone();
            async move { provider.search(&query, fetch_limit, &filters).await }
        })
        .await;

        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(results) => {
                self.health.record_success(&name);
                let count = results.len();
                for result in results {
                    if result.validate().is_err() {
                        continue;
                    }
                    let item_parsed = parse_title(&result.title);
                    let title_key = title_dedupe_key(&item_parsed, result.size_bytes);
                    let key = dedupe_key(&result, Some(&title_key));
                    let quality = parse_quality(&result.title);
                    let dubbing = detect_dubbing(&result.title, None);
                    let age_days = result
                        .published_at
                        .map(|p| (Utc::now() - p).num_seconds() as f64 / 86400.0);
                    let has_info_hash = result.info_hash.len() == 40;
                    let has_magnet = result.magnet_uri.is_some();
                    let content_type = classify_content_type(
                        &result.title,
                        item_parsed.season.is_some() || item_parsed.episode.is_some(),
                    );
                    let ranking_input = RankingInput {
                        query: query_parsed,
                        item: &item_parsed,
                        seeders: result.seeders,
                        leechers: result.leechers,
                        size_bytes: result.size_bytes,
                        published_age_days: age_days,
                        quality: &quality,
                        dubbing: dubbing.as_ref(),
                        preferred_audio_hints: &req.ranking_profile.preferred_audio,
                        preferred_subtitle_hints: &req.ranking_profile.preferred_subtitle,
                        has_info_hash,
                        has_magnet,
                        content_type,
                    };
                    let relevance = compute_relevance(&req.ranking_profile, &ranking_input);
                    let enrichment = tsearch_core::models::SearchEnrichment {
                        relevance_score: relevance,
                        parsed_year: item_parsed.year,
                        parsed_season: item_parsed.season,
                        parsed_episode: item_parsed.episode,
                        quality: quality.quality_string(),
                        dubbing_group: dubbing.as_ref().and_then(|d| d.group.clone()),
                        dubbing_type: dubbing.as_ref().and_then(|d| d.dubbing_type).map(|t| t.as_str().to_string()),
                        is_dubbed_russian: dubbing.is_some(),
                        normalized_title: item_parsed.normalized.clone(),
                        content_type: content_type.as_str().to_string(),
                    };
                    let entry = build_merged_entry(result, enrichment, relevance);
                    merge.offer(key, entry, name.clone());
                }
                ProviderOutcome { provider: name, result_count: count, error: None, duration_ms, served_from_cache: false }
            }
            Err(err) => {
                self.health.record_failure(&name, err.to_string());
                ProviderOutcome { provider: name, result_count: 0, error: Some(err.to_string()), duration_ms, served_from_cache: false }
            }
        }
    }
}

#[async_trait]
impl PopularQueryRefresher for Aggregator {
    async fn refresh(&self, request: SearchRequest, provider_names: &[String]) -> Result<SearchResponse> {
        let providers = self.resolve_providers(provider_names)?;
        self.execute(&request, &providers).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsearch_core::models::{SearchFilters, SortKey, SortOrder};
    use tsearch_core::testutil::StaticSearchProvider;

    fn result(hash: &str, seeders: i64) -> tsearch_core::models::SearchResult {
        tsearch_core::models::SearchResult {
            provider: "p".to_string(),
            title: "Ubuntu 22.04".to_string(),
            info_hash: hash.to_string(),
            magnet_uri: Some(format!("magnet:?xt=urn:btih:{hash}")),
            torrent_url: None,
            size_bytes: 1000,
            seeders,
            leechers: 1,
            published_at: None,
            category: "os".to_string(),
        }
    }

    fn request() -> SearchRequest {
        SearchRequest::new(
            "ubuntu",
            1,
            1,
            SortKey::Seeders,
            SortOrder::Desc,
            RankingProfile::default(),
            SearchFilters::default(),
            true,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn dedupe_sort_paginate_scenario() {
        let provider_a = Arc::new(StaticSearchProvider::new(
            "providera",
            vec![result(&"1".repeat(40), 10), result(&"1".repeat(40), 25)],
        ));
        let provider_b = Arc::new(StaticSearchProvider::new(
            "providerb",
            vec![result(&"2".repeat(40), 5), result(&"3".repeat(40), 1)],
        ));
        let aggregator = Arc::new(Aggregator::new(
            vec![provider_a, provider_b],
            Arc::new(HealthRegistry::new()),
            None,
            None,
            AggregatorConfig::default(),
        ));
        let response = aggregator.search(request(), &[]).await.unwrap();
        assert_eq!(response.total_matched, 3);
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].result.seeders, 5);
    }

    #[tokio::test]
    async fn unknown_provider_errors() {
        let aggregator = Arc::new(Aggregator::new(vec![], Arc::new(HealthRegistry::new()), None, None, AggregatorConfig::default()));
        let err = aggregator.search(request(), &["nope".to_string()]).await.unwrap_err();
        assert!(matches!(err, Error::UnknownProvider { .. }));
    }

    #[tokio::test]
    async fn cache_hit_avoids_second_provider_call() {
        let provider = Arc::new(StaticSearchProvider::new("p", vec![result(&"1".repeat(40), 10)]));
        let cache = Arc::new(CacheStore::new(crate::cache::CacheConfig::default(), None));
        let aggregator = Arc::new(Aggregator::new(
            vec![provider.clone()],
            Arc::new(HealthRegistry::new()),
            Some(cache),
            None,
            AggregatorConfig::default(),
        ));
        let mut req = request();
        req.no_cache = false;
        aggregator.search(req.clone(), &[]).await.unwrap();
        aggregator.search(req, &[]).await.unwrap();
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn stale_hit_spawns_background_revalidation() {
        let provider = Arc::new(StaticSearchProvider::new("p", vec![result(&"1".repeat(40), 10)]));
        // Already-expired fresh window, but a stale window that still
        // covers "just stored": -1 * -1000 gives a positive stale_ttl.
        let mut config = crate::cache::CacheConfig::default();
        config.fresh_ttl_secs = -1;
        config.stale_multiplier = -1000;
        let cache = Arc::new(CacheStore::new(config, None));
        let aggregator = Arc::new(Aggregator::new(
            vec![provider.clone()],
            Arc::new(HealthRegistry::new()),
            Some(cache),
            None,
            AggregatorConfig::default(),
        ));
        let mut req = request();
        req.no_cache = false;

        aggregator.search(req.clone(), &[]).await.unwrap();
        assert_eq!(provider.call_count(), 1);

        aggregator.search(req, &[]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(provider.call_count(), 2, "stale hit should have spawned exactly one background revalidation");
    }

    struct FakeCatalog {
        hit: tsearch_core::models::CatalogHit,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl CatalogClient for FakeCatalog {
        async fn multi_search(&self, _normalized_query: &str) -> Result<Option<tsearch_core::models::CatalogHit>> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Some(self.hit.clone()))
        }
    }

    #[tokio::test]
    async fn catalog_hit_backfills_empty_fields_once() {
        let provider = Arc::new(StaticSearchProvider::new(
            "p",
            vec![result(&"1".repeat(40), 10), result(&"4".repeat(40), 3)],
        ));
        let catalog = Arc::new(FakeCatalog {
            hit: tsearch_core::models::CatalogHit {
                id: "tt123".to_string(),
                poster: Some("http://example/poster.jpg".to_string()),
                rating: Some(8.1),
                overview: Some("a".repeat(600)),
            },
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let aggregator = Arc::new(Aggregator::new(
            vec![provider],
            Arc::new(HealthRegistry::new()),
            None,
            Some(catalog.clone()),
            AggregatorConfig::default(),
        ));
        let mut req = request();
        req.limit = 10;
        let response = aggregator.search(req, &[]).await.unwrap();

        assert_eq!(catalog.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(response.results.len(), 2);
        for item in &response.results {
            assert_eq!(item.enrichment.catalog_id.as_deref(), Some("tt123"));
            assert_eq!(item.enrichment.rating, Some(8.1));
            assert_eq!(item.enrichment.overview.as_ref().unwrap().chars().count(), 500);
        }
    }
}
