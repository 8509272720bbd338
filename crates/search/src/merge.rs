//! Concurrent-safe merge of per-provider results into a deduplicated set.

use std::collections::HashMap;
use std::sync::Mutex;

use tsearch_core::models::{CatalogHit, EnrichedResult, SearchEnrichment, SearchResult};
use tsearch_parsing::ranking::{should_replace, TieBreakFields};

/// One merged entry: the winning result plus its already-parsed
/// enrichment and every `{source, tracker}` observed for its dedupe key
/// across providers.
#[derive(Debug, Clone)]
pub struct MergedEntry {
    pub result: SearchResult,
    pub enrichment: SearchEnrichment,
    pub sources: Vec<String>,
}

/// `quality`/`dubbing_group`/`parsed_year`/`parsed_season` each count for
/// one point of richness, used as the final merge/sort tie-break.
pub fn enrichment_richness(e: &SearchEnrichment) -> u32 {
    [e.quality.is_some(), e.dubbing_group.is_some(), e.parsed_year.is_some(), e.parsed_season.is_some()]
        .iter()
        .filter(|b| **b)
        .count() as u32
}

/// Guarded by a single mutex so concurrent provider results merge safely.
#[derive(Default)]
pub struct MergeMap {
    inner: Mutex<HashMap<String, MergedEntry>>,
}

impl MergeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or conditionally replaces the entry at `dedupe_key`. On
    /// replace, preserves the accumulated `sources[]`; on no-replace,
    /// still appends the new source ref.
    pub fn offer(&self, dedupe_key: String, candidate: MergedEntry, source_ref: String) {
        let mut map = self.inner.lock().unwrap();
        match map.get_mut(&dedupe_key) {
            None => {
                let mut entry = candidate;
                entry.sources = vec![source_ref];
                map.insert(dedupe_key, entry);
            }
            Some(existing) => {
                let existing_fields = TieBreakFields {
                    relevance: existing.enrichment.relevance_score,
                    seeders: existing.result.seeders,
                    leechers: existing.result.leechers,
                    published_at: existing.result.published_at,
                    has_info_hash: is_valid_hash(&existing.result.info_hash),
                    has_magnet: existing.result.magnet_uri.is_some(),
                    enrichment_richness: enrichment_richness(&existing.enrichment),
                };
                let candidate_fields = TieBreakFields {
                    relevance: candidate.enrichment.relevance_score,
                    seeders: candidate.result.seeders,
                    leechers: candidate.result.leechers,
                    published_at: candidate.result.published_at,
                    has_info_hash: is_valid_hash(&candidate.result.info_hash),
                    has_magnet: candidate.result.magnet_uri.is_some(),
                    enrichment_richness: enrichment_richness(&candidate.enrichment),
                };
                if should_replace(&existing_fields, &candidate_fields) {
                    let mut sources = std::mem::take(&mut existing.sources);
                    sources.push(source_ref);
                    let mut replaced = candidate;
                    replaced.sources = sources;
                    *existing = replaced;
                } else {
                    existing.sources.push(source_ref);
                }
            }
        }
    }

    pub fn snapshot(&self) -> Vec<MergedEntry> {
        self.inner.lock().unwrap().values().cloned().collect()
    }

    /// Backfills every entry's empty catalog fields (`catalog_id`/`poster`/
    /// `rating`/`overview`) from a single external-catalog hit. Never
    /// overwrites a field a provider or an earlier hit already populated.
    pub fn apply_catalog_hit(&self, hit: &CatalogHit) {
        let overview = hit.capped_overview();
        let mut map = self.inner.lock().unwrap();
        for entry in map.values_mut() {
            let enrichment = &mut entry.enrichment;
            if enrichment.catalog_id.is_none() {
                enrichment.catalog_id = Some(hit.id.clone());
            }
            if enrichment.poster.is_none() {
                enrichment.poster = hit.poster.clone();
            }
            if enrichment.rating.is_none() {
                enrichment.rating = hit.rating;
            }
            if enrichment.overview.is_none() {
                enrichment.overview = overview.clone();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_valid_hash(s: &str) -> bool {
    s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

/// Dedupe key preference chain: normalized info-hash →
/// info-hash extracted from magnet → title-derived key → `"magnet:"+magnet`
/// → `name + ":" + size`.
pub fn dedupe_key(result: &SearchResult, title_key: Option<&str>) -> String {
    if is_valid_hash(&result.info_hash) {
        return result.info_hash.to_lowercase();
    }
    if let Some(magnet) = &result.magnet_uri {
        if let Some(hash) = extract_info_hash_from_magnet(magnet) {
            return hash;
        }
    }
    if let Some(key) = title_key {
        return key.to_string();
    }
    if let Some(magnet) = &result.magnet_uri {
        return format!("magnet:{magnet}");
    }
    format!("{}:{}", result.title.to_lowercase(), result.size_bytes)
}

pub fn extract_info_hash_from_magnet(magnet: &str) -> Option<String> {
    let marker = "btih:";
    let idx = magnet.to_lowercase().find(marker)?;
    let rest = &magnet[idx + marker.len()..];
    let hash: String = rest.chars().take_while(|c| *c != '&').collect();
    if hash.len() == 40 {
        Some(hash.to_lowercase())
    } else {
        None
    }
}

pub fn build_merged_entry(result: SearchResult, mut enrichment: SearchEnrichment, relevance: f64) -> MergedEntry {
    enrichment.relevance_score = relevance;
    MergedEntry {
        result,
        enrichment,
        sources: Vec::new(),
    }
}

pub fn to_enriched(entry: MergedEntry) -> EnrichedResult {
    EnrichedResult {
        result: entry.result,
        enrichment: entry.enrichment,
    }
}
