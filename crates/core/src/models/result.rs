//! Per-candidate search result and post-merge enrichment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn is_valid_info_hash(s: &str) -> bool {
    s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

/// One candidate surfaced by a provider, before ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub provider: String,
    pub title: String,
    pub info_hash: String,
    pub magnet_uri: Option<String>,
    pub torrent_url: Option<String>,
    pub size_bytes: i64,
    pub seeders: i64,
    pub leechers: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub category: String,
}

impl SearchResult {
    /// Validates the 40-hex-lowercase info-hash invariant and the
    /// exactly-one-of(magnet, torrent_url) invariant.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_info_hash(&self.info_hash) {
            return Err(Error::InvalidSource {
                reason: format!("info_hash {:?} is not 40 lowercase hex chars", self.info_hash),
            });
        }
        match (&self.magnet_uri, &self.torrent_url) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            (Some(_), Some(_)) => Err(Error::InvalidSource {
                reason: "exactly one of magnet_uri/torrent_url must be set".to_string(),
            }),
            (None, None) => Err(Error::InvalidSource {
                reason: "neither magnet_uri nor torrent_url is set".to_string(),
            }),
        }
    }

    /// Dedupe key used by the merge step: lowercased info-hash, falling
    /// back to (lowercased title, size_bytes) when the hash is absent.
    pub fn dedupe_key(&self) -> String {
        if is_valid_info_hash(&self.info_hash) {
            self.info_hash.clone()
        } else {
            format!("{}:{}", self.title.to_lowercase(), self.size_bytes)
        }
    }
}

/// Parsed attributes and derived relevance score attached post-merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchEnrichment {
    pub relevance_score: f64,
    pub parsed_year: Option<i32>,
    pub parsed_season: Option<i32>,
    pub parsed_episode: Option<i32>,
    pub quality: Option<String>,
    pub dubbing_group: Option<String>,
    pub dubbing_type: Option<String>,
    pub is_dubbed_russian: bool,
    pub normalized_title: String,
    /// `movie | series | anime`.
    pub content_type: String,
    /// Populated post-merge by a configured external catalog client;
    /// left empty (and never overwritten) otherwise.
    pub catalog_id: Option<String>,
    pub poster: Option<String>,
    pub rating: Option<f64>,
    pub overview: Option<String>,
}

/// One hit from an external catalog's multi-search, used to backfill the
/// catalog fields of [`SearchEnrichment`] after merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogHit {
    pub id: String,
    pub poster: Option<String>,
    pub rating: Option<f64>,
    pub overview: Option<String>,
}

const OVERVIEW_MAX_CHARS: usize = 500;

impl CatalogHit {
    /// Truncates `overview` to 500 chars (char-boundary safe) before
    /// it's applied to any [`SearchEnrichment`].
    pub fn capped_overview(&self) -> Option<String> {
        self.overview.as_ref().map(|o| o.chars().take(OVERVIEW_MAX_CHARS).collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedResult {
    #[serde(flatten)]
    pub result: SearchResult,
    pub enrichment: SearchEnrichment,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> SearchResult {
        SearchResult {
            provider: "piratebay".to_string(),
            title: "Example.Title.2020".to_string(),
            info_hash: "a".repeat(40),
            magnet_uri: Some("magnet:?xt=urn:btih:aaaa".to_string()),
            torrent_url: None,
            size_bytes: 1000,
            seeders: 10,
            leechers: 2,
            published_at: None,
            category: "movies".to_string(),
        }
    }

    #[test]
    fn validates_good_result() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn rejects_uppercase_hash() {
        let mut r = base();
        r.info_hash = "A".repeat(40);
        assert!(r.validate().is_err());
    }

    #[test]
    fn rejects_both_sources() {
        let mut r = base();
        r.torrent_url = Some("http://example/t.torrent".to_string());
        assert!(r.validate().is_err());
    }

    #[test]
    fn rejects_neither_source() {
        let mut r = base();
        r.magnet_uri = None;
        assert!(r.validate().is_err());
    }

    #[test]
    fn dedupe_key_falls_back_without_hash() {
        let mut r = base();
        r.info_hash = "not-a-hash".to_string();
        assert_eq!(r.dedupe_key(), "example.title.2020:1000");
    }
}
