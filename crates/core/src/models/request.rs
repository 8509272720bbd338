//! Search request, ranking profile and filter models.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    Relevance,
    Seeders,
    SizeBytes,
    Published,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// +1 for desc, -1 for asc; multiply into a comparator's ordering.
    pub fn sign(self) -> i32 {
        match self {
            SortOrder::Desc => 1,
            SortOrder::Asc => -1,
        }
    }
}

pub const MIN_LIMIT: u32 = 1;
pub const MAX_LIMIT: u32 = 200;
pub const DEFAULT_LIMIT: u32 = 50;

/// A normalized, validated search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: u32,
    pub offset: u32,
    pub sort_by: SortKey,
    pub sort_order: SortOrder,
    pub ranking_profile: RankingProfile,
    pub filters: SearchFilters,
    pub no_cache: bool,
}

impl SearchRequest {
    /// Trims the query and clamps limit/offset to their valid ranges.
    /// Returns `ErrInvalidQuery`/`ErrInvalidOffset` on invalid input.
    pub fn new(
        query: impl Into<String>,
        limit: u32,
        offset: i64,
        sort_by: SortKey,
        sort_order: SortOrder,
        ranking_profile: RankingProfile,
        filters: SearchFilters,
        no_cache: bool,
    ) -> Result<Self> {
        let query = query.into().trim().to_string();
        if query.is_empty() {
            return Err(Error::InvalidQuery);
        }
        if offset < 0 {
            return Err(Error::InvalidOffset);
        }
        let limit = limit.clamp(MIN_LIMIT, MAX_LIMIT);
        Ok(Self {
            query,
            limit,
            offset: offset as u32,
            sort_by,
            sort_order,
            ranking_profile,
            filters,
            no_cache,
        })
    }

    /// `clamp(limit+offset, lo, hi)`, where `(lo, hi)` depends on whether the
    /// provider set includes a Torznab-style backend.
    pub fn fetch_limit(&self, torznab_style: bool) -> u32 {
        let (lo, hi) = if torznab_style { (10, 80) } else { (50, 200) };
        (self.limit + self.offset).clamp(lo, hi)
    }
}

/// Weighted objective converting a candidate's parsed attributes into a
/// relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingProfile {
    pub freshness: f64,
    pub seeders: f64,
    pub quality: f64,
    pub language: f64,
    pub size: f64,
    /// 0 => component-specific default (2GiB series / 6GiB movies).
    pub target_size_bytes: i64,
    pub preferred_audio: Vec<String>,
    pub preferred_subtitle: Vec<String>,
    pub prefer_series: bool,
    pub prefer_movies: bool,
}

impl Default for RankingProfile {
    fn default() -> Self {
        Self {
            freshness: 1.0,
            seeders: 1.0,
            quality: 1.0,
            language: 1.0,
            size: 1.0,
            target_size_bytes: 0,
            preferred_audio: Vec::new(),
            preferred_subtitle: Vec::new(),
            prefer_series: false,
            prefer_movies: false,
        }
    }
}

impl RankingProfile {
    /// Weights multiplied by 100 and truncated, used for cache-key
    /// fingerprinting.
    pub fn fingerprint(&self) -> String {
        let w = |v: f64| (v * 100.0).trunc() as i64;
        let mut audio: Vec<String> = self
            .preferred_audio
            .iter()
            .map(|s| s.to_lowercase())
            .collect();
        audio.sort();
        let mut subs: Vec<String> = self
            .preferred_subtitle
            .iter()
            .map(|s| s.to_lowercase())
            .collect();
        subs.sort();
        format!(
            "f{}:s{}:q{}:l{}:z{}:t{}:a{}:u{}:ps{}:pm{}",
            w(self.freshness),
            w(self.seeders),
            w(self.quality),
            w(self.language),
            w(self.size),
            self.target_size_bytes,
            audio.join(","),
            subs.join(","),
            self.prefer_series,
            self.prefer_movies
        )
    }

    pub fn wants_russian(&self) -> bool {
        self.preferred_audio
            .iter()
            .chain(self.preferred_subtitle.iter())
            .any(|lang| {
                let l = lang.to_lowercase();
                l == "ru" || l == "rus" || l == "russian"
            })
    }
}

/// Result filters applied after merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    pub quality: Vec<String>,
    pub content_type: String,
    pub year_from: i32,
    pub year_to: i32,
    pub dubbing_groups: Vec<String>,
    pub dubbing_types: Vec<String>,
    pub min_seeders: i64,
}

impl SearchFilters {
    /// Sorted, case-folded token representation used for cache keys.
    pub fn normalized_tokens(&self) -> String {
        let norm = |v: &[String]| -> String {
            let mut out: Vec<String> = v.iter().map(|s| s.to_lowercase()).collect();
            out.sort();
            out.join(",")
        };
        format!(
            "q:{}|c:{}|yf:{}|yt:{}|dg:{}|dt:{}|ms:{}",
            norm(&self.quality),
            self.content_type.to_lowercase(),
            self.year_from,
            self.year_to,
            norm(&self.dubbing_groups),
            norm(&self.dubbing_types),
            self.min_seeders
        )
    }
}

/// Resolve a provider selector against the known provider set, honoring
/// case-folded aliases.
pub fn resolve_provider_aliases(name: &str) -> String {
    let key = name.to_lowercase();
    let aliases: HashMap<&str, &str> = HashMap::from([
        ("bittorrent", "piratebay"),
        ("tpb", "piratebay"),
        ("x1337", "1337x"),
        ("rt", "rutracker"),
    ]);
    aliases.get(key.as_str()).map(|s| s.to_string()).unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_query() {
        let err = SearchRequest::new(
            "   ",
            50,
            0,
            SortKey::Relevance,
            SortOrder::Desc,
            RankingProfile::default(),
            SearchFilters::default(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery));
    }

    #[test]
    fn rejects_negative_offset() {
        let err = SearchRequest::new(
            "ubuntu",
            50,
            -1,
            SortKey::Relevance,
            SortOrder::Desc,
            RankingProfile::default(),
            SearchFilters::default(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidOffset));
    }

    #[test]
    fn clamps_limit() {
        let req = SearchRequest::new(
            "ubuntu",
            9999,
            0,
            SortKey::Relevance,
            SortOrder::Desc,
            RankingProfile::default(),
            SearchFilters::default(),
            false,
        )
        .unwrap();
        assert_eq!(req.limit, MAX_LIMIT);
    }

    #[test]
    fn fetch_limit_generic_vs_torznab() {
        let req = SearchRequest::new(
            "ubuntu",
            50,
            10,
            SortKey::Relevance,
            SortOrder::Desc,
            RankingProfile::default(),
            SearchFilters::default(),
            false,
        )
        .unwrap();
        assert_eq!(req.fetch_limit(false), 60);
        assert_eq!(req.fetch_limit(true), 60);

        let req2 = SearchRequest::new(
            "ubuntu",
            5,
            0,
            SortKey::Relevance,
            SortOrder::Desc,
            RankingProfile::default(),
            SearchFilters::default(),
            false,
        )
        .unwrap();
        assert_eq!(req2.fetch_limit(false), 50);
        assert_eq!(req2.fetch_limit(true), 10);
    }

    #[test]
    fn resolves_aliases() {
        assert_eq!(resolve_provider_aliases("bittorrent/tpb".split('/').next().unwrap()), "bittorrent");
        assert_eq!(resolve_provider_aliases("tpb"), "piratebay");
        assert_eq!(resolve_provider_aliases("x1337"), "1337x");
        assert_eq!(resolve_provider_aliases("RT"), "rutracker");
    }
}
