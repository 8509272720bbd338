//! Post-merge result filtering.

use tsearch_core::models::{EnrichedResult, SearchFilters};

fn content_type_passes(filter: &str, item_content_type: &str, is_series: bool) -> bool {
    match filter {
        "" => true,
        "movie" => !is_series,
        "series" => is_series || item_content_type == "series" || item_content_type == "anime",
        "anime" => item_content_type == "anime",
        _ => true,
    }
}

pub fn apply_filters(results: Vec<EnrichedResult>, filters: &SearchFilters) -> Vec<EnrichedResult> {
    results
        .into_iter()
        .filter(|r| {
            if !filters.quality.is_empty() {
                match &r.enrichment.quality {
                    Some(q) if filters.quality.iter().any(|allowed| allowed.eq_ignore_ascii_case(q)) => {}
                    _ => return false,
                }
            }

            let is_series = r.enrichment.parsed_season.is_some() || r.enrichment.parsed_episode.is_some();
            if !content_type_passes(&filters.content_type, &r.enrichment.content_type, is_series) {
                return false;
            }

            if filters.year_from != 0 {
                if let Some(year) = r.enrichment.parsed_year {
                    if year != 0 && year < filters.year_from {
                        return false;
                    }
                }
            }
            if filters.year_to != 0 {
                if let Some(year) = r.enrichment.parsed_year {
                    if year != 0 && year > filters.year_to {
                        return false;
                    }
                }
            }

            if !filters.dubbing_groups.is_empty() {
                let group_matches = r
                    .enrichment
                    .dubbing_group
                    .as_deref()
                    .map(|g| filters.dubbing_groups.iter().any(|f| f.eq_ignore_ascii_case(g)))
                    .unwrap_or(false);
                if !group_matches {
                    return false;
                }
            }

            if !filters.dubbing_types.is_empty() {
                let type_matches = r
                    .enrichment
                    .dubbing_type
                    .as_deref()
                    .map(|t| filters.dubbing_types.iter().any(|f| f.eq_ignore_ascii_case(t)))
                    .unwrap_or(false);
                if !type_matches {
                    return false;
                }
            }

            if filters.min_seeders > 0 && r.result.seeders < filters.min_seeders {
                return false;
            }

            true
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsearch_core::models::{SearchEnrichment, SearchResult};

    fn item(seeders: i64, year: Option<i32>) -> EnrichedResult {
        EnrichedResult {
            result: SearchResult {
                provider: "p".to_string(),
                title: "t".to_string(),
                info_hash: "a".repeat(40),
                magnet_uri: Some("magnet:?xt=urn:btih:aaaa".to_string()),
                torrent_url: None,
                size_bytes: 1,
                seeders,
                leechers: 0,
                published_at: None,
                category: "movies".to_string(),
            },
            enrichment: SearchEnrichment {
                parsed_year: year,
                ..Default::default()
            },
        }
    }

    #[test]
    fn min_seeders_filter() {
        let results = vec![item(1, None), item(10, None)];
        let mut filters = SearchFilters::default();
        filters.min_seeders = 5;
        let filtered = apply_filters(results, &filters);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].result.seeders, 10);
    }

    #[test]
    fn year_range_filter_passes_zero_year() {
        let results = vec![item(1, None), item(1, Some(1999))];
        let mut filters = SearchFilters::default();
        filters.year_from = 2000;
        let filtered = apply_filters(results, &filters);
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn empty_filters_are_idempotent() {
        let results = vec![item(1, Some(2000)), item(2, Some(2010))];
        let filters = SearchFilters::default();
        let filtered = apply_filters(results.clone(), &filters);
        assert_eq!(filtered.len(), results.len());
    }
}
