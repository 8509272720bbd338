//! Relevance scoring and the merge/sort tie-break chain.

use std::cmp::Ordering;

use tsearch_core::models::{RankingProfile, SortKey, SortOrder};

use crate::dubbing::DubbingInfo;
use crate::metadata::{token_coverage, ParsedTitle};
use crate::quality::{ContentType, QualityInfo};

const DEFAULT_SERIES_TARGET_BYTES: i64 = 2 * 1024 * 1024 * 1024;
const DEFAULT_MOVIE_TARGET_BYTES: i64 = 6 * 1024 * 1024 * 1024;

/// Everything the scorer needs about one candidate, assembled by the
/// caller from parsing + the raw `SearchResult`.
pub struct RankingInput<'a> {
    pub query: &'a ParsedTitle,
    pub item: &'a ParsedTitle,
    pub seeders: i64,
    pub leechers: i64,
    pub size_bytes: i64,
    pub published_age_days: Option<f64>,
    pub quality: &'a QualityInfo,
    pub dubbing: Option<&'a DubbingInfo>,
    pub preferred_audio_hints: &'a [String],
    pub preferred_subtitle_hints: &'a [String],
    pub has_info_hash: bool,
    pub has_magnet: bool,
    pub content_type: ContentType,
}

fn quality_component(quality: &QualityInfo, dubbing: Option<&DubbingInfo>) -> f64 {
    let mut score = quality.resolution_score();
    score += quality.codec_bonus();
    score += quality.cam_penalty();
    score += 0.7 * quality.source_type_score();
    if quality.hdr {
        score += 2.0;
    }
    if quality.dolby_vision {
        score += 1.0;
    }
    score += quality.audio_channel_bonus();
    if let Some(d) = dubbing {
        score += d.score();
    }
    score
}

fn language_component(profile: &RankingProfile, input: &RankingInput) -> f64 {
    let mut matches = 0;
    let mut score = 0.0;
    for lang in input.preferred_audio_hints {
        if profile
            .preferred_audio
            .iter()
            .any(|p| p.eq_ignore_ascii_case(lang))
        {
            score += 4.0;
            matches += 1;
        }
    }
    for lang in input.preferred_subtitle_hints {
        if profile
            .preferred_subtitle
            .iter()
            .any(|p| p.eq_ignore_ascii_case(lang))
        {
            score += 3.0;
            matches += 1;
        }
    }
    let has_preferences = !profile.preferred_audio.is_empty() || !profile.preferred_subtitle.is_empty();
    if has_preferences && matches == 0 {
        let has_hints = !input.preferred_audio_hints.is_empty() || !input.preferred_subtitle_hints.is_empty();
        return if has_hints { -4.0 } else { -3.0 };
    }
    score
}

fn size_component(profile: &RankingProfile, input: &RankingInput) -> f64 {
    let target = if profile.target_size_bytes > 0 {
        profile.target_size_bytes
    } else if input.content_type == ContentType::Series {
        DEFAULT_SERIES_TARGET_BYTES
    } else {
        DEFAULT_MOVIE_TARGET_BYTES
    };
    if target == 0 {
        return 0.0;
    }
    let delta = (input.size_bytes - target).unsigned_abs() as f64;
    (5.0 - 5.0 * delta / target as f64).max(0.0)
}

fn freshness_component(age_days: Option<f64>) -> f64 {
    match age_days {
        Some(days) => (12.0 - (days / 30.0).min(12.0)).max(0.0),
        None => 0.0,
    }
}

fn category_component(profile: &RankingProfile, content_type: ContentType) -> f64 {
    let exclusive = profile.prefer_series ^ profile.prefer_movies;
    let mut score = 0.0;
    if profile.prefer_series {
        if content_type == ContentType::Series || content_type == ContentType::Anime {
            score += 6.0;
        } else if exclusive {
            score -= 3.0;
        }
    }
    if profile.prefer_movies {
        if content_type == ContentType::Movie {
            score += 6.0;
        } else if exclusive {
            score -= 3.0;
        }
    }
    score
}

/// Computes the full weighted relevance score for one candidate against
/// one query. Higher is better.
pub fn compute_relevance(profile: &RankingProfile, input: &RankingInput) -> f64 {
    let mut score = 0.0;

    let coverage = token_coverage(&input.query.tokens, &input.item.tokens);
    score += 100.0 * coverage;
    if coverage >= 1.0 {
        score += 12.0;
    }

    if !input.query.normalized.is_empty() && input.item.normalized.contains(&input.query.normalized) {
        score += 30.0;
    }

    match (input.query.year, input.item.year) {
        (Some(qy), Some(iy)) if qy == iy => score += 22.0,
        (Some(qy), Some(iy)) if qy != 0 && iy != 0 && qy != iy => score -= 14.0,
        _ => {}
    }

    match (input.query.season, input.item.season) {
        (Some(qs), Some(is)) if qs == is => score += 18.0,
        (Some(_), Some(_)) => score -= 20.0,
        _ => {}
    }
    match (input.query.episode, input.item.episode) {
        (Some(qe), Some(ie)) if qe == ie => score += 14.0,
        (Some(_), Some(_)) => score -= 16.0,
        _ => {}
    }

    score += profile.seeders
        * ((1.0 + input.seeders as f64).ln() * 3.0 + (1.0 + input.leechers as f64).ln() * 1.5);

    score += profile.quality * quality_component(input.quality, input.dubbing);

    score += profile.language * language_component(profile, input);

    score += profile.size * size_component(profile, input);

    score += profile.freshness * freshness_component(input.published_age_days);

    score += category_component(profile, input.content_type);

    if input.has_info_hash || input.has_magnet {
        score += 4.0;
    }

    let token_delta = (input.query.tokens.len() as i64 - input.item.tokens.len() as i64).unsigned_abs() as f64;
    score -= 0.7 * token_delta;

    score
}

/// Result of the ordering chain used both for ranking (after relevance
/// computed) and for dedupe-replacement decisions in the merge step.
#[derive(Debug, Clone, Copy)]
pub struct TieBreakFields {
    pub relevance: f64,
    pub seeders: i64,
    pub leechers: i64,
    pub published_at: Option<chrono::DateTime<chrono::Utc>>,
    pub has_info_hash: bool,
    pub has_magnet: bool,
    pub enrichment_richness: u32,
}

/// True iff `candidate` should replace `existing` under the merge
/// replacement rule: strictly greater relevance, then
/// seeders/leechers/publishedAt/info-hash/magnet/enrichment richness.
pub fn should_replace(existing: &TieBreakFields, candidate: &TieBreakFields) -> bool {
    if candidate.relevance != existing.relevance {
        return candidate.relevance > existing.relevance;
    }
    if candidate.seeders != existing.seeders {
        return candidate.seeders > existing.seeders;
    }
    if candidate.leechers != existing.leechers {
        return candidate.leechers > existing.leechers;
    }
    match (candidate.published_at, existing.published_at) {
        (Some(c), Some(e)) if c != e => return c > e,
        (Some(_), None) => return true,
        (None, Some(_)) => return false,
        _ => {}
    }
    if candidate.has_info_hash != existing.has_info_hash {
        return candidate.has_info_hash;
    }
    if candidate.has_magnet != existing.has_magnet {
        return candidate.has_magnet;
    }
    candidate.enrichment_richness > existing.enrichment_richness
}

/// Sort comparator applying `sort_by`/`sort_order`, falling back to the
/// tie-break chain (seeders desc, leechers desc, published desc, name,
/// size) on equal primary key.
pub fn compare_for_sort(
    sort_by: SortKey,
    order: SortOrder,
    a: (&TieBreakFields, &str, i64),
    b: (&TieBreakFields, &str, i64),
) -> Ordering {
    let (af, aname, asize) = a;
    let (bf, bname, bsize) = b;

    let primary = match sort_by {
        SortKey::Relevance => af.relevance.partial_cmp(&bf.relevance).unwrap_or(Ordering::Equal),
        SortKey::Seeders => af.seeders.cmp(&bf.seeders),
        SortKey::SizeBytes => asize.cmp(&bsize),
        SortKey::Published => af.published_at.cmp(&bf.published_at),
    };
    let primary = match order.sign() {
        1 => primary,
        _ => primary.reverse(),
    };
    if primary != Ordering::Equal {
        return primary;
    }

    af.seeders
        .cmp(&bf.seeders)
        .reverse()
        .then_with(|| af.leechers.cmp(&bf.leechers).reverse())
        .then_with(|| af.published_at.cmp(&bf.published_at).reverse())
        .then_with(|| aname.cmp(bname))
        .then_with(|| asize.cmp(&bsize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::parse_title;
    use crate::quality::parse_quality;

    #[test]
    fn exact_title_match_scores_highly() {
        let profile = RankingProfile::default();
        let query = parse_title("ubuntu 22.04 desktop");
        let item = parse_title("ubuntu 22.04 desktop");
        let quality = parse_quality("ubuntu 22.04 desktop");
        let input = RankingInput {
            query: &query,
            item: &item,
            seeders: 100,
            leechers: 10,
            size_bytes: 3_000_000_000,
            published_age_days: Some(1.0),
            quality: &quality,
            dubbing: None,
            preferred_audio_hints: &[],
            preferred_subtitle_hints: &[],
            has_info_hash: true,
            has_magnet: true,
            content_type: ContentType::Movie,
        };
        let score = compute_relevance(&profile, &input);
        assert!(score > 100.0, "expected high score, got {score}");
    }

    #[test]
    fn mismatched_year_penalized() {
        let profile = RankingProfile::default();
        let query = parse_title("movie 2020");
        let item = parse_title("movie 2015");
        let quality = parse_quality("movie 2015");
        let input = RankingInput {
            query: &query,
            item: &item,
            seeders: 1,
            leechers: 1,
            size_bytes: 0,
            published_age_days: None,
            quality: &quality,
            dubbing: None,
            preferred_audio_hints: &[],
            preferred_subtitle_hints: &[],
            has_info_hash: false,
            has_magnet: false,
            content_type: ContentType::Movie,
        };
        let score = compute_relevance(&profile, &input);
        let query_match = parse_title("movie 2020");
        let item_match = parse_title("movie 2020");
        let quality_match = parse_quality("movie 2020");
        let input_match = RankingInput {
            query: &query_match,
            item: &item_match,
            quality: &quality_match,
            ..input
        };
        let score_match = compute_relevance(&profile, &input_match);
        assert!(score_match > score);
    }

    #[test]
    fn replacement_prefers_strictly_higher_relevance() {
        let existing = TieBreakFields {
            relevance: 10.0,
            seeders: 5,
            leechers: 1,
            published_at: None,
            has_info_hash: false,
            has_magnet: true,
            enrichment_richness: 0,
        };
        let candidate = TieBreakFields { relevance: 10.0, seeders: 9, ..existing };
        assert!(should_replace(&existing, &candidate));
        let lower = TieBreakFields { relevance: 5.0, ..existing };
        assert!(!should_replace(&existing, &lower));
    }
}
