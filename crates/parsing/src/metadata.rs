//! Title metadata extraction: year, season/episode, tokenization and the
//! title-derived dedupe key.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

const SIZE_BUCKET: i64 = 64 * 1024 * 1024;

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(19\d{2}|20\d{2})").unwrap());
static SE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"s(\d{1,2})e(\d{1,3})").unwrap());
static X_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{1,2})x(\d{1,3})").unwrap());
static SEASON_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:season|сезон)[\s._-]*(\d{1,2})").unwrap());
static EPISODE_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:episode|серия)[\s._-]*(\d{1,3})").unwrap());
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").unwrap());

const STOPWORDS: &[&str] = &[
    // resolution
    "480p", "576p", "720p", "1080p", "1440p", "2160p", "4320p", "4k", "8k", "uhd", "hd", "sd",
    // codec
    "h264", "h265", "hevc", "avc", "x264", "x265", "av1", "xvid", "divx", "10bit", "8bit",
    // source type
    "bluray", "blu", "ray", "bdrip", "brrip", "webdl", "web", "webrip", "dl", "hdtv", "dvdrip",
    "dvd", "hdrip", "camrip", "cam", "ts", "telesync", "hdcam", "remux", "amzn", "nf", "hmax",
    // container
    "mkv", "mp4", "avi", "ts2", "m4v",
    // language / release tags
    "rus", "rusub", "eng", "multi", "dual", "dubbed", "subbed", "repack", "proper", "internal",
    "extended", "uncut", "limited", "retail", "ukr",
];

static STOPWORD_SET: Lazy<BTreeSet<&'static str>> = Lazy::new(|| STOPWORDS.iter().copied().collect());

/// `ё` -> `е`, transliteration table for Cyrillic -> Latin, applied per
/// character in order (longest-first not needed: single-char map).
fn transliterate_char(c: char) -> Option<&'static str> {
    Some(match c {
        'а' => "a", 'б' => "b", 'в' => "v", 'г' => "g", 'д' => "d", 'е' => "e", 'ж' => "zh",
        'з' => "z", 'и' => "i", 'й' => "y", 'к' => "k", 'л' => "l", 'м' => "m", 'н' => "n",
        'о' => "o", 'п' => "p", 'р' => "r", 'с' => "s", 'т' => "t", 'у' => "u", 'ф' => "f",
        'х' => "h", 'ц' => "ts", 'ч' => "ch", 'ш' => "sh", 'щ' => "sch", 'ъ' => "", 'ы' => "y",
        'ь' => "", 'э' => "e", 'ю' => "yu", 'я' => "ya",
        _ => return None,
    })
}

fn transliterate(token: &str) -> Option<String> {
    let mut out = String::new();
    let mut any = false;
    for c in token.chars() {
        if let Some(t) = transliterate_char(c) {
            out.push_str(t);
            any = true;
        } else {
            out.push(c);
        }
    }
    if any {
        Some(out)
    } else {
        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParsedTitle {
    pub normalized: String,
    pub year: Option<i32>,
    pub season: Option<i32>,
    pub episode: Option<i32>,
    pub tokens: BTreeSet<String>,
}

/// Lowercases, folds `ё` -> `е`, extracts year/season/episode, tokenizes on
/// alphanumerics discarding stopwords, and adds Cyrillic transliterations
/// of surviving tokens to the token set.
pub fn parse_title(raw: &str) -> ParsedTitle {
    let normalized = raw.to_lowercase().replace('ё', "е");

    let year = YEAR_RE
        .find_iter(&normalized)
        .filter_map(|m| m.as_str().parse::<i32>().ok())
        .max();

    let (season, episode) = if let Some(caps) = SE_RE.captures(&normalized) {
        (caps[1].parse().ok(), caps[2].parse().ok())
    } else if let Some(caps) = X_RE.captures(&normalized) {
        (caps[1].parse().ok(), caps[2].parse().ok())
    } else {
        let season = SEASON_WORD_RE
            .captures(&normalized)
            .and_then(|c| c[1].parse().ok());
        let episode = EPISODE_WORD_RE
            .captures(&normalized)
            .and_then(|c| c[1].parse().ok());
        (season, episode)
    };

    let mut tokens = BTreeSet::new();
    for m in TOKEN_RE.find_iter(&normalized) {
        let tok = m.as_str();
        if STOPWORD_SET.contains(tok) {
            continue;
        }
        tokens.insert(tok.to_string());
        if let Some(translit) = transliterate(tok) {
            tokens.insert(translit);
        }
    }

    ParsedTitle {
        normalized,
        year,
        season,
        episode,
        tokens,
    }
}

/// `"title|"+tokens+"|y:"+year+"|s:"+season+"|e:"+episode+"|b:"+bucket`
///: near-identical releases collapse to the same key.
pub fn title_dedupe_key(parsed: &ParsedTitle, size_bytes: i64) -> String {
    let tokens: Vec<&String> = parsed.tokens.iter().collect();
    let token_str = tokens
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(",");
    let bucket = size_bytes / SIZE_BUCKET;
    format!(
        "title|{}|y:{}|s:{}|e:{}|b:{}",
        token_str,
        parsed.year.unwrap_or(0),
        parsed.season.unwrap_or(0),
        parsed.episode.unwrap_or(0),
        bucket
    )
}

/// Jaccard-free coverage: fraction of `query_tokens` present in
/// `item_tokens`.
pub fn token_coverage(query_tokens: &BTreeSet<String>, item_tokens: &BTreeSet<String>) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let matched = query_tokens.intersection(item_tokens).count();
    matched as f64 / query_tokens.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_year_season_episode_se_format() {
        let parsed = parse_title("Breaking.Bad.S03E07.1080p.BluRay.x264");
        assert_eq!(parsed.season, Some(3));
        assert_eq!(parsed.episode, Some(7));
        assert_eq!(parsed.year, None);
    }

    #[test]
    fn extracts_year_and_x_format() {
        let parsed = parse_title("Some.Show.2021.3x12.HDTV");
        assert_eq!(parsed.year, Some(2021));
        assert_eq!(parsed.season, Some(3));
        assert_eq!(parsed.episode, Some(12));
    }

    #[test]
    fn extracts_word_form_season_episode_russian() {
        let parsed = parse_title("Шоу Сезон 2 Серия 5");
        assert_eq!(parsed.season, Some(2));
        assert_eq!(parsed.episode, Some(5));
    }

    #[test]
    fn drops_stopwords_and_transliterates() {
        let parsed = parse_title("Интерстеллар 2014 1080p BluRay");
        assert!(!parsed.tokens.contains("1080p"));
        assert!(!parsed.tokens.contains("bluray"));
        assert!(parsed.tokens.contains("interstellar") || parsed.tokens.iter().any(|t| t.contains("interstell")));
    }

    #[test]
    fn dedupe_key_buckets_size() {
        let parsed = parse_title("Movie.2020.1080p");
        let key_a = title_dedupe_key(&parsed, 64 * 1024 * 1024);
        let key_b = title_dedupe_key(&parsed, 64 * 1024 * 1024 + 100);
        assert_eq!(key_a, key_b);
    }

    #[test]
    fn coverage_is_full_for_identical_tokens() {
        let a = parse_title("Ubuntu 22.04 Desktop");
        let b = parse_title("Ubuntu 22.04 Desktop");
        assert_eq!(token_coverage(&a.tokens, &b.tokens), 1.0);
    }
}
