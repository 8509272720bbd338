//! Quality, source-type, HDR/audio and content-type extraction.

use once_cell::sync::Lazy;
use regex::Regex;

static RESOLUTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(2160p|4320p|1440p|1080p|720p|480p)").unwrap());
static CODEC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(hevc|h\.?265|x265|av1|h\.?264|x264)").unwrap());
static SOURCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(remux|bluray|blu-ray|web-?dl|webrip|hdtv|dvdrip|bdrip|brrip|hdcam|camrip|\bcam\b|telesync|\bts\b)").unwrap()
});
static AUDIO_CHANNELS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(7\.1|5\.1|2\.0)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Movie,
    Series,
    Anime,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Movie => "movie",
            ContentType::Series => "series",
            ContentType::Anime => "anime",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QualityInfo {
    pub resolution: Option<String>,
    pub codec: Option<String>,
    pub source_type: Option<String>,
    pub hdr: bool,
    pub dolby_vision: bool,
    pub audio_channels: Option<String>,
}

impl QualityInfo {
    /// `resolution + source + codec` concatenated when detected.
    pub fn quality_string(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.resolution, &self.source_type, &self.codec]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    /// Resolution bucket score: 2160p->8, 1440p->7, 1080p->6, 720p->4,
    /// 480p->2, else 0.
    pub fn resolution_score(&self) -> f64 {
        match self.resolution.as_deref() {
            Some("2160p") | Some("4320p") => 8.0,
            Some("1440p") => 7.0,
            Some("1080p") => 6.0,
            Some("720p") => 4.0,
            Some("480p") => 2.0,
            _ => 0.0,
        }
    }

    pub fn codec_bonus(&self) -> f64 {
        match self.codec.as_deref() {
            Some("hevc") | Some("av1") => 1.0,
            _ => 0.0,
        }
    }

    pub fn cam_penalty(&self) -> f64 {
        match self.source_type.as_deref() {
            Some("cam") => -3.0,
            _ => 0.0,
        }
    }

    /// Remux 10, BluRay 9, WEB-DL 8, HDTV 5, DVDRip 4, CAM 0, unknown 2.
    pub fn source_type_score(&self) -> f64 {
        match self.source_type.as_deref() {
            Some("remux") => 10.0,
            Some("bluray") => 9.0,
            Some("webdl") => 8.0,
            Some("webrip") => 7.0,
            Some("hdtv") => 5.0,
            Some("dvdrip") | Some("bdrip") | Some("brrip") => 4.0,
            Some("hdcam") | Some("camrip") | Some("cam") | Some("telesync") | Some("ts") => 0.0,
            Some(_) => 2.0,
            None => 2.0,
        }
    }

    pub fn audio_channel_bonus(&self) -> f64 {
        match self.audio_channels.as_deref() {
            Some("7.1") => 1.5,
            Some("5.1") => 1.0,
            _ => 0.0,
        }
    }
}

fn normalize_source(raw: &str) -> &'static str {
    let lower = raw.to_lowercase();
    if lower.contains("remux") {
        "remux"
    } else if lower.contains("blu") {
        "bluray"
    } else if lower.contains("web") && lower.contains("rip") {
        "webrip"
    } else if lower.contains("web") {
        "webdl"
    } else if lower.contains("hdtv") {
        "hdtv"
    } else if lower.contains("dvd") {
        "dvdrip"
    } else if lower.contains("bdrip") {
        "bdrip"
    } else if lower.contains("brrip") {
        "brrip"
    } else if lower.contains("hdcam") {
        "hdcam"
    } else if lower.contains("camrip") || lower == "cam" {
        "cam"
    } else if lower.contains("telesync") || lower == "ts" {
        "telesync"
    } else {
        "unknown"
    }
}

fn normalize_codec(raw: &str) -> &'static str {
    let lower = raw.to_lowercase().replace('.', "");
    if lower.contains("hevc") || lower.contains("265") {
        "hevc"
    } else if lower.contains("av1") {
        "av1"
    } else {
        "h264"
    }
}

pub fn parse_quality(title: &str) -> QualityInfo {
    let resolution = RESOLUTION_RE
        .find(title)
        .map(|m| m.as_str().to_lowercase());
    let codec = CODEC_RE.find(title).map(|m| normalize_codec(m.as_str()).to_string());
    let source_type = SOURCE_RE.find(title).map(|m| normalize_source(m.as_str()).to_string());
    let hdr = title.to_lowercase().contains("hdr");
    let dolby_vision = {
        let lower = title.to_lowercase();
        lower.contains("dolby vision") || lower.contains("dovi") || lower.contains(" dv ")
    };
    let audio_channels = AUDIO_CHANNELS_RE.find(title).map(|m| m.as_str().to_string());

    QualityInfo {
        resolution,
        codec,
        source_type,
        hdr,
        dolby_vision,
        audio_channels,
    }
}

/// `series` when season/episode present, `anime` when an anime marker is
/// present, else `movie`.
pub fn classify_content_type(title: &str, has_season_or_episode: bool) -> ContentType {
    let lower = title.to_lowercase();
    if lower.contains("anime") || lower.contains("аниме") {
        ContentType::Anime
    } else if has_season_or_episode || lower.contains("season") || lower.contains("сезон") {
        ContentType::Series
    } else {
        ContentType::Movie
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_release_tags() {
        let q = parse_quality("Movie.2020.1080p.BluRay.x264-GROUP");
        assert_eq!(q.resolution.as_deref(), Some("1080p"));
        assert_eq!(q.source_type.as_deref(), Some("bluray"));
        assert_eq!(q.codec.as_deref(), Some("h264"));
    }

    #[test]
    fn detects_hdr_and_channels() {
        let q = parse_quality("Movie.2020.2160p.HDR.WEB-DL.DDP5.1");
        assert!(q.hdr);
        assert_eq!(q.audio_channels.as_deref(), Some("5.1"));
        assert_eq!(q.resolution_score(), 8.0);
    }

    #[test]
    fn cam_scores_low() {
        let q = parse_quality("Movie.2020.CAMRip");
        assert_eq!(q.source_type_score(), 0.0);
    }

    #[test]
    fn classifies_content_type() {
        assert_eq!(classify_content_type("Show S01E02", true), ContentType::Series);
        assert_eq!(classify_content_type("Anime Title", false), ContentType::Anime);
        assert_eq!(classify_content_type("Movie 2020", false), ContentType::Movie);
    }
}
