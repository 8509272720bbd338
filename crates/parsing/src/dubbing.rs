//! Dubbing group and type detection against a fixed lexicon.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DubbingType {
    Dub,
    MultiVoice,
    Voiceover,
    Author,
    BackVoice,
    Unknown,
}

impl DubbingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DubbingType::Dub => "dub",
            DubbingType::MultiVoice => "multiVoice",
            DubbingType::Voiceover => "voiceover",
            DubbingType::Author => "author",
            DubbingType::BackVoice => "backVoice",
            DubbingType::Unknown => "unknown",
        }
    }

    /// dub 4, multiVoice 3, voiceover 2, author/backVoice 1, unknown 0.
    pub fn type_bonus(&self) -> f64 {
        match self {
            DubbingType::Dub => 4.0,
            DubbingType::MultiVoice => 3.0,
            DubbingType::Voiceover => 2.0,
            DubbingType::Author | DubbingType::BackVoice => 1.0,
            DubbingType::Unknown => 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DubbingInfo {
    pub group: Option<String>,
    pub groups: Vec<String>,
    pub dubbing_type: Option<DubbingType>,
}

impl DubbingInfo {
    /// known group +5, professional group +2, plus the detected type's
    /// bonus.
    pub fn score(&self) -> f64 {
        let mut score = 0.0;
        if self.group.is_some() {
            score += 5.0;
            if self.group.as_deref().map(is_professional).unwrap_or(false) {
                score += 2.0;
            }
        }
        if let Some(t) = self.dubbing_type {
            score += t.type_bonus();
        }
        score
    }
}

/// Canonical group aliases. Professional (studio) groups get the
/// professional bonus; fan/community groups do not.
const PROFESSIONAL_GROUPS: &[&str] = &["lostfilm", "newstudio", "kubik in cube", "jaskier"];

const GROUP_ALIASES: &[(&str, &str)] = &[
    ("lostfilm", "LostFilm"),
    ("lost film", "LostFilm"),
    ("newstudio", "NewStudio"),
    ("new studio", "NewStudio"),
    ("кураж-бамбей", "Кураж-Бамбей"),
    ("куражбамбей", "Кураж-Бамбей"),
    ("пучков", "Пучков"),
    ("гоблин", "Пучков"),
    ("jaskier", "Jaskier"),
    ("kubik in cube", "Kubik In Cube"),
    ("coldfilm", "ColdFilm"),
    ("ambiguous", "Ambiguous"),
    ("alexfilm", "AlexFilm"),
    ("baibako", "Baibako"),
];

fn is_professional(group: &str) -> bool {
    PROFESSIONAL_GROUPS.contains(&group.to_lowercase().as_str())
}

static TYPE_PATTERNS: Lazy<Vec<(Regex, DubbingType)>> = Lazy::new(|| {
    vec![
        (Regex::new(r"дубляж").unwrap(), DubbingType::Dub),
        (Regex::new(r"двух[- ]?голос|многоголос").unwrap(), DubbingType::MultiVoice),
        (Regex::new(r"одноголос|авторск").unwrap(), DubbingType::Author),
        (Regex::new(r"закадров").unwrap(), DubbingType::BackVoice),
        (Regex::new(r"озвуч").unwrap(), DubbingType::Voiceover),
        (Regex::new(r"(?i)\bdub(bed)?\b").unwrap(), DubbingType::Dub),
    ]
});

/// Scans `title` (optionally concatenated with a description) against the
/// group lexicon and type patterns. A known group with no explicit type
/// defaults to `dub` for professional studios, `voiceover` otherwise.
pub fn detect_dubbing(title: &str, description: Option<&str>) -> Option<DubbingInfo> {
    let combined = match description {
        Some(d) => format!("{} {}", title, d),
        None => title.to_string(),
    };
    let lower = combined.to_lowercase();

    let mut groups: Vec<String> = Vec::new();
    for (needle, canonical) in GROUP_ALIASES {
        if lower.contains(needle) && !groups.contains(&canonical.to_string()) {
            groups.push(canonical.to_string());
        }
    }

    let detected_type = TYPE_PATTERNS
        .iter()
        .find(|(re, _)| re.is_match(&lower))
        .map(|(_, t)| *t);

    if groups.is_empty() && detected_type.is_none() {
        return None;
    }

    let primary_group = groups.first().cloned();
    let dubbing_type = detected_type.or_else(|| {
        primary_group.as_deref().map(|g| {
            if is_professional(g) {
                DubbingType::Dub
            } else {
                DubbingType::Voiceover
            }
        })
    });

    Some(DubbingInfo {
        group: primary_group,
        groups,
        dubbing_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_professional_group_defaults_to_dub() {
        let info = detect_dubbing("Show.S01E01.LostFilm", None).unwrap();
        assert_eq!(info.group.as_deref(), Some("LostFilm"));
        assert_eq!(info.dubbing_type, Some(DubbingType::Dub));
        assert!(info.score() > 5.0);
    }

    #[test]
    fn detects_explicit_multivoice_pattern() {
        let info = detect_dubbing("Фильм многоголосый перевод", None).unwrap();
        assert_eq!(info.dubbing_type, Some(DubbingType::MultiVoice));
    }

    #[test]
    fn no_dubbing_signal_returns_none() {
        assert!(detect_dubbing("Ubuntu 22.04 Desktop ISO", None).is_none());
    }

    #[test]
    fn unknown_group_without_professional_status_defaults_voiceover() {
        let info = detect_dubbing("Show.S01.Baibako", None).unwrap();
        assert_eq!(info.dubbing_type, Some(DubbingType::Voiceover));
    }
}
