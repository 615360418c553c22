// Query language detection
// Script-ratio heuristic: quoted passages are removed, then Arabic-block
// code points are counted against the remaining length.


use std::sync::LazyLock;

use fancy_regex::Regex;
use serde::{Deserialize, Serialize};

/// Fraction of Arabic-block characters above which a query is treated as Urdu
pub const URDU_RATIO_THRESHOLD: f64 = 0.15;

const ARABIC_BLOCK: std::ops::RangeInclusive<char> = '\u{0600}'..='\u{06FF}';

// Straight quotes must close with the same character; typographic quotes with
// their closing counterpart.
static QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)(["'])(.*?)\1|“.*?”|‘.*?’"#).expect("quote pattern is valid")
});

/// Dominant script of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Latin,
    Urdu,
}

impl Language {
    /// Human-readable name used when steering the prompt
    #[inline]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Latin => "English",
            Self::Urdu => "Urdu",
        }
    }

    /// ISO 639-1 style code
    #[inline]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Latin => "en",
            Self::Urdu => "ur",
        }
    }
}

impl std::fmt::Display for Language {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Remove substrings enclosed in matching quotes
#[inline]
pub fn strip_quoted(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut last = 0;

    for found in QUOTED.find_iter(text) {
        // The pattern has no lookaround, so matching cannot hit the backtrack limit
        let Ok(found) = found else { break };
        cleaned.push_str(text.get(last..found.start()).unwrap_or_default());
        last = found.end();
    }
    cleaned.push_str(text.get(last..).unwrap_or_default());

    cleaned
}

/// Share of Arabic-block characters in `text` after quotes are removed
#[inline]
pub fn urdu_ratio(text: &str) -> f64 {
    let cleaned = strip_quoted(text);
    let total = cleaned.chars().count().max(1);
    let urdu = cleaned.chars().filter(|c| ARABIC_BLOCK.contains(c)).count();

    urdu as f64 / total as f64
}

/// Classify the dominant script of a query
#[inline]
pub fn detect_language(text: &str) -> Language {
    if urdu_ratio(text) > URDU_RATIO_THRESHOLD {
        Language::Urdu
    } else {
        Language::Latin
    }
}
