//! Small language guesser for media titles.
//!
//! Titles written mostly in a script that belongs to one language (kana, Hangul, Cyrillic,
//! Arabic and so on) are decided by script. Latin titles fall back to stopword counts. Not a
//! real classifier: it only has to beat "no signal" on short titles, and must stay
//! deterministic (ties broken by a configured seed, not by hash order).

use crate::config::DetectorConfig;
use subpipe_core::LanguageDetector;

const STOPWORDS: &[(&str, &[&str])] = &[
    (
        "en",
        &[
            "the", "and", "of", "to", "is", "in", "how", "what", "why", "with", "for", "you",
            "this", "that", "my", "your", "are", "was", "from",
        ],
    ),
    (
        "es",
        &[
            "el", "la", "los", "las", "de", "del", "que", "y", "en", "por", "para", "con", "cómo",
            "qué", "una", "un", "es", "mi", "tu",
        ],
    ),
    (
        "fr",
        &[
            "le", "la", "les", "de", "des", "du", "et", "en", "une", "un", "pour", "avec", "comment",
            "est", "dans", "sur", "aux", "au", "pas",
        ],
    ),
    (
        "de",
        &[
            "der", "die", "das", "und", "ist", "ein", "eine", "mit", "für", "wie", "den", "dem",
            "nicht", "auf", "zu", "von", "im",
        ],
    ),
    (
        "pt",
        &[
            "o", "a", "os", "as", "de", "do", "da", "dos", "das", "e", "em", "um", "uma", "para",
            "com", "não", "como", "é", "no", "na",
        ],
    ),
    (
        "it",
        &[
            "il", "lo", "la", "gli", "le", "di", "del", "della", "che", "e", "un", "una", "per",
            "con", "come", "non", "è", "nel", "sono",
        ],
    ),
    (
        "nl",
        &[
            "de", "het", "een", "van", "en", "is", "op", "voor", "met", "niet", "dat", "wat",
            "hoe", "zijn", "je", "naar", "ik",
        ],
    ),
];

/// Unicode blocks that point at one language. Han is shared by ja and zh; kana decides.
const SCRIPTS: &[(&str, &[(char, char)])] = &[
    ("ja", &[('\u{3040}', '\u{30ff}'), ('\u{31f0}', '\u{31ff}')]),
    ("zh", &[('\u{4e00}', '\u{9fff}'), ('\u{3400}', '\u{4dbf}')]),
    (
        "ko",
        &[('\u{ac00}', '\u{d7af}'), ('\u{1100}', '\u{11ff}'), ('\u{3130}', '\u{318f}')],
    ),
    ("ru", &[('\u{0400}', '\u{04ff}')]),
    ("ar", &[('\u{0600}', '\u{06ff}')]),
    ("he", &[('\u{0590}', '\u{05ff}')]),
    ("el", &[('\u{0370}', '\u{03ff}')]),
    ("th", &[('\u{0e00}', '\u{0e7f}')]),
    ("hi", &[('\u{0900}', '\u{097f}')]),
];

/// Fewest script letters that count as a signal.
const MIN_SCRIPT_LETTERS: usize = 2;

/// Language of the dominant non-Latin script, when it covers at least half of the letters.
pub fn script_language(text: &str) -> Option<&'static str> {
    let mut letters = 0usize;
    let mut counts = vec![0usize; SCRIPTS.len()];
    for c in text.chars().filter(|c| c.is_alphabetic()) {
        letters += 1;
        if let Some(i) = SCRIPTS
            .iter()
            .position(|(_, ranges)| ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(&c)))
        {
            counts[i] += 1;
        }
    }
    // Kanji next to any kana is Japanese.
    if counts[0] > 0 {
        counts[0] += counts[1];
        counts[1] = 0;
    }
    let (i, best) = counts
        .iter()
        .enumerate()
        .fold((0, 0), |acc, (i, n)| if *n > acc.1 { (i, *n) } else { acc });
    (best >= MIN_SCRIPT_LETTERS && best * 2 >= letters).then(|| SCRIPTS[i].0)
}

#[derive(Debug, Clone, Default)]
pub struct StopwordDetector {
    cfg: DetectorConfig,
}

impl StopwordDetector {
    pub fn new(cfg: DetectorConfig) -> Self {
        Self { cfg }
    }

    /// Per-language hit counts, in table order.
    pub fn scores(text: &str) -> Vec<(&'static str, usize)> {
        let lower = text.to_lowercase();
        let tokens: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        STOPWORDS
            .iter()
            .map(|(lang, words)| {
                let hits = tokens.iter().filter(|t| words.contains(*t)).count();
                (*lang, hits)
            })
            .collect()
    }
}

impl LanguageDetector for StopwordDetector {
    fn detect(&self, text: &str) -> Option<String> {
        if let Some(lang) = script_language(text) {
            tracing::debug!(lang, "detected title language by script");
            return Some(lang.to_string());
        }
        let scores = Self::scores(text);
        let best = scores.iter().map(|(_, n)| *n).max()?;
        if best == 0 || best < self.cfg.min_hits {
            return None;
        }
        let tied: Vec<&str> = scores
            .iter()
            .filter(|(_, n)| *n == best)
            .map(|(l, _)| *l)
            .collect();
        let pick = tied[(self.cfg.seed % tied.len() as u64) as usize];
        tracing::debug!(lang = pick, hits = best, tied = tied.len(), "detected title language");
        Some(pick.to_string())
    }
}
