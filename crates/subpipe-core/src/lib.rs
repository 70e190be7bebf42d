use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub mod normalize;
pub mod select;
pub mod transcript;

pub use normalize::{clip_chars, normalize, normalize_with, NormalizeOptions};
pub use select::{select_candidates, select_candidates_with, Candidate, SelectionPolicy};
pub use transcript::{
    fetch_transcript, plan_languages, validate_url, Attempt, AttemptOutcome, LanguagePlan,
    Transcript, TranscriptRequest,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("no subtitles available")]
    NoSubtitlesAvailable,
    #[error("requested language unavailable (available: {})", .available.join(","))]
    RequestedLanguageUnavailable {
        requested: Option<String>,
        available: Vec<String>,
    },
    /// `requested`/`available` are filled in on the request's terminal failure; a single
    /// retriever call leaves them empty.
    #[error("subtitle retrieval failed for {language}: {message}")]
    RetrievalFailure {
        language: String,
        message: String,
        requested: Option<String>,
        available: Vec<String>,
    },
    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl Error {
    /// Stable machine-readable code (used in JSON envelopes).
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "invalid_url",
            Self::SourceUnavailable(_) => "source_unavailable",
            Self::NoSubtitlesAvailable => "no_subtitles_available",
            Self::RequestedLanguageUnavailable { .. } => "requested_language_unavailable",
            Self::RetrievalFailure { .. } => "retrieval_failure",
            Self::NotConfigured(_) => "not_configured",
        }
    }

    /// A per-candidate retrieval failure, before the orchestrator knows the availability.
    pub fn retrieval(language: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RetrievalFailure {
            language: language.into(),
            message: message.into(),
            requested: None,
            available: Vec::new(),
        }
    }

    pub fn retryable(&self) -> bool {
        match self {
            Self::SourceUnavailable(_) | Self::RetrievalFailure { .. } => true,
            // Retrying the same request yields the same answer; the caller has to change it.
            Self::InvalidUrl(_)
            | Self::NoSubtitlesAvailable
            | Self::RequestedLanguageUnavailable { .. }
            | Self::NotConfigured(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Which subtitle languages a piece of media exposes.
///
/// Immutable snapshot per request. Codes are trimmed and empty codes dropped on construction;
/// a code may be both manual and auto.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageAvailability {
    pub manual: BTreeSet<String>,
    pub auto: BTreeSet<String>,
    /// Spoken language inferred from metadata or title text.
    pub detected: Option<String>,
}

fn clean_codes<I, S>(codes: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    codes
        .into_iter()
        .map(|c| c.as_ref().trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

impl LanguageAvailability {
    pub fn new<I, J, S, T>(manual: I, auto: J, detected: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            manual: clean_codes(manual),
            auto: clean_codes(auto),
            detected: detected
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
        }
    }

    pub fn contains(&self, code: &str) -> bool {
        self.manual.contains(code) || self.auto.contains(code)
    }

    /// manual ∪ auto, lexicographic.
    pub fn all(&self) -> Vec<String> {
        self.manual.union(&self.auto).cloned().collect()
    }

    pub fn total(&self) -> usize {
        self.manual.union(&self.auto).count()
    }

    pub fn is_empty(&self) -> bool {
        self.manual.is_empty() && self.auto.is_empty()
    }
}

/// Input to the selector: an optional requested code against one availability snapshot.
///
/// See [`SelectionRequest::candidates`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionRequest {
    pub requested: Option<String>,
    pub availability: LanguageAvailability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubtitleFormat {
    #[serde(rename = "srt")]
    Srt,
    #[serde(rename = "vtt")]
    WebVtt,
}

impl SubtitleFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "srt" => Some(Self::Srt),
            "vtt" | "webvtt" => Some(Self::WebVtt),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Srt => "srt",
            Self::WebVtt => "vtt",
        }
    }
}

impl std::str::FromStr for SubtitleFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| format!("unknown subtitle format: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Manual,
    Auto,
    /// Both kinds were requested; the retriever did not say which one it wrote.
    Unknown,
}

/// Raw subtitle file content as produced by a [`SubtitleSource`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleDocument {
    pub format: SubtitleFormat,
    pub raw: String,
    pub filename: Option<String>,
    pub kind: TrackKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub title: Option<String>,
    pub availability: LanguageAvailability,
}

#[async_trait::async_trait]
pub trait MetadataSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch_metadata(&self, url: &str) -> Result<MediaMetadata>;
}

#[async_trait::async_trait]
pub trait SubtitleSource: Send + Sync {
    fn name(&self) -> &'static str;
    /// `Ok(None)` means the track does not exist; `Err(_)` means the retriever itself failed.
    async fn fetch_subtitle(&self, url: &str, cand: &Candidate)
        -> Result<Option<SubtitleDocument>>;
}

pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Option<String>;
}
