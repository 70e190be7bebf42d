//! Per-request orchestration: metadata -> candidate selection -> sequential retrieval ->
//! normalization.
//!
//! Candidates are tried one at a time, in selection order, stopping at the first document.
//! A retriever error only ends the request when it happens on the last candidate.

use crate::normalize::{clip_chars, normalize_with, NormalizeOptions};
use crate::select::{resolve, select_candidates_with, Candidate, SelectionPolicy};
use crate::{
    Error, LanguageAvailability, MetadataSource, Result, SelectionRequest, SubtitleFormat,
    SubtitleSource, TrackKind,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptRequest {
    pub url: String,
    /// Preferred language code; `None` lets the detected/available languages decide.
    pub language: Option<String>,
    /// Clip the normalized text to this many chars.
    pub max_chars: Option<usize>,
    /// Collapse consecutive duplicate caption lines.
    pub dedupe: bool,
}

impl TranscriptRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Found,
    NotFound,
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub language: String,
    pub manual: bool,
    pub auto: bool,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

impl Attempt {
    fn new(cand: &Candidate, outcome: AttemptOutcome) -> Self {
        Self {
            language: cand.code.clone(),
            manual: cand.manual,
            auto: cand.auto,
            outcome,
        }
    }
}

/// Terminal artifact of one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub title: Option<String>,
    pub used_language: String,
    pub content: String,
    pub format: SubtitleFormat,
    pub kind: TrackKind,
    pub filename: Option<String>,
    pub truncated: bool,
    pub requested: Option<String>,
    /// `None` when no language was requested.
    pub requested_available: Option<bool>,
    pub availability: LanguageAvailability,
    pub attempts: Vec<Attempt>,
}

/// Only absolute `http`/`https` URLs are handed to a collaborator.
pub fn validate_url(raw: &str) -> Result<()> {
    let u = url::Url::parse(raw.trim()).map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))?;
    match u.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::InvalidUrl(format!("unsupported scheme: {other}"))),
    }
}

fn retrieval_message(e: Error) -> String {
    match e {
        Error::RetrievalFailure { message, .. } => message,
        other => other.to_string(),
    }
}

/// Availability snapshot plus the ordered candidates, without retrieving anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguagePlan {
    pub title: Option<String>,
    pub requested: Option<String>,
    pub requested_available: Option<bool>,
    pub availability: LanguageAvailability,
    pub candidates: Vec<Candidate>,
}

pub async fn plan_languages(
    meta: &dyn MetadataSource,
    url: &str,
    requested: Option<&str>,
    policy: &SelectionPolicy,
) -> Result<LanguagePlan> {
    validate_url(url)?;
    let md = meta.fetch_metadata(url.trim()).await?;
    let sel = SelectionRequest::new(requested, md.availability);
    let candidates = sel.candidates(policy);
    let requested_available = sel.requested_available();
    Ok(LanguagePlan {
        title: md.title,
        requested: sel.requested,
        requested_available,
        availability: sel.availability,
        candidates,
    })
}

pub async fn fetch_transcript(
    meta: &dyn MetadataSource,
    subs: &dyn SubtitleSource,
    req: &TranscriptRequest,
    policy: &SelectionPolicy,
) -> Result<Transcript> {
    validate_url(&req.url)?;
    let url = req.url.trim();

    let md = meta.fetch_metadata(url).await?;
    let av = md.availability;
    if av.is_empty() {
        tracing::info!(url, source = meta.name(), "no subtitle tracks exposed");
        return Err(Error::NoSubtitlesAvailable);
    }

    let requested = req
        .language
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let requested_available = requested.map(|r| resolve(r, &av).is_some());
    let unavailable = |av: &LanguageAvailability| Error::RequestedLanguageUnavailable {
        requested: requested.map(str::to_string),
        available: av.all(),
    };

    let cands = select_candidates_with(requested, &av, policy);
    if cands.is_empty() {
        return Err(unavailable(&av));
    }

    let mut attempts = Vec::with_capacity(cands.len());
    let last = cands.len() - 1;
    for (i, cand) in cands.iter().enumerate() {
        match subs.fetch_subtitle(url, cand).await {
            Ok(Some(doc)) => {
                tracing::info!(
                    language = cand.code.as_str(),
                    format = doc.format.extension(),
                    bytes = doc.raw.len(),
                    "subtitle retrieved"
                );
                attempts.push(Attempt::new(cand, AttemptOutcome::Found));
                let opts = NormalizeOptions { dedupe: req.dedupe };
                let text = normalize_with(&doc.raw, doc.format, &opts);
                let (content, truncated) = match req.max_chars {
                    Some(n) => clip_chars(&text, n),
                    None => (text, false),
                };
                return Ok(Transcript {
                    title: md.title,
                    used_language: cand.code.clone(),
                    content,
                    format: doc.format,
                    kind: doc.kind,
                    filename: doc.filename,
                    truncated,
                    requested: requested.map(str::to_string),
                    requested_available,
                    availability: av,
                    attempts,
                });
            }
            Ok(None) => {
                tracing::debug!(language = cand.code.as_str(), "subtitle not found");
                attempts.push(Attempt::new(cand, AttemptOutcome::NotFound));
            }
            Err(e) => {
                let message = retrieval_message(e);
                tracing::warn!(
                    language = cand.code.as_str(),
                    source = subs.name(),
                    error = message.as_str(),
                    "subtitle retrieval failed"
                );
                attempts.push(Attempt::new(
                    cand,
                    AttemptOutcome::Failed {
                        message: message.clone(),
                    },
                ));
                if i == last {
                    return Err(Error::RetrievalFailure {
                        language: cand.code.clone(),
                        message,
                        requested: requested.map(str::to_string),
                        available: av.all(),
                    });
                }
            }
        }
    }

    Err(unavailable(&av))
}
