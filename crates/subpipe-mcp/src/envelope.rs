use serde::Serialize;
use subpipe_core::Error as CoreError;

pub(crate) const SCHEMA_VERSION: u64 = 1;

pub(crate) fn warning_hint(code: &'static str) -> Option<&'static str> {
    match code {
        "requested_language_unavailable_fell_back" => Some(
            "The requested language has no subtitle track, so another available language was used. Pass strict=true to get an error instead.",
        ),
        "transcript_truncated" => Some(
            "The transcript was clipped to max_chars. Raise max_chars (or SUBPIPE_MAX_CHARS on the server) for the full text.",
        ),
        "candidate_retrieval_failed" => Some(
            "yt-dlp failed on at least one earlier candidate language before a later one succeeded; see attempts.",
        ),
        "empty_transcript" => Some(
            "The subtitle track contained no text once timings and markup were removed.",
        ),
        _ => None,
    }
}

pub(crate) fn warning_hints_from(codes: &[&'static str]) -> serde_json::Value {
    let mut m = serde_json::Map::new();
    for c in codes {
        if let Some(h) = warning_hint(c) {
            m.insert((*c).to_string(), serde_json::json!(h));
        }
    }
    serde_json::Value::Object(m)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ErrorCode {
    InvalidParams,
    InvalidUrl,
    NotConfigured,
    SourceUnavailable,
    NoSubtitlesAvailable,
    RequestedLanguageUnavailable,
    RetrievalFailure,
    UnexpectedError,
}

impl ErrorCode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParams => "invalid_params",
            Self::InvalidUrl => "invalid_url",
            Self::NotConfigured => "not_configured",
            Self::SourceUnavailable => "source_unavailable",
            Self::NoSubtitlesAvailable => "no_subtitles_available",
            Self::RequestedLanguageUnavailable => "requested_language_unavailable",
            Self::RetrievalFailure => "retrieval_failure",
            Self::UnexpectedError => "unexpected_error",
        }
    }

    pub(crate) fn retryable(self) -> bool {
        match self {
            Self::SourceUnavailable | Self::RetrievalFailure => true,
            // Configuration + invalid input are not retryable without changing something.
            Self::NotConfigured
            | Self::InvalidParams
            | Self::InvalidUrl
            | Self::NoSubtitlesAvailable
            | Self::RequestedLanguageUnavailable
            | Self::UnexpectedError => false,
        }
    }

    pub(crate) fn from_core(e: &CoreError) -> Self {
        match e {
            CoreError::InvalidUrl(_) => Self::InvalidUrl,
            CoreError::SourceUnavailable(_) => Self::SourceUnavailable,
            CoreError::NoSubtitlesAvailable => Self::NoSubtitlesAvailable,
            CoreError::RequestedLanguageUnavailable { .. } => Self::RequestedLanguageUnavailable,
            CoreError::RetrievalFailure { .. } => Self::RetrievalFailure,
            CoreError::NotConfigured(_) => Self::NotConfigured,
        }
    }

    pub(crate) fn hint(self) -> &'static str {
        match self {
            Self::InvalidParams => "Check the request parameters (url is required).",
            Self::InvalidUrl => "Pass an absolute http(s) URL to the media page.",
            Self::NotConfigured => "Install yt-dlp or set SUBPIPE_YTDLP_BIN to its path.",
            Self::SourceUnavailable => {
                "The metadata lookup failed (network, private/removed media, or an unsupported site). Retry later, or try the URL with yt-dlp directly."
            }
            Self::NoSubtitlesAvailable => {
                "This media exposes no subtitle or auto-caption tracks."
            }
            Self::RequestedLanguageUnavailable => {
                "Pick one of the `available` codes, or drop strict to allow fallback languages."
            }
            Self::RetrievalFailure => {
                "yt-dlp failed while downloading the subtitle track (see error.message). Retry, pick another code from `available`, or update yt-dlp."
            }
            Self::UnexpectedError => "Unexpected internal error.",
        }
    }
}

pub(crate) fn add_envelope_fields(payload: &mut serde_json::Value, kind: &str, elapsed_ms: u128) {
    payload["schema_version"] = serde_json::json!(SCHEMA_VERSION);
    payload["kind"] = serde_json::json!(kind);
    payload["elapsed_ms"] = serde_json::json!(elapsed_ms);
    // Keep ubiquitous keys present (null when unused) so clients never branch on "missing".
    if payload.get("attempts").is_none() {
        payload["attempts"] = serde_json::Value::Null;
    }
    if payload.get("request").is_none() {
        payload["request"] = serde_json::Value::Null;
    }
}

pub(crate) fn error_obj(
    code: ErrorCode,
    message: impl ToString,
    hint: impl ToString,
) -> serde_json::Value {
    #[derive(Serialize)]
    struct ErrorObject {
        code: &'static str,
        message: String,
        hint: String,
        retryable: bool,
    }

    let e = ErrorObject {
        code: code.as_str(),
        message: message.to_string(),
        hint: hint.to_string(),
        retryable: code.retryable(),
    };
    match serde_json::to_value(e) {
        Ok(v) => v,
        Err(_) => serde_json::json!({
            "code": code.as_str(),
            "message": message.to_string(),
            "hint": hint.to_string(),
            "retryable": code.retryable()
        }),
    }
}

/// `{ok:false, error}` for a core failure. Terminal language failures also list `requested` and
/// `available` so the caller can retry with an explicit code.
pub(crate) fn core_error_payload(e: &CoreError) -> serde_json::Value {
    let code = ErrorCode::from_core(e);
    let mut payload = serde_json::json!({
        "ok": false,
        "error": error_obj(code, e, code.hint()),
    });
    match e {
        CoreError::RequestedLanguageUnavailable {
            requested,
            available,
        }
        | CoreError::RetrievalFailure {
            requested,
            available,
            ..
        } => {
            payload["requested"] = serde_json::json!(requested);
            payload["available"] = serde_json::json!(available);
        }
        _ => {}
    }
    payload
}
