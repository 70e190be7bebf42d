//! Request handling shared by the CLI, the HTTP endpoint, and the MCP tools.
//!
//! Each operation returns a complete JSON envelope; on failure the [`ErrorCode`] rides along so a
//! surface can pick its own status (exit code, HTTP status).

use crate::envelope::{
    add_envelope_fields, core_error_payload, error_obj, warning_hints_from, ErrorCode,
};
use std::path::Path;
use std::time::Instant;
use subpipe_core::{
    fetch_transcript, normalize_with, plan_languages, AttemptOutcome, NormalizeOptions,
    SubtitleFormat, Transcript,
};
use subpipe_local::LocalSetup;

#[derive(Debug)]
pub(crate) struct Failure {
    pub(crate) code: ErrorCode,
    pub(crate) payload: serde_json::Value,
}

pub(crate) type Reply = std::result::Result<serde_json::Value, Failure>;

#[derive(Debug, Clone, Default)]
pub(crate) struct SubsParams {
    pub(crate) url: String,
    pub(crate) lang: Option<String>,
    pub(crate) strict: bool,
    pub(crate) dedupe: Option<bool>,
    pub(crate) max_chars: Option<usize>,
}

fn fail(
    kind: &str,
    code: ErrorCode,
    mut payload: serde_json::Value,
    request: serde_json::Value,
    t0: Instant,
) -> Failure {
    payload["request"] = request;
    add_envelope_fields(&mut payload, kind, t0.elapsed().as_millis());
    Failure { code, payload }
}

fn invalid_params(kind: &str, message: &str, request: serde_json::Value, t0: Instant) -> Failure {
    let code = ErrorCode::InvalidParams;
    let payload = serde_json::json!({
        "ok": false,
        "error": error_obj(code, message, code.hint()),
    });
    fail(kind, code, payload, request, t0)
}

pub(crate) fn transcript_warnings(t: &Transcript) -> Vec<&'static str> {
    let mut w = Vec::new();
    if t.requested.is_some() && t.requested_available == Some(false) {
        w.push("requested_language_unavailable_fell_back");
    }
    if t.truncated {
        w.push("transcript_truncated");
    }
    if t
        .attempts
        .iter()
        .any(|a| matches!(a.outcome, AttemptOutcome::Failed { .. }))
    {
        w.push("candidate_retrieval_failed");
    }
    if t.content.is_empty() {
        w.push("empty_transcript");
    }
    w
}

pub(crate) async fn subtitle_text(setup: &LocalSetup, p: SubsParams) -> Reply {
    const KIND: &str = "subtitle_text";
    let t0 = Instant::now();
    let req = setup.request(&p.url, p.lang.clone(), p.max_chars, p.dedupe);
    let request = serde_json::json!({
        "url": p.url,
        "lang": req.language,
        "strict": p.strict,
        "dedupe": req.dedupe,
        "max_chars": req.max_chars,
    });
    if p.url.trim().is_empty() {
        return Err(invalid_params(KIND, "url must be non-empty", request, t0));
    }

    let policy = setup.policy(p.strict);
    match fetch_transcript(&setup.ytdlp, &setup.ytdlp, &req, &policy).await {
        Ok(t) => {
            let warnings = transcript_warnings(&t);
            let mut payload = serde_json::json!({
                "ok": true,
                "url": req.url.trim(),
                "title": t.title,
                "filename": t.filename,
                "used_language": t.used_language,
                "requested": t.requested,
                "requested_available": t.requested_available,
                "format": t.format,
                "track_kind": t.kind,
                "truncated": t.truncated,
                "chars": t.content.chars().count(),
                "content": t.content,
                "availability": t.availability,
                "attempts": t.attempts,
                "warnings": warnings,
                "warning_hints": warning_hints_from(&warnings),
                "request": request,
            });
            add_envelope_fields(&mut payload, KIND, t0.elapsed().as_millis());
            Ok(payload)
        }
        Err(e) => {
            tracing::info!(code = e.code(), error = %e, "subtitle request failed");
            Err(fail(
                KIND,
                ErrorCode::from_core(&e),
                core_error_payload(&e),
                request,
                t0,
            ))
        }
    }
}

pub(crate) async fn subtitle_languages(
    setup: &LocalSetup,
    url: &str,
    lang: Option<String>,
    strict: bool,
) -> Reply {
    const KIND: &str = "subtitle_languages";
    let t0 = Instant::now();
    let lang = lang
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .or_else(|| setup.default_lang.clone());
    let request = serde_json::json!({ "url": url, "lang": lang, "strict": strict });
    if url.trim().is_empty() {
        return Err(invalid_params(KIND, "url must be non-empty", request, t0));
    }
    let policy = setup.policy(strict);
    match plan_languages(&setup.ytdlp, url, lang.as_deref(), &policy).await {
        Ok(plan) => {
            let mut payload = serde_json::json!({
                "ok": true,
                "url": url.trim(),
                "title": plan.title,
                "requested": plan.requested,
                "requested_available": plan.requested_available,
                "available": plan.availability.all(),
                "availability": plan.availability,
                "candidates": plan.candidates,
                "request": request,
            });
            add_envelope_fields(&mut payload, KIND, t0.elapsed().as_millis());
            Ok(payload)
        }
        Err(e) => Err(fail(
            KIND,
            ErrorCode::from_core(&e),
            core_error_payload(&e),
            request,
            t0,
        )),
    }
}

/// Normalize a local subtitle file. The format comes from `format` or the file extension.
pub(crate) fn normalize_file(path: &Path, format: Option<SubtitleFormat>, dedupe: bool) -> Reply {
    const KIND: &str = "normalize";
    let t0 = Instant::now();
    let request = serde_json::json!({
        "path": path.to_string_lossy(),
        "format": format,
        "dedupe": dedupe,
    });
    let Some(format) = format.or_else(|| {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(SubtitleFormat::from_extension)
    }) else {
        return Err(invalid_params(
            KIND,
            "cannot infer subtitle format from the file extension; pass --format srt|vtt",
            request,
            t0,
        ));
    };
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            return Err(invalid_params(
                KIND,
                &format!("cannot read {}: {e}", path.display()),
                request,
                t0,
            ))
        }
    };
    let raw = String::from_utf8_lossy(&bytes);
    let content = normalize_with(&raw, format, &NormalizeOptions { dedupe });
    let mut payload = serde_json::json!({
        "ok": true,
        "format": format,
        "chars": content.chars().count(),
        "content": content,
        "request": request,
    });
    add_envelope_fields(&mut payload, KIND, t0.elapsed().as_millis());
    Ok(payload)
}
