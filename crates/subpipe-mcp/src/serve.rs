//! HTTP surface: `POST /download_subs`, `GET /healthz`.

use crate::envelope::ErrorCode;
use crate::ops::{self, SubsParams};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use subpipe_local::LocalSetup;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DownloadSubsBody {
    #[serde(default)]
    url: Option<String>,
    #[serde(default, alias = "language")]
    lang: Option<String>,
    #[serde(default)]
    strict: Option<bool>,
    #[serde(default)]
    dedupe: Option<bool>,
    #[serde(default)]
    max_chars: Option<usize>,
}

pub(crate) fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidParams | ErrorCode::InvalidUrl => StatusCode::BAD_REQUEST,
        ErrorCode::NoSubtitlesAvailable | ErrorCode::RequestedLanguageUnavailable => {
            StatusCode::NOT_FOUND
        }
        ErrorCode::SourceUnavailable | ErrorCode::RetrievalFailure => StatusCode::BAD_GATEWAY,
        ErrorCode::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::UnexpectedError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reply(r: ops::Reply) -> Response {
    match r {
        Ok(v) => (StatusCode::OK, Json(v)).into_response(),
        Err(f) => (status_for(f.code), Json(f.payload)).into_response(),
    }
}

async fn download_subs(
    State(setup): State<Arc<LocalSetup>>,
    body: Result<Json<DownloadSubsBody>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(b)) => b,
        Err(rej) => {
            let code = ErrorCode::InvalidParams;
            let mut payload = serde_json::json!({
                "ok": false,
                "error": crate::envelope::error_obj(code, rej.body_text(), "Send a JSON body like {\"url\": \"https://...\", \"lang\": \"en\"}."),
            });
            crate::envelope::add_envelope_fields(&mut payload, "subtitle_text", 0);
            return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
        }
    };
    let params = SubsParams {
        url: body.url.unwrap_or_default(),
        lang: body.lang,
        strict: body.strict.unwrap_or(false),
        dedupe: body.dedupe,
        max_chars: body.max_chars,
    };
    tracing::debug!(url = %params.url, lang = ?params.lang, "download_subs");
    reply(ops::subtitle_text(&setup, params).await)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ok": true,
        "name": "subpipe",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub(crate) fn router(setup: Arc<LocalSetup>) -> Router {
    Router::new()
        .route("/download_subs", post(download_subs))
        .route("/healthz", get(healthz))
        .with_state(setup)
}

pub(crate) async fn serve_http(bind: SocketAddr, setup: LocalSetup) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(Arc::new(setup)))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use subpipe_local::{YtDlp, YtDlpConfig};

    fn setup(bin: &str) -> LocalSetup {
        LocalSetup {
            ytdlp: YtDlp::new(YtDlpConfig {
                bin: bin.to_string(),
                timeout: Duration::from_secs(10),
                ..YtDlpConfig::default()
            }),
            policy: Default::default(),
            max_chars: 10_000,
            default_lang: None,
            dedupe: false,
        }
    }

    async fn spawn(setup: LocalSetup) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(Arc::new(setup))).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn status_mapping() {
        assert_eq!(status_for(ErrorCode::InvalidUrl), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(ErrorCode::RequestedLanguageUnavailable),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(ErrorCode::NoSubtitlesAvailable),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(ErrorCode::RetrievalFailure),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn healthz_and_bad_bodies() {
        let base = spawn(setup("/nonexistent/yt-dlp")).await;
        let http = reqwest::Client::new();

        let r = http.get(format!("{base}/healthz")).send().await.unwrap();
        assert_eq!(r.status(), 200);

        let r = http
            .post(format!("{base}/download_subs"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(r.status(), 400);
        let v: serde_json::Value = r.json().await.unwrap();
        assert_eq!(v["error"]["code"], "invalid_params");

        let r = http
            .post(format!("{base}/download_subs"))
            .json(&serde_json::json!({"url": "notaurl"}))
            .send()
            .await
            .unwrap();
        assert_eq!(r.status(), 400);
        let v: serde_json::Value = r.json().await.unwrap();
        assert_eq!(v["error"]["code"], "invalid_url");
    }

    #[tokio::test]
    async fn missing_ytdlp_is_service_unavailable() {
        let base = spawn(setup("/nonexistent/yt-dlp")).await;
        let r = reqwest::Client::new()
            .post(format!("{base}/download_subs"))
            .json(&serde_json::json!({"url": "https://example.com/v"}))
            .send()
            .await
            .unwrap();
        assert_eq!(r.status(), 503);
        let v: serde_json::Value = r.json().await.unwrap();
        assert_eq!(v["error"]["code"], "not_configured");
        assert_eq!(v["error"]["retryable"], false);
    }

    #[cfg(unix)]
    mod fake_ytdlp {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        const SCRIPT: &str = r#"#!/bin/sh
json=0; out=""; langs=""; prev=""
for a in "$@"; do
  case "$prev" in
    -o) out="$a" ;;
    --sub-langs) langs="$a" ;;
  esac
  [ "$a" = "-J" ] && json=1
  prev="$a"
done
if [ "$json" = 1 ]; then
  echo '{"id":"v1","title":"Fixture","subtitles":{},"automatic_captions":{"de":[],"fr":[]}}'
  exit 0
fi
dir=$(dirname "$out")
if [ "$langs" = "fr" ]; then
  printf 'WEBVTT\n\n00:00:00.000 --> 00:00:01.000\nbonjour\n' > "$dir/v1.fr.vtt"
fi
exit 0
"#;

        fn install(dir: &std::path::Path) -> String {
            let p = dir.join("yt-dlp");
            std::fs::write(&p, SCRIPT).unwrap();
            std::fs::set_permissions(&p, std::fs::Permissions::from_mode(0o755)).unwrap();
            p.to_string_lossy().to_string()
        }

        #[tokio::test]
        async fn download_subs_status_codes() {
            let tmp = tempfile::tempdir().unwrap();
            let base = spawn(setup(&install(tmp.path()))).await;
            let http = reqwest::Client::new();
            let url = format!("{base}/download_subs");

            // Unavailable request falls back: de is empty, fr has text.
            let r = http
                .post(&url)
                .json(&serde_json::json!({"url": "https://example.com/v", "lang": "ja"}))
                .send()
                .await
                .unwrap();
            assert_eq!(r.status(), 200);
            let v: serde_json::Value = r.json().await.unwrap();
            assert_eq!(v["used_language"], "fr");
            assert_eq!(v["content"], "bonjour");
            assert_eq!(v["filename"], "v1.fr.vtt");
            assert_eq!(v["title"], "Fixture");
            assert!(v["warnings"]
                .as_array()
                .unwrap()
                .contains(&serde_json::json!("requested_language_unavailable_fell_back")));

            // Strict: 404 with the available list.
            let r = http
                .post(&url)
                .json(&serde_json::json!({"url": "https://example.com/v", "lang": "ja", "strict": true}))
                .send()
                .await
                .unwrap();
            assert_eq!(r.status(), 404);
            let v: serde_json::Value = r.json().await.unwrap();
            assert_eq!(v["error"]["code"], "requested_language_unavailable");
            assert_eq!(v["available"], serde_json::json!(["de", "fr"]));
        }

        #[tokio::test]
        async fn language_is_accepted_as_an_alias_for_lang() {
            let tmp = tempfile::tempdir().unwrap();
            let base = spawn(setup(&install(tmp.path()))).await;
            let r = reqwest::Client::new()
                .post(format!("{base}/download_subs"))
                .json(&serde_json::json!({"url": "https://example.com/v", "language": "fr", "strict": true}))
                .send()
                .await
                .unwrap();
            assert_eq!(r.status(), 200);
            let v: serde_json::Value = r.json().await.unwrap();
            assert_eq!(v["used_language"], "fr");
            assert_eq!(v["requested"], "fr");
            assert_eq!(v["request"]["lang"], "fr");
            assert_eq!(v["content"], "bonjour");
        }
    }
}
