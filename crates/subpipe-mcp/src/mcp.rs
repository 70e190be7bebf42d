//! MCP stdio server: `subtitle_text`, `subtitle_languages`, `subpipe_meta`.

use crate::envelope::add_envelope_fields;
use crate::ops::{self, SubsParams};
use rmcp::{
    handler::server::router::tool::ToolRouter as RmcpToolRouter,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use subpipe_local::LocalSetup;

fn tool_result(payload: serde_json::Value) -> CallToolResult {
    // Structured content for machine consumers, plus a text copy for clients that only read
    // `content[0].text`.
    let mut r = CallToolResult::structured(payload.clone());
    r.content = vec![Content::text(payload.to_string())];
    r
}

fn reply_result(r: ops::Reply) -> CallToolResult {
    match r {
        Ok(v) => tool_result(v),
        Err(f) => tool_result(f.payload),
    }
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub(crate) struct SubtitleTextArgs {
    /// Media page URL (required).
    #[serde(default)]
    url: Option<String>,
    /// Preferred subtitle language code (e.g. "en", "es", "pt-BR").
    #[serde(default)]
    lang: Option<String>,
    /// If true, never fall back to a language other than the detected/requested one.
    #[serde(default)]
    strict: Option<bool>,
    /// Drop consecutive duplicate caption lines (rolling auto-captions).
    #[serde(default)]
    dedupe: Option<bool>,
    /// Max chars of transcript text (default: SUBPIPE_MAX_CHARS).
    #[serde(default)]
    max_chars: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub(crate) struct SubtitleLanguagesArgs {
    /// Media page URL (required).
    #[serde(default)]
    url: Option<String>,
    /// Preferred language code, to preview candidate order.
    #[serde(default)]
    lang: Option<String>,
    #[serde(default)]
    strict: Option<bool>,
}

#[derive(Clone)]
pub(crate) struct SubpipeMcp {
    tool_router: RmcpToolRouter<Self>,
    setup: Arc<LocalSetup>,
}

#[tool_router]
impl SubpipeMcp {
    pub(crate) fn new(setup: LocalSetup) -> Self {
        Self {
            tool_router: Self::tool_router(),
            setup: Arc::new(setup),
        }
    }

    #[tool(description = "Report subpipe configuration + version (no secrets)")]
    async fn subpipe_meta(&self) -> Result<CallToolResult, McpError> {
        let t0 = std::time::Instant::now();
        let cfg = self.setup.ytdlp.config();
        let mut payload = serde_json::json!({
            "ok": true,
            "name": "subpipe",
            "version": env!("CARGO_PKG_VERSION"),
            "configured": {
                "ytdlp_bin": cfg.bin,
                "ytdlp_found": subpipe_local::shellout::has(&cfg.bin),
                "ytdlp_timeout_ms": cfg.timeout.as_millis() as u64,
                "sub_format": cfg.sub_format,
                "convert_srt": cfg.convert_srt,
                "max_chars": self.setup.max_chars,
                "default_lang": self.setup.default_lang,
                "dedupe": self.setup.dedupe,
                "fallback": self.setup.policy.fallback,
                "orig_variants": self.setup.policy.orig_variants,
            },
        });
        add_envelope_fields(&mut payload, "subpipe_meta", t0.elapsed().as_millis());
        Ok(tool_result(payload))
    }

    #[tool(
        description = "Download the best subtitle track for a media URL (via yt-dlp) and return it as plain text"
    )]
    async fn subtitle_text(
        &self,
        params: Parameters<Option<SubtitleTextArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let args = params.0.unwrap_or_default();
        let p = SubsParams {
            url: args.url.unwrap_or_default(),
            lang: args.lang,
            strict: args.strict.unwrap_or(false),
            dedupe: args.dedupe,
            max_chars: args.max_chars,
        };
        Ok(reply_result(ops::subtitle_text(&self.setup, p).await))
    }

    #[tool(
        description = "List subtitle languages for a media URL and the order they would be tried (no download)"
    )]
    async fn subtitle_languages(
        &self,
        params: Parameters<Option<SubtitleLanguagesArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let args = params.0.unwrap_or_default();
        let url = args.url.unwrap_or_default();
        Ok(reply_result(
            ops::subtitle_languages(
                &self.setup,
                &url,
                args.lang,
                args.strict.unwrap_or(false),
            )
            .await,
        ))
    }
}

#[tool_handler]
impl rmcp::ServerHandler for SubpipeMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Subtitle text for media URLs (yt-dlp). Outputs are JSON and schema-versioned; failures carry error.code and error.hint."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

pub(crate) async fn serve_stdio(setup: LocalSetup) -> Result<(), McpError> {
    let svc = SubpipeMcp::new(setup);
    let running = svc
        .serve(stdio())
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    // Keep the stdio server alive until the client closes.
    running
        .waiting()
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(())
}
