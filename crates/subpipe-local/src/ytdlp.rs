//! `yt-dlp` as metadata source and subtitle retriever.
//!
//! Design goals:
//! - Bounded (size/time): every invocation goes through [`shellout::run_bounded`].
//! - One fresh temp dir per retrieval; nothing outlives the call.
//! - Avoid brittle HTML scraping; `yt-dlp` already tracks the platforms' moving targets.

use crate::config::YtDlpConfig;
use crate::shellout::{self, ShellError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use subpipe_core::{
    Candidate, Error, LanguageAvailability, LanguageDetector, MediaMetadata, MetadataSource,
    Result, SubtitleDocument, SubtitleFormat, SubtitleSource, TrackKind,
};
use tokio::process::Command;

/// Pseudo-language yt-dlp lists for chat replays; never a subtitle track.
const LIVE_CHAT: &str = "live_chat";

#[derive(Debug, Default, Deserialize)]
struct InfoJson {
    title: Option<String>,
    language: Option<String>,
    #[serde(default)]
    subtitles: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    automatic_captions: Option<BTreeMap<String, serde_json::Value>>,
}

/// The parts of `yt-dlp -J` output we care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoSummary {
    pub title: Option<String>,
    pub language: Option<String>,
    pub manual: Vec<String>,
    pub auto: Vec<String>,
}

fn track_codes(m: Option<BTreeMap<String, serde_json::Value>>) -> Vec<String> {
    m.unwrap_or_default()
        .into_keys()
        .filter(|k| k != LIVE_CHAT)
        .collect()
}

pub fn parse_info_json(bytes: &[u8]) -> std::result::Result<InfoSummary, &'static str> {
    let info: InfoJson = serde_json::from_slice(bytes).map_err(|_| "ytdlp_bad_json")?;
    Ok(InfoSummary {
        title: info.title.filter(|t| !t.trim().is_empty()),
        language: info.language.filter(|l| !l.trim().is_empty()),
        manual: track_codes(info.subtitles),
        auto: track_codes(info.automatic_captions),
    })
}

/// Chars of yt-dlp's own explanation kept in an error message.
const DETAIL_MAX_CHARS: usize = 300;

/// The line that explains a yt-dlp failure: the last `ERROR:` line, else the last non-empty one.
pub fn error_detail(stderr: &str) -> Option<String> {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let line = lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or(lines.last())?;
    Some(line.chars().take(DETAIL_MAX_CHARS).collect())
}

/// `ytdlp_<code>`, followed by yt-dlp's explanation when it printed one.
fn shell_message(e: &ShellError) -> String {
    let code = ytdlp_code(e.code);
    match error_detail(&e.stderr_tail) {
        Some(detail) => format!("{code}: {detail}"),
        None => code.to_string(),
    }
}

/// Map shellout codes onto this tool's namespace.
fn ytdlp_code(code: &'static str) -> &'static str {
    match code {
        "shellout_tool_not_found" => "ytdlp_not_found",
        "shellout_spawn_failed" => "ytdlp_spawn_failed",
        "shellout_nonzero_exit" => "ytdlp_nonzero_exit",
        "shellout_timeout" => "ytdlp_timeout",
        "shellout_read_failed" | "shellout_wait_failed" => "ytdlp_io_failed",
        other => other,
    }
}

#[derive(Clone)]
pub struct YtDlp {
    cfg: YtDlpConfig,
    detector: Option<Arc<dyn LanguageDetector>>,
}

impl std::fmt::Debug for YtDlp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YtDlp")
            .field("cfg", &self.cfg)
            .field("detector", &self.detector.is_some())
            .finish()
    }
}

impl YtDlp {
    pub fn new(cfg: YtDlpConfig) -> Self {
        Self {
            cfg,
            detector: None,
        }
    }

    /// Fallback for media whose metadata carries no spoken language.
    pub fn with_detector(mut self, detector: Arc<dyn LanguageDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn config(&self) -> &YtDlpConfig {
        &self.cfg
    }

    fn not_found(&self) -> Error {
        Error::NotConfigured(format!(
            "yt-dlp not found at {:?} (install it or set SUBPIPE_YTDLP_BIN)",
            self.cfg.bin
        ))
    }

    pub fn metadata_from_info(&self, info: InfoSummary) -> MediaMetadata {
        let detected = info.language.clone().or_else(|| {
            let title = info.title.as_deref()?;
            self.detector.as_ref()?.detect(title)
        });
        MediaMetadata {
            title: info.title,
            availability: LanguageAvailability::new(info.manual, info.auto, detected),
        }
    }
}

pub fn subtitle_args(cfg: &YtDlpConfig, url: &str, cand: &Candidate, dir: &Path) -> Vec<String> {
    let mut args = vec!["--skip-download".to_string()];
    // A candidate with neither flag set can only come from a hand-built request; ask for both.
    let both = !cand.manual && !cand.auto;
    if cand.manual || both {
        args.push("--write-subs".to_string());
    }
    if cand.auto || both {
        args.push("--write-auto-subs".to_string());
    }
    args.push("--sub-langs".to_string());
    args.push(cand.code.clone());
    args.push("--sub-format".to_string());
    args.push(cfg.sub_format.clone());
    if cfg.convert_srt {
        args.push("--convert-subs".to_string());
        args.push("srt".to_string());
    }
    args.push("-o".to_string());
    args.push(dir.join("%(id)s.%(ext)s").to_string_lossy().to_string());
    args.push("--no-warnings".to_string());
    args.push("--no-playlist".to_string());
    args.push(url.to_string());
    args
}

/// Pick the subtitle file yt-dlp wrote for `code`.
///
/// Prefers `*.<code>.vtt|srt`; otherwise the first subtitle file by name.
pub fn pick_subtitle_file(dir: &Path, code: &str) -> Option<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .and_then(SubtitleFormat::from_extension)
                    .is_some()
        })
        .collect();
    files.sort();
    let wanted = [format!(".{code}.vtt"), format!(".{code}.srt")];
    files
        .iter()
        .find(|p| {
            let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
            wanted.iter().any(|w| name.ends_with(w.as_str()))
        })
        .or_else(|| files.first())
        .cloned()
}

fn track_kind(cand: &Candidate) -> TrackKind {
    match (cand.manual, cand.auto) {
        (true, false) => TrackKind::Manual,
        (false, true) => TrackKind::Auto,
        _ => TrackKind::Unknown,
    }
}

#[async_trait::async_trait]
impl MetadataSource for YtDlp {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch_metadata(&self, url: &str) -> Result<MediaMetadata> {
        let mut cmd = Command::new(&self.cfg.bin);
        cmd.arg("-J")
            .arg("--skip-download")
            .arg("--no-warnings")
            .arg("--no-playlist")
            .arg(url);
        let out = shellout::run_bounded(cmd, self.cfg.timeout, self.cfg.max_info_bytes)
            .await
            .map_err(|e| match ytdlp_code(e.code) {
                "ytdlp_not_found" => self.not_found(),
                _ => Error::SourceUnavailable(shell_message(&e)),
            })?;
        if out.stdout_truncated {
            return Err(Error::SourceUnavailable("ytdlp_info_too_large".to_string()));
        }
        let info = parse_info_json(&out.stdout)
            .map_err(|code| Error::SourceUnavailable(code.to_string()))?;
        let meta = self.metadata_from_info(info);
        tracing::debug!(
            manual = meta.availability.manual.len(),
            auto = meta.availability.auto.len(),
            detected = meta.availability.detected.as_deref().unwrap_or(""),
            "yt-dlp metadata"
        );
        Ok(meta)
    }
}

#[async_trait::async_trait]
impl SubtitleSource for YtDlp {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch_subtitle(&self, url: &str, cand: &Candidate) -> Result<Option<SubtitleDocument>> {
        let fail = |message: String| Error::retrieval(cand.code.clone(), message);
        let tmp = tempfile::Builder::new()
            .prefix("subpipe-")
            .tempdir()
            .map_err(|_| fail("ytdlp_tempdir_failed".to_string()))?;

        let mut cmd = Command::new(&self.cfg.bin);
        cmd.args(subtitle_args(&self.cfg, url, cand, tmp.path()));
        shellout::run_bounded(cmd, self.cfg.timeout, 64 * 1024)
            .await
            .map_err(|e| match ytdlp_code(e.code) {
                "ytdlp_not_found" => self.not_found(),
                _ => fail(shell_message(&e)),
            })?;

        let Some(path) = pick_subtitle_file(tmp.path(), &cand.code) else {
            tracing::debug!(lang = %cand.code, "yt-dlp wrote no subtitle file");
            return Ok(None);
        };
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(SubtitleFormat::from_extension)
            .unwrap_or(SubtitleFormat::WebVtt);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|_| fail("ytdlp_read_failed".to_string()))?;
        Ok(Some(SubtitleDocument {
            format,
            raw: String::from_utf8_lossy(&bytes).into_owned(),
            filename: path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string),
            kind: track_kind(cand),
        }))
    }
}
