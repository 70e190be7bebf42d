//! Local collaborators for `subpipe-core`: `yt-dlp` shellouts, env config, title language guess.

use std::sync::Arc;
use subpipe_core::{LanguageDetector, SelectionPolicy, TranscriptRequest};

pub mod config;
pub mod detect;
pub mod shellout;
pub mod ytdlp;

pub use config::{DetectMode, DetectorConfig, YtDlpConfig};
pub use detect::StopwordDetector;
pub use ytdlp::YtDlp;

#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Everything a surface needs to serve a request, resolved from env once at startup.
#[derive(Debug, Clone)]
pub struct LocalSetup {
    pub ytdlp: YtDlp,
    pub policy: SelectionPolicy,
    pub max_chars: usize,
    pub default_lang: Option<String>,
    pub dedupe: bool,
}

impl LocalSetup {
    pub fn from_env() -> Self {
        let mut ytdlp = YtDlp::new(YtDlpConfig::from_env());
        if config::detect_mode_from_env() == DetectMode::Title {
            let det: Arc<dyn LanguageDetector> =
                Arc::new(StopwordDetector::new(DetectorConfig::from_env()));
            ytdlp = ytdlp.with_detector(det);
        }
        Self {
            ytdlp,
            policy: config::selection_policy_from_env(),
            max_chars: config::max_chars_from_env(),
            default_lang: config::default_lang_from_env(),
            dedupe: config::dedupe_from_env(),
        }
    }

    /// Request with env defaults applied where the caller left a field unset.
    pub fn request(
        &self,
        url: &str,
        language: Option<String>,
        max_chars: Option<usize>,
        dedupe: Option<bool>,
    ) -> TranscriptRequest {
        let language = language
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .or_else(|| self.default_lang.clone());
        let mut req = TranscriptRequest::new(url).with_language(language);
        req.max_chars = Some(max_chars.unwrap_or(self.max_chars).clamp(1, 2_000_000));
        req.dedupe = dedupe.unwrap_or(self.dedupe);
        req
    }

    /// Strict requests never fall back past the requested language.
    pub fn policy(&self, strict: bool) -> SelectionPolicy {
        if strict {
            SelectionPolicy {
                fallback: false,
                ..self.policy.clone()
            }
        } else {
            self.policy.clone()
        }
    }
}
