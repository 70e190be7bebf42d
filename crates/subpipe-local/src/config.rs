//! Env-driven knobs. Unset, empty, or unparsable values fall back to defaults.

use std::collections::BTreeMap;
use std::time::Duration;
use subpipe_core::{select::default_orig_variants, SelectionPolicy};

pub const DEFAULT_YTDLP_BIN: &str = "yt-dlp";
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_MAX_CHARS: usize = 200_000;

pub fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn env_usize(key: &str, default: usize) -> usize {
    env(key)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(default)
}

pub fn env_u64(key: &str, default: u64) -> u64 {
    env(key)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default)
}

pub fn env_bool(key: &str, default: bool) -> bool {
    match env(key).map(|s| s.to_ascii_lowercase()).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

pub fn timeout_from_env_ms(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_u64(key, default_ms).clamp(50, 600_000))
}

pub fn max_chars_from_env() -> usize {
    env_usize("SUBPIPE_MAX_CHARS", DEFAULT_MAX_CHARS).clamp(200, 2_000_000)
}

pub fn default_lang_from_env() -> Option<String> {
    env("SUBPIPE_DEFAULT_LANG")
}

pub fn dedupe_from_env() -> bool {
    env_bool("SUBPIPE_DEDUPE", false)
}

/// yt-dlp `--sub-format` preference chain.
pub const DEFAULT_SUB_FORMAT: &str = "vtt/srt/best";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YtDlpConfig {
    pub bin: String,
    pub timeout: Duration,
    pub sub_format: String,
    /// Pass `--convert-subs srt` (needs ffmpeg next to yt-dlp).
    pub convert_srt: bool,
    /// Cap for `-J` output; info JSON with full caption listings runs to a few MB.
    pub max_info_bytes: usize,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            bin: DEFAULT_YTDLP_BIN.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            sub_format: DEFAULT_SUB_FORMAT.to_string(),
            convert_srt: false,
            max_info_bytes: 32 * 1024 * 1024,
        }
    }
}

impl YtDlpConfig {
    pub fn from_env() -> Self {
        Self {
            bin: env("SUBPIPE_YTDLP_BIN").unwrap_or_else(|| DEFAULT_YTDLP_BIN.to_string()),
            timeout: timeout_from_env_ms("SUBPIPE_YTDLP_TIMEOUT_MS", DEFAULT_TIMEOUT_MS),
            sub_format: env("SUBPIPE_SUB_FORMAT")
                .unwrap_or_else(|| DEFAULT_SUB_FORMAT.to_string()),
            convert_srt: env_bool("SUBPIPE_CONVERT_SRT", false),
            ..Self::default()
        }
    }
}

pub fn selection_policy_from_env() -> SelectionPolicy {
    let orig_variants: BTreeMap<String, String> = match env("SUBPIPE_ORIG_VARIANTS") {
        Some(s) if s.eq_ignore_ascii_case("none") => BTreeMap::new(),
        Some(s) => SelectionPolicy::parse_variants(&s),
        None => default_orig_variants(),
    };
    SelectionPolicy {
        orig_variants,
        fallback: env_bool("SUBPIPE_FALLBACK", true),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectMode {
    /// Guess the spoken language from the title when metadata has none.
    Title,
    Off,
}

pub fn detect_mode_from_env() -> DetectMode {
    match env("SUBPIPE_DETECT").map(|s| s.to_ascii_lowercase()).as_deref() {
        Some("off") => DetectMode::Off,
        _ => DetectMode::Title,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorConfig {
    /// Tie-break among equally scored languages.
    pub seed: u64,
    /// Minimum stopword hits before a guess is made.
    pub min_hits: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            min_hits: 2,
        }
    }
}

impl DetectorConfig {
    pub fn from_env() -> Self {
        Self {
            seed: env_u64("SUBPIPE_DETECT_SEED", 0),
            ..Self::default()
        }
    }
}
