//! SRT / WebVTT -> plain text.
//!
//! Pure and total: malformed input is passed through or dropped line by line, never rejected.
//! Output is a single paragraph (retained lines joined by one space), in source order.

use crate::SubtitleFormat;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Drop a retained line equal to the line retained right before it (rolling auto-captions).
    pub dedupe: bool,
}

fn cached(cell: &'static OnceLock<Regex>, pat: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pat).expect("static regex"))
}

/// `<00:00:01.500>` karaoke timing tags (hours optional).
fn inline_timestamp() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"<(?:\d{1,2}:)?\d{2}:\d{2}\.\d{3}>")
}

/// `<c>`, `</c>`, `<c.colorE5E5E5>`, `<c.a.b>`.
fn cue_span() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"</?c(?:\.[^\s<>]*)?>")
}

fn signature_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"(?m)^[^\S\n]*WEBVTT[^\n]*(?:\n|$)")
}

/// `[music]`, `[applause]`; never crosses a line break.
fn bracketed() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"\[[^\]\n]*\]")
}

fn clock_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"^\d{1,2}:\d{2}:\d{2}")
}

/// Signature line plus the metadata lines glued to it (`Kind: captions`, `Language: en`,
/// `X-TIMESTAMP-MAP=...`).
fn vtt_header_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(
        &RE,
        r"\A(?:[^\S\n]*\n)*[^\S\n]*WEBVTT[^\n]*(?:\n(?:[A-Za-z][A-Za-z0-9_-]*:[^\n]*|X-TIMESTAMP-MAP=[^\n]*))*",
    )
}

fn strip_markup_once(s: &str) -> String {
    let s = inline_timestamp().replace_all(s, "");
    let s = cue_span().replace_all(&s, "");
    let s = signature_line().replace_all(&s, "");
    let s = bracketed().replace_all(&s, "");
    s.into_owned()
}

/// Repeat until stable: removing one token can splice together another.
fn strip_markup(s: &str) -> String {
    let mut cur = strip_markup_once(s);
    loop {
        let next = strip_markup_once(&cur);
        if next == cur {
            return cur;
        }
        cur = next;
    }
}

fn is_content_line(l: &str) -> bool {
    !l.is_empty()
        && !l.chars().all(|c| c.is_ascii_digit())
        && !l.contains("-->")
        && !clock_prefix().is_match(l)
}

pub fn normalize(raw: &str, format: SubtitleFormat) -> String {
    normalize_with(raw, format, &NormalizeOptions::default())
}

/// Normalize with explicit options.
///
/// Passes repeat until the output is stable, so the result is idempotent. Once cues are joined,
/// a stray `[` in one cue and a stray `]` in a later cue form a single bracket span, and any
/// speech between them is removed: cues `we open [`, `a long stretch of real speech`,
/// `more real speech ] closing` come out as `we open closing`.
pub fn normalize_with(raw: &str, format: SubtitleFormat, opts: &NormalizeOptions) -> String {
    // Joining can put both halves of a bracket span on one line; repeat until stable.
    let mut cur = normalize_pass(raw, format, opts);
    loop {
        let next = normalize_pass(&cur, format, opts);
        if next == cur {
            return cur;
        }
        cur = next;
    }
}

fn normalize_pass(raw: &str, format: SubtitleFormat, opts: &NormalizeOptions) -> String {
    let mut text = raw.replace('\u{feff}', "");
    if format == SubtitleFormat::WebVtt {
        text = vtt_header_block().replace(&text, "").into_owned();
    }
    let text = strip_markup(&text);

    let mut kept: Vec<String> = Vec::new();
    for line in text.lines() {
        let l = line.trim();
        if !is_content_line(l) {
            continue;
        }
        let l = l.split_whitespace().collect::<Vec<_>>().join(" ");
        if opts.dedupe && kept.last() == Some(&l) {
            continue;
        }
        kept.push(l);
    }
    kept.join(" ")
}

/// Clip to at most `max_chars` chars (never splits a char). Returns `(text, clipped)`.
pub fn clip_chars(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => (text[..idx].trim_end().to_string(), true),
        None => (text.to_string(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn srt_drops_indices_timings_and_annotations() {
        let raw = "1\n00:00:01,000 --> 00:00:02,000\nHello [music] world\n";
        assert_eq!(normalize(raw, SubtitleFormat::Srt), "Hello world");
    }

    #[test]
    fn vtt_drops_signature_cue_spans_and_karaoke_tags() {
        let raw = "WEBVTT\n\n00:00:00.000 --> 00:00:01.000\n<c>Hi</c> <00:00:00.500>there\n";
        assert_eq!(normalize(raw, SubtitleFormat::WebVtt), "Hi there");
    }

    #[test]
    fn vtt_header_metadata_lines_do_not_leak() {
        let raw = "WEBVTT\nKind: captions\nLanguage: en\n\n00:00:00.000 --> 00:00:02.000 align:start position:0%\nfirst line\n\n00:00:02.000 --> 00:00:03.000\nsecond line\n";
        assert_eq!(
            normalize(raw, SubtitleFormat::WebVtt),
            "first line second line"
        );
    }

    #[test]
    fn hls_timestamp_map_header_is_dropped() {
        let raw = "WEBVTT\nX-TIMESTAMP-MAP=MPEGTS:900000,LOCAL:00:00:00.000\n\n00:00:00.000 --> 00:00:01.000\nhola\n";
        assert_eq!(normalize(raw, SubtitleFormat::WebVtt), "hola");
    }

    #[test]
    fn classed_cue_spans_are_stripped() {
        let raw = "WEBVTT\n\n00:00:00.000 --> 00:00:01.000\n<c.colorE5E5E5>so</c><00:00:00.240><c> we</c><00:00:00.480><c.a.b> went</c>\n";
        assert_eq!(normalize(raw, SubtitleFormat::WebVtt), "so we went");
    }

    #[test]
    fn unrelated_angle_tags_survive() {
        let raw = "1\n00:00:01,000 --> 00:00:02,000\n<code>x</code> and <i>y</i>\n";
        assert_eq!(
            normalize(raw, SubtitleFormat::Srt),
            "<code>x</code> and <i>y</i>"
        );
    }

    #[test]
    fn clock_lines_without_arrow_are_dropped() {
        let raw = "WEBVTT\n\n00:00:01.000\n--> 00:00:02.000\nstill here\n";
        assert_eq!(normalize(raw, SubtitleFormat::WebVtt), "still here");
    }

    #[test]
    fn crlf_and_bom_are_tolerated() {
        let raw = "\u{feff}1\r\n00:00:01,000 --> 00:00:02,000\r\nHola\r\n\r\n2\r\n00:00:02,000 --> 00:00:03,000\r\nmundo\r\n";
        assert_eq!(normalize(raw, SubtitleFormat::Srt), "Hola mundo");
    }

    #[test]
    fn brackets_split_across_lines_go_once_joined() {
        let raw = "a [ b\nc ] d\n";
        assert_eq!(normalize(raw, SubtitleFormat::Srt), "a d");
        // A split span can reassemble into an arrow or a bare number; neither may leak.
        assert_eq!(normalize("--[\n]>\n", SubtitleFormat::Srt), "");
        assert_eq!(normalize("1[\n]2\n", SubtitleFormat::Srt), "");
    }

    #[test]
    fn stray_brackets_on_distant_cues_swallow_the_speech_between() {
        let raw = "1\n00:00:01,000 --> 00:00:02,000\nwe open [\n\n\
                   2\n00:00:02,000 --> 00:00:03,000\na long stretch of real speech\n\n\
                   3\n00:00:03,000 --> 00:00:04,000\nmore real speech ] closing\n";
        assert_eq!(normalize(raw, SubtitleFormat::Srt), "we open closing");
    }

    #[test]
    fn signature_only_at_line_start() {
        let raw = "say WEBVTT out loud\n  WEBVTT indented header\n";
        assert_eq!(normalize(raw, SubtitleFormat::Srt), "say WEBVTT out loud");
    }

    #[test]
    fn rolling_repeats_are_kept_by_default() {
        let raw = "WEBVTT\n\n00:00:00.000 --> 00:00:01.000\nwe went\n\n00:00:01.000 --> 00:00:02.000\nwe went\nto the park\n";
        assert_eq!(
            normalize(raw, SubtitleFormat::WebVtt),
            "we went we went to the park"
        );
        assert_eq!(
            normalize_with(raw, SubtitleFormat::WebVtt, &NormalizeOptions { dedupe: true }),
            "we went to the park"
        );
    }

    #[test]
    fn dedupe_only_touches_consecutive_lines() {
        let raw = "a\nb\na\na\n";
        let opts = NormalizeOptions { dedupe: true };
        assert_eq!(normalize_with(raw, SubtitleFormat::Srt, &opts), "a b a");
    }

    #[test]
    fn empty_and_markup_only_inputs_yield_empty_text() {
        assert_eq!(normalize("", SubtitleFormat::Srt), "");
        assert_eq!(normalize("WEBVTT\n\n", SubtitleFormat::WebVtt), "");
        assert_eq!(
            normalize("1\n00:00:01,000 --> 00:00:02,000\n[Music]\n", SubtitleFormat::Srt),
            ""
        );
    }

    #[test]
    fn clip_chars_respects_char_boundaries() {
        let (s, clipped) = clip_chars("héllo wörld", 7);
        assert_eq!(s, "héllo w");
        assert!(clipped);
        let (s, clipped) = clip_chars("short", 10);
        assert_eq!(s, "short");
        assert!(!clipped);
        let (s, clipped) = clip_chars("ab cd", 3);
        assert_eq!(s, "ab");
        assert!(clipped);
    }

    fn structural_line() -> impl Strategy<Value = String> {
        prop::sample::select(vec![
            "1",
            "42",
            "00:00:01,000 --> 00:00:02,000",
            "00:00:01.000 --> 00:00:02.000 align:start position:0%",
            "00:00:03.000",
            "WEBVTT",
            "WEBVTT - generated",
            "Kind: captions",
            "",
            "  ",
        ])
        .prop_map(str::to_string)
    }

    fn content_line() -> impl Strategy<Value = String> {
        let frag = prop::sample::select(vec![
            "hello",
            "world",
            "WEBVTT",
            "<c>hi</c>",
            "<00:00:00.500>there",
            "<c.colorE5E5E5>x</c>",
            "[music]",
            "[Applause]",
            "  ",
        ]);
        prop::collection::vec(frag, 1..4).prop_map(|frags| frags.join(" "))
    }

    fn document() -> impl Strategy<Value = String> {
        prop::collection::vec(prop_oneof![structural_line(), content_line()], 0..12)
            .prop_map(|lines| lines.join("\n"))
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(raw in document(), vtt in any::<bool>(), dedupe in any::<bool>()) {
            let f = if vtt { SubtitleFormat::WebVtt } else { SubtitleFormat::Srt };
            let opts = NormalizeOptions { dedupe };
            let once = normalize_with(&raw, f, &opts);
            let twice = normalize_with(&once, f, &opts);
            prop_assert_eq!(&once, &twice);
            prop_assert!(!once.contains('\n'));
        }

        #[test]
        fn normalize_never_leaks_timings_or_indices(raw in document(), vtt in any::<bool>()) {
            let f = if vtt { SubtitleFormat::WebVtt } else { SubtitleFormat::Srt };
            let out = normalize(&raw, f);
            prop_assert!(!out.contains("-->"));
            prop_assert!(!out.contains('['));
            prop_assert!(!out.contains("<c"));
            for tok in out.split(' ') {
                prop_assert!(!tok.is_empty() || out.is_empty());
                prop_assert!(!tok.chars().all(|c| c.is_ascii_digit()) || tok.is_empty());
            }
        }

        #[test]
        fn normalize_never_panics(raw in any::<String>(), vtt in any::<bool>()) {
            let f = if vtt { SubtitleFormat::WebVtt } else { SubtitleFormat::Srt };
            let _ = normalize(&raw, f);
        }
    }
}
