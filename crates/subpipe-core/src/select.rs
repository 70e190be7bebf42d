//! Subtitle language selection.
//!
//! Deterministic: the same availability snapshot and request always produce the same ordered
//! candidate list. Every returned code is present in the availability snapshot.

use crate::{LanguageAvailability, SelectionRequest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One language to ask the retriever for, plus which track kinds exist for it.
///
/// Both flags may be set; the retriever may then prefer the manual track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub code: String,
    pub manual: bool,
    pub auto: bool,
}

impl Candidate {
    pub fn for_code(code: &str, av: &LanguageAvailability) -> Self {
        Self {
            code: code.to_string(),
            manual: av.manual.contains(code),
            auto: av.auto.contains(code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionPolicy {
    /// Requested code -> original-audio variant code (`es` -> `es-orig`).
    ///
    /// Unverified platform behaviour; only `es`/`en` are known to use the suffix.
    pub orig_variants: BTreeMap<String, String>,
    /// Append every remaining available language as last-resort fallbacks.
    pub fallback: bool,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            orig_variants: default_orig_variants(),
            fallback: true,
        }
    }
}

pub fn default_orig_variants() -> BTreeMap<String, String> {
    let mut m = BTreeMap::new();
    m.insert("es".to_string(), "es-orig".to_string());
    m.insert("en".to_string(), "en-orig".to_string());
    m
}

impl SelectionPolicy {
    /// Only the detected/requested languages (and the single-language default); no fallbacks.
    pub fn strict() -> Self {
        Self {
            fallback: false,
            ..Self::default()
        }
    }

    /// Parse a `es=es-orig,en=en-orig` table. Malformed pairs are skipped.
    pub fn parse_variants(s: &str) -> BTreeMap<String, String> {
        let mut m = BTreeMap::new();
        for pair in s.split(',') {
            let Some((k, v)) = pair.split_once('=') else {
                continue;
            };
            let (k, v) = (k.trim(), v.trim());
            if k.is_empty() || v.is_empty() {
                continue;
            }
            m.insert(k.to_string(), v.to_string());
        }
        m
    }
}

/// Map a user-supplied code onto the spelling used by the availability snapshot.
pub(crate) fn resolve<'a>(code: &str, av: &'a LanguageAvailability) -> Option<&'a str> {
    let code = code.trim();
    if code.is_empty() {
        return None;
    }
    av.manual
        .iter()
        .chain(av.auto.iter())
        .find(|c| c.as_str() == code)
        .or_else(|| {
            av.manual
                .iter()
                .chain(av.auto.iter())
                .find(|c| c.eq_ignore_ascii_case(code))
        })
        .map(String::as_str)
}

fn push<'a>(codes: &mut Vec<&'a str>, av: &'a LanguageAvailability, code: Option<&str>) {
    if let Some(c) = code.and_then(|c| resolve(c, av)) {
        if !codes.contains(&c) {
            codes.push(c);
        }
    }
}

/// Ordered candidate codes using the default policy.
pub fn select_candidates(requested: Option<&str>, av: &LanguageAvailability) -> Vec<String> {
    select_candidates_with(requested, av, &SelectionPolicy::default())
        .into_iter()
        .map(|c| c.code)
        .collect()
}

pub fn select_candidates_with(
    requested: Option<&str>,
    av: &LanguageAvailability,
    policy: &SelectionPolicy,
) -> Vec<Candidate> {
    let mut codes: Vec<&str> = Vec::new();

    // Spoken-language signal first.
    push(&mut codes, av, av.detected.as_deref());

    let requested = requested.map(str::trim).filter(|r| !r.is_empty());
    if let Some(r) = requested {
        push(&mut codes, av, Some(r));
        let variant = policy.orig_variants.get(r).or_else(|| {
            policy
                .orig_variants
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(r))
                .map(|(_, v)| v)
        });
        push(&mut codes, av, variant.map(String::as_str));
    }

    let all = av.all();
    if codes.is_empty() && all.len() == 1 {
        push(&mut codes, av, Some(all[0].as_str()));
    }

    if policy.fallback {
        for c in &all {
            push(&mut codes, av, Some(c.as_str()));
        }
    }

    let out: Vec<Candidate> = codes
        .into_iter()
        .map(|c| Candidate::for_code(c, av))
        .collect();
    tracing::debug!(
        requested = requested.unwrap_or(""),
        detected = av.detected.as_deref().unwrap_or(""),
        candidates = ?out.iter().map(|c| c.code.as_str()).collect::<Vec<_>>(),
        "selected subtitle candidates"
    );
    out
}

impl SelectionRequest {
    /// Blank requested codes count as no request.
    pub fn new(requested: Option<&str>, availability: LanguageAvailability) -> Self {
        Self {
            requested: requested
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
            availability,
        }
    }

    pub fn candidates(&self, policy: &SelectionPolicy) -> Vec<Candidate> {
        select_candidates_with(self.requested.as_deref(), &self.availability, policy)
    }

    /// `None` when nothing was requested.
    pub fn requested_available(&self) -> Option<bool> {
        self.requested
            .as_deref()
            .map(|r| resolve(r, &self.availability).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn av(manual: &[&str], auto: &[&str], detected: Option<&str>) -> LanguageAvailability {
        LanguageAvailability::new(
            manual.iter().copied(),
            auto.iter().copied(),
            detected.map(str::to_string),
        )
    }

    #[test]
    fn single_language_shortcut() {
        let a = av(&[], &["en"], None);
        assert_eq!(select_candidates(None, &a), vec!["en"]);
        let strict = select_candidates_with(None, &a, &SelectionPolicy::strict());
        assert_eq!(strict.len(), 1);
        assert_eq!(strict[0].code, "en");
        assert!(strict[0].auto && !strict[0].manual);
    }

    #[test]
    fn selection_request_trims_and_reports_availability() {
        let req = SelectionRequest::new(Some("  EN "), av(&["en"], &["de"], None));
        assert_eq!(req.requested.as_deref(), Some("EN"));
        assert_eq!(req.requested_available(), Some(true));
        let codes: Vec<String> = req
            .candidates(&SelectionPolicy::default())
            .into_iter()
            .map(|c| c.code)
            .collect();
        assert_eq!(codes, vec!["en", "de"]);

        let blank = SelectionRequest::new(Some(" "), av(&[], &["de"], None));
        assert_eq!(blank.requested, None);
        assert_eq!(blank.requested_available(), None);
        assert_eq!(blank.candidates(&SelectionPolicy::strict()).len(), 1);

        let missing = SelectionRequest::new(Some("ja"), av(&["fr"], &["de"], None));
        assert_eq!(missing.requested_available(), Some(false));
        assert!(missing.candidates(&SelectionPolicy::strict()).is_empty());
    }

    #[test]
    fn detected_precedes_requested() {
        let a = av(&["fr"], &["en", "fr"], Some("fr"));
        let got = select_candidates(Some("en"), &a);
        assert_eq!(got, vec!["fr", "en"]);
    }

    #[test]
    fn remaining_languages_follow_in_lexicographic_order() {
        let a = av(&["fr"], &["en", "fr", "de", "it"], Some("fr"));
        let got = select_candidates(Some("en"), &a);
        assert_eq!(got, vec!["fr", "en", "de", "it"]);
    }

    #[test]
    fn empty_availability_yields_nothing() {
        let a = av(&[], &[], Some("en"));
        assert!(select_candidates(Some("en"), &a).is_empty());
        assert!(select_candidates(None, &a).is_empty());
    }

    #[test]
    fn orig_variant_follows_requested() {
        let a = av(&[], &["de", "es", "es-orig"], None);
        let got = select_candidates(Some("es"), &a);
        assert_eq!(got, vec!["es", "es-orig", "de"]);

        let a = av(&[], &["en", "en-orig", "fr"], None);
        assert_eq!(select_candidates(Some("en"), &a), vec!["en", "en-orig", "fr"]);
    }

    #[test]
    fn orig_variant_only_when_available() {
        let a = av(&[], &["es", "fr"], None);
        assert_eq!(select_candidates(Some("es"), &a), vec!["es", "fr"]);
    }

    #[test]
    fn orig_variant_used_even_when_plain_code_is_missing() {
        let a = av(&[], &["es-orig", "fr"], None);
        assert_eq!(select_candidates(Some("es"), &a), vec!["es-orig", "fr"]);
    }

    #[test]
    fn unavailable_requested_is_dropped_and_fallbacks_remain() {
        let a = av(&["de"], &["fr"], None);
        assert_eq!(select_candidates(Some("ja"), &a), vec!["de", "fr"]);
    }

    #[test]
    fn strict_policy_skips_fallbacks() {
        let a = av(&["de"], &["en", "fr"], None);
        let got: Vec<String> = select_candidates_with(Some("en"), &a, &SelectionPolicy::strict())
            .into_iter()
            .map(|c| c.code)
            .collect();
        assert_eq!(got, vec!["en"]);

        let none = select_candidates_with(Some("ja"), &a, &SelectionPolicy::strict());
        assert!(none.is_empty());
    }

    #[test]
    fn requested_code_matches_case_insensitively() {
        let a = av(&["pt-BR"], &["en"], None);
        assert_eq!(select_candidates(Some("pt-br"), &a), vec!["pt-BR", "en"]);
    }

    #[test]
    fn flags_reflect_set_membership() {
        let a = av(&["en", "fr"], &["en", "de"], None);
        let got = select_candidates_with(Some("en"), &a, &SelectionPolicy::default());
        assert_eq!(
            got[0],
            Candidate {
                code: "en".to_string(),
                manual: true,
                auto: true
            }
        );
        let de = got.iter().find(|c| c.code == "de").unwrap();
        assert!(!de.manual && de.auto);
        let fr = got.iter().find(|c| c.code == "fr").unwrap();
        assert!(fr.manual && !fr.auto);
    }

    #[test]
    fn custom_variant_table() {
        let mut policy = SelectionPolicy::default();
        policy.orig_variants = SelectionPolicy::parse_variants("fr=fr-orig, bad, =x, de = de-orig");
        assert_eq!(policy.orig_variants.len(), 2);
        let a = av(&[], &["fr", "fr-orig", "es", "es-orig"], None);
        let got: Vec<String> = select_candidates_with(Some("fr"), &a, &policy)
            .into_iter()
            .map(|c| c.code)
            .collect();
        assert_eq!(got, vec!["fr", "fr-orig", "es", "es-orig"]);
    }

    fn code() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["en", "en-orig", "es", "es-orig", "fr", "de", "pt-BR"])
            .prop_map(str::to_string)
    }

    proptest! {
        #[test]
        fn candidates_are_unique_and_available(
            manual in prop::collection::btree_set(code(), 0..5),
            auto in prop::collection::btree_set(code(), 0..5),
            detected in proptest::option::of(code()),
            requested in proptest::option::of(code()),
            fallback in any::<bool>(),
        ) {
            let a = LanguageAvailability::new(manual, auto, detected);
            let policy = SelectionPolicy { fallback, ..SelectionPolicy::default() };
            let got = select_candidates_with(requested.as_deref(), &a, &policy);
            let mut seen = std::collections::BTreeSet::new();
            for c in &got {
                prop_assert!(seen.insert(c.code.clone()), "duplicate {}", c.code);
                prop_assert!(a.contains(&c.code));
                prop_assert_eq!(c.manual, a.manual.contains(&c.code));
                prop_assert_eq!(c.auto, a.auto.contains(&c.code));
            }
            if a.is_empty() {
                prop_assert!(got.is_empty());
            }
            if fallback {
                prop_assert_eq!(got.len(), a.total());
            }
        }

        #[test]
        fn detected_comes_before_requested(
            manual in prop::collection::btree_set(code(), 0..5),
            auto in prop::collection::btree_set(code(), 1..5),
            detected in code(),
            requested in code(),
        ) {
            let a = LanguageAvailability::new(manual, auto, Some(detected.clone()));
            let got = select_candidates(Some(&requested), &a);
            if a.contains(&detected) {
                prop_assert_eq!(got.first(), Some(&detected));
            }
            if a.contains(&requested) {
                let pos = got.iter().position(|c| c == &requested).unwrap();
                prop_assert!(pos <= 1);
                if let Some(v) = SelectionPolicy::default().orig_variants.get(&requested) {
                    if a.contains(v) && v != &detected {
                        prop_assert_eq!(got.get(pos + 1), Some(v));
                    }
                }
            }
        }
    }
}
