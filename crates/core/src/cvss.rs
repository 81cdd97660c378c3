//! CVSS v3.1 metric resolution.
//!
//! Merges fixed assignments, matched-vector values and domain defaults into
//! a complete metric assignment, builds the canonical vector strings, and
//! hands them to the scorer. Precedence per metric code: fixed > matched >
//! first enumerated domain value.

use crate::models::ResolvedCvss;
use crate::scorer::{Cvss31, ScoreError};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub const SCHEME: &str = "CVSS:3.1";

pub const BASE_CODES: [&str; 8] = ["AV", "AC", "PR", "UI", "S", "C", "I", "A"];
pub const TEMPORAL_CODES: [&str; 3] = ["E", "RL", "RC"];
pub const ENVIRONMENTAL_CODES: [&str; 11] = [
    "CR", "IR", "AR", "MAV", "MAC", "MPR", "MUI", "MS", "MC", "MI", "MA",
];

/// Declared value domains, in canonical declaration order. The first value
/// of each domain is the default used when neither tier knows the metric.
const DOMAINS: [(&str, &[&str]); 22] = [
    ("AV", &["N", "A", "L", "P"]),
    ("AC", &["L", "H"]),
    ("PR", &["N", "L", "H"]),
    ("UI", &["N", "R"]),
    ("S", &["U", "C"]),
    ("C", &["N", "L", "H"]),
    ("I", &["N", "L", "H"]),
    ("A", &["N", "L", "H"]),
    ("E", &["X", "U", "P", "F", "H"]),
    ("RL", &["X", "O", "T", "W", "U"]),
    ("RC", &["X", "U", "R", "C"]),
    ("CR", &["L", "M", "H"]),
    ("IR", &["L", "M", "H"]),
    ("AR", &["L", "M", "H"]),
    ("MAV", &["X", "N", "A", "L", "P"]),
    ("MAC", &["X", "L", "H"]),
    ("MPR", &["X", "N", "L", "H"]),
    ("MUI", &["X", "N", "R"]),
    ("MS", &["X", "U", "C"]),
    ("MC", &["X", "N", "L", "H"]),
    ("MI", &["X", "N", "L", "H"]),
    ("MA", &["X", "N", "L", "H"]),
];

pub fn domain(code: &str) -> Option<&'static [&'static str]> {
    DOMAINS.iter().find(|(c, _)| *c == code).map(|(_, d)| *d)
}

pub fn default_value(code: &str) -> Option<&'static str> {
    domain(code).and_then(|d| d.first().copied())
}

/// A complete assignment: every declared code mapped to a value, kept in
/// declaration order so vector strings are canonical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMetrics {
    assignments: Vec<(&'static str, String)>,
}

impl ResolvedMetrics {
    pub fn get(&self, code: &str) -> Option<&str> {
        self.assignments
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, v)| v.as_str())
    }

    fn parts(&self, codes: &[&str]) -> String {
        self.assignments
            .iter()
            .filter(|(c, _)| codes.contains(c))
            .map(|(c, v)| format!("{}:{}", c, v))
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn base_vector(&self) -> String {
        format!("{}/{}", SCHEME, self.parts(&BASE_CODES))
    }

    /// Temporal vector, or `None` when every temporal metric sits at its
    /// default and the vector would carry no information.
    pub fn temporal_vector(&self) -> Option<String> {
        let informative = TEMPORAL_CODES
            .iter()
            .any(|c| self.get(c) != default_value(c));
        if !informative {
            return None;
        }
        Some(format!(
            "{}/{}/{}",
            SCHEME,
            self.parts(&BASE_CODES),
            self.parts(&TEMPORAL_CODES)
        ))
    }

    pub fn environmental_vector(&self) -> String {
        format!(
            "{}/{}/{}",
            SCHEME,
            self.parts(&BASE_CODES),
            self.parts(&ENVIRONMENTAL_CODES)
        )
    }
}

/// Three-tier precedence merge over the declared code list.
///
/// Fixed assignments win unconditionally; an out-of-domain fixed value is
/// surfaced later as a scorer validation failure for that record. Matched
/// values are only taken when they are inside the code's domain.
pub fn resolve(
    fixed: &BTreeMap<String, String>,
    matched: &BTreeMap<String, String>,
) -> ResolvedMetrics {
    let mut assignments = Vec::with_capacity(DOMAINS.len());
    for (code, domain) in DOMAINS {
        let value = if let Some(v) = fixed.get(code) {
            v.clone()
        } else if let Some(v) = matched.get(code) {
            if domain.contains(&v.as_str()) {
                v.clone()
            } else {
                warn!("ignoring out-of-domain matched value {}:{}", code, v);
                domain[0].to_string()
            }
        } else {
            domain[0].to_string()
        };
        assignments.push((code, value));
    }
    ResolvedMetrics { assignments }
}

/// Resolve metrics for one vulnerability and score the resulting vectors.
///
/// Scorer validation failures null the scores for this record only; the
/// offending base vector string is kept in the result for diagnostics.
pub fn score_record(
    description: &str,
    fixed: &BTreeMap<String, String>,
    matched: &BTreeMap<String, String>,
    temporal_fallback: Option<f64>,
) -> ResolvedCvss {
    let resolved = resolve(fixed, matched);
    let base_vector = resolved.base_vector();
    let temporal_vector = resolved.temporal_vector();
    let environmental_vector = resolved.environmental_vector();
    debug!("resolved base vector: {}", base_vector);

    let scored: Result<ResolvedCvss, ScoreError> = (|| {
        let base_score = Cvss31::parse(&base_vector)?.base_score();
        let temporal_score = match &temporal_vector {
            Some(tv) => Some(Cvss31::parse(tv)?.temporal_score()),
            None => temporal_fallback,
        };
        let environmental_score = Cvss31::parse(&environmental_vector)?.environmental_score();
        Ok(ResolvedCvss {
            description: description.to_string(),
            base_vector: base_vector.clone(),
            base_score: Some(base_score),
            temporal_vector: temporal_vector.clone(),
            temporal_score,
            environmental_vector: Some(environmental_vector.clone()),
            environmental_score: Some(environmental_score),
        })
    })();

    match scored {
        Ok(result) => result,
        Err(e) => {
            warn!("invalid CVSS vector for '{}': {}", truncate(description), e);
            ResolvedCvss {
                description: description.to_string(),
                base_vector,
                base_score: None,
                temporal_vector: None,
                temporal_score: None,
                environmental_vector: None,
                environmental_score: None,
            }
        }
    }
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(50) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn every_code_resolves_to_domain_value() {
        let resolved = resolve(&BTreeMap::new(), &BTreeMap::new());
        for (code, dom) in DOMAINS {
            let v = resolved.get(code).unwrap();
            assert!(dom.contains(&v), "{}:{} outside domain", code, v);
        }
    }

    #[test]
    fn fixed_wins_over_matched() {
        let fixed = map(&[("AV", "P")]);
        let matched = map(&[("AV", "N")]);
        let resolved = resolve(&fixed, &matched);
        assert_eq!(resolved.get("AV"), Some("P"));
    }

    #[test]
    fn matched_fills_unfixed_codes() {
        let fixed = map(&[("AC", "H")]);
        let matched = map(&[("AV", "A"), ("C", "H")]);
        let resolved = resolve(&fixed, &matched);
        assert_eq!(resolved.get("AC"), Some("H"));
        assert_eq!(resolved.get("AV"), Some("A"));
        assert_eq!(resolved.get("C"), Some("H"));
        assert_eq!(resolved.get("I"), Some("N"));
    }

    #[test]
    fn out_of_domain_matched_value_falls_back_to_default() {
        let matched = map(&[("AV", "Z")]);
        let resolved = resolve(&BTreeMap::new(), &matched);
        assert_eq!(resolved.get("AV"), Some("N"));
    }

    #[test]
    fn resolution_is_idempotent() {
        let fixed = map(&[("AV", "L"), ("E", "F")]);
        let matched = map(&[("C", "H"), ("RL", "O")]);
        let a = resolve(&fixed, &matched);
        let b = resolve(&fixed, &matched);
        assert_eq!(a.base_vector(), b.base_vector());
        assert_eq!(a.temporal_vector(), b.temporal_vector());
        assert_eq!(a.environmental_vector(), b.environmental_vector());
    }

    #[test]
    fn base_vector_uses_declaration_order() {
        let resolved = resolve(&BTreeMap::new(), &BTreeMap::new());
        assert_eq!(
            resolved.base_vector(),
            "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:N/A:N"
        );
    }

    #[test]
    fn temporal_vector_omitted_at_defaults() {
        let resolved = resolve(&BTreeMap::new(), &BTreeMap::new());
        assert!(resolved.temporal_vector().is_none());

        let fixed = map(&[("E", "F")]);
        let resolved = resolve(&fixed, &BTreeMap::new());
        let tv = resolved.temporal_vector().unwrap();
        assert!(tv.ends_with("/E:F/RL:X/RC:X"));
    }

    #[test]
    fn score_record_reports_scores_for_valid_input() {
        let fixed = map(&[("C", "H"), ("I", "H"), ("A", "H")]);
        let result = score_record("remote code execution", &fixed, &BTreeMap::new(), None);
        assert_eq!(result.base_score, Some(9.8));
        assert!(result.environmental_score.is_some());
        assert_eq!(result.temporal_score, None);
        assert!(result.temporal_vector.is_none());
    }

    #[test]
    fn temporal_fallback_is_reported_when_uninformative() {
        let result = score_record("x", &BTreeMap::new(), &BTreeMap::new(), Some(6.5));
        assert_eq!(result.temporal_score, Some(6.5));
        assert!(result.temporal_vector.is_none());
    }

    #[test]
    fn invalid_fixed_value_nulls_scores_only() {
        let fixed = map(&[("AV", "BOGUS")]);
        let result = score_record("x", &fixed, &BTreeMap::new(), None);
        assert!(result.base_vector.contains("AV:BOGUS"));
        assert_eq!(result.base_score, None);
        assert_eq!(result.environmental_score, None);
    }
}
