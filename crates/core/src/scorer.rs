//! CVSS v3.1 score arithmetic.
//!
//! Implements the scoring formulas from the CVSS v3.1 specification: Base,
//! Temporal and Environmental equations plus the Roundup helper. Input is a
//! canonical vector string; anything outside the specification's grammar or
//! value domains is a validation error.

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("vector must start with CVSS:3.1")]
    BadPrefix,
    #[error("malformed metric segment: {0}")]
    MalformedSegment(String),
    #[error("unknown metric code: {0}")]
    UnknownMetric(String),
    #[error("duplicate metric code: {0}")]
    DuplicateMetric(String),
    #[error("invalid value {value} for metric {code}")]
    InvalidValue { code: String, value: String },
    #[error("missing mandatory base metric: {0}")]
    MissingBaseMetric(&'static str),
}

const MANDATORY: [&str; 8] = ["AV", "AC", "PR", "UI", "S", "C", "I", "A"];

/// Accepted values per code, per the v3.1 specification. The scorer accepts
/// `X` on every optional metric even where the resolution layer narrows the
/// domain.
const VALID: [(&str, &[&str]); 22] = [
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
    ("CR", &["X", "L", "M", "H"]),
    ("IR", &["X", "L", "M", "H"]),
    ("AR", &["X", "L", "M", "H"]),
    ("MAV", &["X", "N", "A", "L", "P"]),
    ("MAC", &["X", "L", "H"]),
    ("MPR", &["X", "N", "L", "H"]),
    ("MUI", &["X", "N", "R"]),
    ("MS", &["X", "U", "C"]),
    ("MC", &["X", "N", "L", "H"]),
    ("MI", &["X", "N", "L", "H"]),
    ("MA", &["X", "N", "L", "H"]),
];

/// A parsed, validated CVSS v3.1 vector.
#[derive(Debug, Clone)]
pub struct Cvss31 {
    metrics: BTreeMap<String, String>,
}

impl Cvss31 {
    pub fn parse(vector: &str) -> Result<Self, ScoreError> {
        let rest = vector
            .strip_prefix("CVSS:3.1/")
            .ok_or(ScoreError::BadPrefix)?;

        let mut metrics = BTreeMap::new();
        for segment in rest.split('/') {
            let (code, value) = segment
                .split_once(':')
                .ok_or_else(|| ScoreError::MalformedSegment(segment.to_string()))?;
            let valid = VALID
                .iter()
                .find(|(c, _)| *c == code)
                .map(|(_, vs)| *vs)
                .ok_or_else(|| ScoreError::UnknownMetric(code.to_string()))?;
            if !valid.contains(&value) {
                return Err(ScoreError::InvalidValue {
                    code: code.to_string(),
                    value: value.to_string(),
                });
            }
            if metrics.insert(code.to_string(), value.to_string()).is_some() {
                return Err(ScoreError::DuplicateMetric(code.to_string()));
            }
        }
        for code in MANDATORY {
            if !metrics.contains_key(code) {
                return Err(ScoreError::MissingBaseMetric(code));
            }
        }
        Ok(Self { metrics })
    }

    fn val(&self, code: &str) -> &str {
        self.metrics.get(code).map(String::as_str).unwrap_or("X")
    }

    /// Modified metric with fallback: `X` (or absent) means "use base".
    fn modified(&self, code: &str, base_code: &str) -> String {
        let v = self.val(code);
        if v == "X" {
            self.val(base_code).to_string()
        } else {
            v.to_string()
        }
    }

    pub fn base_score(&self) -> f64 {
        let scope_changed = self.val("S") == "C";
        let iss = 1.0
            - (1.0 - cia_weight(self.val("C")))
                * (1.0 - cia_weight(self.val("I")))
                * (1.0 - cia_weight(self.val("A")));
        let impact = if scope_changed {
            7.52 * (iss - 0.029) - 3.25 * (iss - 0.02).powi(15)
        } else {
            6.42 * iss
        };
        let exploitability = 8.22
            * av_weight(self.val("AV"))
            * ac_weight(self.val("AC"))
            * pr_weight(self.val("PR"), scope_changed)
            * ui_weight(self.val("UI"));
        if impact <= 0.0 {
            0.0
        } else if scope_changed {
            roundup((1.08 * (impact + exploitability)).min(10.0))
        } else {
            roundup((impact + exploitability).min(10.0))
        }
    }

    pub fn temporal_score(&self) -> f64 {
        roundup(
            self.base_score()
                * e_weight(self.val("E"))
                * rl_weight(self.val("RL"))
                * rc_weight(self.val("RC")),
        )
    }

    pub fn environmental_score(&self) -> f64 {
        let ms = self.modified("MS", "S");
        let scope_changed = ms == "C";

        let mc = cia_weight(&self.modified("MC", "C"));
        let mi = cia_weight(&self.modified("MI", "I"));
        let ma = cia_weight(&self.modified("MA", "A"));

        let miss = (1.0
            - (1.0 - requirement_weight(self.val("CR")) * mc)
                * (1.0 - requirement_weight(self.val("IR")) * mi)
                * (1.0 - requirement_weight(self.val("AR")) * ma))
            .min(0.915);

        let modified_impact = if scope_changed {
            7.52 * (miss - 0.029) - 3.25 * (miss * 0.9731 - 0.02).powi(13)
        } else {
            6.42 * miss
        };
        let modified_exploitability = 8.22
            * av_weight(&self.modified("MAV", "AV"))
            * ac_weight(&self.modified("MAC", "AC"))
            * pr_weight(&self.modified("MPR", "PR"), scope_changed)
            * ui_weight(&self.modified("MUI", "UI"));

        if modified_impact <= 0.0 {
            return 0.0;
        }
        let inner = if scope_changed {
            (1.08 * (modified_impact + modified_exploitability)).min(10.0)
        } else {
            (modified_impact + modified_exploitability).min(10.0)
        };
        roundup(
            roundup(inner)
                * e_weight(self.val("E"))
                * rl_weight(self.val("RL"))
                * rc_weight(self.val("RC")),
        )
    }
}

/// Roundup as defined in Appendix A of the specification: smallest number,
/// to one decimal place, that is equal to or higher than the input.
fn roundup(input: f64) -> f64 {
    let int_input = (input * 100_000.0).round() as i64;
    if int_input % 10_000 == 0 {
        int_input as f64 / 100_000.0
    } else {
        ((int_input / 10_000) as f64 + 1.0) / 10.0
    }
}

fn av_weight(v: &str) -> f64 {
    match v {
        "N" => 0.85,
        "A" => 0.62,
        "L" => 0.55,
        _ => 0.2,
    }
}

fn ac_weight(v: &str) -> f64 {
    match v {
        "L" => 0.77,
        _ => 0.44,
    }
}

fn pr_weight(v: &str, scope_changed: bool) -> f64 {
    match (v, scope_changed) {
        ("N", _) => 0.85,
        ("L", false) => 0.62,
        ("L", true) => 0.68,
        (_, false) => 0.27,
        (_, true) => 0.5,
    }
}

fn ui_weight(v: &str) -> f64 {
    match v {
        "N" => 0.85,
        _ => 0.62,
    }
}

fn cia_weight(v: &str) -> f64 {
    match v {
        "H" => 0.56,
        "L" => 0.22,
        _ => 0.0,
    }
}

fn e_weight(v: &str) -> f64 {
    match v {
        "U" => 0.91,
        "P" => 0.94,
        "F" => 0.97,
        _ => 1.0,
    }
}

fn rl_weight(v: &str) -> f64 {
    match v {
        "O" => 0.95,
        "T" => 0.96,
        "W" => 0.97,
        _ => 1.0,
    }
}

fn rc_weight(v: &str) -> f64 {
    match v {
        "U" => 0.92,
        "R" => 0.96,
        _ => 1.0,
    }
}

fn requirement_weight(v: &str) -> f64 {
    match v {
        "L" => 0.5,
        "H" => 1.5,
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundup_matches_specification_examples() {
        assert_eq!(roundup(4.02), 4.1);
        assert_eq!(roundup(4.0), 4.0);
        assert_eq!(roundup(0.0), 0.0);
        assert_eq!(roundup(9.76), 9.8);
    }

    #[test]
    fn critical_base_vector_scores_9_8() {
        let v = Cvss31::parse("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H").unwrap();
        assert_eq!(v.base_score(), 9.8);
    }

    #[test]
    fn no_impact_vector_scores_zero() {
        let v = Cvss31::parse("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:N/A:N").unwrap();
        assert_eq!(v.base_score(), 0.0);
    }

    #[test]
    fn scope_changed_uses_changed_weights() {
        // Published example: CVE-2017-5638 style vector scores 10.0.
        let v = Cvss31::parse("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:C/C:H/I:H/A:H").unwrap();
        assert_eq!(v.base_score(), 10.0);
    }

    #[test]
    fn temporal_score_discounts_base() {
        let v =
            Cvss31::parse("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H/E:U/RL:O/RC:U").unwrap();
        // 9.8 * 0.91 * 0.95 * 0.92 = 7.794... -> 7.8
        assert_eq!(v.temporal_score(), 7.8);
    }

    #[test]
    fn temporal_defaults_leave_base_unchanged() {
        let v =
            Cvss31::parse("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H/E:X/RL:X/RC:X").unwrap();
        assert_eq!(v.temporal_score(), v.base_score());
    }

    #[test]
    fn environmental_without_modifications_tracks_base() {
        let v = Cvss31::parse("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H").unwrap();
        assert_eq!(v.environmental_score(), v.base_score());
    }

    #[test]
    fn modified_metrics_override_base() {
        let v = Cvss31::parse(
            "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H/CR:H/IR:H/AR:H/MC:N/MI:N/MA:N",
        )
        .unwrap();
        assert_eq!(v.environmental_score(), 0.0);
    }

    #[test]
    fn rejects_bad_prefix() {
        assert!(matches!(
            Cvss31::parse("CVSS:3.0/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:N/A:N"),
            Err(ScoreError::BadPrefix)
        ));
    }

    #[test]
    fn rejects_unknown_code_and_value() {
        assert!(matches!(
            Cvss31::parse("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:N/A:N/ZZ:Q"),
            Err(ScoreError::UnknownMetric(_))
        ));
        assert!(matches!(
            Cvss31::parse("CVSS:3.1/AV:Q/AC:L/PR:N/UI:N/S:U/C:N/I:N/A:N"),
            Err(ScoreError::InvalidValue { .. })
        ));
    }

    #[test]
    fn rejects_missing_base_metric() {
        assert!(matches!(
            Cvss31::parse("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:N"),
            Err(ScoreError::MissingBaseMetric(_))
        ));
    }

    #[test]
    fn rejects_duplicate_metric() {
        assert!(matches!(
            Cvss31::parse("CVSS:3.1/AV:N/AV:L/AC:L/PR:N/UI:N/S:U/C:N/I:N/A:N"),
            Err(ScoreError::DuplicateMetric(_))
        ));
    }
}
