use serde::{Deserialize, Serialize};

/// The outcome of a Critic's review of a rendered report (§3).
///
/// Invariant: `pass ⇔ score ≥ 0.8`, unless the producing Critic explicitly
/// overrides `pass` independently of `score` — both fields remain
/// authoritative in that case (§9 Open Question (a)); callers that want to
/// enforce the invariant should use [`ReviewVerdict::is_consistent`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewVerdict {
    /// Score in `[0, 1]`.
    pub score: f64,
    /// Whether the report passed review.
    pub pass: bool,
    /// Human-readable reasons, especially for failing reviews.
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// Score threshold at or above which a review conventionally passes.
pub const PASS_THRESHOLD: f64 = 0.8;

impl ReviewVerdict {
    /// `true` if `pass` agrees with the `score ≥ 0.8` convention.
    pub fn is_consistent(&self) -> bool {
        self.pass == (self.score >= PASS_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consistent_when_pass_matches_threshold() {
        let verdict = ReviewVerdict {
            score: 0.9,
            pass: true,
            reasons: vec![],
        };
        assert!(verdict.is_consistent());
    }

    #[test]
    fn inconsistent_when_producer_overrides_pass() {
        let verdict = ReviewVerdict {
            score: 0.5,
            pass: true,
            reasons: vec![],
        };
        assert!(!verdict.is_consistent());
    }

    #[test]
    fn roundtrips_through_json() {
        let verdict = ReviewVerdict {
            score: 0.5,
            pass: false,
            reasons: vec!["missing top section".to_string()],
        };
        let json = serde_json::to_string(&verdict).unwrap();
        let back: ReviewVerdict = serde_json::from_str(&json).unwrap();
        assert_eq!(verdict, back);
    }
}
