// Resolved threshold specification

use super::mode::BaselineReference;
use serde::{Deserialize, Serialize};

/// Confidence level used for reporting intervals when the mode names none
pub const DEFAULT_REPORTING_CONFIDENCE: f64 = 0.95;

/// Absorbs floating-point overshoot in `threshold × samples` (0.7 × 10 = 7.000000000000001)
const REQUIRED_EPSILON: f64 = 1e-9;

/// Where a resolved threshold came from, with the inputs that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum ThresholdOrigin {
    Explicit,

    DerivedFromBaseline {
        baseline: BaselineReference,
        confidence: f64,
        /// One-sided Wilson lower bound of the baseline rate
        baseline_lower_bound: f64,
    },

    PowerDerived {
        reference_rate: f64,
        confidence: f64,
        power: f64,
        min_detectable_effect: f64,
        /// Baseline the reference rate was taken from, if any
        baseline: Option<BaselineReference>,
    },

    ThresholdFirst {
        reference_rate: Option<f64>,
        /// Diagnostic only; never used for pass/fail
        implied_confidence: Option<f64>,
        baseline: Option<BaselineReference>,
    },
}

/// A concrete `(samples, threshold)` pair, fixed before the first trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSpecification {
    /// Trials planned for the run
    pub samples: u64,
    /// Minimum observed success rate for a pass, in (0, 1)
    pub threshold: f64,
    pub origin: ThresholdOrigin,
}

impl ThresholdSpecification {
    /// Successes needed for a pass over `samples` trials: `ceil(threshold × samples)`
    pub fn required_successes_for(&self, samples: u64) -> u64 {
        let exact = self.threshold * samples as f64;
        (exact - REQUIRED_EPSILON).ceil().max(0.0) as u64
    }

    /// Successes needed over the full planned run
    pub fn required_successes(&self) -> u64 {
        self.required_successes_for(self.samples)
    }

    /// Successes still needed given the successes recorded so far
    pub fn successes_still_required(&self, successes: u64) -> u64 {
        self.required_successes().saturating_sub(successes)
    }

    /// Failures the planned run can absorb and still pass
    pub fn failures_tolerated(&self) -> u64 {
        self.samples - self.required_successes().min(self.samples)
    }

    /// No outcome of the remaining trials can reach the threshold
    pub fn is_impossible(&self, successes: u64, executed: u64) -> bool {
        let remaining = self.samples.saturating_sub(executed);
        successes + remaining < self.required_successes()
    }

    /// The threshold is met regardless of the remaining trials
    pub fn is_success_guaranteed(&self, successes: u64) -> bool {
        successes >= self.required_successes()
    }

    pub fn is_baseline_derived(&self) -> bool {
        match &self.origin {
            ThresholdOrigin::DerivedFromBaseline { .. } => true,
            ThresholdOrigin::PowerDerived { baseline, .. }
            | ThresholdOrigin::ThresholdFirst { baseline, .. } => baseline.is_some(),
            ThresholdOrigin::Explicit => false,
        }
    }

    pub fn baseline(&self) -> Option<&BaselineReference> {
        match &self.origin {
            ThresholdOrigin::DerivedFromBaseline { baseline, .. } => Some(baseline),
            ThresholdOrigin::PowerDerived { baseline, .. }
            | ThresholdOrigin::ThresholdFirst { baseline, .. } => baseline.as_ref(),
            ThresholdOrigin::Explicit => None,
        }
    }

    pub fn implied_confidence(&self) -> Option<f64> {
        match &self.origin {
            ThresholdOrigin::ThresholdFirst {
                implied_confidence, ..
            } => *implied_confidence,
            _ => None,
        }
    }

    /// Two-sided confidence used for the verdict's interval
    pub fn reporting_confidence(&self) -> f64 {
        match &self.origin {
            ThresholdOrigin::DerivedFromBaseline { confidence, .. }
            | ThresholdOrigin::PowerDerived { confidence, .. } => *confidence,
            _ => DEFAULT_REPORTING_CONFIDENCE,
        }
    }

    /// One-line provenance for reports
    pub fn describe_origin(&self) -> String {
        match &self.origin {
            ThresholdOrigin::Explicit => "explicit".to_string(),
            ThresholdOrigin::DerivedFromBaseline {
                baseline,
                confidence,
                baseline_lower_bound,
            } => format!(
                "derived from baseline {}/{} at {:.1}% confidence (baseline lower bound {:.4})",
                baseline.successes,
                baseline.samples,
                confidence * 100.0,
                baseline_lower_bound
            ),
            ThresholdOrigin::PowerDerived {
                reference_rate,
                confidence,
                power,
                min_detectable_effect,
                ..
            } => format!(
                "power analysis: reference {:.4}, effect {:.4}, {:.1}% confidence, {:.1}% power",
                reference_rate,
                min_detectable_effect,
                confidence * 100.0,
                power * 100.0
            ),
            ThresholdOrigin::ThresholdFirst {
                implied_confidence, ..
            } => match implied_confidence {
                Some(c) => format!("threshold-first (implied confidence {:.1}%)", c * 100.0),
                None => "threshold-first (no reference rate)".to_string(),
            },
        }
    }
}
