// Verdict composition for a terminated run
//
// Aggregates the frozen run counts and the resolved threshold into the single
// externally-visible result: pass/fail, observed rate over *executed* samples,
// a two-sided Wilson interval, a one-sided z-test against the threshold, the
// termination reason, and every caveat that applies.
//
// Pass/fail:
// - COMPLETED, BUDGET_EXHAUSTED(evaluate_partial): successes >= required_successes_for(executed)
// - SUCCESS_GUARANTEED: pass, IMPOSSIBLE / ABORTED: fail (fixed by the controller)
// - BUDGET_EXHAUSTED(fail): fail

use crate::budget::ExhaustionPolicy;
use crate::controller::{RunState, TerminationReason};
use crate::statistics::{wilson_interval, z_test, ConfidenceInterval};
use crate::threshold::ThresholdSpecification;
use serde::Serialize;
use std::fmt;

/// Below this many executed samples the normal-theory statistics are shaky
pub const SMALL_SAMPLE_THRESHOLD: u64 = 30;

/// A qualification attached to a verdict
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Caveat {
    SmallSample { executed: u64 },
    ZeroVariance { observed_rate: f64 },
    ImpliedConfidence { confidence: f64 },
    BaselineProvenance { successes: u64, samples: u64 },
    PartialEvaluation { executed: u64, planned: u64 },
    External { message: String },
}

impl fmt::Display for Caveat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Caveat::SmallSample { executed } => write!(
                f,
                "small sample: {} executed (< {}); interval and z-test are approximate",
                executed, SMALL_SAMPLE_THRESHOLD
            ),
            Caveat::ZeroVariance { observed_rate } => write!(
                f,
                "zero observed variance (rate {:.1}); the true rate may differ even though every sample agreed",
                observed_rate
            ),
            Caveat::ImpliedConfidence { confidence } => write!(
                f,
                "threshold chosen directly; implied confidence is {:.1}% (diagnostic only)",
                confidence * 100.0
            ),
            Caveat::BaselineProvenance { successes, samples } => write!(
                f,
                "threshold derived from baseline {}/{}; valid only while the baseline reflects current conditions",
                successes, samples
            ),
            Caveat::PartialEvaluation { executed, planned } => write!(
                f,
                "budget exhausted: evaluated {} of {} planned samples as if complete",
                executed, planned
            ),
            Caveat::External { message } => f.write_str(message),
        }
    }
}

/// Final, immutable result of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub passed: bool,
    /// successes / samples executed (not planned)
    pub observed_rate: f64,
    pub effective_threshold: f64,
    pub confidence_interval: ConfidenceInterval,
    /// One-sided z against the threshold; `None` when nothing executed
    pub z_score: Option<f64>,
    /// Lower-tail p-value; small values are evidence the rate is below threshold
    pub p_value: Option<f64>,
    pub termination: TerminationReason,
    pub caveats: Vec<Caveat>,
    pub threshold_origin: String,
    pub run: RunState,
}

/// Pass rule shared with the controller's early exits: enough successes for
/// the samples actually executed, counted with `required_successes_for`
fn decide(reason: &TerminationReason, spec: &ThresholdSpecification, state: &RunState) -> bool {
    let executed = state.samples_executed;
    let enough = executed > 0 && state.successes >= spec.required_successes_for(executed);
    match reason {
        TerminationReason::SuccessGuaranteed { .. } => true,
        TerminationReason::Impossible { .. } | TerminationReason::Aborted { .. } => false,
        TerminationReason::BudgetExhausted(exhaustion) => match exhaustion.policy {
            ExhaustionPolicy::Fail => false,
            ExhaustionPolicy::EvaluatePartial => enough,
        },
        TerminationReason::Completed => enough,
    }
}

/// Build the verdict for a terminated run
///
/// # Arguments
/// * `spec` - Threshold the run was planned against
/// * `state` - Frozen run counts
/// * `reason` - Terminal reason reached by the controller
/// * `external_caveats` - Caller-supplied caveats, appended verbatim
pub fn compose(
    spec: &ThresholdSpecification,
    state: &RunState,
    reason: &TerminationReason,
    external_caveats: &[String],
) -> Verdict {
    let executed = state.samples_executed;
    let observed_rate = state.observed_rate();
    let confidence = spec.reporting_confidence();

    let confidence_interval = if executed == 0 {
        ConfidenceInterval::unbounded(confidence)
    } else {
        wilson_interval(state.successes, executed, confidence).unwrap_or_else(|e| {
            tracing::warn!("interval unavailable: {}", e);
            ConfidenceInterval::unbounded(confidence)
        })
    };

    let test = if executed == 0 {
        None
    } else {
        z_test(observed_rate, spec.threshold, executed).ok()
    };

    let passed = decide(reason, spec, state);

    let mut caveats = Vec::new();
    if executed < SMALL_SAMPLE_THRESHOLD {
        caveats.push(Caveat::SmallSample { executed });
    }
    if executed > 0 && (observed_rate == 0.0 || observed_rate == 1.0) {
        caveats.push(Caveat::ZeroVariance { observed_rate });
    }
    if let Some(confidence) = spec.implied_confidence() {
        caveats.push(Caveat::ImpliedConfidence { confidence });
    }
    if let Some(baseline) = spec.baseline() {
        caveats.push(Caveat::BaselineProvenance {
            successes: baseline.successes,
            samples: baseline.samples,
        });
    }
    if let TerminationReason::BudgetExhausted(exhaustion) = reason {
        if exhaustion.policy == ExhaustionPolicy::EvaluatePartial {
            caveats.push(Caveat::PartialEvaluation {
                executed,
                planned: state.samples_planned,
            });
        }
    }
    caveats.extend(external_caveats.iter().map(|message| Caveat::External {
        message: message.clone(),
    }));

    Verdict {
        passed,
        observed_rate,
        effective_threshold: spec.threshold,
        confidence_interval,
        z_score: test.map(|t| t.z),
        p_value: test.map(|t| t.p_value),
        termination: reason.clone(),
        caveats,
        threshold_origin: spec.describe_origin(),
        run: state.clone(),
    }
}

impl Verdict {
    /// Samples planned but never executed
    pub fn samples_skipped(&self) -> u64 {
        self.run.remaining()
    }

    /// Generate human-readable report
    pub fn to_report_string(&self) -> String {
        let mut report = String::new();

        if self.passed {
            report.push_str("✅ PASS\n\n");
        } else {
            report.push_str("❌ FAIL\n\n");
        }

        report.push_str(&format!(
            "Observed rate: {:.4} ({}/{} samples, {} planned)\n",
            self.observed_rate, self.run.successes, self.run.samples_executed, self.run.samples_planned
        ));
        report.push_str(&format!(
            "Threshold: {:.4} ({})\n",
            self.effective_threshold, self.threshold_origin
        ));
        report.push_str(&format!(
            "{:.0}% interval: [{:.4}, {:.4}]\n",
            self.confidence_interval.confidence * 100.0,
            self.confidence_interval.lower,
            self.confidence_interval.upper
        ));
        if let (Some(z), Some(p)) = (self.z_score, self.p_value) {
            report.push_str(&format!("z = {:.3}, p = {:.4}\n", z, p));
        }
        report.push_str(&format!(
            "Termination: {} ({})\n",
            self.termination.label(),
            self.termination
        ));
        if self.run.resource_used > 0 {
            report.push_str(&format!("Resources used: {}\n", self.run.resource_used));
        }
        report.push_str(&format!("Elapsed: {:?}\n", self.run.elapsed));

        if !self.caveats.is_empty() {
            report.push_str(&format!("\n⚠️  Caveats ({}):\n", self.caveats.len()));
            for caveat in &self.caveats {
                report.push_str(&format!("  - {}\n", caveat));
            }
        }

        if !self.run.failure_examples.is_empty() {
            report.push_str(&format!(
                "\n🔍 Example failures ({} of {}):\n",
                self.run.failure_examples.len(),
                self.run.failures
            ));
            for example in &self.run.failure_examples {
                report.push_str(&format!("  - {}\n", example));
            }
        }

        report
    }
}
