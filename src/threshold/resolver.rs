// Turns a declared ThresholdMode into a ThresholdSpecification
//
// Baseline-derived thresholds follow a two-step construction:
//   1. p_base = Wilson lower bound of the baseline at the one-sided z for `confidence`
//   2. threshold = p_base − z · sqrt(p_base · (1 − p_base) / test_samples)
// Step 1 is boundary-safe (a 1000/1000 baseline gives 0.9973, never 1.0), so
// step 2 always has non-zero variance and the perfect-baseline case needs no
// special handling.

use super::mode::{BaselineReference, ThresholdMode};
use super::spec::{ThresholdOrigin, ThresholdSpecification};
use crate::error::{ConfigError, Result};
use crate::statistics::{
    confidence_for_z, required_sample_size_for_power, standard_error, wilson_lower_bound,
    z_for_confidence, StatsError,
};

fn check_samples(samples: u64) -> Result<()> {
    if samples == 0 {
        return Err(ConfigError::ZeroSamples);
    }
    Ok(())
}

fn check_threshold(threshold: f64) -> Result<()> {
    if threshold.is_finite() && threshold > 0.0 && threshold < 1.0 {
        Ok(())
    } else {
        Err(ConfigError::ThresholdOutOfRange(threshold))
    }
}

fn check_confidence(confidence: f64) -> Result<()> {
    if confidence.is_finite() && confidence > 0.0 && confidence < 1.0 {
        Ok(())
    } else {
        Err(ConfigError::ConfidenceOutOfRange(confidence))
    }
}

fn require_baseline<'a>(
    baseline: Option<&'a BaselineReference>,
    mode: &'static str,
) -> Result<&'a BaselineReference> {
    let baseline = baseline.ok_or(ConfigError::MissingBaseline { mode })?;
    baseline.validate()?;
    Ok(baseline)
}

/// One-sided lower bound `p − z·SE(p, n)`, clamped at zero
fn one_sided_bound(p: f64, z: f64, n: u64) -> Result<f64> {
    let se = standard_error(p, n)?;
    Ok((p - z * se).max(0.0))
}

/// Resolve a threshold mode into a concrete specification
///
/// # Arguments
/// * `mode` - Declared threshold mode
/// * `baseline` - Prior measurement; required by `baseline` mode, optional otherwise
///
/// # Example
/// ```
/// use veredicto::threshold::{resolve, BaselineReference, ThresholdMode};
///
/// let mode = ThresholdMode::DerivedFromBaseline { samples: 100, confidence: 0.95 };
/// let spec = resolve(&mode, Some(&BaselineReference::new(1000, 1000))).unwrap();
/// assert!((spec.threshold - 0.989).abs() < 0.001);
/// ```
pub fn resolve(
    mode: &ThresholdMode,
    baseline: Option<&BaselineReference>,
) -> Result<ThresholdSpecification> {
    let spec = match *mode {
        ThresholdMode::Explicit {
            samples,
            min_pass_rate,
        } => {
            check_samples(samples)?;
            check_threshold(min_pass_rate)?;
            ThresholdSpecification {
                samples,
                threshold: min_pass_rate,
                origin: ThresholdOrigin::Explicit,
            }
        }

        ThresholdMode::DerivedFromBaseline {
            samples,
            confidence,
        } => {
            check_samples(samples)?;
            check_confidence(confidence)?;
            let baseline = require_baseline(baseline, "baseline")?;

            let z = z_for_confidence(confidence)?;
            let baseline_lower_bound = wilson_lower_bound(baseline.successes, baseline.samples, z)?;
            let threshold = one_sided_bound(baseline_lower_bound, z, samples)?;
            if threshold <= 0.0 {
                return Err(ConfigError::DegenerateThreshold(threshold));
            }

            ThresholdSpecification {
                samples,
                threshold,
                origin: ThresholdOrigin::DerivedFromBaseline {
                    baseline: baseline.clone(),
                    confidence,
                    baseline_lower_bound,
                },
            }
        }

        ThresholdMode::PowerDerived {
            reference_rate,
            confidence,
            power,
            min_detectable_effect,
        } => {
            check_confidence(confidence)?;
            if !(power.is_finite() && power > 0.0 && power < 1.0) {
                return Err(ConfigError::PowerOutOfRange(power));
            }
            let effect = min_detectable_effect.ok_or(ConfigError::MissingMinDetectableEffect)?;
            let z = z_for_confidence(confidence)?;

            let (reference, source) = match reference_rate {
                Some(rate) => {
                    if !(rate.is_finite() && rate > 0.0 && rate < 1.0) {
                        return Err(ConfigError::ReferenceRateOutOfRange(rate));
                    }
                    (rate, None)
                }
                None => {
                    let baseline = require_baseline(baseline, "power")?;
                    let rate = wilson_lower_bound(baseline.successes, baseline.samples, z)?;
                    (rate, Some(baseline.clone()))
                }
            };

            let alternative = reference - effect;
            if !(effect.is_finite() && effect > 0.0) || alternative < 0.0 {
                return Err(ConfigError::InvalidMinDetectableEffect { reference, effect });
            }

            let samples =
                required_sample_size_for_power(reference, alternative, 1.0 - confidence, power)
                    .map_err(|e| match e {
                        StatsError::NonFiniteSampleSize | StatsError::EqualProportions(_) => {
                            ConfigError::NonFiniteSampleSize
                        }
                        other => ConfigError::Statistics(other),
                    })?;

            let threshold = one_sided_bound(reference, z, samples)?;
            if threshold <= 0.0 {
                return Err(ConfigError::DegenerateThreshold(threshold));
            }

            ThresholdSpecification {
                samples,
                threshold,
                origin: ThresholdOrigin::PowerDerived {
                    reference_rate: reference,
                    confidence,
                    power,
                    min_detectable_effect: effect,
                    baseline: source,
                },
            }
        }

        ThresholdMode::ThresholdFirst {
            samples,
            min_pass_rate,
            reference_rate,
        } => {
            check_samples(samples)?;
            check_threshold(min_pass_rate)?;

            let (reference, source) = match (reference_rate, baseline) {
                (Some(rate), _) => {
                    if !(0.0..=1.0).contains(&rate) {
                        return Err(ConfigError::ReferenceRateOutOfRange(rate));
                    }
                    (Some(rate), None)
                }
                (None, Some(baseline)) => {
                    baseline.validate()?;
                    (Some(baseline.rate()), Some(baseline.clone()))
                }
                (None, None) => (None, None),
            };

            // SE is taken at the threshold, not at the reference rate.
            let implied_confidence = match reference {
                Some(rate) => {
                    let se = standard_error(min_pass_rate, samples)?;
                    Some(confidence_for_z((rate - min_pass_rate) / se)?)
                }
                None => None,
            };

            ThresholdSpecification {
                samples,
                threshold: min_pass_rate,
                origin: ThresholdOrigin::ThresholdFirst {
                    reference_rate: reference,
                    implied_confidence,
                    baseline: source,
                },
            }
        }
    };

    tracing::debug!(
        mode = mode.name(),
        samples = spec.samples,
        threshold = spec.threshold,
        required = spec.required_successes(),
        "resolved threshold"
    );

    Ok(spec)
}

impl ThresholdMode {
    /// Resolve this mode; see [`resolve`]
    pub fn resolve(&self, baseline: Option<&BaselineReference>) -> Result<ThresholdSpecification> {
        resolve(self, baseline)
    }
}
