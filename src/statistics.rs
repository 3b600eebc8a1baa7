//! Binomial proportion statistics for pass/fail trial counts
//!
//! Pure, stateless functions used by the threshold resolver and the verdict
//! composer. Every bound here stays well-defined at the boundaries
//! (`p̂ ∈ {0, 1}`, tiny `n`), which is why the Wilson score family is used
//! instead of the plain normal approximation for anything computed from
//! observed counts.
//!
//! # Scientific Foundation
//!
//! - Wilson, E. B. (1927). Probable inference, the law of succession, and
//!   statistical inference. JASA 22(158). Score interval for a binomial proportion.
//! - Brown, Cai & DasGupta (2001). Interval estimation for a binomial proportion.
//!   Statistical Science 16(2). Wald intervals collapse at p̂ ∈ {0, 1}; Wilson does not.
//!
//! Normal quantiles and CDF values come from `statrs`.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use thiserror::Error;

/// Errors raised by the statistics functions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    #[error("sample count must be > 0")]
    ZeroSamples,

    #[error("successes ({successes}) exceed samples ({samples})")]
    SuccessesExceedSamples { successes: u64, samples: u64 },

    #[error("{name} must be in {range}, got {value}")]
    OutOfRange {
        name: &'static str,
        range: &'static str,
        value: f64,
    },

    #[error("z must be finite and non-negative, got {0}")]
    InvalidZ(f64),

    #[error("power analysis requires p0 != p1 (both are {0})")]
    EqualProportions(f64),

    #[error("required sample size is not finite")]
    NonFiniteSampleSize,

    #[error("normal distribution error: {0}")]
    Distribution(String),
}

pub type Result<T> = std::result::Result<T, StatsError>;

/// A two-sided confidence interval for a proportion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    /// Two-sided confidence level, e.g. 0.95
    pub confidence: f64,
}

impl ConfidenceInterval {
    /// The uninformative interval reported when nothing was observed
    pub fn unbounded(confidence: f64) -> Self {
        Self {
            lower: 0.0,
            upper: 1.0,
            confidence,
        }
    }

    pub fn contains(&self, rate: f64) -> bool {
        self.lower <= rate && rate <= self.upper
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// One-sided z-test of an observed rate against a reference proportion
///
/// The alternative hypothesis is "true rate is below `p0`", so a small
/// `p_value` is evidence of degradation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZTest {
    pub z: f64,
    pub p_value: f64,
}

fn standard_normal() -> Result<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| StatsError::Distribution(e.to_string()))
}

fn check_unit_open(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(StatsError::OutOfRange {
            name,
            range: "(0, 1)",
            value,
        })
    }
}

fn check_unit_closed(name: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(StatsError::OutOfRange {
            name,
            range: "[0, 1]",
            value,
        })
    }
}

fn check_counts(successes: u64, samples: u64) -> Result<()> {
    if samples == 0 {
        return Err(StatsError::ZeroSamples);
    }
    if successes > samples {
        return Err(StatsError::SuccessesExceedSamples { successes, samples });
    }
    Ok(())
}

/// One-sided normal quantile for a confidence level
///
/// `z_for_confidence(0.95)` ≈ 1.6449.
pub fn z_for_confidence(confidence: f64) -> Result<f64> {
    check_unit_open("confidence", confidence)?;
    Ok(standard_normal()?.inverse_cdf(confidence))
}

/// Two-sided normal quantile for a confidence level
///
/// `two_sided_z(0.95)` ≈ 1.96.
pub fn two_sided_z(confidence: f64) -> Result<f64> {
    check_unit_open("confidence", confidence)?;
    Ok(standard_normal()?.inverse_cdf(1.0 - (1.0 - confidence) / 2.0))
}

/// Standard normal CDF, i.e. the one-sided confidence implied by `z`
pub fn confidence_for_z(z: f64) -> Result<f64> {
    if z.is_nan() {
        return Err(StatsError::InvalidZ(z));
    }
    Ok(standard_normal()?.cdf(z))
}

/// One-sided Wilson score lower bound
///
/// # Arguments
/// * `successes` - Number of successful trials `k`
/// * `samples` - Number of trials `n` (must be > 0)
/// * `z` - One-sided critical value, e.g. 1.645 for 95%
///
/// The result always lies in `[0, k/n]`. At `k == n` it reduces to the closed
/// form `n / (n + z²)`, which is returned directly.
///
/// # Example
/// ```
/// use veredicto::statistics::wilson_lower_bound;
///
/// let lb = wilson_lower_bound(1000, 1000, 1.645).unwrap();
/// assert!((lb - 1000.0 / (1000.0 + 1.645 * 1.645)).abs() < 1e-15);
/// ```
pub fn wilson_lower_bound(successes: u64, samples: u64, z: f64) -> Result<f64> {
    check_counts(successes, samples)?;
    if !z.is_finite() || z < 0.0 {
        return Err(StatsError::InvalidZ(z));
    }

    let n = samples as f64;
    let z2 = z * z;

    if successes == samples {
        return Ok(n / (n + z2));
    }

    let p = successes as f64 / n;
    let denominator = 1.0 + z2 / n;
    let center = p + z2 / (2.0 * n);
    let spread = z * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt();

    Ok(((center - spread) / denominator).clamp(0.0, p))
}

/// Two-sided Wilson score interval for reporting
///
/// # Example
/// ```
/// use veredicto::statistics::wilson_interval;
///
/// let ci = wilson_interval(0, 20, 0.95).unwrap();
/// assert_eq!(ci.lower, 0.0);
/// assert!(ci.upper > 0.0 && ci.upper < 0.2);
/// ```
pub fn wilson_interval(successes: u64, samples: u64, confidence: f64) -> Result<ConfidenceInterval> {
    check_counts(successes, samples)?;
    let z = two_sided_z(confidence)?;

    let n = samples as f64;
    let p = successes as f64 / n;
    let z2 = z * z;
    let denominator = 1.0 + z2 / n;
    let center = (p + z2 / (2.0 * n)) / denominator;
    let spread = (z / denominator) * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt();

    let lower = if successes == 0 {
        0.0
    } else {
        (center - spread).clamp(0.0, p)
    };
    let upper = if successes == samples {
        1.0
    } else {
        (center + spread).clamp(p, 1.0)
    };

    Ok(ConfidenceInterval {
        lower,
        upper,
        confidence,
    })
}

/// `sqrt(p̂·(1 − p̂) / n)`
pub fn standard_error(p_hat: f64, n: u64) -> Result<f64> {
    check_unit_closed("p_hat", p_hat)?;
    if n == 0 {
        return Err(StatsError::ZeroSamples);
    }
    Ok((p_hat * (1.0 - p_hat) / n as f64).sqrt())
}

/// One-sided z-test of `p_hat` against `p0` over `n` trials
///
/// The null variance is taken at `p0`. When `p0 ∈ {0, 1}` that variance is
/// zero: any `p_hat ≥ p0` maps to `z = +∞, p = 1` and any `p_hat < p0` maps
/// to `z = −∞, p = 0`.
pub fn z_test(p_hat: f64, p0: f64, n: u64) -> Result<ZTest> {
    check_unit_closed("p_hat", p_hat)?;
    check_unit_closed("p0", p0)?;
    if n == 0 {
        return Err(StatsError::ZeroSamples);
    }

    let se = standard_error(p0, n)?;
    if se == 0.0 {
        return Ok(if p_hat >= p0 {
            ZTest {
                z: f64::INFINITY,
                p_value: 1.0,
            }
        } else {
            ZTest {
                z: f64::NEG_INFINITY,
                p_value: 0.0,
            }
        });
    }

    let z = (p_hat - p0) / se;
    Ok(ZTest {
        z,
        p_value: standard_normal()?.cdf(z),
    })
}

/// Sample size needed to detect a drop from `p0` to `p1`
///
/// Closed form: `n = ((z_α·√(p0·q0) + z_β·√(p1·q1)) / (p0 − p1))²`, rounded up,
/// with `z_α = Φ⁻¹(1 − alpha)` and `z_β = Φ⁻¹(power)`.
///
/// # Example
/// ```
/// use veredicto::statistics::required_sample_size_for_power;
///
/// let n = required_sample_size_for_power(0.95, 0.90, 0.05, 0.80).unwrap();
/// assert!(n > 100 && n < 400);
/// ```
pub fn required_sample_size_for_power(p0: f64, p1: f64, alpha: f64, power: f64) -> Result<u64> {
    check_unit_closed("p0", p0)?;
    check_unit_closed("p1", p1)?;
    check_unit_open("alpha", alpha)?;
    check_unit_open("power", power)?;
    if p0 == p1 {
        return Err(StatsError::EqualProportions(p0));
    }

    let normal = standard_normal()?;
    let z_alpha = normal.inverse_cdf(1.0 - alpha);
    let z_beta = normal.inverse_cdf(power);

    let numerator = z_alpha * (p0 * (1.0 - p0)).sqrt() + z_beta * (p1 * (1.0 - p1)).sqrt();
    let n = (numerator / (p0 - p1)).powi(2).ceil();

    if !n.is_finite() || n > u64::MAX as f64 {
        return Err(StatsError::NonFiniteSampleSize);
    }
    Ok((n as u64).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    const Z95: f64 = 1.6448536269514722;

    #[test]
    fn test_z_for_confidence_95() {
        let z = z_for_confidence(0.95).unwrap();
        assert!((z - Z95).abs() < 1e-9);
    }

    #[test]
    fn test_two_sided_z_95() {
        let z = two_sided_z(0.95).unwrap();
        assert!((z - 1.959963984540054).abs() < 1e-9);
    }

    #[test]
    fn test_z_for_confidence_rejects_bounds() {
        assert!(z_for_confidence(0.0).is_err());
        assert!(z_for_confidence(1.0).is_err());
        assert!(z_for_confidence(f64::NAN).is_err());
    }

    #[test]
    fn test_confidence_for_z_inverts_quantile() {
        let c = confidence_for_z(Z95).unwrap();
        assert!((c - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_wilson_lower_bound_perfect_closed_form() {
        let lb = wilson_lower_bound(100, 100, Z95).unwrap();
        assert_eq!(lb, 100.0 / (100.0 + Z95 * Z95));
    }

    #[test]
    fn test_wilson_lower_bound_zero_successes() {
        assert_eq!(wilson_lower_bound(0, 50, Z95).unwrap(), 0.0);
    }

    #[test]
    fn test_wilson_lower_bound_below_point_estimate() {
        let lb = wilson_lower_bound(80, 100, Z95).unwrap();
        assert!(lb < 0.8);
        assert!(lb > 0.7);
    }

    #[test]
    fn test_wilson_lower_bound_zero_z_is_point_estimate() {
        let lb = wilson_lower_bound(30, 40, 0.0).unwrap();
        assert!((lb - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_wilson_lower_bound_rejects_zero_samples() {
        assert_eq!(wilson_lower_bound(0, 0, Z95), Err(StatsError::ZeroSamples));
    }

    #[test]
    fn test_wilson_lower_bound_rejects_excess_successes() {
        assert!(matches!(
            wilson_lower_bound(11, 10, Z95),
            Err(StatsError::SuccessesExceedSamples { .. })
        ));
    }

    #[test]
    fn test_wilson_lower_bound_rejects_negative_z() {
        assert!(matches!(
            wilson_lower_bound(5, 10, -1.0),
            Err(StatsError::InvalidZ(_))
        ));
    }

    #[test]
    fn test_wilson_interval_perfect_run() {
        let ci = wilson_interval(10, 10, 0.95).unwrap();
        assert_eq!(ci.upper, 1.0);
        assert!(ci.lower > 0.6 && ci.lower < 0.8);
        assert!(ci.contains(1.0));
    }

    #[test]
    fn test_wilson_interval_brackets_estimate() {
        let ci = wilson_interval(45, 100, 0.95).unwrap();
        assert!(ci.contains(0.45));
        assert!(ci.width() > 0.15 && ci.width() < 0.25);
    }

    #[test]
    fn test_standard_error_basic() {
        let se = standard_error(0.5, 100).unwrap();
        assert!((se - 0.05).abs() < 1e-12);
        assert_eq!(standard_error(1.0, 10).unwrap(), 0.0);
        assert!(standard_error(0.5, 0).is_err());
        assert!(standard_error(1.5, 10).is_err());
    }

    #[test]
    fn test_z_test_below_reference() {
        let t = z_test(0.80, 0.90, 100).unwrap();
        assert!(t.z < -3.0);
        assert!(t.p_value < 0.001);
    }

    #[test]
    fn test_z_test_at_reference() {
        let t = z_test(0.9, 0.9, 50).unwrap();
        assert!(t.z.abs() < 1e-12);
        assert!((t.p_value - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_z_test_zero_variance_reference() {
        let pass = z_test(1.0, 1.0, 20).unwrap();
        assert_eq!(pass.z, f64::INFINITY);
        assert_eq!(pass.p_value, 1.0);

        let fail = z_test(0.95, 1.0, 20).unwrap();
        assert_eq!(fail.z, f64::NEG_INFINITY);
        assert_eq!(fail.p_value, 0.0);

        let floor = z_test(0.0, 0.0, 20).unwrap();
        assert_eq!(floor.z, f64::INFINITY);
    }

    #[test]
    fn test_required_sample_size_known_value() {
        // p0=0.95 → p1=0.90, alpha=0.05, power=0.80
        // (1.6449·0.2179 + 0.8416·0.3) / 0.05 = 12.2186 → n = 150
        let n = required_sample_size_for_power(0.95, 0.90, 0.05, 0.80).unwrap();
        assert_eq!(n, 150);
    }

    #[test]
    fn test_required_sample_size_grows_as_effect_shrinks() {
        let wide = required_sample_size_for_power(0.95, 0.85, 0.05, 0.8).unwrap();
        let narrow = required_sample_size_for_power(0.95, 0.93, 0.05, 0.8).unwrap();
        assert!(narrow > wide);
    }

    #[test]
    fn test_required_sample_size_equal_proportions() {
        assert_eq!(
            required_sample_size_for_power(0.9, 0.9, 0.05, 0.8),
            Err(StatsError::EqualProportions(0.9))
        );
    }

    #[test]
    fn test_required_sample_size_rejects_bad_power() {
        assert!(required_sample_size_for_power(0.9, 0.8, 0.05, 1.0).is_err());
        assert!(required_sample_size_for_power(0.9, 0.8, 0.0, 0.8).is_err());
    }
}
