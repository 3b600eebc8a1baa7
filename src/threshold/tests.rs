// Threshold resolution scenarios
//
// Covers each declared mode end to end, including the boundary baselines
// (perfect and empty) and the configuration errors that must surface before a
// single trial runs.

use super::*;
use crate::error::ConfigError;

/// Perfect 1000/1000 baseline, 100 test samples at 95% → threshold ≈ 0.989
#[test]
fn test_perfect_baseline_derivation() {
    let mode = ThresholdMode::DerivedFromBaseline {
        samples: 100,
        confidence: 0.95,
    };
    let spec = resolve(&mode, Some(&BaselineReference::new(1000, 1000))).unwrap();

    assert_eq!(spec.samples, 100);
    assert!(
        (spec.threshold - 0.989).abs() < 0.001,
        "threshold {} should be ≈ 0.989",
        spec.threshold
    );
    assert!(spec.threshold < 1.0);
    assert_eq!(spec.required_successes(), 99);
    assert!(spec.is_baseline_derived());

    match spec.origin {
        ThresholdOrigin::DerivedFromBaseline {
            baseline_lower_bound,
            ..
        } => {
            let z2 = 1.6448536269514722_f64.powi(2);
            assert!((baseline_lower_bound - 1000.0 / (1000.0 + z2)).abs() < 1e-12);
        }
        other => panic!("Expected DerivedFromBaseline origin, got {:?}", other),
    }
}

#[test]
fn test_baseline_derivation_typical_rate() {
    let mode = ThresholdMode::DerivedFromBaseline {
        samples: 200,
        confidence: 0.95,
    };
    let spec = resolve(&mode, Some(&BaselineReference::new(900, 1000))).unwrap();

    // Below the raw 0.90 baseline rate, but not absurdly so
    assert!(spec.threshold < 0.90);
    assert!(spec.threshold > 0.82);
}

#[test]
fn test_smaller_test_sample_gives_lower_threshold() {
    let baseline = BaselineReference::new(950, 1000);
    let small = resolve(
        &ThresholdMode::DerivedFromBaseline {
            samples: 20,
            confidence: 0.95,
        },
        Some(&baseline),
    )
    .unwrap();
    let large = resolve(
        &ThresholdMode::DerivedFromBaseline {
            samples: 500,
            confidence: 0.95,
        },
        Some(&baseline),
    )
    .unwrap();

    assert!(small.threshold < large.threshold);
}

#[test]
fn test_baseline_mode_requires_baseline() {
    let mode = ThresholdMode::DerivedFromBaseline {
        samples: 100,
        confidence: 0.95,
    };
    assert_eq!(
        resolve(&mode, None),
        Err(ConfigError::MissingBaseline { mode: "baseline" })
    );
}

#[test]
fn test_empty_baseline_is_degenerate() {
    let mode = ThresholdMode::DerivedFromBaseline {
        samples: 100,
        confidence: 0.95,
    };
    let result = resolve(&mode, Some(&BaselineReference::new(0, 1000)));
    assert!(matches!(result, Err(ConfigError::DegenerateThreshold(_))));
}

#[test]
fn test_invalid_baseline_counts() {
    let mode = ThresholdMode::DerivedFromBaseline {
        samples: 100,
        confidence: 0.95,
    };
    assert!(matches!(
        resolve(&mode, Some(&BaselineReference::new(11, 10))),
        Err(ConfigError::InvalidBaseline { .. })
    ));
    assert!(matches!(
        resolve(&mode, Some(&BaselineReference::new(0, 0))),
        Err(ConfigError::InvalidBaseline { .. })
    ));
}

#[test]
fn test_explicit_threshold_bounds() {
    let ok = ThresholdMode::Explicit {
        samples: 10,
        min_pass_rate: 0.8,
    };
    assert_eq!(resolve(&ok, None).unwrap().required_successes(), 8);

    for bad in [0.0, 1.0, -0.1, 1.5, f64::NAN] {
        let mode = ThresholdMode::Explicit {
            samples: 10,
            min_pass_rate: bad,
        };
        assert!(
            matches!(resolve(&mode, None), Err(ConfigError::ThresholdOutOfRange(_))),
            "threshold {} should be rejected",
            bad
        );
    }
}

#[test]
fn test_explicit_zero_samples() {
    let mode = ThresholdMode::Explicit {
        samples: 0,
        min_pass_rate: 0.8,
    };
    assert_eq!(resolve(&mode, None), Err(ConfigError::ZeroSamples));
}

#[test]
fn test_power_mode_missing_effect() {
    let mode = ThresholdMode::PowerDerived {
        reference_rate: Some(0.95),
        confidence: 0.95,
        power: 0.8,
        min_detectable_effect: None,
    };
    assert_eq!(
        resolve(&mode, None),
        Err(ConfigError::MissingMinDetectableEffect)
    );
}

#[test]
fn test_power_mode_zero_effect() {
    let mode = ThresholdMode::PowerDerived {
        reference_rate: Some(0.95),
        confidence: 0.95,
        power: 0.8,
        min_detectable_effect: Some(0.0),
    };
    assert!(matches!(
        resolve(&mode, None),
        Err(ConfigError::InvalidMinDetectableEffect { .. })
    ));
}

#[test]
fn test_power_mode_vanishing_effect_is_non_finite() {
    let mode = ThresholdMode::PowerDerived {
        reference_rate: Some(0.5),
        confidence: 0.95,
        power: 0.8,
        min_detectable_effect: Some(1e-300),
    };
    assert_eq!(resolve(&mode, None), Err(ConfigError::NonFiniteSampleSize));
}

#[test]
fn test_power_mode_sample_size() {
    let mode = ThresholdMode::PowerDerived {
        reference_rate: Some(0.95),
        confidence: 0.95,
        power: 0.8,
        min_detectable_effect: Some(0.05),
    };
    let spec = resolve(&mode, None).unwrap();
    assert_eq!(spec.samples, 150);
    assert!(spec.threshold < 0.95 && spec.threshold > 0.90);
    assert!(!spec.is_baseline_derived());
}

#[test]
fn test_power_mode_reference_from_baseline() {
    let mode = ThresholdMode::PowerDerived {
        reference_rate: None,
        confidence: 0.95,
        power: 0.8,
        min_detectable_effect: Some(0.05),
    };
    let spec = resolve(&mode, Some(&BaselineReference::new(1000, 1000))).unwrap();
    assert!(spec.is_baseline_derived());
    match spec.origin {
        ThresholdOrigin::PowerDerived { reference_rate, .. } => {
            assert!(reference_rate < 1.0 && reference_rate > 0.99);
        }
        other => panic!("Expected PowerDerived origin, got {:?}", other),
    }
}

#[test]
fn test_power_mode_effect_larger_than_reference() {
    let mode = ThresholdMode::PowerDerived {
        reference_rate: Some(0.1),
        confidence: 0.95,
        power: 0.8,
        min_detectable_effect: Some(0.2),
    };
    assert!(matches!(
        resolve(&mode, None),
        Err(ConfigError::InvalidMinDetectableEffect { .. })
    ));
}

#[test]
fn test_threshold_first_implied_confidence() {
    let mode = ThresholdMode::ThresholdFirst {
        samples: 100,
        min_pass_rate: 0.9,
        reference_rate: Some(0.95),
    };
    let spec = resolve(&mode, None).unwrap();
    // z = (0.95 - 0.9) / sqrt(0.9·0.1/100) = 1.667 → ≈ 95.2%
    let implied = spec.implied_confidence().unwrap();
    assert!((implied - 0.952).abs() < 0.002, "implied {}", implied);
    assert_eq!(spec.threshold, 0.9);
}

#[test]
fn test_threshold_first_uses_baseline_rate() {
    let mode = ThresholdMode::ThresholdFirst {
        samples: 50,
        min_pass_rate: 0.8,
        reference_rate: None,
    };
    let spec = resolve(&mode, Some(&BaselineReference::new(850, 1000))).unwrap();
    assert!(spec.implied_confidence().unwrap() > 0.5);
    assert!(spec.is_baseline_derived());
}

#[test]
fn test_threshold_first_without_reference() {
    let mode = ThresholdMode::ThresholdFirst {
        samples: 50,
        min_pass_rate: 0.8,
        reference_rate: None,
    };
    let spec = resolve(&mode, None).unwrap();
    assert_eq!(spec.implied_confidence(), None);
}

#[test]
fn test_resolution_is_pure() {
    let mode = ThresholdMode::DerivedFromBaseline {
        samples: 100,
        confidence: 0.99,
    };
    let baseline = BaselineReference::new(970, 1000).with_metadata("model", "v3");
    let first = resolve(&mode, Some(&baseline)).unwrap();
    let second = resolve(&mode, Some(&baseline)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_mode_from_toml() {
    #[derive(serde::Deserialize)]
    struct Wrapper {
        threshold: ThresholdMode,
    }

    let parsed: Wrapper = toml::from_str(
        r#"
        [threshold]
        mode = "power"
        reference_rate = 0.9
        confidence = 0.95
        power = 0.8
        "#,
    )
    .unwrap();

    assert_eq!(
        parsed.threshold,
        ThresholdMode::PowerDerived {
            reference_rate: Some(0.9),
            confidence: 0.95,
            power: 0.8,
            min_detectable_effect: None,
        }
    );
}
