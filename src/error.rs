//! Configuration errors
//!
//! Raised eagerly while resolving a threshold or validating a run plan, before
//! any trial executes. A `ConfigError` is never a failing verdict: it means the
//! test could not be set up at all.

use crate::statistics::StatsError;
use thiserror::Error;

/// Errors for threshold resolution and run configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("sample count must be > 0")]
    ZeroSamples,

    #[error("threshold must be in (0, 1), got {0}")]
    ThresholdOutOfRange(f64),

    #[error("confidence must be in (0, 1), got {0}")]
    ConfidenceOutOfRange(f64),

    #[error("power must be in (0, 1), got {0}")]
    PowerOutOfRange(f64),

    #[error("reference rate must be in (0, 1), got {0}")]
    ReferenceRateOutOfRange(f64),

    #[error("power-derived threshold requires min_detectable_effect")]
    MissingMinDetectableEffect,

    #[error("min_detectable_effect must be > 0 and leave a rate >= 0 (reference {reference}, effect {effect})")]
    InvalidMinDetectableEffect { reference: f64, effect: f64 },

    #[error("required sample size is not finite")]
    NonFiniteSampleSize,

    #[error("{mode} threshold requires a baseline reference")]
    MissingBaseline { mode: &'static str },

    #[error("invalid baseline: {successes} successes out of {samples} samples")]
    InvalidBaseline { successes: u64, samples: u64 },

    #[error("derived threshold {0} is degenerate (baseline too weak for this sample size)")]
    DegenerateThreshold(f64),

    #[error("invalid budget: {0}")]
    InvalidBudget(String),

    #[error("invalid execution settings: {0}")]
    InvalidExecution(String),

    #[error(transparent)]
    Statistics(#[from] StatsError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
