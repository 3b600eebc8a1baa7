// Declared threshold modes and the baseline they may draw on

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a test obtains its pass threshold
///
/// # Example TOML
///
/// ```toml
/// [threshold]
/// mode = "baseline"
/// samples = 100
/// confidence = 0.95
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ThresholdMode {
    /// Threshold and sample count given directly
    Explicit { samples: u64, min_pass_rate: f64 },

    /// Sample-size-first: threshold from a baseline's Wilson lower bound
    #[serde(rename = "baseline")]
    DerivedFromBaseline { samples: u64, confidence: f64 },

    /// Confidence-first: sample size from a power analysis
    ///
    /// When `reference_rate` is omitted, the baseline's Wilson lower bound at
    /// `confidence` is used instead.
    #[serde(rename = "power")]
    PowerDerived {
        #[serde(default)]
        reference_rate: Option<f64>,
        confidence: f64,
        power: f64,
        #[serde(default)]
        min_detectable_effect: Option<f64>,
    },

    /// Samples and threshold given; implied confidence reported as a caveat
    ///
    /// When `reference_rate` is omitted, the baseline's observed rate is used.
    ThresholdFirst {
        samples: u64,
        min_pass_rate: f64,
        #[serde(default)]
        reference_rate: Option<f64>,
    },
}

impl ThresholdMode {
    /// Short name used in logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            ThresholdMode::Explicit { .. } => "explicit",
            ThresholdMode::DerivedFromBaseline { .. } => "baseline",
            ThresholdMode::PowerDerived { .. } => "power",
            ThresholdMode::ThresholdFirst { .. } => "threshold_first",
        }
    }
}

/// A prior measurement of the same component
///
/// Only `successes` and `samples` are interpreted. `metadata` is carried through
/// untouched (e.g. recording date, model version) for report renderers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineReference {
    pub successes: u64,
    pub samples: u64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl BaselineReference {
    pub fn new(successes: u64, samples: u64) -> Self {
        Self {
            successes,
            samples,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Observed success rate of the baseline
    pub fn rate(&self) -> f64 {
        self.successes as f64 / self.samples as f64
    }

    pub fn validate(&self) -> Result<()> {
        if self.samples == 0 || self.successes > self.samples {
            return Err(ConfigError::InvalidBaseline {
                successes: self.successes,
                samples: self.samples,
            });
        }
        Ok(())
    }
}
