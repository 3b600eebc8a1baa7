//! Veredicto - statistical verdicts for non-deterministic tests
//!
//! A probabilistic test runs the same trial many times and passes when the
//! observed success rate clears a threshold. This library resolves that
//! threshold (directly, from a baseline, from a power analysis, or with an
//! implied confidence), drives trials one at a time with early termination,
//! enforces time and resource budgets shared across concurrent runs, and
//! composes a verdict with a Wilson interval, a z-test and qualifying caveats.
//!
//! # Example
//!
//! ```
//! use veredicto::controller::{SampleRun, TrialOutcome};
//! use veredicto::threshold::{BaselineReference, ThresholdMode};
//!
//! let baseline = BaselineReference::new(951, 1000);
//! let mode = ThresholdMode::DerivedFromBaseline { samples: 50, confidence: 0.95 };
//! let spec = mode.resolve(Some(&baseline)).unwrap();
//!
//! let verdict = SampleRun::new(spec).run(|i: u64| TrialOutcome::from_bool(i % 25 != 0));
//! println!("{}", verdict.to_report_string());
//! ```

pub mod budget;
pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod statistics;
pub mod threshold;
pub mod verdict;

pub use budget::{BudgetScope, ExhaustionPolicy, ScopeLevel};
pub use config::RunPlan;
pub use controller::{SampleRun, TerminationReason, TrialOutcome};
pub use error::ConfigError;
pub use threshold::{resolve, BaselineReference, ThresholdMode, ThresholdSpecification};
pub use verdict::{compose, Caveat, Verdict};
