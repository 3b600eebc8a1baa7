// Per-trial outcome and the caller-facing seams of the controller

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of one trial, returned by value from the executor
///
/// `resource_charge` is the dynamic charge for this trial (tokens, requests).
/// It is ignored when the run uses a static per-trial charge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialOutcome {
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_charge: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TrialOutcome {
    pub fn success() -> Self {
        Self {
            succeeded: true,
            ..Self::default()
        }
    }

    pub fn failure() -> Self {
        Self::default()
    }

    pub fn from_bool(succeeded: bool) -> Self {
        Self {
            succeeded,
            ..Self::default()
        }
    }

    /// An unexpected executor error; handled per `ExceptionPolicy`
    pub fn errored(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            resource_charge: None,
            error: Some(message.into()),
        }
    }

    pub fn with_charge(mut self, charge: u64) -> Self {
        self.resource_charge = Some(charge);
        self
    }

    /// Counts toward successes: succeeded and no error
    pub fn is_success(&self) -> bool {
        self.succeeded && self.error.is_none()
    }
}

/// Runs one trial of the component under test
///
/// Implemented for any `FnMut(u64) -> TrialOutcome`; the argument is the
/// zero-based trial index.
pub trait TrialExecutor {
    fn execute(&mut self, index: u64) -> TrialOutcome;
}

impl<F> TrialExecutor for F
where
    F: FnMut(u64) -> TrialOutcome,
{
    fn execute(&mut self, index: u64) -> TrialOutcome {
        self(index)
    }
}

/// Receives a synchronous event after every executed trial
pub trait ProgressListener {
    fn on_trial(&mut self, index: u64, outcome: &TrialOutcome);
}

impl<F> ProgressListener for F
where
    F: FnMut(u64, &TrialOutcome),
{
    fn on_trial(&mut self, index: u64, outcome: &TrialOutcome) {
        self(index, outcome)
    }
}

/// Listener that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressListener for NoProgress {
    fn on_trial(&mut self, _index: u64, _outcome: &TrialOutcome) {}
}

/// Supplies the inter-trial delay chosen by an external pacing scheduler
///
/// Consulted before every trial except the first. The controller only waits.
pub trait Pacer: Send {
    fn delay_before(&mut self, index: u64) -> Option<Duration>;
}

/// Same delay before every trial after the first
#[derive(Debug, Clone, Copy)]
pub struct FixedPacing(pub Duration);

impl Pacer for FixedPacing {
    fn delay_before(&mut self, _index: u64) -> Option<Duration> {
        (!self.0.is_zero()).then_some(self.0)
    }
}
