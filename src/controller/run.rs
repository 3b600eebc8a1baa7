// Sequential sample controller
//
// Drives trials strictly one at a time. Before each trial the budget chain is
// checked; after each trial the counts are updated and the run re-evaluates
// whether the threshold has become unreachable (IMPOSSIBLE) or already met
// (SUCCESS_GUARANTEED). Because trial i+1 never starts before trial i is fully
// recorded, skipping the remaining trials on either condition is sound.

use super::outcome::{NoProgress, Pacer, ProgressListener, TrialExecutor, TrialOutcome};
use crate::budget::{BudgetExhaustion, BudgetScope};
use crate::threshold::ThresholdSpecification;
use crate::verdict::{compose, Verdict};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What to do when the executor reports an error or panics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionPolicy {
    /// Count the trial as a failure and continue
    #[default]
    FailSample,
    /// Stop the run immediately with a distinct termination reason
    AbortTest,
}

/// Per-run execution settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub on_exception: ExceptionPolicy,

    /// Fixed resource charge per trial. When set, budgets are checked against
    /// it up front and the executor's own charge is ignored.
    pub static_charge: Option<u64>,

    /// Failure descriptions kept for the report
    pub max_example_failures: usize,

    /// Delay between trials in milliseconds
    pub pacing_ms: Option<u64>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            on_exception: ExceptionPolicy::FailSample,
            static_charge: None,
            max_example_failures: 5,
            pacing_ms: None,
        }
    }
}

impl ExecutionConfig {
    /// Abort on the first executor error and keep more failure examples
    pub fn strict() -> Self {
        Self {
            on_exception: ExceptionPolicy::AbortTest,
            max_example_failures: 20,
            ..Self::default()
        }
    }

    pub fn with_static_charge(mut self, charge: u64) -> Self {
        self.static_charge = Some(charge);
        self
    }

    pub fn with_exception_policy(mut self, policy: ExceptionPolicy) -> Self {
        self.on_exception = policy;
        self
    }
}

/// Why a run stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TerminationReason {
    /// Every planned trial ran without an early stop
    Completed,
    /// Even if every remaining trial succeeds the threshold cannot be reached
    Impossible { required: u64, max_reachable: u64 },
    /// The threshold is already met; the remaining trials were skipped
    SuccessGuaranteed { skipped: u64 },
    /// A budget scope ran out before the next trial
    BudgetExhausted(BudgetExhaustion),
    /// The executor failed under `ExceptionPolicy::AbortTest`
    Aborted { trial: u64, message: String },
}

impl TerminationReason {
    pub fn label(&self) -> &'static str {
        match self {
            TerminationReason::Completed => "COMPLETED",
            TerminationReason::Impossible { .. } => "IMPOSSIBLE",
            TerminationReason::SuccessGuaranteed { .. } => "SUCCESS_GUARANTEED",
            TerminationReason::BudgetExhausted(_) => "BUDGET_EXHAUSTED",
            TerminationReason::Aborted { .. } => "ABORTED",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Completed => f.write_str("all planned samples executed"),
            TerminationReason::Impossible {
                required,
                max_reachable,
            } => write!(
                f,
                "threshold unreachable: at most {} successes possible, {} required",
                max_reachable, required
            ),
            TerminationReason::SuccessGuaranteed { skipped } => {
                write!(f, "threshold already met, {} samples skipped", skipped)
            }
            TerminationReason::BudgetExhausted(exhaustion) => write!(f, "{}", exhaustion),
            TerminationReason::Aborted { trial, message } => {
                write!(f, "aborted at trial {}: {}", trial, message)
            }
        }
    }
}

/// Lifecycle of a run; terminal phases are absorbing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Ready,
    Running,
    Terminated(TerminationReason),
}

/// Counts owned and mutated only by one controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub samples_planned: u64,
    pub samples_executed: u64,
    pub successes: u64,
    pub failures: u64,
    pub resource_used: u64,
    pub elapsed: Duration,
    pub phase: RunPhase,
    pub failure_examples: Vec<String>,
}

impl RunState {
    fn new(samples_planned: u64) -> Self {
        Self {
            samples_planned,
            samples_executed: 0,
            successes: 0,
            failures: 0,
            resource_used: 0,
            elapsed: Duration::ZERO,
            phase: RunPhase::Ready,
            failure_examples: Vec::new(),
        }
    }

    /// State for trials recorded outside the controller (imported results)
    ///
    /// The phase is COMPLETED when every planned trial was recorded, otherwise
    /// the run stays READY and the caller supplies the reason to `compose`.
    pub fn recorded(samples_planned: u64, samples_executed: u64, successes: u64) -> Self {
        let successes = successes.min(samples_executed);
        let phase = if samples_executed >= samples_planned {
            RunPhase::Terminated(TerminationReason::Completed)
        } else {
            RunPhase::Ready
        };
        Self {
            samples_planned,
            samples_executed,
            successes,
            failures: samples_executed - successes,
            phase,
            ..Self::new(samples_planned)
        }
    }

    pub fn remaining(&self) -> u64 {
        self.samples_planned.saturating_sub(self.samples_executed)
    }

    /// `successes / samples_executed`, or 0 before any trial
    pub fn observed_rate(&self) -> f64 {
        if self.samples_executed == 0 {
            0.0
        } else {
            self.successes as f64 / self.samples_executed as f64
        }
    }

    pub fn termination(&self) -> Option<&TerminationReason> {
        match &self.phase {
            RunPhase::Terminated(reason) => Some(reason),
            _ => None,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

/// One probabilistic test run, constructed and driven by the caller
///
/// # Example
///
/// ```
/// use veredicto::controller::{SampleRun, TerminationReason, TrialOutcome};
/// use veredicto::threshold::{resolve, ThresholdMode};
///
/// let spec = resolve(&ThresholdMode::Explicit { samples: 10, min_pass_rate: 0.8 }, None).unwrap();
/// let verdict = SampleRun::new(spec).run(|_: u64| TrialOutcome::success());
///
/// assert!(verdict.passed);
/// assert_eq!(verdict.run.samples_executed, 8);
/// assert_eq!(verdict.termination, TerminationReason::SuccessGuaranteed { skipped: 2 });
/// ```
pub struct SampleRun {
    spec: ThresholdSpecification,
    config: ExecutionConfig,
    budget: Option<Arc<BudgetScope>>,
    pacer: Option<Box<dyn Pacer>>,
    external_caveats: Vec<String>,
    state: RunState,
}

impl fmt::Debug for SampleRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleRun")
            .field("spec", &self.spec)
            .field("config", &self.config)
            .field("budget", &self.budget.as_ref().map(|b| b.id().clone()))
            .field("paced", &self.pacer.is_some())
            .field("state", &self.state)
            .finish()
    }
}

impl SampleRun {
    pub fn new(spec: ThresholdSpecification) -> Self {
        let state = RunState::new(spec.samples);
        Self {
            spec,
            config: ExecutionConfig::default(),
            budget: None,
            pacer: None,
            external_caveats: Vec::new(),
            state,
        }
    }

    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        if self.pacer.is_none() {
            if let Some(ms) = config.pacing_ms {
                self.pacer = Some(Box::new(super::outcome::FixedPacing(Duration::from_millis(ms))));
            }
        }
        self.config = config;
        self
    }

    /// Innermost budget scope; its ancestors are charged and checked too
    pub fn with_budget(mut self, scope: Arc<BudgetScope>) -> Self {
        self.budget = Some(scope);
        self
    }

    pub fn with_pacer(mut self, pacer: impl Pacer + 'static) -> Self {
        self.pacer = Some(Box::new(pacer));
        self
    }

    /// Externally computed caveats (covariate mismatch, baseline expiry, ...),
    /// appended verbatim to the verdict
    pub fn with_external_caveats<I, S>(mut self, caveats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.external_caveats.extend(caveats.into_iter().map(Into::into));
        self
    }

    pub fn spec(&self) -> &ThresholdSpecification {
        &self.spec
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Run to termination and compose the verdict
    pub fn run<E: TrialExecutor>(self, executor: E) -> Verdict {
        self.run_with_progress(executor, &mut NoProgress)
    }

    /// Run to termination, reporting each trial to `listener`
    pub fn run_with_progress<E, L>(mut self, mut executor: E, listener: &mut L) -> Verdict
    where
        E: TrialExecutor,
        L: ProgressListener + ?Sized,
    {
        self.state.phase = RunPhase::Running;
        tracing::info!(
            samples = self.spec.samples,
            threshold = self.spec.threshold,
            required = self.spec.required_successes(),
            "starting probabilistic run"
        );

        let started = Instant::now();
        let reason = loop {
            if let Some(reason) = self.step(&mut executor, listener) {
                break reason;
            }
        };
        self.state.elapsed = started.elapsed();

        tracing::info!(
            reason = reason.label(),
            executed = self.state.samples_executed,
            successes = self.state.successes,
            "run terminated: {}",
            reason
        );
        self.state.phase = RunPhase::Terminated(reason.clone());

        compose(&self.spec, &self.state, &reason, &self.external_caveats)
    }

    /// Execute one trial, returning the terminal reason if the run is over
    fn step<E, L>(&mut self, executor: &mut E, listener: &mut L) -> Option<TerminationReason>
    where
        E: TrialExecutor,
        L: ProgressListener + ?Sized,
    {
        if self.state.remaining() == 0 {
            return Some(TerminationReason::Completed);
        }

        if let Some(scope) = &self.budget {
            if let Some(exhaustion) = scope.check(self.config.static_charge) {
                tracing::warn!(
                    executed = self.state.samples_executed,
                    "stopping: {}",
                    exhaustion
                );
                return Some(TerminationReason::BudgetExhausted(exhaustion));
            }
        }

        let index = self.state.samples_executed;
        if index > 0 {
            if let Some(delay) = self.pacer.as_mut().and_then(|p| p.delay_before(index)) {
                std::thread::sleep(delay);
            }
        }

        let trial_started = Instant::now();
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| executor.execute(index))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload);
                tracing::warn!(trial = index, "executor {}", message);
                TrialOutcome::errored(message)
            }
        };
        let trial_elapsed = trial_started.elapsed();

        let charge = self
            .config
            .static_charge
            .or(outcome.resource_charge)
            .unwrap_or(0);
        self.state.resource_used = self.state.resource_used.saturating_add(charge);
        if let Some(scope) = &self.budget {
            if let Some(overflow) = scope.charge(trial_elapsed, charge) {
                tracing::debug!(trial = index, "budget overflow recorded: {}", overflow);
            }
        }

        self.record(index, &outcome);
        listener.on_trial(index, &outcome);

        if let (Some(message), ExceptionPolicy::AbortTest) = (&outcome.error, self.config.on_exception) {
            return Some(TerminationReason::Aborted {
                trial: index,
                message: message.clone(),
            });
        }

        self.evaluate()
    }

    fn record(&mut self, index: u64, outcome: &TrialOutcome) {
        self.state.samples_executed += 1;
        if outcome.is_success() {
            self.state.successes += 1;
        } else {
            self.state.failures += 1;
            if self.state.failure_examples.len() < self.config.max_example_failures {
                let example = match &outcome.error {
                    Some(message) => format!("trial {}: {}", index, message),
                    None => format!("trial {} failed", index),
                };
                self.state.failure_examples.push(example);
            }
        }

        tracing::debug!(
            trial = index,
            success = outcome.is_success(),
            successes = self.state.successes,
            failures = self.state.failures,
            "trial recorded"
        );
    }

    /// Early-termination rules; impossibility is checked before success
    fn evaluate(&self) -> Option<TerminationReason> {
        let remaining = self.state.remaining();
        if remaining == 0 {
            return Some(TerminationReason::Completed);
        }

        let successes = self.state.successes;
        if self.spec.is_impossible(successes, self.state.samples_executed) {
            return Some(TerminationReason::Impossible {
                required: self.spec.required_successes(),
                max_reachable: successes + remaining,
            });
        }
        if self.spec.is_success_guaranteed(successes) {
            return Some(TerminationReason::SuccessGuaranteed { skipped: remaining });
        }
        None
    }
}
