//! Sequential sample controller
//!
//! ```text
//! READY ──run()──▶ RUNNING ──┬──▶ IMPOSSIBLE
//!                            ├──▶ SUCCESS_GUARANTEED
//!                            ├──▶ BUDGET_EXHAUSTED
//!                            ├──▶ ABORTED
//!                            └──▶ COMPLETED
//! ```
//!
//! Per trial: check budgets → (pace) → execute → charge → record → evaluate.

mod outcome;
mod run;

pub use outcome::{FixedPacing, NoProgress, Pacer, ProgressListener, TrialExecutor, TrialOutcome};
pub use run::{ExceptionPolicy, ExecutionConfig, RunPhase, RunState, SampleRun, TerminationReason};
