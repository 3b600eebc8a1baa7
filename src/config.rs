//! Run plan files
//!
//! A run plan is a TOML file describing one probabilistic test: how its
//! threshold is obtained, the baseline it draws on, the budgets it runs under
//! and how the executor's errors are handled.
//!
//! # Example plan
//!
//! ```toml
//! name = "answers_in_json"
//! caveats = ["model pinned to 2024-06 snapshot"]
//!
//! [threshold]
//! mode = "baseline"
//! samples = 100
//! confidence = 0.95
//!
//! [baseline]
//! successes = 951
//! samples = 1000
//!
//! [budget]
//! policy = "evaluate_partial"
//!
//! [budget.method]
//! resource = 50000
//!
//! [budget.suite]
//! time_ms = 600000
//!
//! [execution]
//! on_exception = "fail_sample"
//! static_charge = 400
//! ```

use crate::budget::{BudgetScope, ExhaustionPolicy, ScopeLevel};
use crate::controller::{ExecutionConfig, SampleRun};
use crate::error::{ConfigError, Result as ConfigResult};
use crate::threshold::{resolve, BaselineReference, ThresholdMode, ThresholdSpecification};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Limits for one budget scope; an omitted limit is unbounded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScopeLimits {
    /// Wall-clock limit in milliseconds
    #[serde(default)]
    pub time_ms: Option<u64>,

    /// Resource limit in caller-defined units
    #[serde(default)]
    pub resource: Option<u64>,

    /// Overrides the plan-wide exhaustion policy for this scope
    #[serde(default)]
    pub policy: Option<ExhaustionPolicy>,
}

impl ScopeLimits {
    fn is_unbounded(&self) -> bool {
        self.time_ms.is_none() && self.resource.is_none()
    }
}

/// `[budget]` section: method ⊂ class ⊂ suite
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetConfig {
    #[serde(default)]
    pub policy: ExhaustionPolicy,
    #[serde(default)]
    pub method: Option<ScopeLimits>,
    #[serde(default)]
    pub class: Option<ScopeLimits>,
    #[serde(default)]
    pub suite: Option<ScopeLimits>,
}

impl BudgetConfig {
    fn levels(&self) -> [(ScopeLevel, Option<&ScopeLimits>); 3] {
        [
            (ScopeLevel::Suite, self.suite.as_ref()),
            (ScopeLevel::Class, self.class.as_ref()),
            (ScopeLevel::Method, self.method.as_ref()),
        ]
    }

    pub fn validate(&self) -> ConfigResult<()> {
        for (level, limits) in self.levels() {
            if let Some(limits) = limits {
                if limits.is_unbounded() {
                    return Err(ConfigError::InvalidBudget(format!(
                        "{} scope declares neither time_ms nor resource",
                        level
                    )));
                }
            }
        }
        Ok(())
    }

    /// Build the scope chain and return its innermost scope
    ///
    /// Every scope is named after the plan; callers sharing a suite budget
    /// across plans should build that scope themselves and attach it with
    /// `BudgetScope::with_parent`.
    pub fn build(&self, name: &str) -> Option<Arc<BudgetScope>> {
        self.levels()
            .into_iter()
            .fold(None, |parent, (level, limits)| match limits {
                Some(limits) => {
                    let mut scope = BudgetScope::new(level, name)
                        .with_policy(limits.policy.unwrap_or(self.policy));
                    if let Some(ms) = limits.time_ms {
                        scope = scope.with_time_limit(Duration::from_millis(ms));
                    }
                    if let Some(resource) = limits.resource {
                        scope = scope.with_resource_limit(resource);
                    }
                    if let Some(parent) = parent {
                        scope = scope.with_parent(parent);
                    }
                    Some(scope.shared())
                }
                None => parent,
            })
    }
}

/// One probabilistic test loaded from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPlan {
    pub name: String,

    pub threshold: ThresholdMode,

    #[serde(default)]
    pub baseline: Option<BaselineReference>,

    #[serde(default)]
    pub budget: Option<BudgetConfig>,

    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Externally computed caveats copied onto every verdict
    #[serde(default)]
    pub caveats: Vec<String>,
}

impl RunPlan {
    /// Load a plan from a TOML file
    ///
    /// # Example
    ///
    /// ```no_run
    /// use veredicto::config::RunPlan;
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let plan = RunPlan::from_file("plans/answers_in_json.toml")?;
    /// let spec = plan.resolve()?;
    /// println!("{}: {} samples at {:.4}", plan.name, spec.samples, spec.threshold);
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_toml_str(&content).with_context(|| format!("Invalid plan {}", path.display()))
    }

    /// Parse a plan from TOML content
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML")
    }

    /// Check the budget and execution sections
    ///
    /// Threshold validation happens in `resolve`.
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(budget) = &self.budget {
            budget.validate()?;
        }
        if self.execution.static_charge == Some(0) {
            return Err(ConfigError::InvalidExecution(
                "static_charge must be > 0; omit it to use per-trial charges".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate the plan and resolve its threshold
    pub fn resolve(&self) -> ConfigResult<ThresholdSpecification> {
        self.validate()?;
        let spec = resolve(&self.threshold, self.baseline.as_ref())?;
        tracing::info!(
            plan = %self.name,
            samples = spec.samples,
            threshold = spec.threshold,
            "plan resolved"
        );
        Ok(spec)
    }

    /// Innermost budget scope built from `[budget]`, if any
    pub fn budget_scope(&self) -> Option<Arc<BudgetScope>> {
        self.budget.as_ref().and_then(|b| b.build(&self.name))
    }

    /// A ready run for an already resolved specification
    pub fn build_run(&self, spec: ThresholdSpecification) -> SampleRun {
        let mut run = SampleRun::new(spec)
            .with_config(self.execution.clone())
            .with_external_caveats(self.caveats.iter().cloned());
        if let Some(scope) = self.budget_scope() {
            run = run.with_budget(scope);
        }
        run
    }

    /// `resolve` followed by `build_run`
    pub fn prepare(&self) -> ConfigResult<SampleRun> {
        let spec = self.resolve()?;
        Ok(self.build_run(spec))
    }
}
