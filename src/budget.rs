//! Hierarchical time and resource budgets shared across runs
//!
//! Scopes form a parent chain: method ⊂ class ⊂ suite. A missing scope means no
//! limit at that level. Each scope tracks two independent counters:
//!
//! | Kind | Unit | Charged with |
//! |------|------|--------------|
//! | `Time` | nanoseconds | wall-clock duration of each trial |
//! | `Resource` | caller-defined units (tokens, requests, ...) | per-trial charge |
//!
//! # Concurrency
//!
//! A scope may be shared by many runs on different threads. Charges use an
//! atomic compare-and-update on the counter, so the exhausted/non-exhausted
//! decision is consistent with some serial order of charges: two concurrent
//! charges can never both succeed when only one fitted. A charge that does not
//! fit is still recorded (`consumed` may exceed `limit`) and flags the scope as
//! exhausted. The flag is observed by the *next* pre-trial check and is never
//! cleared.
//!
//! # Example
//!
//! ```
//! use veredicto::budget::{BudgetScope, ExhaustionPolicy, ScopeLevel};
//!
//! let suite = BudgetScope::new(ScopeLevel::Suite, "llm-suite")
//!     .with_resource_limit(10_000)
//!     .shared();
//! let method = BudgetScope::new(ScopeLevel::Method, "answers_in_json")
//!     .with_resource_limit(1_000)
//!     .with_policy(ExhaustionPolicy::EvaluatePartial)
//!     .with_parent(suite.clone())
//!     .shared();
//!
//! assert!(method.check(Some(500)).is_none());
//! ```

use crossbeam::utils::CachePadded;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Nesting level of a budget scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLevel {
    Method,
    Class,
    Suite,
}

impl fmt::Display for ScopeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScopeLevel::Method => "method",
            ScopeLevel::Class => "class",
            ScopeLevel::Suite => "suite",
        };
        f.write_str(s)
    }
}

/// Which counter of a scope ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetKind {
    Time,
    Resource,
}

impl fmt::Display for BudgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetKind::Time => f.write_str("time"),
            BudgetKind::Resource => f.write_str("resource"),
        }
    }
}

/// Effect of an exhausted scope on the final verdict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Always a failing verdict
    #[default]
    Fail,
    /// Compare the partial counts against the threshold as if complete
    EvaluatePartial,
}

/// Identity of a scope, reported when it is the one that ran out
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId {
    pub level: ScopeLevel,
    pub name: String,
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.level, self.name)
    }
}

/// Details of the scope that stopped a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetExhaustion {
    pub scope: ScopeId,
    pub kind: BudgetKind,
    pub policy: ExhaustionPolicy,
    pub limit: u64,
    pub consumed: u64,
}

impl fmt::Display for BudgetExhaustion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            BudgetKind::Time => write!(
                f,
                "{} time budget exhausted ({:?} of {:?})",
                self.scope,
                Duration::from_nanos(self.consumed),
                Duration::from_nanos(self.limit)
            ),
            BudgetKind::Resource => write!(
                f,
                "{} resource budget exhausted ({} of {} units)",
                self.scope, self.consumed, self.limit
            ),
        }
    }
}

/// Result of charging a single counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charge {
    /// The charge fitted within the limit (or there is no limit)
    Accepted,
    /// The charge was recorded but overflowed the limit
    Exhausted,
}

/// One atomically-updated counter with an optional limit
#[derive(Debug)]
struct Counter {
    limit: Option<u64>,
    consumed: CachePadded<AtomicU64>,
    exhausted: AtomicBool,
}

impl Counter {
    fn new(limit: Option<u64>) -> Self {
        Self {
            limit,
            consumed: CachePadded::new(AtomicU64::new(0)),
            exhausted: AtomicBool::new(false),
        }
    }

    fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Acquire)
    }

    fn try_charge(&self, amount: u64) -> Charge {
        // The closure never declines, so fetch_update always yields the prior value.
        let previous = match self.consumed.fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
            Some(c.saturating_add(amount))
        }) {
            Ok(prev) | Err(prev) => prev,
        };

        match self.limit {
            Some(limit) if previous.saturating_add(amount) > limit => {
                self.exhausted.store(true, Ordering::Release);
                Charge::Exhausted
            }
            _ => Charge::Accepted,
        }
    }

    /// Would a trial charging `next` (if known up front) overrun this counter?
    fn would_exceed(&self, next: Option<u64>) -> bool {
        let Some(limit) = self.limit else {
            return false;
        };
        if self.exhausted.load(Ordering::Acquire) {
            return true;
        }
        let consumed = self.consumed();
        match next {
            Some(charge) => consumed.saturating_add(charge) > limit,
            None => consumed >= limit,
        }
    }
}

/// Point-in-time view of one scope, for reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSnapshot {
    pub scope: ScopeId,
    pub time_limit_ns: Option<u64>,
    pub time_consumed_ns: u64,
    pub resource_limit: Option<u64>,
    pub resource_consumed: u64,
    pub exhausted: bool,
}

/// A budget container at one level of the hierarchy
#[derive(Debug)]
pub struct BudgetScope {
    id: ScopeId,
    policy: ExhaustionPolicy,
    time: Counter,
    resource: Counter,
    parent: Option<Arc<BudgetScope>>,
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

impl BudgetScope {
    /// Create an unlimited scope; add limits with the `with_*` builders
    pub fn new(level: ScopeLevel, name: impl Into<String>) -> Self {
        Self {
            id: ScopeId {
                level,
                name: name.into(),
            },
            policy: ExhaustionPolicy::default(),
            time: Counter::new(None),
            resource: Counter::new(None),
            parent: None,
        }
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time = Counter::new(Some(duration_nanos(limit)));
        self
    }

    pub fn with_resource_limit(mut self, limit: u64) -> Self {
        self.resource = Counter::new(Some(limit));
        self
    }

    pub fn with_policy(mut self, policy: ExhaustionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_parent(mut self, parent: Arc<BudgetScope>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Wrap in an `Arc` so the scope can be shared across runs and children
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn id(&self) -> &ScopeId {
        &self.id
    }

    pub fn policy(&self) -> ExhaustionPolicy {
        self.policy
    }

    pub fn parent(&self) -> Option<&Arc<BudgetScope>> {
        self.parent.as_ref()
    }

    pub fn time_consumed(&self) -> Duration {
        Duration::from_nanos(self.time.consumed())
    }

    pub fn resource_consumed(&self) -> u64 {
        self.resource.consumed()
    }

    pub fn is_exhausted(&self) -> bool {
        self.time.exhausted.load(Ordering::Acquire) || self.resource.exhausted.load(Ordering::Acquire)
    }

    /// This scope followed by its ancestors, innermost first
    pub fn chain(&self) -> impl Iterator<Item = &BudgetScope> {
        std::iter::successors(Some(self), |scope| scope.parent.as_deref())
    }

    fn exhaustion(&self, kind: BudgetKind) -> BudgetExhaustion {
        let counter = match kind {
            BudgetKind::Time => &self.time,
            BudgetKind::Resource => &self.resource,
        };
        BudgetExhaustion {
            scope: self.id.clone(),
            kind,
            policy: self.policy,
            limit: counter.limit.unwrap_or(u64::MAX),
            consumed: counter.consumed(),
        }
    }

    /// Pre-trial check of this scope alone
    ///
    /// `static_charge` is the resource charge the next trial will make when it
    /// is known up front; `None` means the charge is only known afterwards.
    pub fn check_local(&self, static_charge: Option<u64>) -> Option<BudgetExhaustion> {
        if self.time.would_exceed(None) {
            return Some(self.exhaustion(BudgetKind::Time));
        }
        if self.resource.would_exceed(static_charge) {
            return Some(self.exhaustion(BudgetKind::Resource));
        }
        None
    }

    /// Pre-trial check across the whole chain, stopping at the first
    /// exhausted scope (innermost first)
    pub fn check(&self, static_charge: Option<u64>) -> Option<BudgetExhaustion> {
        self.chain().find_map(|scope| scope.check_local(static_charge))
    }

    /// Charge one counter of this scope only
    pub fn try_charge(&self, kind: BudgetKind, amount: u64) -> Charge {
        match kind {
            BudgetKind::Time => self.time.try_charge(amount),
            BudgetKind::Resource => self.resource.try_charge(amount),
        }
    }

    /// Record a finished trial against every scope in the chain
    ///
    /// Every scope is charged even if an inner one overflowed. Returns the
    /// innermost overflow, if any; the run notices it at its next check.
    pub fn charge(&self, elapsed: Duration, resource: u64) -> Option<BudgetExhaustion> {
        let elapsed = duration_nanos(elapsed);
        let mut first = None;
        for scope in self.chain() {
            let time = scope.try_charge(BudgetKind::Time, elapsed);
            let res = scope.try_charge(BudgetKind::Resource, resource);
            if first.is_none() {
                if time == Charge::Exhausted {
                    first = Some(scope.exhaustion(BudgetKind::Time));
                } else if res == Charge::Exhausted {
                    first = Some(scope.exhaustion(BudgetKind::Resource));
                }
            }
        }
        first
    }

    pub fn snapshot(&self) -> ScopeSnapshot {
        ScopeSnapshot {
            scope: self.id.clone(),
            time_limit_ns: self.time.limit,
            time_consumed_ns: self.time.consumed(),
            resource_limit: self.resource.limit,
            resource_consumed: self.resource.consumed(),
            exhausted: self.is_exhausted(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_unlimited_scope_never_exhausts() {
        let scope = BudgetScope::new(ScopeLevel::Method, "m");
        assert_eq!(scope.charge(Duration::from_secs(3600), u64::MAX / 2), None);
        assert!(scope.check(Some(u64::MAX / 2)).is_none());
        assert!(!scope.is_exhausted());
    }

    #[test]
    fn test_static_charge_precheck() {
        let scope = BudgetScope::new(ScopeLevel::Method, "m").with_resource_limit(1000);

        assert!(scope.check(Some(500)).is_none());
        scope.charge(Duration::ZERO, 500);
        assert!(scope.check(Some(500)).is_none());
        scope.charge(Duration::ZERO, 500);

        let exhausted = scope.check(Some(500)).unwrap();
        assert_eq!(exhausted.kind, BudgetKind::Resource);
        assert_eq!(exhausted.consumed, 1000);
        assert_eq!(exhausted.limit, 1000);
        // Exactly at the limit is not an overflow
        assert!(!scope.is_exhausted());
    }

    #[test]
    fn test_dynamic_charge_detected_on_next_check() {
        let scope = BudgetScope::new(ScopeLevel::Method, "m").with_resource_limit(100);

        assert_eq!(scope.try_charge(BudgetKind::Resource, 80), Charge::Accepted);
        assert!(scope.check(None).is_none());
        assert_eq!(scope.try_charge(BudgetKind::Resource, 80), Charge::Exhausted);

        // The overflowing charge is kept, not undone
        assert_eq!(scope.resource_consumed(), 160);
        assert!(scope.is_exhausted());
        assert!(scope.check(None).is_some());
    }

    #[test]
    fn test_time_budget() {
        let scope = BudgetScope::new(ScopeLevel::Class, "c").with_time_limit(Duration::from_millis(10));
        scope.charge(Duration::from_millis(6), 0);
        assert!(scope.check(None).is_none());
        let overflow = scope.charge(Duration::from_millis(6), 0).unwrap();
        assert_eq!(overflow.kind, BudgetKind::Time);
        assert_eq!(scope.time_consumed(), Duration::from_millis(12));
        assert_eq!(scope.check(None).unwrap().kind, BudgetKind::Time);
    }

    #[test]
    fn test_chain_reports_innermost_first() {
        let suite = BudgetScope::new(ScopeLevel::Suite, "s")
            .with_resource_limit(10)
            .shared();
        let class = BudgetScope::new(ScopeLevel::Class, "c")
            .with_resource_limit(10)
            .with_parent(suite.clone())
            .shared();
        let method = BudgetScope::new(ScopeLevel::Method, "m")
            .with_policy(ExhaustionPolicy::EvaluatePartial)
            .with_parent(class.clone());

        method.charge(Duration::ZERO, 10);
        let hit = method.check(Some(1)).unwrap();
        assert_eq!(hit.scope.level, ScopeLevel::Class);
        assert_eq!(hit.policy, ExhaustionPolicy::Fail);

        let levels: Vec<_> = method.chain().map(|s| s.id().level).collect();
        assert_eq!(
            levels,
            vec![ScopeLevel::Method, ScopeLevel::Class, ScopeLevel::Suite]
        );
        assert_eq!(suite.resource_consumed(), 10);
    }

    #[test]
    fn test_concurrent_charges_only_one_fits() {
        for _ in 0..50 {
            let scope = BudgetScope::new(ScopeLevel::Suite, "s")
                .with_resource_limit(1)
                .shared();
            let accepted: usize = thread::scope(|s| {
                let handles: Vec<_> = (0..8)
                    .map(|_| {
                        let scope = scope.clone();
                        s.spawn(move || scope.try_charge(BudgetKind::Resource, 1))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap())
                    .filter(|c| *c == Charge::Accepted)
                    .count()
            });
            assert_eq!(accepted, 1);
            assert_eq!(scope.resource_consumed(), 8);
            assert!(scope.is_exhausted());
        }
    }

    #[test]
    fn test_display_formats() {
        let id = ScopeId {
            level: ScopeLevel::Class,
            name: "ChatTests".to_string(),
        };
        assert_eq!(id.to_string(), "class:ChatTests");

        let e = BudgetExhaustion {
            scope: id,
            kind: BudgetKind::Resource,
            policy: ExhaustionPolicy::Fail,
            limit: 1000,
            consumed: 1000,
        };
        assert!(e.to_string().contains("1000 of 1000 units"));
    }
}
