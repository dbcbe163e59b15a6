//! Diagnostic sinks for rule set runs.
//!
//! The engine reports what it does through a [`Tracer`]. The default sink,
//! [`NullTracer`], drops everything; [`TracingTracer`] forwards to `tracing`.

use tracing::{debug, trace, Level};

/// Which action list of a rule ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    Then,
    Else,
}

impl Branch {
    #[must_use]
    pub fn of(result: bool) -> Self {
        if result {
            Branch::Then
        } else {
            Branch::Else
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Branch::Then => "then",
            Branch::Else => "else",
        }
    }
}

/// Receiver of structured diagnostic events. Every method defaults to a no-op.
pub trait Tracer: Send + Sync {
    /// Whether events should be produced at all. The engine skips building event
    /// payloads when this is `false`.
    fn is_enabled(&self) -> bool {
        false
    }

    fn rule_set_started(&self, _rule_set: &str) {}

    fn rule_started(&self, _rule_set: &str, _rule: &str) {}

    fn rule_result(&self, _rule_set: &str, _rule: &str, _result: bool) {}

    fn branch_started(&self, _rule_set: &str, _rule: &str, _branch: Branch) {}

    /// `rule` was marked for re-evaluation by a side effect of `source`.
    fn rule_triggered(&self, _rule_set: &str, _source: &str, _rule: &str) {}

    fn condition_symbols(&self, _rule_set: &str, _rule: &str, _symbols: &[String]) {}

    fn side_effect_symbols(&self, _rule_set: &str, _rule: &str, _branch: Branch, _symbols: &[String]) {}

    fn triggers(&self, _rule_set: &str, _rule: &str, _branch: Branch, _triggered: &[String]) {}
}

/// A tracer that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTracer;

impl Tracer for NullTracer {}

/// Forwards events to the `tracing` subscriber. Enabled when `DEBUG` is.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTracer;

impl Tracer for TracingTracer {
    fn is_enabled(&self) -> bool {
        tracing::enabled!(Level::DEBUG)
    }

    fn rule_set_started(&self, rule_set: &str) {
        debug!(rule_set, "executing rule set");
    }

    fn rule_started(&self, rule_set: &str, rule: &str) {
        trace!(rule_set, rule, "evaluating condition");
    }

    fn rule_result(&self, rule_set: &str, rule: &str, result: bool) {
        debug!(rule_set, rule, result, "condition evaluated");
    }

    fn branch_started(&self, rule_set: &str, rule: &str, branch: Branch) {
        debug!(rule_set, rule, branch = branch.as_str(), "executing actions");
    }

    fn rule_triggered(&self, rule_set: &str, source: &str, rule: &str) {
        debug!(rule_set, source, rule, "rule re-triggered");
    }

    fn condition_symbols(&self, rule_set: &str, rule: &str, symbols: &[String]) {
        trace!(rule_set, rule, symbols = ?symbols, "condition reads");
    }

    fn side_effect_symbols(&self, rule_set: &str, rule: &str, branch: Branch, symbols: &[String]) {
        trace!(rule_set, rule, branch = branch.as_str(), symbols = ?symbols, "actions write");
    }

    fn triggers(&self, rule_set: &str, rule: &str, branch: Branch, triggered: &[String]) {
        trace!(rule_set, rule, branch = branch.as_str(), triggers = ?triggered, "actions trigger");
    }
}

/// Host handle threaded through a run for tracking side-channel events.
pub trait TrackingContext: Send + Sync {
    /// Identifier of the host activity driving the run. Rule results are only
    /// tracked for contexts that have one.
    fn correlation_id(&self) -> Option<&str> {
        None
    }

    /// Called once per evaluated rule condition while tracing is enabled.
    fn track_data(&self, rule: &str, result: bool);
}
