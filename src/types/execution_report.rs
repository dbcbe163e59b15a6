use std::fmt;
use std::time::Duration;

use crate::trace::Branch;

/// One step of a rule set run, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    ConditionEvaluated { rule: String, result: bool },
    ActionsExecuted { rule: String, branch: Branch },
    /// `rule` was marked for re-evaluation by the actions of `source`.
    RuleTriggered { source: String, rule: String },
    Halted { rule: String },
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::ConditionEvaluated { rule, result } => write!(f, "{rule}={result}"),
            TraceEvent::ActionsExecuted { rule, branch } => write!(f, "{rule}:{}", branch.as_str()),
            TraceEvent::RuleTriggered { source, rule } => write!(f, "{source}->{rule}"),
            TraceEvent::Halted { rule } => write!(f, "halt({rule})"),
        }
    }
}

/// Detailed result of [`RuleEngine::execute()`](crate::RuleEngine::execute).
///
/// Lists what happened in order, how many times each rule's actions ran, and
/// the wall-clock duration of the run.
#[derive(Debug, Clone)]
#[must_use]
pub struct ExecutionReport {
    events: Vec<TraceEvent>,
    execution_counts: Vec<(String, u64)>,
    halted: bool,
    duration: Duration,
}

impl ExecutionReport {
    pub(crate) fn new(
        events: Vec<TraceEvent>,
        execution_counts: Vec<(String, u64)>,
        halted: bool,
        duration: Duration,
    ) -> Self {
        Self {
            events,
            execution_counts,
            halted,
            duration,
        }
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Condition results for `rule`, in evaluation order.
    #[must_use]
    pub fn condition_results(&self, rule: &str) -> Vec<bool> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::ConditionEvaluated { rule: r, result } if r == rule => Some(*result),
                _ => None,
            })
            .collect()
    }

    /// Rule names in the order their conditions were evaluated, repeats included.
    #[must_use]
    pub fn evaluation_order(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::ConditionEvaluated { rule, .. } => Some(rule.as_str()),
                _ => None,
            })
            .collect()
    }

    /// How many times the actions of `rule` ran, or `None` for a rule that was
    /// not part of the run.
    #[must_use]
    pub fn execution_count(&self, rule: &str) -> Option<u64> {
        self.execution_counts
            .iter()
            .find(|(name, _)| name == rule)
            .map(|(_, n)| *n)
    }

    /// Whether a `Halt` action ended the run.
    #[must_use]
    pub fn halted(&self) -> bool {
        self.halted
    }

    /// Wall-clock duration of the run.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "events: [")?;
        for (i, e) in self.events.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{e}")?;
        }
        write!(f, "]")?;
        if self.halted {
            write!(f, ", halted")?;
        }
        write!(f, ", duration: {:?}", self.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExecutionReport {
        ExecutionReport::new(
            vec![
                TraceEvent::ConditionEvaluated {
                    rule: "r1".into(),
                    result: true,
                },
                TraceEvent::ActionsExecuted {
                    rule: "r1".into(),
                    branch: Branch::Then,
                },
                TraceEvent::RuleTriggered {
                    source: "r1".into(),
                    rule: "r2".into(),
                },
                TraceEvent::ConditionEvaluated {
                    rule: "r2".into(),
                    result: false,
                },
                TraceEvent::ConditionEvaluated {
                    rule: "r1".into(),
                    result: false,
                },
            ],
            vec![("r1".into(), 1), ("r2".into(), 0)],
            false,
            Duration::from_nanos(500),
        )
    }

    #[test]
    fn report_accessors() {
        let report = sample();
        assert_eq!(report.condition_results("r1"), [true, false]);
        assert_eq!(report.evaluation_order(), ["r1", "r2", "r1"]);
        assert_eq!(report.execution_count("r1"), Some(1));
        assert_eq!(report.execution_count("r2"), Some(0));
        assert_eq!(report.execution_count("r3"), None);
        assert!(!report.halted());
        assert_eq!(report.duration(), Duration::from_nanos(500));
    }

    #[test]
    fn report_display() {
        let s = sample().to_string();
        assert!(s.starts_with("events: [r1=true, r1:then, r1->r2, r2=false, r1=false]"));
        assert!(s.contains("duration: 500ns"));
    }

    #[test]
    fn report_display_halted() {
        let report = ExecutionReport::new(
            vec![TraceEvent::Halted { rule: "stop".into() }],
            vec![("stop".into(), 1)],
            true,
            Duration::from_nanos(100),
        );
        assert!(report.to_string().contains("[halt(stop)], halted"));
    }
}
