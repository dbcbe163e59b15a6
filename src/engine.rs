//! The forward-chaining scheduler.
//!
//! Building a [`RuleEngine`] validates a rule set, orders its active rules by
//! priority and works out, for each rule and branch, which rules read what the
//! branch writes. Running it walks the ordered rules, re-evaluating any rule
//! whose inputs were written, until no rule is left pending or a `Halt` runs.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexSet;
use tracing::{debug, warn};

use crate::analysis;
use crate::error::RuleError;
use crate::evaluate::RuleExecution;
use crate::trace::{Branch, NullTracer, Tracer, TrackingContext};
use crate::types::{
    validate_rules, ChainingBehavior, ExecutionReport, ReevaluationBehavior, Rule, RuleAction,
    RuleSet, RuleSetValidationError, TraceEvent, Value,
};
use crate::validation::RuleValidation;

/// Run-time settings for engines.
///
/// ```
/// use std::sync::Arc;
/// use rulechain::{EngineOptions, TracingTracer};
///
/// let options = EngineOptions::new()
///     .max_reevaluations(1_000)
///     .tracer(Arc::new(TracingTracer));
/// assert_eq!(options.get_max_reevaluations(), Some(1_000));
/// ```
#[derive(Clone)]
#[must_use]
pub struct EngineOptions {
    max_reevaluations: Option<u64>,
    tracer: Arc<dyn Tracer>,
}

impl EngineOptions {
    /// No re-evaluation ceiling, no tracing.
    pub fn new() -> Self {
        EngineOptions {
            max_reevaluations: None,
            tracer: Arc::new(NullTracer),
        }
    }

    /// Fail a run once conditions have been re-evaluated more than `limit` times.
    pub fn max_reevaluations(mut self, limit: u64) -> Self {
        self.max_reevaluations = Some(limit);
        self
    }

    pub fn tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    #[must_use]
    pub fn get_max_reevaluations(&self) -> Option<u64> {
        self.max_reevaluations
    }

    #[must_use]
    pub fn get_tracer(&self) -> &Arc<dyn Tracer> {
        &self.tracer
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions::new()
    }
}

impl fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOptions")
            .field("max_reevaluations", &self.max_reevaluations)
            .field("tracing", &self.tracer.is_enabled())
            .finish()
    }
}

/// An active rule in execution order, with what it reads and what its
/// branches write and re-trigger.
///
/// Trigger lists hold positions in the engine's execution order.
#[derive(Debug, Clone, Default)]
pub struct RuleState {
    rule: usize,
    dependencies: Vec<String>,
    then_side_effects: Vec<String>,
    else_side_effects: Vec<String>,
    then_triggers: Vec<usize>,
    else_triggers: Vec<usize>,
}

impl RuleState {
    /// Paths the condition reads.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    #[must_use]
    pub fn side_effects(&self, branch: Branch) -> &[String] {
        match branch {
            Branch::Then => &self.then_side_effects,
            Branch::Else => &self.else_side_effects,
        }
    }

    #[must_use]
    pub fn triggers(&self, branch: Branch) -> &[usize] {
        match branch {
            Branch::Then => &self.then_triggers,
            Branch::Else => &self.else_triggers,
        }
    }
}

/// A validated, analyzed rule set ready to run.
///
/// The engine owns its copy of the rules together with the validation session
/// that checked them, and never changes after construction, so one engine may
/// run on several threads at once. Per-run state lives in each call.
pub struct RuleEngine {
    name: String,
    chaining: ChainingBehavior,
    rules: Box<[Rule]>,
    states: Vec<RuleState>,
    validation: RuleValidation,
    options: EngineOptions,
}

impl RuleEngine {
    /// Build an engine with the rule set's own options.
    ///
    /// # Errors
    ///
    /// [`RuleError::Validation`] carrying every problem found.
    pub fn new(rule_set: &RuleSet, validation: RuleValidation) -> Result<Self, RuleError> {
        Self::with_options(rule_set, validation, rule_set.options().clone())
    }

    /// # Errors
    ///
    /// [`RuleError::Validation`] carrying every problem found.
    pub fn with_options(
        rule_set: &RuleSet,
        mut validation: RuleValidation,
        options: EngineOptions,
    ) -> Result<Self, RuleError> {
        // clones keep their node ids, so results recorded for the copy match the originals
        let rules: Box<[Rule]> = rule_set.rules().into();
        validate_rules(&rules, &mut validation);
        if validation.errors().has_errors() {
            warn!(
                rule_set = rule_set.name(),
                errors = validation.errors().error_count(),
                "rule set failed validation"
            );
            return Err(RuleSetValidationError {
                name: rule_set.name().to_owned(),
                errors: validation.errors().clone(),
            }
            .into());
        }

        let mut order: Vec<usize> = (0..rules.len()).filter(|&i| rules[i].is_active()).collect();
        order.sort_by(|&a, &b| {
            rules[b]
                .get_priority()
                .cmp(&rules[a].get_priority())
                .then_with(|| rules[b].name().cmp(rules[a].name()))
        });

        let mut states: Vec<RuleState> = order
            .into_iter()
            .map(|rule| RuleState {
                rule,
                ..RuleState::default()
            })
            .collect();

        let chaining = rule_set.chaining();
        if chaining != ChainingBehavior::None {
            analyze(&rules, &mut states, chaining, &validation);
        }

        let engine = RuleEngine {
            name: rule_set.name().to_owned(),
            chaining,
            rules,
            states,
            validation,
            options,
        };
        engine.trace_analysis();
        debug!(
            rule_set = %engine.name,
            rules = engine.states.len(),
            chaining = ?chaining,
            "rule engine built"
        );
        Ok(engine)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn chaining(&self) -> ChainingBehavior {
        self.chaining
    }

    #[must_use]
    pub fn validation(&self) -> &RuleValidation {
        &self.validation
    }

    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Active rules in execution order.
    #[must_use]
    pub fn states(&self) -> &[RuleState] {
        &self.states
    }

    #[must_use]
    pub fn rule(&self, state: &RuleState) -> &Rule {
        &self.rules[state.rule]
    }

    /// Names of the active rules in execution order.
    #[must_use]
    pub fn rule_order(&self) -> Vec<&str> {
        self.states.iter().map(|s| self.rule(s).name()).collect()
    }

    /// The analyzed state of the active rule named `name`.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<&RuleState> {
        self.states.iter().find(|s| self.rule(s).name() == name)
    }

    /// Names of the rules re-triggered when `name` takes `branch`.
    #[must_use]
    pub fn triggered_by(&self, name: &str, branch: Branch) -> Option<Vec<&str>> {
        self.state(name).map(|s| self.trigger_names(s.triggers(branch)))
    }

    fn trigger_names(&self, triggers: &[usize]) -> Vec<&str> {
        triggers.iter().map(|&t| self.rule(&self.states[t]).name()).collect()
    }

    fn trace_analysis(&self) {
        let tracer = self.options.tracer.as_ref();
        if !tracer.is_enabled() || self.chaining == ChainingBehavior::None {
            return;
        }
        for state in &self.states {
            let rule = self.rule(state).name();
            tracer.condition_symbols(&self.name, rule, &state.dependencies);
            for branch in [Branch::Then, Branch::Else] {
                tracer.side_effect_symbols(&self.name, rule, branch, state.side_effects(branch));
                let triggered: Vec<String> = self
                    .trigger_names(state.triggers(branch))
                    .into_iter()
                    .map(str::to_owned)
                    .collect();
                tracer.triggers(&self.name, rule, branch, &triggered);
            }
        }
    }

    /// Run the rules against `subject`.
    ///
    /// # Errors
    ///
    /// See [`execute_with_context`](Self::execute_with_context).
    pub fn execute(&self, subject: impl Into<Value>) -> Result<ExecutionReport, RuleError> {
        self.execute_with_context(subject, None)
    }

    /// Run the rules against `subject`, reporting each condition result to
    /// `context` while tracing is enabled.
    ///
    /// # Errors
    ///
    /// - [`RuleError::InvalidArgument`] for a null subject.
    /// - [`RuleError::SubjectTypeMismatch`] when the subject's type is not the
    ///   validated one.
    /// - [`RuleError::Evaluation`] for the first failing condition or action.
    /// - [`RuleError::ReevaluationLimit`] when a configured ceiling is exceeded.
    pub fn execute_with_context(
        &self,
        subject: impl Into<Value>,
        context: Option<&dyn TrackingContext>,
    ) -> Result<ExecutionReport, RuleError> {
        let subject = subject.into();
        self.check_subject(&subject)?;

        let started = Instant::now();
        let tracer = self.options.tracer.as_ref();
        let tracing = tracer.is_enabled();
        if tracing {
            tracer.rule_set_started(&self.name);
        }

        let mut execution = RuleExecution::new(&self.validation, subject);
        if let Some(context) = context {
            execution = execution.with_context(context);
        }

        let n = self.states.len();
        let mut satisfied = vec![false; n];
        let mut evaluated = vec![false; n];
        let mut execution_counts = vec![0_u64; n];
        let mut reevaluations = 0_u64;
        let mut events = Vec::new();
        let mut halted = false;

        let mut i = 0;
        while i < n {
            if satisfied[i] {
                i += 1;
                continue;
            }
            satisfied[i] = true;
            let state = &self.states[i];
            let rule = self.rule(state);

            if evaluated[i] {
                reevaluations += 1;
                if let Some(limit) = self.options.max_reevaluations {
                    if reevaluations > limit {
                        warn!(rule_set = %self.name, limit, "re-evaluation limit exceeded");
                        return Err(RuleError::ReevaluationLimit {
                            rule_set: self.name.clone(),
                            limit,
                        });
                    }
                }
            }
            evaluated[i] = true;

            if tracing {
                tracer.rule_started(&self.name, rule.name());
            }
            let result = match rule.condition() {
                Some(condition) => condition.evaluate(&execution).map_err(|e| {
                    warn!(rule_set = %self.name, rule = rule.name(), error = %e, "condition failed");
                    e
                })?,
                None => false,
            };
            events.push(TraceEvent::ConditionEvaluated {
                rule: rule.name().to_owned(),
                result,
            });
            if tracing {
                tracer.rule_result(&self.name, rule.name(), result);
                if let Some(context) = context.filter(|c| c.correlation_id().is_some()) {
                    context.track_data(rule.name(), result);
                }
            }

            let branch = Branch::of(result);
            let actions = match branch {
                Branch::Then => rule.then_actions(),
                Branch::Else => rule.else_actions(),
            };
            if actions.is_empty() {
                i += 1;
                continue;
            }

            execution_counts[i] += 1;
            if tracing {
                tracer.branch_started(&self.name, rule.name(), branch);
            }
            events.push(TraceEvent::ActionsExecuted {
                rule: rule.name().to_owned(),
                branch,
            });
            for action in actions {
                action.execute(&mut execution).map_err(|e| {
                    warn!(rule_set = %self.name, rule = rule.name(), error = %e, "action failed");
                    e
                })?;
                if execution.halted() {
                    halted = true;
                    break;
                }
            }
            if halted {
                debug!(rule_set = %self.name, rule = rule.name(), "rule set halted");
                events.push(TraceEvent::Halted {
                    rule: rule.name().to_owned(),
                });
                break;
            }

            for &t in state.triggers(branch) {
                let target = self.rule(&self.states[t]);
                let eligible = execution_counts[t] == 0 || target.get_reevaluation() == ReevaluationBehavior::Always;
                if satisfied[t] && eligible {
                    satisfied[t] = false;
                    events.push(TraceEvent::RuleTriggered {
                        source: rule.name().to_owned(),
                        rule: target.name().to_owned(),
                    });
                    if tracing {
                        tracer.rule_triggered(&self.name, rule.name(), target.name());
                    }
                    if t < i {
                        i = t;
                    }
                }
            }
        }

        let counts = self
            .states
            .iter()
            .zip(execution_counts)
            .map(|(s, n)| (self.rule(s).name().to_owned(), n))
            .collect();
        Ok(ExecutionReport::new(events, counts, halted, started.elapsed()))
    }

    fn check_subject(&self, subject: &Value) -> Result<(), RuleError> {
        if subject.is_null() {
            return Err(RuleError::InvalidArgument("subject must not be null".into()));
        }
        let catalog = self.validation.catalog();
        let expected = self.validation.this_type();
        let actual = subject.runtime_type();
        if !catalog.is_assignable(expected, &actual) {
            return Err(RuleError::SubjectTypeMismatch {
                expected: catalog.type_name(expected),
                actual: catalog.type_name(&actual),
            });
        }
        Ok(())
    }
}

/// Fill in dependencies, side effects and triggers for every state.
fn analyze(rules: &[Rule], states: &mut [RuleState], chaining: ChainingBehavior, validation: &RuleValidation) {
    for state in states.iter_mut() {
        let rule = &rules[state.rule];
        state.dependencies = rule
            .condition()
            .map(|c| c.dependencies(validation))
            .unwrap_or_default();
        state.then_side_effects = side_effects(rule.then_actions(), chaining, validation);
        state.else_side_effects = side_effects(rule.else_actions(), chaining, validation);
    }

    let dependencies: Vec<Vec<String>> = states.iter().map(|s| s.dependencies.clone()).collect();
    let triggers = |effects: &[String]| -> Vec<usize> {
        dependencies
            .iter()
            .enumerate()
            .filter(|(_, deps)| analysis::intersects(effects, deps))
            .map(|(j, _)| j)
            .collect()
    };
    for state in states.iter_mut() {
        state.then_triggers = triggers(&state.then_side_effects);
        state.else_triggers = triggers(&state.else_side_effects);
    }
}

fn side_effects(actions: &[RuleAction], chaining: ChainingBehavior, validation: &RuleValidation) -> Vec<String> {
    let mut paths = IndexSet::new();
    for action in actions {
        if chaining == ChainingBehavior::UpdateOnly && !matches!(action, RuleAction::Update(_)) {
            continue;
        }
        paths.extend(action.side_effects(validation));
    }
    paths.into_iter().collect()
}

impl fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleEngine")
            .field("name", &self.name)
            .field("chaining", &self.chaining)
            .field("rule_order", &self.rule_order())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for RuleEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleEngine({}, [{}])", self.name, self.rule_order().join(", "))
    }
}
