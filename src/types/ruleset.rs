use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;

use super::catalog::TypeCatalog;
use super::error::{ErrorCode, ErrorObject, ValidationError};
use super::execution_report::ExecutionReport;
use super::rule::Rule;
use super::ty::TypeId;
use super::value::ObjectRef;
use crate::cache::Cache;
use crate::engine::{EngineOptions, RuleEngine};
use crate::error::RuleError;
use crate::trace::TrackingContext;
use crate::validation::RuleValidation;

/// Which action side effects re-trigger other rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChainingBehavior {
    /// Every active rule is evaluated exactly once, in priority order.
    None,
    /// Only explicit `Update` actions trigger re-evaluation.
    UpdateOnly,
    /// Updates plus everything statements are found to write.
    #[default]
    Full,
}

/// Engines are cached per catalog and subject type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct EngineKey {
    catalog: usize,
    subject: TypeId,
}

/// Builder for constructing a [`RuleSet`].
///
/// # Example
///
/// ```
/// use rulechain::{this, ChainingBehavior, Rule, RuleAction, RuleSetBuilder};
///
/// let rule_set = RuleSetBuilder::new("Orders")
///     .chaining(ChainingBehavior::Full)
///     .rule(
///         Rule::new("Decrement")
///             .when(this().field("Count").gt(0_i32))
///             .then(RuleAction::assign(this().field("Count"), this().field("Count").sub(1_i32))),
///     )
///     .build();
/// assert_eq!(rule_set.rules().len(), 1);
/// ```
#[derive(Debug, Default)]
#[must_use]
pub struct RuleSetBuilder {
    name: String,
    description: Option<String>,
    chaining: ChainingBehavior,
    rules: Vec<Rule>,
    options: EngineOptions,
    cache_capacity: Option<usize>,
}

impl RuleSetBuilder {
    pub fn new(name: &str) -> Self {
        RuleSetBuilder {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_owned());
        self
    }

    pub fn chaining(mut self, chaining: ChainingBehavior) -> Self {
        self.chaining = chaining;
        self
    }

    /// Options used by engines the rule set builds for [`RuleSet::execute`].
    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Keep at most `max` engines, evicting the least recently used one. The
    /// default keeps one per catalog and subject type seen.
    pub fn engine_cache_capacity(mut self, max: usize) -> Self {
        self.cache_capacity = Some(max);
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Insert a rule at `index`, shifting later rules back.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(mut self, index: usize, rule: Rule) -> Self {
        self.rules.insert(index, rule);
        self
    }

    /// Drop every rule named `name`.
    pub fn remove(mut self, name: &str) -> Self {
        self.rules.retain(|r| r.name() != name);
        self
    }

    /// Replace the rule with the same name, or append it.
    pub fn set(mut self, rule: Rule) -> Self {
        match self.rules.iter_mut().find(|r| r.name() == rule.name()) {
            Some(slot) => *slot = rule,
            None => self.rules.push(rule),
        }
        self
    }

    /// Seal the definition. The result cannot be edited, only rebuilt through
    /// [`RuleSet::to_builder`].
    pub fn build(self) -> RuleSet {
        RuleSet {
            name: self.name,
            description: self.description,
            chaining: self.chaining,
            rules: self.rules,
            options: self.options,
            cache_capacity: self.cache_capacity,
            engines: self.cache_capacity.map_or_else(Cache::new, Cache::with_capacity),
        }
    }
}

/// A named, immutable collection of rules plus its chaining behavior.
///
/// [`execute`](Self::execute) compiles a [`RuleEngine`] the first time it sees a
/// subject type and reuses it afterwards. Only the build is done under the
/// cache lock, so several threads may run the same cached engine at once.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuleSet {
    name: String,
    description: Option<String>,
    chaining: ChainingBehavior,
    rules: Vec<Rule>,
    #[cfg_attr(feature = "serde", serde(skip))]
    options: EngineOptions,
    #[cfg_attr(feature = "serde", serde(skip))]
    cache_capacity: Option<usize>,
    #[cfg_attr(feature = "serde", serde(skip))]
    engines: Cache<EngineKey, Arc<RuleEngine>>,
}

impl RuleSet {
    pub fn builder(name: &str) -> RuleSetBuilder {
        RuleSetBuilder::new(name)
    }

    /// A builder holding a copy of this definition.
    pub fn to_builder(&self) -> RuleSetBuilder {
        RuleSetBuilder {
            name: self.name.clone(),
            description: self.description.clone(),
            chaining: self.chaining,
            rules: self.rules.clone(),
            options: self.options.clone(),
            cache_capacity: self.cache_capacity,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn chaining(&self) -> ChainingBehavior {
        self.chaining
    }

    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    #[must_use]
    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name() == name)
    }

    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Validate every rule against the subject type of `validation`.
    ///
    /// Problems accumulate in `validation`; duplicate rule names are reported
    /// once per repeat and checking carries on. Returns `false` if any error
    /// was added.
    pub fn validate(&self, validation: &mut RuleValidation) -> bool {
        validate_rules(&self.rules, validation)
    }

    /// Paths read by the conditions of the active rules, in rule order and
    /// without repeats. Only meaningful after [`validate`](Self::validate).
    #[must_use]
    pub fn dependencies(&self, validation: &RuleValidation) -> Vec<String> {
        let mut paths = IndexSet::new();
        for condition in self.rules.iter().filter(|r| r.is_active()).filter_map(Rule::condition) {
            paths.extend(condition.dependencies(validation));
        }
        paths.into_iter().collect()
    }

    /// Run the rule set against `subject`, building and caching an engine for
    /// its type on first use.
    ///
    /// # Errors
    ///
    /// [`RuleError::Validation`] if the rules do not validate against the
    /// subject's type, or any error raised by [`RuleEngine::execute_with_context`].
    pub fn execute(
        &self,
        catalog: &Arc<TypeCatalog>,
        subject: &ObjectRef,
        context: Option<&dyn TrackingContext>,
    ) -> Result<ExecutionReport, RuleError> {
        let engine = self.engine_for(catalog, subject.type_id())?;
        engine.execute_with_context(subject.clone(), context)
    }

    /// The cached engine for subjects of type `subject`, built if needed.
    ///
    /// # Errors
    ///
    /// [`RuleError::Validation`] if the rules do not validate.
    pub fn engine_for(&self, catalog: &Arc<TypeCatalog>, subject: TypeId) -> Result<Arc<RuleEngine>, RuleError> {
        let key = EngineKey {
            catalog: Arc::as_ptr(catalog) as usize,
            subject,
        };
        self.engines.get_or_build(key, || {
            let validation = RuleValidation::new(Arc::clone(catalog), subject);
            RuleEngine::with_options(self, validation, self.options.clone()).map(Arc::new)
        })
    }

    /// Number of engines currently cached.
    #[must_use]
    pub fn cached_engines(&self) -> usize {
        self.engines.len()
    }

    /// Drop every cached engine.
    pub fn clear_cache(&self) {
        self.engines.clear();
    }
}

pub(crate) fn validate_rules(rules: &[Rule], validation: &mut RuleValidation) -> bool {
    let before = validation.errors().error_count();
    let mut seen = HashSet::new();
    for rule in rules {
        if !rule.name().is_empty() && !seen.insert(rule.name()) {
            validation.add_error(
                ValidationError::new(
                    format!("rule set contains more than one rule named '{}'", rule.name()),
                    ErrorCode::DuplicateRules,
                )
                .with_object(ErrorObject::Rule(rule.name().to_owned())),
            );
        }
        rule.validate(validation);
    }
    validation.errors().error_count() == before
}

impl Clone for RuleSet {
    /// Copies the definition; the clone starts with an empty engine cache.
    fn clone(&self) -> Self {
        self.to_builder().build()
    }
}

impl PartialEq for RuleSet {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.chaining == other.chaining
            && self.rules == other.rules
    }
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("chaining", &self.chaining)
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RuleSet({}, {} rules, chaining {:?})",
            self.name,
            self.rules.len(),
            self.chaining,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{this, RuleAction, Value};
    use crate::validation::tests::order_catalog;

    fn decrement() -> Rule {
        Rule::new("Decrement")
            .priority(10)
            .when(this().field("Count").gt(0_i32))
            .then(RuleAction::assign(this().field("Count"), this().field("Count").sub(1_i32)))
    }

    #[test]
    fn builder_collects_rules() {
        let set = RuleSetBuilder::new("Orders")
            .description("order rules")
            .chaining(ChainingBehavior::UpdateOnly)
            .rule(decrement())
            .rule(Rule::new("Stop").when(this().field("Flag")).then(RuleAction::halt()))
            .build();
        assert_eq!(set.name(), "Orders");
        assert_eq!(set.description(), Some("order rules"));
        assert_eq!(set.chaining(), ChainingBehavior::UpdateOnly);
        assert_eq!(set.rules().len(), 2);
        assert_eq!(set.rules()[1].name(), "Stop");
    }

    #[test]
    fn builder_edits() {
        let set = RuleSet::builder("S")
            .rule(decrement())
            .insert(0, Rule::new("First").when(this().field("Flag")))
            .set(decrement().priority(1))
            .remove("First")
            .build();
        assert_eq!(set.rules().len(), 1);
        assert_eq!(set.rules()[0].get_priority(), 1);
    }

    #[test]
    fn duplicate_names_are_reported_and_validation_continues() {
        let (catalog, order) = order_catalog();
        let mut v = RuleValidation::new(catalog, order);
        let set = RuleSet::builder("S")
            .rule(decrement())
            .rule(decrement())
            .rule(Rule::new("Bad").when(this().field("Missing")))
            .build();
        assert!(!set.validate(&mut v));
        let codes: Vec<_> = v.errors().iter().map(|e| e.code()).collect();
        assert_eq!(codes, [ErrorCode::DuplicateRules, ErrorCode::UnknownFieldOrProperty]);
    }

    #[test]
    fn dependencies_cover_active_conditions() {
        let (catalog, order) = order_catalog();
        let mut v = RuleValidation::new(catalog, order);
        let set = RuleSet::builder("S")
            .rule(decrement())
            .rule(Rule::new("Again").when(this().field("Count").eq(0_i32)))
            .rule(Rule::new("Off").active(false).when(this().field("Name").eq("x")))
            .rule(Rule::new("Flagged").when(this().field("Flag")))
            .build();
        assert!(set.validate(&mut v));
        assert_eq!(set.dependencies(&v), ["this/Count/", "this/Flag/"]);
    }

    #[test]
    fn clone_and_equality_ignore_cache() {
        let set = RuleSet::builder("S").rule(decrement()).build();
        let copy = set.clone();
        assert_eq!(copy, set);
        assert_ne!(copy.to_builder().chaining(ChainingBehavior::None).build(), set);
        assert_eq!(set.to_string(), "RuleSet(S, 1 rules, chaining Full)");
    }

    #[test]
    fn execute_caches_engine_per_subject_type() {
        let (catalog, order) = order_catalog();
        let set = RuleSet::builder("S").rule(decrement()).build();
        let subject = catalog.instantiate(order);
        subject.set("Count", 3_i32);

        let report = set.execute(&catalog, &subject, None).unwrap();
        assert_eq!(report.execution_count("Decrement"), Some(3));
        assert_eq!(subject.get("Count"), Some(Value::Int32(0)));
        assert_eq!(set.cached_engines(), 1);

        set.execute(&catalog, &subject, None).unwrap();
        assert_eq!(set.cached_engines(), 1);
        set.clear_cache();
        assert_eq!(set.cached_engines(), 0);
    }

    #[test]
    fn bounded_cache_evicts_the_oldest_engine() {
        let (first_catalog, order) = order_catalog();
        let (second_catalog, second_order) = order_catalog();
        let set = RuleSet::builder("S")
            .engine_cache_capacity(1)
            .rule(decrement())
            .build();

        let first = set.engine_for(&first_catalog, order).unwrap();
        set.engine_for(&second_catalog, second_order).unwrap();
        assert_eq!(set.cached_engines(), 1);

        let rebuilt = set.engine_for(&first_catalog, order).unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(set.clone().to_builder().build().cached_engines(), 0);
    }

    #[test]
    fn invalid_rule_set_is_not_cached() {
        let (catalog, order) = order_catalog();
        let set = RuleSet::builder("S")
            .rule(Rule::new("Bad").when(this().field("Missing")))
            .build();
        let subject = catalog.instantiate(order);
        match set.execute(&catalog, &subject, None) {
            Err(RuleError::Validation(e)) => {
                assert_eq!(e.name, "S");
                assert_eq!(e.errors.len(), 1);
            }
            other => panic!("expected Validation, got {other:?}"),
        }
        assert_eq!(set.cached_engines(), 0);
    }
}
