use std::fmt;

use super::action::RuleAction;
use super::error::{ErrorCode, ErrorObject, EvaluationError, ValidationError};
use super::expr::Expr;
use crate::analysis;
use crate::evaluate::RuleExecution;
use crate::validation::RuleValidation;

/// Whether a rule may run again after its actions have executed once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReevaluationBehavior {
    /// Once its actions have run, the rule is never re-triggered.
    Never,
    #[default]
    Always,
}

/// A boolean expression over the subject.
///
/// Conditions stored in a [`RuleConditionCollection`](super::RuleConditionCollection)
/// carry a name; a rule's inline condition has an empty one.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuleCondition {
    name: String,
    expression: Expr,
}

impl RuleCondition {
    #[must_use]
    pub fn new(expression: impl Into<Expr>) -> Self {
        RuleCondition {
            name: String::new(),
            expression: expression.into(),
        }
    }

    #[must_use]
    pub fn named(name: &str, expression: impl Into<Expr>) -> Self {
        RuleCondition {
            name: name.to_owned(),
            expression: expression.into(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn expression(&self) -> &Expr {
        &self.expression
    }

    /// Check that the expression is valid and boolean.
    pub fn validate(&self, validation: &mut RuleValidation) -> bool {
        validation.validate_condition(&self.expression)
    }

    /// # Errors
    ///
    /// Returns the evaluation failure, tagged with the condition text.
    pub fn evaluate(&self, execution: &RuleExecution<'_>) -> Result<bool, EvaluationError> {
        execution.evaluate_condition(&self.expression)
    }

    /// Paths the condition reads. Only meaningful after [`validate`](Self::validate).
    #[must_use]
    pub fn dependencies(&self, validation: &RuleValidation) -> Vec<String> {
        analysis::expression_dependencies(validation, &self.expression)
    }
}

impl fmt::Display for RuleCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}

impl From<Expr> for RuleCondition {
    fn from(expression: Expr) -> Self {
        RuleCondition::new(expression)
    }
}

/// A named, prioritized condition with then and else actions.
///
/// Built with chained setters and immutable once added to a
/// [`RuleSet`](super::RuleSet).
///
/// ```
/// use rulechain::{this, Rule, RuleAction};
///
/// let rule = Rule::new("Decrement")
///     .priority(10)
///     .when(this().field("Count").gt(0_i32))
///     .then(RuleAction::assign(this().field("Count"), this().field("Count").sub(1_i32)));
/// assert_eq!(rule.to_string(), "Decrement: IF this.Count > 0 THEN this.Count = this.Count - 1");
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[must_use]
pub struct Rule {
    name: String,
    description: Option<String>,
    priority: i32,
    reevaluation: ReevaluationBehavior,
    active: bool,
    condition: Option<RuleCondition>,
    then_actions: Vec<RuleAction>,
    else_actions: Vec<RuleAction>,
}

impl Rule {
    pub fn new(name: &str) -> Self {
        Rule {
            name: name.to_owned(),
            description: None,
            priority: 0,
            reevaluation: ReevaluationBehavior::default(),
            active: true,
            condition: None,
            then_actions: Vec::new(),
            else_actions: Vec::new(),
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_owned());
        self
    }

    /// Higher priorities run first.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn reevaluation(mut self, behavior: ReevaluationBehavior) -> Self {
        self.reevaluation = behavior;
        self
    }

    /// Inactive rules are validated but never executed.
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn when(mut self, condition: impl Into<RuleCondition>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn then(mut self, action: impl Into<RuleAction>) -> Self {
        self.then_actions.push(action.into());
        self
    }

    pub fn otherwise(mut self, action: impl Into<RuleAction>) -> Self {
        self.else_actions.push(action.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn get_description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn get_priority(&self) -> i32 {
        self.priority
    }

    #[must_use]
    pub fn get_reevaluation(&self) -> ReevaluationBehavior {
        self.reevaluation
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn condition(&self) -> Option<&RuleCondition> {
        self.condition.as_ref()
    }

    #[must_use]
    pub fn then_actions(&self) -> &[RuleAction] {
        &self.then_actions
    }

    #[must_use]
    pub fn else_actions(&self) -> &[RuleAction] {
        &self.else_actions
    }

    /// Validate the name, condition and both action lists, recording every
    /// problem in `validation`. Returns `false` if any error was added.
    pub fn validate(&self, validation: &mut RuleValidation) -> bool {
        let before = validation.errors().error_count();

        if self.name.trim().is_empty() {
            validation.add_error(ValidationError::new(
                "a rule must have a non-empty name",
                ErrorCode::InvalidRuleName,
            ));
        }

        match &self.condition {
            Some(condition) => {
                condition.validate(validation);
            }
            None => validation.add_error(
                ValidationError::new(
                    format!("rule '{}' has no condition", self.name),
                    ErrorCode::MissingRuleCondition,
                )
                .with_object(ErrorObject::Rule(self.name.clone())),
            ),
        }

        self.validate_actions(&self.then_actions, validation);
        self.validate_actions(&self.else_actions, validation);

        validation.errors().error_count() == before
    }

    fn validate_actions(&self, actions: &[RuleAction], validation: &mut RuleValidation) {
        let mut halted = false;
        for action in actions {
            if halted {
                validation.add_error(
                    ValidationError::warning(
                        format!("action '{action}' in rule '{}' follows Halt and never runs", self.name),
                        ErrorCode::UnreachableAction,
                    )
                    .with_object(ErrorObject::Rule(self.name.clone())),
                );
            }
            action.validate(validation);
            halted |= matches!(action, RuleAction::Halt);
        }
    }
}

fn write_actions(f: &mut fmt::Formatter<'_>, actions: &[RuleAction]) -> fmt::Result {
    for (i, action) in actions.iter().enumerate() {
        if i > 0 {
            f.write_str("; ")?;
        }
        write!(f, "{action}")?;
    }
    Ok(())
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: IF ", self.name)?;
        match &self.condition {
            Some(c) => write!(f, "{c}")?,
            None => f.write_str("<none>")?,
        }
        if !self.then_actions.is_empty() {
            f.write_str(" THEN ")?;
            write_actions(f, &self.then_actions)?;
        }
        if !self.else_actions.is_empty() {
            f.write_str(" ELSE ")?;
            write_actions(f, &self.else_actions)?;
        }
        Ok(())
    }
}
