use std::fmt;

use super::error::{ErrorCode, ErrorObject, EvaluationError, ValidationError};
use super::expr::Expr;
use crate::analysis;
use crate::evaluate::RuleExecution;
use crate::validation::RuleValidation;

/// An executable statement inside a rule action.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Statement {
    /// Evaluate for effect, typically a method call.
    Expression(Expr),
    Assign { left: Expr, right: Expr },
}

impl Statement {
    #[must_use]
    pub fn assign(left: impl Into<Expr>, right: impl Into<Expr>) -> Self {
        Statement::Assign {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Validate against the subject type, recording problems in `validation`.
    pub fn validate(&self, validation: &mut RuleValidation) -> bool {
        validation.validate_statement(self)
    }

    /// # Errors
    ///
    /// Returns the first [`EvaluationError`] raised, tagged with the statement text.
    pub fn execute(&self, execution: &mut RuleExecution<'_>) -> Result<(), EvaluationError> {
        execution
            .execute_statement(self)
            .map_err(|e| e.with_context(self))
    }

    /// Paths this statement writes.
    #[must_use]
    pub fn side_effects(&self, validation: &RuleValidation) -> Vec<String> {
        analysis::statement_side_effects(validation, self)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Expression(e) => write!(f, "{e}"),
            Statement::Assign { left, right } => write!(f, "{left} = {right}"),
        }
    }
}

/// One entry of a rule's then or else list.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RuleAction {
    /// Stop the whole rule set run.
    Halt,
    /// Declare that the given path changed, for chaining.
    Update(String),
    Statement(Statement),
}

impl RuleAction {
    #[must_use]
    pub fn halt() -> Self {
        RuleAction::Halt
    }

    /// `path` is a member path such as `this/Total`, `Total` or `this.Order.Total`.
    #[must_use]
    pub fn update(path: &str) -> Self {
        RuleAction::Update(path.to_owned())
    }

    #[must_use]
    pub fn assign(left: impl Into<Expr>, right: impl Into<Expr>) -> Self {
        RuleAction::Statement(Statement::assign(left, right))
    }

    /// Evaluate an expression (usually a method call) for its side effects.
    #[must_use]
    pub fn invoke(expr: impl Into<Expr>) -> Self {
        RuleAction::Statement(Statement::Expression(expr.into()))
    }

    pub fn validate(&self, validation: &mut RuleValidation) -> bool {
        match self {
            RuleAction::Halt => true,
            RuleAction::Update(path) => {
                let normalized = analysis::normalize_update_path(path);
                if normalized.is_none() {
                    validation.add_error(
                        ValidationError::new(
                            format!("update path '{path}' is not a valid member path"),
                            ErrorCode::InvalidUpdatePath,
                        )
                        .with_object(ErrorObject::Text(path.clone())),
                    );
                }
                normalized.is_some()
            }
            RuleAction::Statement(s) => s.validate(validation),
        }
    }

    /// Run the action. `Update` has no runtime effect; `Halt` stops the run.
    ///
    /// # Errors
    ///
    /// Propagates statement evaluation failures.
    pub fn execute(&self, execution: &mut RuleExecution<'_>) -> Result<(), EvaluationError> {
        match self {
            RuleAction::Halt => {
                execution.halt();
                Ok(())
            }
            RuleAction::Update(_) => Ok(()),
            RuleAction::Statement(s) => s.execute(execution),
        }
    }

    /// Paths written by this action.
    #[must_use]
    pub fn side_effects(&self, validation: &RuleValidation) -> Vec<String> {
        match self {
            RuleAction::Halt => Vec::new(),
            RuleAction::Update(path) => analysis::normalize_update_path(path)
                .into_iter()
                .collect(),
            RuleAction::Statement(s) => s.side_effects(validation),
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAction::Halt => f.write_str("Halt"),
            RuleAction::Update(path) => write!(f, "Update(\"{path}\")"),
            RuleAction::Statement(s) => write!(f, "{s}"),
        }
    }
}

impl From<Statement> for RuleAction {
    fn from(s: Statement) -> Self {
        RuleAction::Statement(s)
    }
}
