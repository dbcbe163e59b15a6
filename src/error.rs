use thiserror::Error;

use crate::types::{DefinitionError, EvaluationError, RuleSetValidationError};

/// Unified error type for building and running rule sets.
///
/// Returned by [`RuleEngine::new()`](crate::RuleEngine::new),
/// [`RuleEngine::execute()`](crate::RuleEngine::execute) and
/// [`RuleSet::execute()`](crate::RuleSet::execute).
#[derive(Debug, Clone, Error)]
pub enum RuleError {
    #[error(transparent)]
    Validation(#[from] RuleSetValidationError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("subject of type '{actual}' does not match the validated type '{expected}'")]
    SubjectTypeMismatch { expected: String, actual: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("rule set '{rule_set}' exceeded {limit} re-evaluation(s)")]
    ReevaluationLimit { rule_set: String, limit: u64 },
}
