use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use super::action::Statement;
use super::catalog::HostError;
use super::expr::Expr;

/// Stable identifiers for validation problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    CodeExpressionNotHandled = 0x0548,
    InvalidAssignTarget = 0x0549,
    OperandTypesIncompatible = 0x054A,
    LeftOperandInvalidType = 0x054B,
    RightOperandInvalidType = 0x054C,
    RelationalOpBadTypes = 0x054D,
    CannotResolveMember = 0x054E,
    MethodNotExists = 0x054F,
    MethodArgCountMismatch = 0x0550,
    MethodDirectionMismatch = 0x0551,
    MethodArgumentTypeMismatch = 0x0552,
    MethodOverloadNotFound = 0x0553,
    IndexerNotFound = 0x0554,
    IndexerArgCannotBeRefOrOut = 0x0555,
    ArrayIndexBadRank = 0x0556,
    ArrayIndexBadType = 0x0557,
    StaticMember = 0x0558,
    NonStaticMember = 0x0559,
    UnknownFieldOrProperty = 0x055A,
    CannotAccessMember = 0x055B,
    CannotReadMember = 0x055C,
    CannotWriteMember = 0x055D,
    UnableToResolveType = 0x055E,
    ExpressionTooDeep = 0x0560,
    ConditionMustBeBoolean = 0x0561,
    TypeNotAuthorized = 0x0562,
    NullTarget = 0x0563,
    NoConversion = 0x0564,
    CannotCreateType = 0x0565,
    ArraySizeInvalid = 0x0566,
    InvalidRuleName = 0x0567,
    DuplicateRules = 0x0568,
    MissingRuleCondition = 0x0569,
    UnreachableAction = 0x056A,
    InvalidUpdatePath = 0x056B,
    VoidResult = 0x056C,
}

impl ErrorCode {
    #[must_use]
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// User-data key under which the offending item is stored.
pub const ERROR_OBJECT_KEY: &str = "ErrorObject";

/// The item a validation error points at.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorObject {
    Expression(Expr),
    Statement(Statement),
    Rule(String),
    Text(String),
}

/// One validation problem.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    message: String,
    code: ErrorCode,
    is_warning: bool,
    user_data: BTreeMap<String, ErrorObject>,
}

impl ValidationError {
    #[must_use]
    pub fn new(message: impl Into<String>, code: ErrorCode) -> Self {
        ValidationError {
            message: message.into(),
            code,
            is_warning: false,
            user_data: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn warning(message: impl Into<String>, code: ErrorCode) -> Self {
        ValidationError {
            is_warning: true,
            ..ValidationError::new(message, code)
        }
    }

    /// Tag the error with the offending item.
    #[must_use]
    pub fn with_object(mut self, object: ErrorObject) -> Self {
        self.user_data.insert(ERROR_OBJECT_KEY.to_owned(), object);
        self
    }

    #[must_use]
    pub fn with_expression(self, expr: &Expr) -> Self {
        self.with_object(ErrorObject::Expression(expr.clone()))
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    #[must_use]
    pub fn is_warning(&self) -> bool {
        self.is_warning
    }

    #[must_use]
    pub fn user_data(&self) -> &BTreeMap<String, ErrorObject> {
        &self.user_data
    }

    pub fn user_data_mut(&mut self) -> &mut BTreeMap<String, ErrorObject> {
        &mut self.user_data
    }

    #[must_use]
    pub fn error_object(&self) -> Option<&ErrorObject> {
        self.user_data.get(ERROR_OBJECT_KEY)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_warning { "warning" } else { "error" };
        write!(f, "{kind} {:#06x}: {}", self.code.code(), self.message)
    }
}

/// Ordered list of validation problems.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether any entry is an error rather than a warning.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|e| !e.is_warning)
    }

    /// Number of non-warning entries.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.0.iter().filter(|e| !e.is_warning).count()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.0.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[ValidationError] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for ValidationErrors {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

/// A rule set (or named condition) failed validation. Carries every problem found.
#[derive(Debug, Clone, Error)]
#[error("'{name}' failed validation with {} error(s): {errors}", errors.error_count())]
pub struct RuleSetValidationError {
    pub name: String,
    pub errors: ValidationErrors,
}

/// Failures raised while executing rules.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("cannot convert a value of type '{from}' to '{to}'")]
    NoConversion { from: String, to: String },

    #[error("cannot access non-static member '{member}' through a null reference")]
    NullTarget { member: String },

    #[error("cannot write to expression '{expression}'")]
    NotWritable { expression: String },

    #[error("arithmetic overflow evaluating '{operation}'")]
    Overflow { operation: String },

    #[error("attempted to divide by zero")]
    DivideByZero,

    #[error("index out of range for array of length {length}")]
    IndexOutOfRange { length: usize },

    #[error("operator '{op}' is not defined for '{left}' and '{right}'")]
    IncompatibleOperands {
        op: String,
        left: String,
        right: String,
    },

    #[error("expression '{expression}' was not validated")]
    NotValidated { expression: String },

    #[error("'{member}' failed: {source}")]
    Host {
        member: String,
        #[source]
        source: HostError,
    },

    #[error("{source} (in '{context}')")]
    InContext {
        context: String,
        #[source]
        source: Box<EvaluationError>,
    },
}

impl EvaluationError {
    /// Attach the decompiled text of the failing expression or statement. The
    /// innermost context is kept.
    #[must_use]
    pub fn with_context(self, context: impl fmt::Display) -> Self {
        match self {
            EvaluationError::InContext { .. } => self,
            other => EvaluationError::InContext {
                context: context.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The error without any attached context.
    #[must_use]
    pub fn root(&self) -> &EvaluationError {
        match self {
            EvaluationError::InContext { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Failures editing named definition collections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("an item named '{name}' already exists")]
    DuplicateName { name: String },

    #[error("item name must not be empty")]
    EmptyName,

    #[error("no item named '{name}'")]
    NotFound { name: String },

    #[error("index {index} is out of range for a collection of {len} item(s)")]
    IndexOutOfRange { index: usize, len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::expr::this;

    #[test]
    fn validation_error_display() {
        let e = ValidationError::new("no field 'X'", ErrorCode::UnknownFieldOrProperty);
        assert_eq!(e.to_string(), "error 0x055a: no field 'X'");
        let w = ValidationError::warning("dead code", ErrorCode::UnreachableAction);
        assert_eq!(w.to_string(), "warning 0x056a: dead code");
    }

    #[test]
    fn error_object_is_stored_under_key() {
        let e = ValidationError::new("bad", ErrorCode::InvalidAssignTarget).with_expression(&this());
        assert_eq!(e.error_object(), Some(&ErrorObject::Expression(this())));
        assert!(e.user_data().contains_key(ERROR_OBJECT_KEY));
    }

    #[test]
    fn warnings_alone_do_not_count_as_errors() {
        let mut errors = ValidationErrors::new();
        errors.push(ValidationError::warning("w", ErrorCode::UnreachableAction));
        assert!(!errors.has_errors());
        errors.push(ValidationError::new("e", ErrorCode::DuplicateRules));
        assert!(errors.has_errors());
        assert_eq!(errors.error_count(), 1);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn rule_set_validation_error_message() {
        let mut errors = ValidationErrors::new();
        errors.push(ValidationError::new("duplicate rule 'a'", ErrorCode::DuplicateRules));
        let err = RuleSetValidationError {
            name: "pricing".into(),
            errors,
        };
        assert_eq!(
            err.to_string(),
            "'pricing' failed validation with 1 error(s): error 0x0568: duplicate rule 'a'"
        );
    }

    #[test]
    fn no_conversion_message() {
        let err = EvaluationError::NoConversion {
            from: "string".into(),
            to: "int".into(),
        };
        assert_eq!(err.to_string(), "cannot convert a value of type 'string' to 'int'");
    }

    #[test]
    fn null_target_message() {
        let err = EvaluationError::NullTarget {
            member: "Total".into(),
        };
        assert_eq!(
            err.to_string(),
            "cannot access non-static member 'Total' through a null reference"
        );
    }

    #[test]
    fn not_writable_message() {
        let err = EvaluationError::NotWritable {
            expression: "1".into(),
        };
        assert_eq!(err.to_string(), "cannot write to expression '1'");
    }

    #[test]
    fn overflow_and_divide_messages() {
        let err = EvaluationError::Overflow {
            operation: "a + b".into(),
        };
        assert_eq!(err.to_string(), "arithmetic overflow evaluating 'a + b'");
        assert_eq!(EvaluationError::DivideByZero.to_string(), "attempted to divide by zero");
    }

    #[test]
    fn host_error_message() {
        let err = EvaluationError::Host {
            member: "Compute".into(),
            source: HostError::new("boom"),
        };
        assert_eq!(err.to_string(), "'Compute' failed: boom");
    }

    #[test]
    fn context_is_attached_once() {
        let err = EvaluationError::DivideByZero
            .with_context("this.A / 0")
            .with_context("this.B = this.A / 0");
        assert_eq!(err.to_string(), "attempted to divide by zero (in 'this.A / 0')");
        assert_eq!(err.root(), &EvaluationError::DivideByZero);
    }

    #[test]
    fn definition_error_messages() {
        assert_eq!(
            DefinitionError::DuplicateName { name: "c1".into() }.to_string(),
            "an item named 'c1' already exists"
        );
        assert_eq!(DefinitionError::EmptyName.to_string(), "item name must not be empty");
        assert_eq!(
            DefinitionError::NotFound { name: "x".into() }.to_string(),
            "no item named 'x'"
        );
        assert_eq!(
            DefinitionError::IndexOutOfRange { index: 3, len: 1 }.to_string(),
            "index 3 is out of range for a collection of 1 item(s)"
        );
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(ErrorCode::CodeExpressionNotHandled.code(), 0x0548);
        assert_eq!(ErrorCode::VoidResult.code(), 0x056C);
    }
}
