//! Execution of validated expressions and statements against a subject value.
//!
//! Evaluation walks the same tree nodes the [`RuleValidation`] session recorded and
//! dispatches on the [`Binding`] stored for each node. A node that was never
//! validated fails with [`EvaluationError::NotValidated`].

mod adjust;
mod operators;
mod slot;

pub use adjust::{adjust_type, adjust_type_with_cast};
pub use slot::Slot;

use crate::trace::TrackingContext;
use crate::types::{
    ArrayRef, ConstructorDef, Direction, EvaluationError, Expr, ExprKind, MethodDef, ParameterDef,
    Statement, Type, TypeCatalog, Value,
};
use crate::validation::{Binding, ExpressionInfo, RuleValidation};

/// State of one run of rule actions against one subject.
///
/// Holds the subject, the halted flag raised by a `Halt` action, and the optional
/// tracking context the host threads through the run.
pub struct RuleExecution<'a> {
    validation: &'a RuleValidation,
    this: Value,
    halted: bool,
    context: Option<&'a dyn TrackingContext>,
}

impl<'a> RuleExecution<'a> {
    #[must_use]
    pub fn new(validation: &'a RuleValidation, this: impl Into<Value>) -> Self {
        RuleExecution {
            validation,
            this: this.into(),
            halted: false,
            context: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: &'a dyn TrackingContext) -> Self {
        self.context = Some(context);
        self
    }

    #[must_use]
    pub fn validation(&self) -> &'a RuleValidation {
        self.validation
    }

    /// The subject, `this`.
    #[must_use]
    pub fn this(&self) -> &Value {
        &self.this
    }

    #[must_use]
    pub fn halted(&self) -> bool {
        self.halted
    }

    #[must_use]
    pub fn context(&self) -> Option<&'a dyn TrackingContext> {
        self.context
    }

    /// Stop the current rule set run after the running action.
    pub fn halt(&mut self) {
        self.halted = true;
    }

    fn catalog(&self) -> &'a TypeCatalog {
        self.validation.catalog()
    }

    fn info(&self, expr: &Expr) -> Result<&'a ExpressionInfo, EvaluationError> {
        self.validation
            .expression_info(expr)
            .ok_or_else(|| EvaluationError::NotValidated {
                expression: expr.to_string(),
            })
    }

    /// Evaluate an expression to its value.
    ///
    /// # Errors
    ///
    /// Returns the first [`EvaluationError`] raised while evaluating the tree.
    pub fn evaluate(&self, expr: &Expr) -> Result<Value, EvaluationError> {
        self.slot(expr)?.get(self.catalog())
    }

    /// Evaluate a rule condition. A null result counts as `false`.
    ///
    /// # Errors
    ///
    /// Returns the evaluation failure, tagged with the condition text.
    pub fn evaluate_condition(&self, expr: &Expr) -> Result<bool, EvaluationError> {
        self.evaluate_bool(expr).map_err(|e| e.with_context(expr))
    }

    fn evaluate_bool(&self, expr: &Expr) -> Result<bool, EvaluationError> {
        let value = self.evaluate(expr)?;
        if let Some(b) = value.as_bool() {
            return Ok(b);
        }
        if value.is_null() {
            return Ok(false);
        }
        let from = self.info(expr)?.ty();
        let value = adjust_type(self.catalog(), from, value, &Type::BOOL)?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Execute an assignment or expression statement.
    ///
    /// # Errors
    ///
    /// Propagates evaluation, conversion and write failures.
    pub fn execute_statement(&mut self, statement: &Statement) -> Result<(), EvaluationError> {
        match statement {
            Statement::Expression(e) => {
                self.evaluate(e)?;
                Ok(())
            }
            Statement::Assign { left, right } => {
                let target = self.slot(left)?;
                let value = self.evaluate(right)?;
                let value = adjust_type(self.catalog(), self.info(right)?.ty(), value, self.info(left)?.ty())?;
                target.set(self.catalog(), value)
            }
        }
    }

    /// Evaluate an expression to its storage location.
    pub(crate) fn slot(&self, expr: &Expr) -> Result<Slot, EvaluationError> {
        match expr.kind() {
            ExprKind::Literal(l) => Ok(Slot::Value(l.to_value())),
            ExprKind::This => Ok(Slot::Value(self.this.clone())),
            ExprKind::TypeRef(_) => Ok(Slot::Value(Value::Null)),
            ExprKind::Direction { expr: inner, .. } => self.slot(inner),
            ExprKind::Field { target, name } => self.field_slot(expr, target, name),
            ExprKind::Property { target, name } => self.property_slot(expr, target, name),
            ExprKind::Indexer { target, args } => {
                let Binding::Indexer { property, expanded } = self.info(expr)?.binding() else {
                    return Err(self.not_validated(expr));
                };
                let target = if property.is_static() {
                    Value::Null
                } else {
                    self.instance(target, "this[]")?
                };
                let (index, _) = self.bind_arguments(property.index_params(), args, *expanded)?;
                Ok(Slot::Property {
                    target,
                    property: property.clone(),
                    index,
                })
            }
            ExprKind::ArrayIndex { target, indices } => {
                let array = match self.evaluate(target)? {
                    Value::Array(a) => a,
                    Value::Null => {
                        return Err(EvaluationError::NullTarget {
                            member: target.to_string(),
                        })
                    }
                    other => return Err(self.no_conversion(&other.runtime_type(), self.info(target)?.ty())),
                };
                let indices = indices
                    .iter()
                    .map(|i| self.index_value(i))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Slot::ArrayElement { array, indices })
            }
            ExprKind::Binary { left, op, right } => self.evaluate_binary(expr, left, *op, right).map(Slot::Value),
            ExprKind::Invoke { target, args, .. } => self.invoke(expr, target, args).map(Slot::Value),
            ExprKind::Cast { expr: inner, .. } => {
                let value = self.evaluate(inner)?;
                let value = adjust_type_with_cast(self.catalog(), self.info(inner)?.ty(), value, self.info(expr)?.ty())?;
                Ok(Slot::Value(value))
            }
            ExprKind::New { args, .. } => self.create(expr, args).map(Slot::Value),
            ExprKind::NewArray { size, initializers, .. } => {
                self.create_array(expr, size.as_deref(), initializers).map(Slot::Value)
            }
        }
    }

    fn not_validated(&self, expr: &Expr) -> EvaluationError {
        EvaluationError::NotValidated {
            expression: expr.to_string(),
        }
    }

    fn no_conversion(&self, from: &Type, to: &Type) -> EvaluationError {
        EvaluationError::NoConversion {
            from: self.catalog().type_name(from),
            to: self.catalog().type_name(to),
        }
    }

    /// Evaluate the target of an instance member access, rejecting null.
    fn instance(&self, target: &Expr, member: &str) -> Result<Value, EvaluationError> {
        let value = self.evaluate(target)?;
        if value.is_null() {
            return Err(EvaluationError::NullTarget {
                member: member.to_owned(),
            });
        }
        Ok(value)
    }

    fn index_value(&self, index: &Expr) -> Result<i64, EvaluationError> {
        let value = self.evaluate(index)?;
        value
            .as_integer()
            .and_then(|n| i64::try_from(n).ok())
            .ok_or_else(|| self.no_conversion(&value.runtime_type(), &Type::INT64))
    }

    fn field_slot(&self, expr: &Expr, target: &Expr, name: &str) -> Result<Slot, EvaluationError> {
        let Binding::Field(field) = self.info(expr)?.binding() else {
            return Err(self.not_validated(expr));
        };
        if field.is_static() {
            return Ok(Slot::Static { field: field.clone() });
        }
        match self.instance(target, name)? {
            Value::Object(target) => Ok(Slot::Field {
                target,
                field: field.clone(),
            }),
            other => Err(self.no_conversion(&other.runtime_type(), &Type::Named(field.declaring()))),
        }
    }

    fn property_slot(&self, expr: &Expr, target: &Expr, name: &str) -> Result<Slot, EvaluationError> {
        match self.info(expr)?.binding() {
            Binding::Length => {
                let length = match self.instance(target, name)? {
                    Value::String(s) => s.encode_utf16().count(),
                    Value::Array(a) => a.len(),
                    other => return Err(self.no_conversion(&other.runtime_type(), &Type::STRING)),
                };
                let length = i32::try_from(length).map_err(|_| EvaluationError::Overflow {
                    operation: expr.to_string(),
                })?;
                Ok(Slot::Value(Value::Int32(length)))
            }
            Binding::Property(property) => {
                let target = if property.is_static() {
                    Value::Null
                } else {
                    self.instance(target, name)?
                };
                Ok(Slot::Property {
                    target,
                    property: property.clone(),
                    index: Vec::new(),
                })
            }
            _ => Err(self.not_validated(expr)),
        }
    }

    /// Convert call arguments to parameter values. Returns the values and, for
    /// each `out`/`ref` argument, the slot its result is written back to.
    fn bind_arguments(
        &self,
        params: &[ParameterDef],
        args: &[Expr],
        expanded: bool,
    ) -> Result<(Vec<Value>, Vec<(usize, Slot)>), EvaluationError> {
        let catalog = self.catalog();
        let fixed = if expanded {
            params.len().saturating_sub(1)
        } else {
            params.len()
        };
        let mut values = Vec::with_capacity(params.len());
        let mut write_back = Vec::new();

        for (i, (param, arg)) in params.iter().zip(args).take(fixed).enumerate() {
            let value = match param.direction {
                Direction::In => {
                    let value = self.evaluate(arg)?;
                    adjust_type(catalog, self.info(arg)?.ty(), value, &param.ty)?
                }
                Direction::Out => {
                    write_back.push((i, self.slot(arg)?));
                    catalog.default_value(&param.ty)
                }
                Direction::Ref => {
                    let slot = self.slot(arg)?;
                    let value = slot.get(catalog)?;
                    write_back.push((i, slot));
                    adjust_type(catalog, self.info(arg)?.ty(), value, &param.ty)?
                }
            };
            values.push(value);
        }

        if expanded {
            let element = params
                .last()
                .and_then(|p| p.ty.element())
                .map(|(element, _)| element.clone())
                .unwrap_or(Type::OBJECT);
            let packed = args
                .iter()
                .skip(fixed)
                .map(|arg| {
                    let value = self.evaluate(arg)?;
                    adjust_type(catalog, self.info(arg)?.ty(), value, &element)
                })
                .collect::<Result<Vec<_>, _>>()?;
            values.push(Value::Array(ArrayRef::from_values(element, packed)));
        }
        Ok((values, write_back))
    }

    fn write_back(
        &self,
        params: &[ParameterDef],
        args: &[Expr],
        values: &[Value],
        slots: Vec<(usize, Slot)>,
    ) -> Result<(), EvaluationError> {
        let catalog = self.catalog();
        for (i, slot) in slots {
            let (Some(param), Some(arg), Some(value)) = (params.get(i), args.get(i), values.get(i)) else {
                continue;
            };
            let value = adjust_type(catalog, &param.ty, value.clone(), self.info(arg)?.ty())?;
            slot.set(catalog, value)?;
        }
        Ok(())
    }

    fn invoke(&self, expr: &Expr, target: &Expr, args: &[Expr]) -> Result<Value, EvaluationError> {
        let Binding::Method { method, expanded } = self.info(expr)?.binding() else {
            return Err(self.not_validated(expr));
        };
        let receiver = if method.is_extension() {
            let value = self.evaluate(target)?;
            match method.receiver() {
                Some(receiver) => adjust_type(self.catalog(), self.info(target)?.ty(), value, receiver)?,
                None => value,
            }
        } else if method.is_static() {
            Value::Null
        } else {
            self.instance(target, method.name())?
        };

        let (mut values, slots) = self.bind_arguments(method.params(), args, *expanded)?;
        let result = method
            .invoke(&receiver, &mut values)
            .map_err(|source| host_error(method, source))?;
        self.write_back(method.params(), args, &values, slots)?;
        Ok(result)
    }

    fn create(&self, expr: &Expr, args: &[Expr]) -> Result<Value, EvaluationError> {
        let info = self.info(expr)?;
        let Binding::Constructor { constructor, expanded } = info.binding() else {
            return Err(self.not_validated(expr));
        };
        let catalog = self.catalog();
        let Some(constructor) = constructor else {
            return Ok(match info.ty() {
                Type::Named(id) => Value::Object(catalog.instantiate(*id)),
                other => catalog.default_value(other),
            });
        };

        let instance = catalog.instantiate(constructor.declaring());
        let (values, _) = self.bind_arguments(constructor.params(), args, *expanded)?;
        constructor
            .invoke(&instance, &values)
            .map_err(|source| constructor_error(catalog, constructor, source))?;
        Ok(Value::Object(instance))
    }

    fn create_array(&self, expr: &Expr, size: Option<&Expr>, initializers: &[Expr]) -> Result<Value, EvaluationError> {
        let catalog = self.catalog();
        let element = match self.info(expr)?.ty().element() {
            Some((element, _)) => element.clone(),
            None => return Err(self.not_validated(expr)),
        };

        let length = match size {
            Some(size) => {
                let n = self.index_value(size)?;
                let n = usize::try_from(n).map_err(|_| EvaluationError::Overflow {
                    operation: expr.to_string(),
                })?;
                Some(n)
            }
            None => None,
        };

        if initializers.is_empty() {
            let items = (0..length.unwrap_or(0)).map(|_| catalog.default_value(&element)).collect();
            return Ok(Value::Array(ArrayRef::from_values(element, items)));
        }
        if length.is_some_and(|n| n != initializers.len()) {
            return Err(EvaluationError::IndexOutOfRange {
                length: initializers.len(),
            });
        }
        let items = initializers
            .iter()
            .map(|init| {
                let value = self.evaluate(init)?;
                adjust_type(catalog, self.info(init)?.ty(), value, &element)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Array(ArrayRef::from_values(element, items)))
    }
}

fn host_error(method: &MethodDef, source: crate::types::HostError) -> EvaluationError {
    let member = if method.declaring_name().is_empty() {
        method.name().to_owned()
    } else {
        format!("{}.{}", method.declaring_name(), method.name())
    };
    EvaluationError::Host { member, source }
}

fn constructor_error(catalog: &TypeCatalog, ctor: &ConstructorDef, source: crate::types::HostError) -> EvaluationError {
    EvaluationError::Host {
        member: format!("{}..ctor", catalog.type_name(&Type::Named(ctor.declaring()))),
        source,
    }
}

impl std::fmt::Debug for RuleExecution<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleExecution")
            .field("this", &self.this)
            .field("halted", &self.halted)
            .field("has_context", &self.context.is_some())
            .finish_non_exhaustive()
    }
}
