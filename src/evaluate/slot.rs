use std::sync::Arc;

use crate::types::{
    ArrayRef, EvaluationError, FieldDef, HostError, ObjectRef, PropertyDef, TypeCatalog, Value,
};

/// A readable, possibly writable storage location produced by evaluating a
/// member, indexer or array element expression.
#[derive(Debug, Clone)]
pub enum Slot {
    /// A computed value with no backing storage.
    Value(Value),
    Field {
        target: ObjectRef,
        field: Arc<FieldDef>,
    },
    Static {
        field: Arc<FieldDef>,
    },
    Property {
        target: Value,
        property: Arc<PropertyDef>,
        index: Vec<Value>,
    },
    ArrayElement {
        array: ArrayRef,
        indices: Vec<i64>,
    },
}

fn host(member: &str, source: HostError) -> EvaluationError {
    EvaluationError::Host {
        member: member.to_owned(),
        source,
    }
}

fn out_of_range(array: &ArrayRef) -> EvaluationError {
    EvaluationError::IndexOutOfRange { length: array.len() }
}

impl Slot {
    /// # Errors
    ///
    /// Host getter failures and out-of-range array indices.
    pub fn get(&self, catalog: &TypeCatalog) -> Result<Value, EvaluationError> {
        match self {
            Slot::Value(v) => Ok(v.clone()),
            Slot::Field { target, field } => Ok(target
                .get(field.name())
                .unwrap_or_else(|| catalog.default_value(field.ty()))),
            Slot::Static { field } => Ok(field
                .constant
                .clone()
                .or_else(|| catalog.static_value(field.declaring(), field.name()))
                .unwrap_or_else(|| catalog.default_value(field.ty()))),
            Slot::Property {
                target,
                property,
                index,
            } => property
                .get(target, index)
                .map_err(|e| host(property.name(), e)),
            Slot::ArrayElement { array, indices } => {
                array.get(indices).ok_or_else(|| out_of_range(array))
            }
        }
    }

    /// # Errors
    ///
    /// [`EvaluationError::NotWritable`] for computed values, plus host setter
    /// failures and out-of-range array indices.
    pub fn set(&self, catalog: &TypeCatalog, value: Value) -> Result<(), EvaluationError> {
        match self {
            Slot::Value(v) => Err(EvaluationError::NotWritable {
                expression: v.to_string(),
            }),
            Slot::Field { target, field } => {
                target.set(field.name(), value);
                Ok(())
            }
            Slot::Static { field } => {
                catalog.set_static_value(field.declaring(), field.name(), value);
                Ok(())
            }
            Slot::Property {
                target,
                property,
                index,
            } => property
                .set(target, index, value)
                .map_err(|e| host(property.name(), e)),
            Slot::ArrayElement { array, indices } => {
                if array.set(indices, value) {
                    Ok(())
                } else {
                    Err(out_of_range(array))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn value_slots_are_read_only() {
        let catalog = TypeCatalog::new();
        let slot = Slot::Value(Value::Int32(3));
        assert_eq!(slot.get(&catalog), Ok(Value::Int32(3)));
        match slot.set(&catalog, Value::Int32(4)) {
            Err(EvaluationError::NotWritable { expression }) => assert_eq!(expression, "3"),
            other => panic!("expected NotWritable, got {other:?}"),
        }
    }

    #[test]
    fn array_element_bounds() {
        let catalog = TypeCatalog::new();
        let array = ArrayRef::from_values(Type::INT32, vec![Value::Int32(1), Value::Int32(2)]);
        let slot = Slot::ArrayElement {
            array: array.clone(),
            indices: vec![1],
        };
        slot.set(&catalog, Value::Int32(9)).unwrap();
        assert_eq!(array.get(&[1]), Some(Value::Int32(9)));

        let past = Slot::ArrayElement {
            array,
            indices: vec![2],
        };
        assert_eq!(
            past.get(&catalog),
            Err(EvaluationError::IndexOutOfRange { length: 2 })
        );
    }
}
