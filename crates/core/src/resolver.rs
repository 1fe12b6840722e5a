//! Reference resolution against the per-run variable store.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::errors::ReferenceError;
use crate::normalizer::unwrap_result_wrapper;
use crate::plan::{ArgValue, Reference, REFERENCE_MARKER};

/// Name → normalized value bindings produced by one plan execution.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct VariableStore {
    bindings: BTreeMap<String, Value>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Binds `value` under `name`; last write wins.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.bindings.insert(name.into(), value)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.bindings.iter()
    }
}

impl FromIterator<(String, Value)> for VariableStore {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self { bindings: iter.into_iter().collect() }
    }
}

/// Resolves one argument value. Literals are returned unchanged.
pub fn resolve(value: &ArgValue, store: &VariableStore) -> Result<Value, ReferenceError> {
    match value {
        ArgValue::Literal(literal) => Ok(literal.clone()),
        ArgValue::Reference(reference) => resolve_reference(reference, store),
    }
}

pub fn resolve_reference(
    reference: &Reference,
    store: &VariableStore,
) -> Result<Value, ReferenceError> {
    let name = reference.name();
    let stored =
        store.get(name).ok_or_else(|| ReferenceError::NotFound { name: name.to_string() })?;

    if stored.is_null() {
        return Err(ReferenceError::NullReference {
            name: name.to_string(),
            field: reference.field_name().map(str::to_string),
        });
    }

    match reference {
        Reference::Identifier(_) => Ok(unwrap_result_wrapper(stored.clone())),
        Reference::FieldAccess { field, .. } => {
            let Value::Object(mapping) = stored else {
                return Err(ReferenceError::TypeMismatch {
                    name: name.to_string(),
                    field: field.clone(),
                });
            };
            mapping.get(field).cloned().ok_or_else(|| ReferenceError::FieldNotFound {
                name: name.to_string(),
                field: field.clone(),
            })
        }
    }
}

/// Resolves a raw JSON value: strings starting with `$` are references,
/// anything else passes through. Unlike plan parsing, no shape is rejected
/// up front; the text after the marker is split on the first `.` and
/// everything past it is taken as the field name.
pub fn resolve_value(value: &Value, store: &VariableStore) -> Result<Value, ReferenceError> {
    let Some(body) = value.as_str().and_then(|text| text.strip_prefix(REFERENCE_MARKER)) else {
        return Ok(value.clone());
    };

    let reference = match body.split_once('.') {
        Some((name, field)) => Reference::field(name, field),
        None => Reference::identifier(body),
    };
    resolve_reference(&reference, store)
}
