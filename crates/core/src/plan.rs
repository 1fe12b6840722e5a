//! Typed plan model.
//!
//! A plan arrives as JSON shaped like
//! `{"steps": [{"tool": "...", "args": {...}, "save_as": "..."}]}`. It is
//! parsed and validated once, up front, so that structural problems and
//! malformed `$name[.field]` references surface before any tool runs.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::errors::PlanError;

/// Marker that turns an argument string into a variable reference.
pub const REFERENCE_MARKER: char = '$';

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Plan {
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub tool: String,
    pub args: BTreeMap<String, ArgValue>,
    pub save_as: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ArgValue {
    Literal(Value),
    Reference(Reference),
}

/// `$name` or `$name.field`; exactly zero or one field hop.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Reference {
    Identifier(String),
    FieldAccess { name: String, field: String },
}

impl Plan {
    pub fn from_json_str(raw: &str) -> Result<Self, PlanError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|error| PlanError::InvalidPlan(format!("plan is not valid JSON: {error}")))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, PlanError> {
        let Value::Object(mut document) = value else {
            return Err(PlanError::InvalidPlan("plan must be a JSON object".to_string()));
        };

        let steps = match document.remove("steps") {
            Some(Value::Array(steps)) => steps,
            Some(_) => return Err(PlanError::InvalidPlan("'steps' must be a list".to_string())),
            None => return Err(PlanError::InvalidPlan("missing 'steps'".to_string())),
        };

        let steps = steps
            .into_iter()
            .enumerate()
            .map(|(offset, raw)| Step::from_value(offset + 1, raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { steps })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Names that steps bind their results to, in step order.
    pub fn bindings(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().filter_map(Step::binding_name)
    }
}

impl Step {
    pub fn new(tool: impl Into<String>) -> Self {
        Self { tool: tool.into(), args: BTreeMap::new(), save_as: None }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: ArgValue) -> Self {
        self.args.insert(key.into(), value);
        self
    }

    pub fn with_literal(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_arg(key, ArgValue::Literal(value.into()))
    }

    pub fn with_reference(self, key: impl Into<String>, reference: Reference) -> Self {
        self.with_arg(key, ArgValue::Reference(reference))
    }

    pub fn saved_as(mut self, name: impl Into<String>) -> Self {
        self.save_as = Some(name.into());
        self
    }

    /// Variable name this step binds to, with whitespace and any leading
    /// reference markers trimmed. `None` when `save_as` is absent or blank.
    pub fn binding_name(&self) -> Option<&str> {
        let name = self.save_as.as_deref()?.trim().trim_start_matches(REFERENCE_MARKER);
        (!name.is_empty()).then_some(name)
    }

    fn from_value(index: usize, raw: Value) -> Result<Self, PlanError> {
        let invalid =
            |message: &str| PlanError::InvalidStep { step: index, message: message.to_string() };

        let Value::Object(mut body) = raw else {
            return Err(invalid("step must be a JSON object"));
        };

        let tool = match body.remove("tool") {
            Some(Value::String(tool)) if !tool.trim().is_empty() => tool,
            Some(Value::String(_)) | Some(Value::Null) | None => {
                return Err(invalid("missing 'tool'"))
            }
            Some(_) => return Err(invalid("'tool' must be a string")),
        };

        let args = match body.remove("args") {
            Some(Value::Object(args)) => parse_args(index, args)?,
            Some(Value::Null) | None => BTreeMap::new(),
            Some(_) => return Err(invalid("'args' must be a mapping")),
        };

        let save_as = match body.remove("save_as") {
            Some(Value::String(name)) => Some(name),
            Some(Value::Null) | None => None,
            Some(_) => return Err(invalid("'save_as' must be a string")),
        };

        Ok(Self { tool, args, save_as })
    }
}

fn parse_args(
    index: usize,
    args: Map<String, Value>,
) -> Result<BTreeMap<String, ArgValue>, PlanError> {
    let mut parsed = BTreeMap::new();
    for (key, value) in args {
        let value = ArgValue::parse(value).map_err(|message| PlanError::InvalidStep {
            step: index,
            message: format!("arg '{key}': {message}"),
        })?;
        parsed.insert(key, value);
    }
    Ok(parsed)
}

impl ArgValue {
    /// Strings starting with `$` become references; everything else,
    /// including nested mappings and sequences, is kept as a literal.
    pub fn parse(value: Value) -> Result<Self, String> {
        match value {
            Value::String(text) if text.starts_with(REFERENCE_MARKER) => {
                Reference::parse(&text).map(Self::Reference)
            }
            other => Ok(Self::Literal(other)),
        }
    }
}

impl Reference {
    pub fn identifier(name: impl Into<String>) -> Self {
        Self::Identifier(name.into())
    }

    pub fn field(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::FieldAccess { name: name.into(), field: field.into() }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        let Some(body) = raw.strip_prefix(REFERENCE_MARKER) else {
            return Err(format!("reference `{raw}` must start with `{REFERENCE_MARKER}`"));
        };

        match body.split_once('.') {
            None if body.is_empty() => Err(format!("reference `{raw}` has no variable name")),
            None => Ok(Self::Identifier(body.to_string())),
            Some((name, _)) if name.is_empty() => {
                Err(format!("reference `{raw}` has no variable name"))
            }
            Some((_, field)) if field.is_empty() => {
                Err(format!("reference `{raw}` has an empty field name"))
            }
            Some((_, field)) if field.contains('.') => Err(format!(
                "reference `{raw}` nests deeper than one field (only `$name.field` is supported)"
            )),
            Some((name, field)) => Ok(Self::field(name, field)),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Identifier(name) | Self::FieldAccess { name, .. } => name,
        }
    }

    pub fn field_name(&self) -> Option<&str> {
        match self {
            Self::Identifier(_) => None,
            Self::FieldAccess { field, .. } => Some(field),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(name) => write!(f, "{REFERENCE_MARKER}{name}"),
            Self::FieldAccess { name, field } => write!(f, "{REFERENCE_MARKER}{name}.{field}"),
        }
    }
}
