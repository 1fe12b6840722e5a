use thiserror::Error;

/// Failure kinds surfaced by plan execution and path resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidPlan,
    InvalidStep,
    ReferenceNotFound,
    NullReference,
    TypeMismatch,
    FieldNotFound,
    NotFound,
    TransportError,
    ToolError,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("variable '{name}' not found")]
    NotFound { name: String },
    #[error(
        "variable '{name}' is null, likely because a previous tool did not find a result{}",
        field_suffix(.field)
    )]
    NullReference { name: String, field: Option<String> },
    #[error("variable '{name}' is not a mapping; cannot access field '{field}'")]
    TypeMismatch { name: String, field: String },
    #[error("field '{field}' not found in variable '{name}'")]
    FieldNotFound { name: String, field: String },
}

fn field_suffix(field: &Option<String>) -> String {
    match field {
        Some(field) => format!("; cannot access field '{field}'"),
        None => String::new(),
    }
}

impl ReferenceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::ReferenceNotFound,
            Self::NullReference { .. } => ErrorKind::NullReference,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::FieldNotFound { .. } => ErrorKind::FieldNotFound,
        }
    }

    pub fn variable(&self) -> &str {
        match self {
            Self::NotFound { name }
            | Self::NullReference { name, .. }
            | Self::TypeMismatch { name, .. }
            | Self::FieldNotFound { name, .. } => name,
        }
    }
}

/// Failure reported by a [`crate::interpreter::ToolInvoker`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InvocationError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("tool failure: {0}")]
    Tool(String),
}

impl InvocationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::TransportError,
            Self::Tool(_) => ErrorKind::ToolError,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
    #[error("step {step}: {message}")]
    InvalidStep { step: usize, message: String },
    #[error("step {step} ({tool}): cannot resolve arg '{arg}': {source}")]
    Reference {
        step: usize,
        tool: String,
        arg: String,
        #[source]
        source: ReferenceError,
    },
    #[error("step {step} ({tool}): {source}")]
    Invocation {
        step: usize,
        tool: String,
        #[source]
        source: InvocationError,
    },
}

impl PlanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPlan(_) => ErrorKind::InvalidPlan,
            Self::InvalidStep { .. } => ErrorKind::InvalidStep,
            Self::Reference { source, .. } => source.kind(),
            Self::Invocation { source, .. } => source.kind(),
        }
    }

    /// 1-based index of the failing step, if the failure is tied to one.
    pub fn step(&self) -> Option<usize> {
        match self {
            Self::InvalidPlan(_) => None,
            Self::InvalidStep { step, .. }
            | Self::Reference { step, .. }
            | Self::Invocation { step, .. } => Some(*step),
        }
    }

    pub fn tool(&self) -> Option<&str> {
        match self {
            Self::Reference { tool, .. } | Self::Invocation { tool, .. } => Some(tool),
            Self::InvalidPlan(_) | Self::InvalidStep { .. } => None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path segment '{segment}' not found under parent {parent_id}")]
    NotFound { segment: String, parent_id: String },
    #[error("segment lookup failed: {0}")]
    Lookup(String),
}

impl PathError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Lookup(_) => ErrorKind::TransportError,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ErrorKind, InvocationError, PathError, PlanError, ReferenceError};

    #[test]
    fn reference_failure_carries_step_tool_and_variable() {
        let error = PlanError::Reference {
            step: 3,
            tool: "list_instances".to_owned(),
            arg: "compartment_ocid".to_owned(),
            source: ReferenceError::NotFound { name: "comp".to_owned() },
        };

        assert_eq!(error.kind(), ErrorKind::ReferenceNotFound);
        assert_eq!(error.step(), Some(3));
        assert_eq!(error.tool(), Some("list_instances"));
        let message = error.to_string();
        assert!(message.contains("step 3"));
        assert!(message.contains("compartment_ocid"));
        assert!(message.contains("'comp'"));
    }

    #[test]
    fn null_reference_message_names_the_field() {
        let error = ReferenceError::NullReference {
            name: "inst".to_owned(),
            field: Some("id".to_owned()),
        };
        assert_eq!(error.kind(), ErrorKind::NullReference);
        assert_eq!(error.variable(), "inst");
        assert!(error.to_string().contains("cannot access field 'id'"));

        let bare = ReferenceError::NullReference { name: "inst".to_owned(), field: None };
        assert!(!bare.to_string().contains("field"));
    }

    #[test]
    fn invocation_kinds_split_transport_from_tool() {
        let transport = PlanError::Invocation {
            step: 1,
            tool: "get_id".to_owned(),
            source: InvocationError::Transport("connection refused".to_owned()),
        };
        let tool = PlanError::Invocation {
            step: 1,
            tool: "get_id".to_owned(),
            source: InvocationError::Tool("compartment missing".to_owned()),
        };

        assert_eq!(transport.kind(), ErrorKind::TransportError);
        assert_eq!(tool.kind(), ErrorKind::ToolError);
    }

    #[test]
    fn plan_level_failures_have_no_step() {
        let error = PlanError::InvalidPlan("'steps' must be a list".to_owned());
        assert_eq!(error.step(), None);
        assert_eq!(error.tool(), None);
        assert_eq!(
            PathError::NotFound { segment: "x".to_owned(), parent_id: "root".to_owned() }.kind(),
            ErrorKind::NotFound
        );
    }
}
