pub mod config;
pub mod doctor;
pub mod resolve_path;
pub mod run;
pub mod validate;

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use toolplan_core::{ErrorKind, Plan, PlanError};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Reads and parses a plan file. Errors carry the file path.
pub(crate) fn read_plan(path: &Path) -> anyhow::Result<Plan> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read plan file `{}`", path.display()))?;
    let plan = Plan::from_json_str(&raw)
        .with_context(|| format!("plan file `{}` is not a valid plan", path.display()))?;
    Ok(plan)
}

/// Class of a `read_plan` failure. Unreadable files count as invalid plans.
pub(crate) fn plan_error_class(error: &anyhow::Error) -> &'static str {
    error
        .downcast_ref::<PlanError>()
        .map(|plan_error| error_class(plan_error.kind()))
        .unwrap_or("invalid_plan")
}

pub(crate) fn error_class(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidPlan => "invalid_plan",
        ErrorKind::InvalidStep => "invalid_step",
        ErrorKind::ReferenceNotFound => "reference_not_found",
        ErrorKind::NullReference => "null_reference",
        ErrorKind::TypeMismatch => "type_mismatch",
        ErrorKind::FieldNotFound => "field_not_found",
        ErrorKind::NotFound => "not_found",
        ErrorKind::TransportError => "transport_error",
        ErrorKind::ToolError => "tool_error",
    }
}
