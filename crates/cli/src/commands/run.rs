use std::path::Path;

use serde_json::Value;
use toolplan_core::config::{AppConfig, LoadOptions};
use toolplan_core::{AuditContext, ExecutionResult, PlanInterpreter, TracingAuditSink, VariableStore};
use toolplan_mcp::McpToolInvoker;

use crate::commands::{error_class, plan_error_class, read_plan, CommandResult};

pub fn run(plan_path: &Path, json_output: bool) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "run",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    crate::logging::init(&config.logging);

    let plan = match read_plan(plan_path) {
        Ok(plan) => plan,
        Err(error) => {
            return CommandResult::failure("run", plan_error_class(&error), format!("{error:#}"), 4);
        }
    };

    let invoker = match McpToolInvoker::from_config(&config.mcp) {
        Ok(invoker) => invoker,
        Err(error) => {
            return CommandResult::failure("run", "config_validation", error.to_string(), 2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "run",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let audit = AuditContext::generate("toolplan-cli");
    let mut state = ExecutionResult::default();
    let outcome = runtime.block_on(PlanInterpreter.execute_into_with_audit(
        &plan,
        &invoker,
        &mut state,
        &TracingAuditSink,
        &audit,
    ));

    match outcome {
        Ok(()) if json_output => match serde_json::to_string_pretty(&state) {
            Ok(output) => CommandResult { exit_code: 0, output },
            Err(error) => CommandResult::failure("run", "serialization", error.to_string(), 5),
        },
        Ok(()) => CommandResult { exit_code: 0, output: render_variables(&state.variables) },
        Err(error) => {
            tracing::warn!(
                event_name = "cli.run.failed",
                run_id = %audit.run_id,
                steps_completed = state.steps.len(),
                variables = state.variables.len(),
                "plan run aborted"
            );
            let failure = CommandResult::failure(
                "run",
                error_class(error.kind()),
                format!("run {}: {error}", audit.run_id),
                5,
            );
            match partial_report(&state, json_output) {
                Some(partial) => CommandResult {
                    exit_code: failure.exit_code,
                    output: format!("{partial}\n{}", failure.output),
                },
                None => failure,
            }
        }
    }
}

/// What a failed run managed to record, printed ahead of the error envelope.
/// JSON mode emits the `{variables, steps}` report on one line.
fn partial_report(state: &ExecutionResult, json_output: bool) -> Option<String> {
    if json_output {
        if state.steps.is_empty() {
            return None;
        }
        return serde_json::to_string(state).ok();
    }
    if state.variables.is_empty() {
        return None;
    }
    Some(render_variables(&state.variables))
}

/// Human rendering of final variables: lists of mappings become one summary
/// line per item, anything else is pretty JSON.
pub fn render_variables(variables: &VariableStore) -> String {
    if variables.is_empty() {
        return "no variables were saved".to_string();
    }

    let mut lines = Vec::new();
    for (name, value) in variables.iter() {
        lines.push(format!("Variable: {name}"));
        match value {
            Value::Array(items) if items.first().is_some_and(Value::is_object) => {
                lines.push(format!("(list of {} items)", items.len()));
                lines.extend(items.iter().map(summary_line));
            }
            other => lines.push(
                serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
            ),
        }
        lines.push(String::new());
    }
    lines.pop();

    lines.join("\n")
}

fn summary_line(item: &Value) -> String {
    let name = first_text(item, &["name", "display_name"]);
    let id = first_text(item, &["id", "ocid"]);
    let created = first_text(item, &["time_created", "timeCreated"]);

    if name.is_empty() && id.is_empty() && created.is_empty() {
        return format!("- {item}");
    }
    format!("- {name} | {id} | {created}")
}

fn first_text(item: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| item.get(*key))
        .find_map(|value| match value {
            Value::Null => None,
            Value::String(text) if text.is_empty() => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        })
        .unwrap_or_default()
}
