//! Strictly sequential plan interpreter.
//!
//! Each step resolves its arguments against the bindings of earlier steps,
//! calls the tool, normalizes the result, records it in the trace, and
//! optionally binds it for later steps. The first failure aborts the run;
//! nothing is retried and bindings made by completed steps are kept.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::errors::{InvocationError, PlanError};
use crate::normalizer::{normalize, RawToolResult};
use crate::plan::{Plan, Step};
use crate::resolver::{resolve, VariableStore};

/// Performs a single tool call. Timeouts and transport concerns belong to
/// the implementation; any error is fatal to the current plan.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(
        &self,
        tool: &str,
        args: &Map<String, Value>,
    ) -> Result<RawToolResult, InvocationError>;
}

#[async_trait]
impl<T> ToolInvoker for Arc<T>
where
    T: ToolInvoker + ?Sized,
{
    async fn invoke(
        &self,
        tool: &str,
        args: &Map<String, Value>,
    ) -> Result<RawToolResult, InvocationError> {
        (**self).invoke(tool, args).await
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StepResult {
    #[serde(rename = "step")]
    pub index: usize,
    pub tool: String,
    #[serde(rename = "args")]
    pub resolved_args: Map<String, Value>,
    pub raw_result: RawToolResult,
    #[serde(rename = "parsed_result")]
    pub normalized_result: Value,
}

/// Append-only record of executed steps, in step order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExecutionTrace {
    steps: Vec<StepResult>,
}

impl ExecutionTrace {
    fn push(&mut self, result: StepResult) {
        self.steps.push(result);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StepResult> {
        self.steps.iter()
    }

    pub fn as_slice(&self) -> &[StepResult] {
        &self.steps
    }
}

/// Variables and trace of one plan run. On failure, a caller that used
/// [`PlanInterpreter::execute_into`] still holds everything recorded up to
/// the failing step.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub variables: VariableStore,
    pub steps: ExecutionTrace,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PlanInterpreter;

impl PlanInterpreter {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute<I>(&self, plan: &Plan, invoker: &I) -> Result<ExecutionResult, PlanError>
    where
        I: ToolInvoker + ?Sized,
    {
        let mut state = ExecutionResult::default();
        self.run(plan, invoker, &mut state, None).await?;
        Ok(state)
    }

    /// Executes into caller-owned state so partial results survive a failure.
    pub async fn execute_into<I>(
        &self,
        plan: &Plan,
        invoker: &I,
        state: &mut ExecutionResult,
    ) -> Result<(), PlanError>
    where
        I: ToolInvoker + ?Sized,
    {
        self.run(plan, invoker, state, None).await
    }

    pub async fn execute_with_audit<I, S>(
        &self,
        plan: &Plan,
        invoker: &I,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<ExecutionResult, PlanError>
    where
        I: ToolInvoker + ?Sized,
        S: AuditSink,
    {
        let mut state = ExecutionResult::default();
        self.execute_into_with_audit(plan, invoker, &mut state, sink, audit).await?;
        Ok(state)
    }

    pub async fn execute_into_with_audit<I, S>(
        &self,
        plan: &Plan,
        invoker: &I,
        state: &mut ExecutionResult,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<(), PlanError>
    where
        I: ToolInvoker + ?Sized,
        S: AuditSink,
    {
        self.run(plan, invoker, state, Some((sink as &dyn AuditSink, audit))).await
    }

    async fn run<I>(
        &self,
        plan: &Plan,
        invoker: &I,
        state: &mut ExecutionResult,
        audit: Option<(&dyn AuditSink, &AuditContext)>,
    ) -> Result<(), PlanError>
    where
        I: ToolInvoker + ?Sized,
    {
        info!(event_name = "plan.started", steps = plan.len(), "executing plan");
        if let Some((sink, context)) = audit {
            sink.emit(
                AuditEvent::new(context, "plan.started", AuditCategory::Plan, AuditOutcome::Success)
                    .with_metadata("steps", plan.len().to_string()),
            );
        }

        for (offset, step) in plan.steps.iter().enumerate() {
            let index = offset + 1;
            match self.run_step(index, step, invoker, state).await {
                Ok(()) => {
                    if let Some((sink, context)) = audit {
                        let mut event = AuditEvent::new(
                            context,
                            "step.completed",
                            AuditCategory::Step,
                            AuditOutcome::Success,
                        )
                        .for_step(index, step.tool.clone());
                        if let Some(name) = step.binding_name() {
                            event = event.with_metadata("saved_as", name);
                        }
                        sink.emit(event);
                    }
                }
                Err(error) => {
                    warn!(
                        event_name = "plan.step.failed",
                        step = index,
                        tool = %step.tool,
                        error_kind = ?error.kind(),
                        error = %error,
                        "plan step failed; aborting plan"
                    );
                    if let Some((sink, context)) = audit {
                        sink.emit(
                            AuditEvent::new(
                                context,
                                "step.failed",
                                AuditCategory::Step,
                                AuditOutcome::Failed,
                            )
                            .for_step(index, step.tool.clone())
                            .with_metadata("error_kind", format!("{:?}", error.kind()))
                            .with_metadata("error", error.to_string()),
                        );
                    }
                    return Err(error);
                }
            }
        }

        info!(
            event_name = "plan.completed",
            steps = state.steps.len(),
            variables = state.variables.len(),
            "plan execution complete"
        );
        if let Some((sink, context)) = audit {
            sink.emit(
                AuditEvent::new(
                    context,
                    "plan.completed",
                    AuditCategory::Plan,
                    AuditOutcome::Success,
                )
                .with_metadata("variables", state.variables.len().to_string()),
            );
        }

        Ok(())
    }

    async fn run_step<I>(
        &self,
        index: usize,
        step: &Step,
        invoker: &I,
        state: &mut ExecutionResult,
    ) -> Result<(), PlanError>
    where
        I: ToolInvoker + ?Sized,
    {
        if step.tool.trim().is_empty() {
            return Err(PlanError::InvalidStep {
                step: index,
                message: "missing 'tool'".to_string(),
            });
        }

        let resolved_args = resolve_args(index, step, &state.variables)?;
        let args = Value::Object(resolved_args.clone());

        info!(
            event_name = "plan.step.invoke",
            step = index,
            tool = %step.tool,
            args = %args,
            "calling tool"
        );

        let raw_result = invoker.invoke(&step.tool, &resolved_args).await.map_err(|source| {
            PlanError::Invocation { step: index, tool: step.tool.clone(), source }
        })?;
        let normalized_result = normalize(&raw_result);

        debug!(
            event_name = "plan.step.result",
            step = index,
            tool = %step.tool,
            result = %normalized_result,
            "normalized tool result"
        );

        state.steps.push(StepResult {
            index,
            tool: step.tool.clone(),
            resolved_args,
            raw_result,
            normalized_result: normalized_result.clone(),
        });

        if let Some(name) = step.binding_name() {
            match &normalized_result {
                Value::Array(items) => info!(
                    event_name = "plan.step.saved",
                    step = index,
                    variable = name,
                    items = items.len(),
                    "saved list result as variable"
                ),
                _ => info!(
                    event_name = "plan.step.saved",
                    step = index,
                    variable = name,
                    "saved result as variable"
                ),
            }
            state.variables.bind(name, normalized_result);
        }

        Ok(())
    }
}

fn resolve_args(
    index: usize,
    step: &Step,
    store: &VariableStore,
) -> Result<Map<String, Value>, PlanError> {
    let mut resolved = Map::new();
    for (key, value) in &step.args {
        let value = resolve(value, store).map_err(|source| PlanError::Reference {
            step: index,
            tool: step.tool.clone(),
            arg: key.clone(),
            source,
        })?;
        resolved.insert(key.clone(), value);
    }
    Ok(resolved)
}
