pub mod audit;
pub mod config;
pub mod errors;
pub mod interpreter;
pub mod normalizer;
pub mod paths;
pub mod plan;
pub mod resolver;

pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use errors::{ErrorKind, InvocationError, PathError, PlanError, ReferenceError};
pub use interpreter::{ExecutionResult, ExecutionTrace, PlanInterpreter, StepResult, ToolInvoker};
pub use normalizer::{normalize, ContentPart, RawToolResult};
pub use paths::{PathResolver, PathResolverOptions, SegmentLookup, ToolSegmentLookup};
pub use plan::{ArgValue, Plan, Reference, Step};
pub use resolver::VariableStore;
