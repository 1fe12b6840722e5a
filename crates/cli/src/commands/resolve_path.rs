use toolplan_core::config::{AppConfig, LoadOptions};
use toolplan_core::{PathResolver, PathResolverOptions, ToolSegmentLookup};
use toolplan_mcp::McpToolInvoker;

use crate::commands::{error_class, CommandResult};

pub fn run(path: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "resolve-path",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    crate::logging::init(&config.logging);

    let root_id = match config.paths.require_root_id() {
        Ok(root_id) => root_id.to_string(),
        Err(error) => {
            return CommandResult::failure(
                "resolve-path",
                "config_validation",
                error.to_string(),
                2,
            );
        }
    };

    let invoker = match McpToolInvoker::from_config(&config.mcp) {
        Ok(invoker) => invoker,
        Err(error) => {
            return CommandResult::failure(
                "resolve-path",
                "config_validation",
                error.to_string(),
                2,
            );
        }
    };

    let lookup = ToolSegmentLookup::new(
        invoker,
        config.paths.lookup_tool.clone(),
        config.paths.parent_arg.clone(),
        config.paths.name_arg.clone(),
    );
    let options = PathResolverOptions {
        root_id,
        root_marker: config.paths.root_marker.clone(),
        coalesce_misses: config.paths.coalesce_misses,
    };
    let resolver = PathResolver::new(lookup, options);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "resolve-path",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let canonical = resolver.canonicalize(path);
    match runtime.block_on(resolver.resolve_canonical(&canonical)) {
        Ok(id) => {
            let shown = if canonical.is_empty() { "<root>" } else { canonical.as_str() };
            CommandResult::success("resolve-path", format!("{shown} => {id}"))
        }
        Err(error) => {
            CommandResult::failure("resolve-path", error_class(error.kind()), error.to_string(), 5)
        }
    }
}
