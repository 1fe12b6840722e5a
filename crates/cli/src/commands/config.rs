use std::env;
use std::fs;
use std::path::Path;

use secrecy::ExposeSecret;
use toml::Value;
use toolplan_core::config::{resolve_config_path, AppConfig, LoadOptions};

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "mcp.base_url",
        &config.mcp.base_url,
        source("mcp.base_url", &["TOOLPLAN_MCP_BASE_URL", "MCP_BASE_URL"]),
    ));
    lines.push(render_line(
        "mcp.timeout_secs",
        &config.mcp.timeout_secs.to_string(),
        source("mcp.timeout_secs", &["TOOLPLAN_MCP_TIMEOUT_SECS"]),
    ));
    let auth_token = config
        .mcp
        .auth_token
        .as_ref()
        .map(|token| redact_token(token.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    lines.push(render_line(
        "mcp.auth_token",
        &auth_token,
        source("mcp.auth_token", &["TOOLPLAN_MCP_AUTH_TOKEN"]),
    ));

    lines.push(render_line(
        "paths.root_id",
        config.paths.root_id.as_deref().unwrap_or("<unset>"),
        source("paths.root_id", &["TOOLPLAN_PATHS_ROOT_ID"]),
    ));
    lines.push(render_line(
        "paths.root_marker",
        &config.paths.root_marker,
        source("paths.root_marker", &["TOOLPLAN_PATHS_ROOT_MARKER"]),
    ));
    lines.push(render_line(
        "paths.lookup_tool",
        &config.paths.lookup_tool,
        source("paths.lookup_tool", &["TOOLPLAN_PATHS_LOOKUP_TOOL"]),
    ));
    lines.push(render_line(
        "paths.parent_arg",
        &config.paths.parent_arg,
        source("paths.parent_arg", &["TOOLPLAN_PATHS_PARENT_ARG"]),
    ));
    lines.push(render_line(
        "paths.name_arg",
        &config.paths.name_arg,
        source("paths.name_arg", &["TOOLPLAN_PATHS_NAME_ARG"]),
    ));
    lines.push(render_line(
        "paths.coalesce_misses",
        &config.paths.coalesce_misses.to_string(),
        source("paths.coalesce_misses", &["TOOLPLAN_PATHS_COALESCE_MISSES"]),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["TOOLPLAN_LOGGING_LEVEL", "TOOLPLAN_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", &["TOOLPLAN_LOGGING_FORMAT", "TOOLPLAN_LOG_FORMAT"]),
    ));

    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<toml::Table>().ok().map(Value::Table)
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps an auth scheme such as `Bearer` visible and hides the credential.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((scheme, _)) = trimmed.split_once(' ') {
        return format!("{scheme} ***");
    }

    "<redacted>".to_string()
}
