use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["toolplan.toml", "config/toolplan.toml"];

/// Every environment variable the loader reads.
pub const ENV_KEYS: [&str; 14] = [
    "TOOLPLAN_MCP_BASE_URL",
    "MCP_BASE_URL",
    "TOOLPLAN_MCP_TIMEOUT_SECS",
    "TOOLPLAN_MCP_AUTH_TOKEN",
    "TOOLPLAN_PATHS_ROOT_ID",
    "TOOLPLAN_PATHS_ROOT_MARKER",
    "TOOLPLAN_PATHS_LOOKUP_TOOL",
    "TOOLPLAN_PATHS_PARENT_ARG",
    "TOOLPLAN_PATHS_NAME_ARG",
    "TOOLPLAN_PATHS_COALESCE_MISSES",
    "TOOLPLAN_LOGGING_LEVEL",
    "TOOLPLAN_LOGGING_FORMAT",
    "TOOLPLAN_LOG_LEVEL",
    "TOOLPLAN_LOG_FORMAT",
];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub mcp: McpConfig,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct McpConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub auth_token: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct PathsConfig {
    pub root_id: Option<String>,
    pub root_marker: String,
    pub lookup_tool: String,
    pub parent_arg: String,
    pub name_arg: String,
    pub coalesce_misses: bool,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub mcp_base_url: Option<String>,
    pub mcp_timeout_secs: Option<u64>,
    pub paths_root_id: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mcp: McpConfig {
                base_url: "http://localhost:8000/mcp".to_string(),
                timeout_secs: 120,
                auth_token: None,
            },
            paths: PathsConfig {
                root_id: None,
                root_marker: "root".to_string(),
                lookup_tool: "find_child".to_string(),
                parent_arg: "parent_id".to_string(),
                name_arg: "name".to_string(),
                coalesce_misses: false,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(mcp) = patch.mcp {
            if let Some(base_url) = mcp.base_url {
                self.mcp.base_url = base_url;
            }
            if let Some(timeout_secs) = mcp.timeout_secs {
                self.mcp.timeout_secs = timeout_secs;
            }
            if let Some(auth_token) = mcp.auth_token {
                self.mcp.auth_token = Some(auth_token.into());
            }
        }

        if let Some(paths) = patch.paths {
            if let Some(root_id) = paths.root_id {
                self.paths.root_id = Some(root_id);
            }
            if let Some(root_marker) = paths.root_marker {
                self.paths.root_marker = root_marker;
            }
            if let Some(lookup_tool) = paths.lookup_tool {
                self.paths.lookup_tool = lookup_tool;
            }
            if let Some(parent_arg) = paths.parent_arg {
                self.paths.parent_arg = parent_arg;
            }
            if let Some(name_arg) = paths.name_arg {
                self.paths.name_arg = name_arg;
            }
            if let Some(coalesce_misses) = paths.coalesce_misses {
                self.paths.coalesce_misses = coalesce_misses;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let base_url = read_env("TOOLPLAN_MCP_BASE_URL").or_else(|| read_env("MCP_BASE_URL"));
        if let Some(value) = base_url {
            self.mcp.base_url = value;
        }
        if let Some(value) = read_env("TOOLPLAN_MCP_TIMEOUT_SECS") {
            self.mcp.timeout_secs = parse_u64("TOOLPLAN_MCP_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TOOLPLAN_MCP_AUTH_TOKEN") {
            self.mcp.auth_token = Some(value.into());
        }

        if let Some(value) = read_env("TOOLPLAN_PATHS_ROOT_ID") {
            self.paths.root_id = Some(value);
        }
        if let Some(value) = read_env("TOOLPLAN_PATHS_ROOT_MARKER") {
            self.paths.root_marker = value;
        }
        if let Some(value) = read_env("TOOLPLAN_PATHS_LOOKUP_TOOL") {
            self.paths.lookup_tool = value;
        }
        if let Some(value) = read_env("TOOLPLAN_PATHS_PARENT_ARG") {
            self.paths.parent_arg = value;
        }
        if let Some(value) = read_env("TOOLPLAN_PATHS_NAME_ARG") {
            self.paths.name_arg = value;
        }
        if let Some(value) = read_env("TOOLPLAN_PATHS_COALESCE_MISSES") {
            self.paths.coalesce_misses = parse_bool("TOOLPLAN_PATHS_COALESCE_MISSES", &value)?;
        }

        let log_level =
            read_env("TOOLPLAN_LOGGING_LEVEL").or_else(|| read_env("TOOLPLAN_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TOOLPLAN_LOGGING_FORMAT").or_else(|| read_env("TOOLPLAN_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(base_url) = overrides.mcp_base_url {
            self.mcp.base_url = base_url;
        }
        if let Some(timeout_secs) = overrides.mcp_timeout_secs {
            self.mcp.timeout_secs = timeout_secs;
        }
        if let Some(root_id) = overrides.paths_root_id {
            self.paths.root_id = Some(root_id);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_mcp(&self.mcp)?;
        validate_paths(&self.paths)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

impl PathsConfig {
    /// The configured root identifier, required only for path resolution.
    pub fn require_root_id(&self) -> Result<&str, ConfigError> {
        self.root_id.as_deref().filter(|id| !id.trim().is_empty()).ok_or_else(|| {
            ConfigError::Validation(
                "paths.root_id is required to resolve paths (set TOOLPLAN_PATHS_ROOT_ID)"
                    .to_string(),
            )
        })
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_FILES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_mcp(mcp: &McpConfig) -> Result<(), ConfigError> {
    let base_url = mcp.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "mcp.base_url must start with http:// or https:// (set TOOLPLAN_MCP_BASE_URL)"
                .to_string(),
        ));
    }

    if mcp.timeout_secs == 0 || mcp.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "mcp.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if let Some(token) = &mcp.auth_token {
        if token.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "mcp.auth_token must not be blank when set".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_paths(paths: &PathsConfig) -> Result<(), ConfigError> {
    if paths.root_marker.trim().is_empty() || paths.root_marker.contains('/') {
        return Err(ConfigError::Validation(
            "paths.root_marker must be a single non-empty path segment".to_string(),
        ));
    }

    if paths.lookup_tool.trim().is_empty() {
        return Err(ConfigError::Validation("paths.lookup_tool must not be empty".to_string()));
    }

    if paths.parent_arg.trim().is_empty() || paths.name_arg.trim().is_empty() {
        return Err(ConfigError::Validation(
            "paths.parent_arg and paths.name_arg must not be empty".to_string(),
        ));
    }

    if paths.parent_arg == paths.name_arg {
        return Err(ConfigError::Validation(
            "paths.parent_arg and paths.name_arg must differ".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    mcp: Option<McpPatch>,
    paths: Option<PathsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct McpPatch {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    auth_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PathsPatch {
    root_id: Option<String>,
    root_marker: Option<String>,
    lookup_tool: Option<String>,
    parent_arg: Option<String>,
    name_arg: Option<String>,
    coalesce_misses: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
