use serde::Serialize;
use toolplan_core::config::{AppConfig, LoadOptions};
use toolplan_mcp::McpToolInvoker;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult { exit_code, output };
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_path_root(&config));
            checks.push(check_mcp_reachability(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "path_root",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "mcp_reachability",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let any_fail = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_fail { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_fail {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Path resolution is optional; a missing root only skips it.
fn check_path_root(config: &AppConfig) -> DoctorCheck {
    match config.paths.require_root_id() {
        Ok(root_id) => DoctorCheck {
            name: "path_root",
            status: CheckStatus::Pass,
            details: format!(
                "resolving paths from `{root_id}` via tool `{}`",
                config.paths.lookup_tool
            ),
        },
        Err(error) => DoctorCheck {
            name: "path_root",
            status: CheckStatus::Skipped,
            details: error.to_string(),
        },
    }
}

fn check_mcp_reachability(config: &AppConfig) -> DoctorCheck {
    let invoker = match McpToolInvoker::from_config(&config.mcp) {
        Ok(invoker) => invoker,
        Err(error) => {
            return DoctorCheck {
                name: "mcp_reachability",
                status: CheckStatus::Fail,
                details: error.to_string(),
            };
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "mcp_reachability",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    match runtime.block_on(invoker.list_tools()) {
        Ok(tools) => {
            let lookup_listed = tools.iter().any(|tool| tool.name == config.paths.lookup_tool);
            let mut details =
                format!("`{}` answered tools/list with {} tool(s)", invoker.endpoint(), tools.len());
            if config.paths.root_id.is_some() && !lookup_listed {
                details.push_str(&format!(
                    "; lookup tool `{}` is not advertised",
                    config.paths.lookup_tool
                ));
            }
            DoctorCheck { name: "mcp_reachability", status: CheckStatus::Pass, details }
        }
        Err(error) => DoctorCheck {
            name: "mcp_reachability",
            status: CheckStatus::Fail,
            details: format!("`{}`: {error}", invoker.endpoint()),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
