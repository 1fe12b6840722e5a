pub mod commands;
pub mod logging;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "toolplan",
    about = "Toolplan operator CLI",
    long_about = "Execute, validate, and troubleshoot JSON tool plans against an MCP tool server.",
    after_help = "Examples:\n  toolplan run --plan plan.json\n  toolplan validate --plan plan.json\n  toolplan resolve-path root/prod/app\n  toolplan doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Execute a plan step by step against the configured MCP server")]
    Run {
        #[arg(long, help = "Path to the plan JSON file")]
        plan: PathBuf,
        #[arg(long, help = "Emit the full execution result as JSON")]
        json: bool,
    },
    #[command(about = "Parse and validate a plan without calling any tool")]
    Validate {
        #[arg(long, help = "Path to the plan JSON file")]
        plan: PathBuf,
    },
    #[command(about = "Resolve a slash-separated hierarchical path to its identifier")]
    ResolvePath {
        #[arg(help = "Path such as `root/prod/app` or `prod/app`")]
        path: String,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and MCP server reachability")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run { plan, json } => commands::run::run(&plan, json),
        Command::Validate { plan } => commands::validate::run(&plan),
        Command::ResolvePath { path } => commands::resolve_path::run(&path),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn parses_run_with_plan_and_json_flag() {
        let cli = Cli::try_parse_from(["toolplan", "run", "--plan", "plan.json", "--json"])
            .expect("run arguments should parse");
        match cli.command {
            Command::Run { plan, json } => {
                assert_eq!(plan.to_str(), Some("plan.json"));
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_resolve_path_positional() {
        let cli = Cli::try_parse_from(["toolplan", "resolve-path", "root/prod/app"])
            .expect("resolve-path arguments should parse");
        assert!(matches!(cli.command, Command::ResolvePath { ref path } if path == "root/prod/app"));
    }

    #[test]
    fn run_requires_plan() {
        assert!(Cli::try_parse_from(["toolplan", "run"]).is_err());
    }
}
