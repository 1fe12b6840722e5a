use std::process::ExitCode;

fn main() -> ExitCode {
    toolplan_cli::run()
}
