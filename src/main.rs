//! `tasks` - task dependency graph CLI

use std::process::ExitCode;

fn main() -> ExitCode {
    match task_graph::cli::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
