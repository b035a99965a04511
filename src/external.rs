//! External command invocation
//!
//! Build and test tools are opaque: only the exit code gates a check, the
//! captured output is kept for display.

use std::process::Command;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

/// Captured result of an external command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalOutput {
    /// Exit code, or -1 if the process was killed by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExternalOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last `n` lines of combined stdout and stderr
    pub fn tail(&self, n: usize) -> Vec<&str> {
        let lines: Vec<&str> = self.stdout.lines().chain(self.stderr.lines()).collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].to_vec()
    }
}

/// Runs `command` with `args` and waits for it to exit
///
/// Fails only if the process cannot be spawned; a non-zero exit is reported
/// through [`ExternalOutput::exit_code`].
pub fn run_external<S: AsRef<str>>(command: &str, args: &[S]) -> Result<ExternalOutput> {
    let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    debug!(command, ?args, "running external command");

    let output = Command::new(command)
        .args(&args)
        .output()
        .with_context(|| format!("Failed to execute: {}", command))?;

    let result = ExternalOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    debug!(command, exit_code = result.exit_code, "external command finished");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn captures_exit_code_and_output() {
        let ok = run_external("sh", &["-c", "echo hello; echo oops >&2"]).unwrap();
        assert!(ok.success());
        assert_eq!(ok.stdout.trim(), "hello");
        assert_eq!(ok.stderr.trim(), "oops");

        let failed = run_external("sh", &["-c", "exit 3"]).unwrap();
        assert_eq!(failed.exit_code, 3);
        assert!(!failed.success());
    }

    #[test]
    fn missing_command_is_an_error() {
        let empty: [&str; 0] = [];
        assert!(run_external("definitely-not-a-real-command-xyz", &empty).is_err());
    }

    #[test]
    fn tail_keeps_last_lines() {
        let output = ExternalOutput {
            exit_code: 1,
            stdout: "a\nb\nc\n".to_string(),
            stderr: "d\n".to_string(),
        };
        assert_eq!(output.tail(2), vec!["c", "d"]);
        assert_eq!(output.tail(10).len(), 4);
    }
}
