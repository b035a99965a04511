//! Commands that change task state (set, check)

use std::process::ExitCode;

use anyhow::Result;
use tracing::info;

use super::output::Output;
use super::workspace::Workspace;
use crate::domain::{AppliedChange, Engine, TaskId, TaskState, TransitionReport};
use crate::external::run_external;

/// Lines of tool output shown when a check fails
const OUTPUT_TAIL: usize = 20;

/// Change a task's state and run its triggers
pub fn set(output: &Output, workspace: &Workspace, id: &TaskId, state: TaskState) -> Result<ExitCode> {
    let mut engine = workspace.load_engine()?;

    let report = match engine.apply_transition(id, state) {
        Ok(report) => report,
        Err(err) => return Ok(output.engine_error(&err, 3)),
    };

    workspace.save(&engine)?;
    print_report(output, &report);

    Ok(ExitCode::SUCCESS)
}

fn print_report(output: &Output, report: &TransitionReport) {
    for warning in &report.warnings {
        output.warning(&warning.to_string());
    }

    if output.is_json() {
        output.data(report);
        return;
    }

    println!("{}: {} -> {}", report.task, report.from, report.to);
    for change in &report.applied {
        match change {
            AppliedChange::State {
                task,
                from,
                to,
                origin,
            } => println!("  {}: {} -> {} (triggered by {})", task, from, to, origin),
            AppliedChange::Property {
                task,
                name,
                value,
                origin,
                ..
            } => println!("  {}: {} = {} (triggered by {})", task, name, value, origin),
        }
    }
    if !report.newly_ready.is_empty() {
        let ids: Vec<&str> = report.newly_ready.iter().map(TaskId::as_str).collect();
        println!("Now ready: {}", ids.join(", "));
    }
    if !report.eligible_parents.is_empty() {
        let ids: Vec<&str> = report.eligible_parents.iter().map(TaskId::as_str).collect();
        println!("All children closed: {}", ids.join(", "));
    }
}

/// Splits a command line into program and arguments
fn command_for(engine: &Engine, id: &TaskId, given: &[String]) -> Option<Vec<String>> {
    if !given.is_empty() {
        return Some(given.to_vec());
    }
    let check = engine.task(id)?.property("CHECK")?;
    let parts: Vec<String> = check.split_whitespace().map(String::from).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts)
    }
}

/// Run a task's check command and complete the task when it passes
pub fn check(output: &Output, workspace: &Workspace, id: &TaskId, given: &[String]) -> Result<ExitCode> {
    let mut engine = workspace.load_engine()?;

    let current = match engine.require(id) {
        Ok(task) => task.state,
        Err(err) => return Ok(output.engine_error(&err, 3)),
    };

    let Some(command) = command_for(&engine, id, given) else {
        output.error(&format!(
            "Task {} has no CHECK property and no command was given",
            id
        ));
        return Ok(ExitCode::FAILURE);
    };

    output.verbose_ctx("check", &format!("Running: {}", command.join(" ")));
    let result = run_external(&command[0], &command[1..])?;

    if !result.success() {
        output.error(&format!(
            "Check for {} failed with exit code {}",
            id, result.exit_code
        ));
        for line in result.tail(OUTPUT_TAIL) {
            eprintln!("  {}", line);
        }
        return Ok(ExitCode::FAILURE);
    }
    info!(task = %id, "check passed");

    let mut reports = Vec::new();
    if current.is_some_and(TaskState::is_open) {
        match engine.apply_transition(id, TaskState::InProgress) {
            Ok(report) => reports.push(report),
            Err(err) => return Ok(output.engine_error(&err, 3)),
        }
    }
    match engine.apply_transition(id, TaskState::Done) {
        Ok(report) => reports.push(report),
        Err(err) => {
            // Keep the IN_PROGRESS move so the passed check is not lost
            if !reports.is_empty() {
                workspace.save(&engine)?;
            }
            return Ok(output.engine_error(&err, 3));
        }
    }

    workspace.save(&engine)?;
    for report in &reports {
        print_report(output, report);
    }

    Ok(ExitCode::SUCCESS)
}
