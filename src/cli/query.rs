//! Query commands (ready, graph, stats, analyze, list, show, validate)
//!
//! These commands load the corpus, answer from the engine and never write.

use std::process::ExitCode;

use anyhow::Result;
use serde::Serialize;

use super::output::Output;
use super::workspace::Workspace;
use crate::domain::{
    resolve_finder, DeclarationKind, Engine, EngineError, Finder, Task, TaskId, TaskState,
};

fn priority_label(task: &Task) -> String {
    task.priority.map(|p| p.to_string()).unwrap_or_default()
}

/// Show tasks ready to work on
pub fn ready(output: &Output, workspace: &Workspace, project: Option<&str>) -> Result<ExitCode> {
    let engine = workspace.load_engine()?;

    let tasks = match project {
        Some(project) => {
            output.verbose_ctx("ready", &format!("Filtering by project: {}", project));
            let scoped = project
                .parse::<TaskId>()
                .map_err(|err| err.to_string())
                .and_then(|id| engine.actionable_tasks_in(&id).map_err(|err| err.to_string()));
            match scoped {
                Ok(tasks) => tasks,
                Err(message) => {
                    output.warning(&message);
                    Vec::new()
                }
            }
        }
        None => engine.actionable_tasks(),
    };

    output.verbose_ctx("ready", &format!("Found {} ready tasks", tasks.len()));

    if output.is_json() {
        let items: Vec<_> = tasks
            .iter()
            .map(|t| {
                serde_json::json!({
                    "id": t.id,
                    "heading": t.heading,
                    "state": t.state,
                    "priority": t.priority,
                    "parent_id": t.parent_id,
                })
            })
            .collect();
        output.data(&items);
    } else if tasks.is_empty() {
        println!("No tasks ready to work on.");
    } else {
        println!("Ready tasks ({}):", tasks.len());
        println!("{:<20} {:<4} {:<12} HEADING", "ID", "PRI", "STATE");
        println!("{}", "-".repeat(60));
        for task in tasks {
            let state = task.state.map(|s| s.to_string()).unwrap_or_default();
            println!(
                "{:<20} {:<4} {:<12} {}",
                task.id,
                priority_label(task),
                state,
                task.heading
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Show the neighbourhood of a task in the dependency graph
pub fn graph(output: &Output, workspace: &Workspace, id: &TaskId, dot: bool) -> Result<ExitCode> {
    let engine = workspace.load_engine()?;

    let graph = match engine.dependency_graph(id) {
        Ok(graph) => graph,
        Err(err) => return Ok(output.engine_error(&err, 2)),
    };

    if let Some(cycle) = &graph.cycle {
        let path: Vec<&str> = cycle.iter().map(TaskId::as_str).collect();
        output.warning(&format!("blocking cycle: {}", path.join(" -> ")));
    }

    if dot {
        print!("{}", graph.to_dot());
        return Ok(ExitCode::SUCCESS);
    }

    if output.is_json() {
        output.data(&graph);
        return Ok(ExitCode::SUCCESS);
    }

    let root = engine.require(id)?;
    println!("{} {} [{}]", root.id, root.heading, status_label(&engine, &root.id));
    println!("{}", "-".repeat(60));
    for edge in &graph.edges {
        let label = if edge.label.is_empty() {
            String::new()
        } else {
            format!("  ({})", edge.label)
        };
        println!(
            "{:<20} --{:?}--> {}{}",
            edge.from,
            edge.kind,
            edge.to,
            label
        );
    }
    if graph.edges.is_empty() {
        println!("No dependencies.");
    }

    Ok(ExitCode::SUCCESS)
}

fn status_label(engine: &Engine, id: &TaskId) -> &'static str {
    engine
        .effective_status(id)
        .map(|s| s.label())
        .unwrap_or("?")
}

/// Show summary counts
pub fn stats(output: &Output, workspace: &Workspace) -> Result<ExitCode> {
    let engine = workspace.load_engine()?;
    let summary = engine.summary();

    if output.is_json() {
        output.data(&summary);
        return Ok(ExitCode::SUCCESS);
    }

    println!("Task Graph Status");
    println!("{}", "=".repeat(40));
    println!();
    println!("Tasks: {} total ({} projects)", summary.total, summary.containers);
    for (state, count) in &summary.by_state {
        println!("  {:<12} {}", state.keyword(), count);
    }
    println!();
    for (status, count) in &summary.by_status {
        if matches!(status.label(), "READY" | "WAITING") {
            println!("  {:<12} {}", status.label(), count);
        }
    }

    if summary.invalid_declarations > 0 || summary.cycles > 0 {
        println!();
        println!("Invalid declarations: {}", summary.invalid_declarations);
        println!("Blocking cycles:      {}", summary.cycles);
    }

    Ok(ExitCode::SUCCESS)
}

/// Show the critical path, bottlenecks and parallel phases of remaining work
pub fn analyze(output: &Output, workspace: &Workspace, limit: usize) -> Result<ExitCode> {
    let engine = workspace.load_engine()?;

    let analysis = match engine.analysis(limit) {
        Ok(analysis) => analysis,
        Err(EngineError::CycleDetected { path }) => {
            let path: Vec<&str> = path.iter().map(TaskId::as_str).collect();
            output.warning(&format!("blocking cycle: {}", path.join(" -> ")));
            output.error("Dependency analysis needs an acyclic blocking graph");
            return Ok(ExitCode::FAILURE);
        }
        Err(err) => return Ok(output.engine_error(&err, 1)),
    };

    if output.is_json() {
        output.data(&analysis);
        return Ok(ExitCode::SUCCESS);
    }

    println!("Critical path ({} tasks):", analysis.critical_path.len());
    if analysis.critical_path.is_empty() {
        println!("  No remaining dependencies.");
    } else {
        let path: Vec<&str> = analysis.critical_path.iter().map(TaskId::as_str).collect();
        println!("  {}", path.join(" -> "));
    }

    println!();
    println!("Bottlenecks:");
    if analysis.bottlenecks.is_empty() {
        println!("  None.");
    } else {
        println!("  {:<20} {:<12} {:>6} {:>10}  HEADING", "ID", "STATUS", "DIRECT", "TRANSITIVE");
        for b in &analysis.bottlenecks {
            println!(
                "  {:<20} {:<12} {:>6} {:>10}  {}",
                b.id, b.status, b.direct, b.transitive, b.heading
            );
        }
    }

    println!();
    println!("Parallel phases:");
    if analysis.phases.is_empty() {
        println!("  No open tasks.");
    }
    for (n, phase) in analysis.phases.iter().enumerate() {
        let ids: Vec<&str> = phase.iter().map(TaskId::as_str).collect();
        println!("  {}: {}", n + 1, ids.join(", "));
    }

    Ok(ExitCode::SUCCESS)
}

/// List tasks, optionally filtered by state
pub fn list(output: &Output, workspace: &Workspace, state: Option<TaskState>) -> Result<ExitCode> {
    let engine = workspace.load_engine()?;

    let tasks: Vec<&Task> = engine
        .store()
        .all()
        .filter(|t| state.is_none() || t.state == state)
        .collect();

    if output.is_json() {
        let items: Vec<_> = tasks
            .iter()
            .map(|t| {
                serde_json::json!({
                    "id": t.id,
                    "heading": t.heading,
                    "state": t.state,
                    "status": engine.effective_status(&t.id),
                    "priority": t.priority,
                    "parent_id": t.parent_id,
                })
            })
            .collect();
        output.data(&items);
    } else if tasks.is_empty() {
        println!("No tasks.");
    } else {
        println!("{:<20} {:<12} {:<4} HEADING", "ID", "STATUS", "PRI");
        println!("{}", "-".repeat(60));
        for task in tasks {
            println!(
                "{:<20} {:<12} {:<4} {}",
                task.id,
                status_label(&engine, &task.id),
                priority_label(task),
                task.heading
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Show one task with its resolved blocker
pub fn show(output: &Output, workspace: &Workspace, id: &TaskId) -> Result<ExitCode> {
    let engine = workspace.load_engine()?;

    let task = match engine.require(id) {
        Ok(task) => task,
        Err(err) => return Ok(output.engine_error(&err, 3)),
    };
    let resolution = engine.resolve(id);

    if output.is_json() {
        let (resolution, error) = match &resolution {
            Ok(r) => (Some(r), None),
            Err(e) => (None, Some(e.to_string())),
        };
        output.data(&serde_json::json!({
            "task": task,
            "status": engine.effective_status(id),
            "resolution": resolution,
            "error": error,
            "children": engine.store().child_ids(id),
        }));
        return Ok(ExitCode::SUCCESS);
    }

    println!("Task: {}", task.id);
    println!("Heading: {}", task.heading);
    println!("Status: {}", status_label(&engine, id));
    if let Some(state) = task.state {
        println!("State: {}", state);
    }
    if let Some(priority) = task.priority {
        println!("Priority: {}", priority);
    }
    if let Some(parent) = &task.parent_id {
        println!("Parent: {}", parent);
    }
    if !task.tags.is_empty() {
        let tags: Vec<&str> = task.tags.iter().map(String::as_str).collect();
        println!("Tags: {}", tags.join(", "));
    }
    if let Some(blocker) = &task.blocker {
        println!("BLOCKER: {}", blocker);
    }
    if let Some(trigger) = &task.trigger {
        println!("TRIGGER: {}", trigger);
    }
    if let Some(closed_at) = task.closed_at {
        println!("Closed: {}", closed_at.to_rfc3339());
    }

    match resolution {
        Ok(resolution) => {
            for unsatisfied in &resolution.unsatisfied {
                let mut waiting: Vec<String> =
                    unsatisfied.targets.iter().map(ToString::to_string).collect();
                waiting.extend(unsatisfied.missing.iter().map(|id| format!("{} (unknown)", id)));
                println!("  waiting on {}: {}", unsatisfied.clause, waiting.join(", "));
            }
        }
        Err(err) => output.warning(&err.to_string()),
    }

    let children = engine.store().children_of(id);
    if !children.is_empty() {
        println!();
        println!("Children ({}):", children.len());
        for child in children {
            println!("  {:<20} {:<12} {}", child.id, status_label(&engine, &child.id), child.heading);
        }
    }

    let properties: Vec<_> = task.properties.iter().collect();
    if !properties.is_empty() {
        println!();
        println!("Properties:");
        for (key, value) in properties {
            println!("  {}: {}", key, value);
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// One problem found by `validate`
#[derive(Debug, Serialize)]
pub struct Problem {
    pub task: Option<TaskId>,
    pub kind: &'static str,
    pub message: String,
}

/// Collects declaration errors, dangling references and blocking cycles
pub fn find_problems(engine: &Engine) -> Vec<Problem> {
    let mut problems: Vec<Problem> = engine
        .invalid_declarations()
        .into_iter()
        .map(|err| {
            let task = match &err {
                EngineError::Parse { task, .. } => Some(task.clone()),
                _ => None,
            };
            Problem {
                task,
                kind: "parse",
                message: err.to_string(),
            }
        })
        .collect();

    for task in engine.store().all() {
        let Some(decls) = engine.declarations(&task.id) else {
            continue;
        };

        let blocker_finders = decls
            .blocker
            .iter()
            .flatten()
            .flat_map(|b| b.clauses.iter().map(|c| (&c.finder, &c.text)));
        let trigger_finders = decls
            .trigger
            .iter()
            .flatten()
            .flat_map(|t| t.clauses.iter().map(|c| (&c.finder, &c.text)));

        let declared = blocker_finders
            .map(|f| (DeclarationKind::Blocker, f))
            .chain(trigger_finders.map(|f| (DeclarationKind::Trigger, f)));

        for (kind, (finder, text)) in declared {
            if !matches!(finder, Finder::Ids(_)) {
                continue;
            }
            let targets = resolve_finder(engine.store(), &task.id, finder);
            for missing in targets.missing {
                problems.push(Problem {
                    task: Some(task.id.clone()),
                    kind: "unknown_id",
                    message: format!("{} clause '{}' references unknown task {}", kind, text, missing),
                });
            }
        }
    }

    for cycle in engine.cycles() {
        let path: Vec<&str> = cycle.iter().map(TaskId::as_str).collect();
        problems.push(Problem {
            task: cycle.first().cloned(),
            kind: "cycle",
            message: format!("Blocking cycle: {}", path.join(" -> ")),
        });
    }

    problems
}

/// Check every declaration in the corpus
pub fn validate(output: &Output, workspace: &Workspace) -> Result<ExitCode> {
    let engine = workspace.load_engine()?;
    let problems = find_problems(&engine);
    let valid = problems.is_empty();

    output.verbose_ctx(
        "validate",
        &format!("Checked {} tasks, {} problems", engine.store().len(), problems.len()),
    );

    if output.is_json() {
        output.data(&serde_json::json!({
            "valid": valid,
            "tasks": engine.store().len(),
            "problems": &problems,
        }));
    } else if valid {
        println!("OK: {} tasks, no problems found.", engine.store().len());
    } else {
        println!("Problems ({}):", problems.len());
        println!("{:<20} {:<12} MESSAGE", "TASK", "KIND");
        println!("{}", "-".repeat(60));
        for problem in &problems {
            let task = problem.task.as_ref().map(TaskId::as_str).unwrap_or("-");
            println!("{:<20} {:<12} {}", task, problem.kind, problem.message);
        }
    }

    if valid {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
