//! Main CLI application structure

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use super::output::{Output, OutputFormat};
use super::workspace::Workspace;
use super::{query, task};
use crate::domain::{TaskId, TaskState};
use crate::logging::{self, LogLevel};
use crate::storage::{Config, Project, SourceFormat};

#[derive(Parser)]
#[command(name = "tasks")]
#[command(author, version, about = "Task dependency graph: what can I work on, and what happens when I finish it")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config, then text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Log level for diagnostics on stderr
    #[arg(long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Task source to use instead of the project's configured one
    #[arg(long, global = true, env = "TASKS_FILE")]
    pub file: Option<PathBuf>,

    /// Format of the task source (inferred from the extension by default)
    #[arg(long, global = true, value_parser = parse_source_format)]
    pub source_format: Option<SourceFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a task-graph project
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Show tasks ready to work on, highest priority first
    Ready {
        /// Only tasks under this project node
        #[arg(long)]
        project: Option<String>,
    },

    /// Show the dependency graph around a task
    Graph {
        id: String,

        /// Emit Graphviz DOT
        #[arg(long)]
        dot: bool,
    },

    /// Change a task's state and run its triggers
    Set {
        id: String,

        #[arg(value_parser = parse_state)]
        state: TaskState,
    },

    /// Show summary counts
    Stats,

    /// Show the critical path, bottlenecks and parallel phases of remaining work
    Analyze {
        /// Number of bottlenecks to list
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show one task in detail
    Show { id: String },

    /// List all tasks
    List {
        /// Only tasks in this state
        #[arg(long, value_parser = parse_state)]
        state: Option<TaskState>,
    },

    /// Check declarations for parse errors, unknown IDs and cycles
    Validate,

    /// Run a task's check command and mark it DONE if it passes
    Check {
        id: String,

        /// Command to run instead of the task's CHECK property
        #[arg(last = true)]
        command: Vec<String>,
    },
}

fn parse_state(s: &str) -> Result<TaskState, String> {
    s.to_ascii_uppercase().parse().map_err(|e| format!("{}", e))
}

fn parse_source_format(s: &str) -> Result<SourceFormat, String> {
    s.parse()
}

/// Parses a task ID argument; a malformed one is reported like an unknown
/// one and exits with `code`
fn task_id(output: &Output, raw: &str, code: u8) -> Result<TaskId, ExitCode> {
    raw.parse::<TaskId>().map_err(|err| {
        output.error(&err.to_string());
        ExitCode::from(code)
    })
}

/// Main entry point for the CLI
pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    logging::init_logging(cli.log_level, cli.verbose)?;

    let format = match cli.format {
        Some(format) => format,
        None => Config::load_global()?.default_format.into(),
    };
    let output = Output::new(format, cli.verbose);

    if let Commands::Init { path } = &cli.command {
        output.verbose_ctx("init", &format!("Initializing project at: {}", path.display()));
        let project = Project::init(path)?;
        output.success(&format!(
            "Initialized task-graph project at {} (source: {})",
            project.root().display(),
            project.source().path().display()
        ));
        return Ok(ExitCode::SUCCESS);
    }

    let workspace = Workspace::open(cli.file.as_deref(), cli.source_format)?;
    output.verbose_ctx(
        "source",
        &format!(
            "Using {} ({})",
            workspace.source().path().display(),
            workspace.source().format()
        ),
    );

    let code = match cli.command {
        Commands::Init { .. } => ExitCode::SUCCESS,
        Commands::Ready { project } => query::ready(&output, &workspace, project.as_deref())?,
        Commands::Graph { id, dot } => match task_id(&output, &id, 2) {
            Ok(id) => query::graph(&output, &workspace, &id, dot)?,
            Err(code) => code,
        },
        Commands::Set { id, state } => match task_id(&output, &id, 3) {
            Ok(id) => task::set(&output, &workspace, &id, state)?,
            Err(code) => code,
        },
        Commands::Stats => query::stats(&output, &workspace)?,
        Commands::Analyze { limit } => query::analyze(&output, &workspace, limit)?,
        Commands::Show { id } => match task_id(&output, &id, 3) {
            Ok(id) => query::show(&output, &workspace, &id)?,
            Err(code) => code,
        },
        Commands::List { state } => query::list(&output, &workspace, state)?,
        Commands::Validate => query::validate(&output, &workspace)?,
        Commands::Check { id, command } => match task_id(&output, &id, 3) {
            Ok(id) => task::check(&output, &workspace, &id, &command)?,
            Err(code) => code,
        },
    };

    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_state_case_insensitively() {
        let cli = Cli::try_parse_from(["tasks", "set", "A", "in-progress"]).unwrap();
        match cli.command {
            Commands::Set { state, .. } => assert_eq!(state, TaskState::InProgress),
            _ => panic!("expected set"),
        }
    }

    #[test]
    fn check_takes_trailing_command() {
        let cli = Cli::try_parse_from(["tasks", "check", "A", "--", "cargo", "test", "-q"]).unwrap();
        match cli.command {
            Commands::Check { id, command } => {
                assert_eq!(id, "A");
                assert_eq!(command, ["cargo", "test", "-q"]);
            }
            _ => panic!("expected check"),
        }
    }

    #[test]
    fn malformed_ids_reach_the_command() {
        let cli = Cli::try_parse_from(["tasks", "set", "a(b", "NEXT"]).unwrap();
        match cli.command {
            Commands::Set { id, .. } => assert_eq!(id, "a(b"),
            _ => panic!("expected set"),
        }
    }

    #[test]
    fn malformed_id_maps_to_given_code() {
        let output = Output::new(OutputFormat::Text, false);
        let code = |raw: &str, code: u8| format!("{:?}", task_id(&output, raw, code).unwrap_err());
        assert_eq!(code("a(b", 3), format!("{:?}", ExitCode::from(3)));
        assert_eq!(code(" ", 2), format!("{:?}", ExitCode::from(2)));
        assert_eq!(task_id(&output, "IMPL-1", 3).unwrap().as_str(), "IMPL-1");
    }

    #[test]
    fn analyze_defaults_to_ten_bottlenecks() {
        let cli = Cli::try_parse_from(["tasks", "analyze"]).unwrap();
        assert!(matches!(cli.command, Commands::Analyze { limit: 10 }));
    }
}
