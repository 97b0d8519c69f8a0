//! CLI command definitions for labforge.
//!
//! Three small offline tools around the task/recorder core: validate a BDDL
//! task file, summarize a demonstration container, and consolidate a
//! session directory into one merged file.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::bddl::{self, ParsedProblem};
use crate::config::EnvArgs;
use crate::recorder::{merge_sessions, DemoFile};

/// BDDL task and demonstration dataset tooling.
#[derive(Parser)]
#[command(name = "labforge")]
#[command(about = "BDDL task validation and demonstration dataset tooling")]
#[command(version)]
#[command(
    long_about = "labforge parses BDDL task descriptions into scene configurations and records\nteleoperated demonstrations to a chunked container format.\n\nExample usage:\n  labforge validate task_suites/example_suite/example_task.bddl\n  labforge inspect demos/demo_0.tar\n  labforge merge demos/ --out session.tar.gz"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Parse and validate a BDDL task description.
    #[command(alias = "check")]
    Validate(ValidateArgs),

    /// Summarize the episodes inside a demonstration container.
    Inspect(InspectArgs),

    /// Consolidate a directory of single-episode files into one container.
    Merge(MergeArgs),
}

/// Arguments for `labforge validate`.
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Task description file (.bddl text or .json pre-parsed document).
    pub file: PathBuf,
}

/// Arguments for `labforge inspect`.
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Demonstration container (.tar episode file or .tar.gz merged session).
    pub file: PathBuf,
}

/// Arguments for `labforge merge`.
#[derive(Parser, Debug)]
pub struct MergeArgs {
    /// Session directory holding single-episode .tar files.
    pub dir: PathBuf,

    /// Output filename, written inside the session directory.
    #[arg(short, long)]
    pub out: Option<String>,
}

/// Parses CLI arguments from the process environment.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parses CLI arguments and runs the selected command.
pub fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli())
}

/// Runs the selected command with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Validate(args) => run_validate_command(args),
        Commands::Inspect(args) => run_inspect_command(args),
        Commands::Merge(args) => run_merge_command(args),
    }
}

fn run_validate_command(args: ValidateArgs) -> anyhow::Result<()> {
    let problem = bddl::parse_file(&args.file)?;
    bddl::validate_problem(&problem)?;
    print_problem_summary(&problem);
    info!(file = %args.file.display(), "task description is valid");
    Ok(())
}

fn print_problem_summary(problem: &ParsedProblem) {
    println!("problem: {}", problem.problem_name);
    if !problem.language_instruction.is_empty() {
        println!("language: {}", problem.language_instruction);
    }
    for (category, instances) in &problem.objects {
        println!("objects/{category}: {}", instances.join(", "));
    }
    for (category, instances) in &problem.fixtures {
        println!("fixtures/{category}: {}", instances.join(", "));
    }
    for (name, region) in &problem.regions {
        println!("region {name} (target {})", region.target);
    }
    println!("initial state: {} predicate(s)", problem.initial_state.len());
    for clause in &problem.goal_state {
        println!("goal: {} ({})", clause.predicate, clause.connective);
    }
    for (index, subtask) in problem.demonstration_states.iter().enumerate() {
        println!("subtask {index}: {subtask}");
    }
}

fn run_inspect_command(args: InspectArgs) -> anyhow::Result<()> {
    let demo = read_container(&args.file)?;
    match EnvArgs::from_json(&demo.env_args) {
        Ok(env_args) => println!("env: {}", env_args.env_name),
        Err(_) => println!("env_args: {}", demo.env_args),
    }
    for (name, episode) in &demo.episodes {
        match episode.num_samples {
            Some(n) => println!("{name}: {n} samples"),
            None => println!(
                "{name}: unmerged, {} chunk(s)",
                episode.chunks.len()
            ),
        }
        for (stream, dataset) in &episode.streams {
            println!("  {stream}: {:?} {}", dataset.shape(), dataset.dtype_name());
        }
    }
    Ok(())
}

fn read_container(path: &PathBuf) -> anyhow::Result<DemoFile> {
    let gzipped = path
        .to_string_lossy()
        .ends_with(".tar.gz");
    let demo = if gzipped {
        DemoFile::read_tar_gz(path)?
    } else {
        DemoFile::read_tar(path)?
    };
    Ok(demo)
}

fn run_merge_command(args: MergeArgs) -> anyhow::Result<()> {
    let out = merge_sessions(&args.dir, args.out.as_deref())?;
    println!("merged session written to {}", out.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_args_parse() {
        let cli = Cli::parse_from(["labforge", "validate", "task.bddl"]);
        match cli.command {
            Commands::Validate(args) => {
                assert_eq!(args.file, PathBuf::from("task.bddl"));
            }
            _ => panic!("expected validate command"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_check_alias() {
        let cli = Cli::parse_from(["labforge", "check", "task.json", "--log-level", "debug"]);
        assert!(matches!(cli.command, Commands::Validate(_)));
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn test_merge_args_parse() {
        let cli = Cli::parse_from(["labforge", "merge", "./demos", "--out", "all.tar.gz"]);
        match cli.command {
            Commands::Merge(args) => {
                assert_eq!(args.dir, PathBuf::from("./demos"));
                assert_eq!(args.out.as_deref(), Some("all.tar.gz"));
            }
            _ => panic!("expected merge command"),
        }
    }

    #[test]
    fn test_validate_command_on_real_file() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("task.bddl");
        std::fs::write(
            &path,
            r#"
            (define (problem smoke)
              (:domain robosuite)
              (:fixtures main_table - table)
              (:objects milk_1 - milk)
              (:regions (table_zone (:target main_table) (:ranges ((-0.1 -0.1 0.1 0.1)))))
              (:init (on milk_1 table_zone))
              (:goal (and (on milk_1 table_zone)))
            )
            "#,
        )
        .expect("write");
        run_validate_command(ValidateArgs { file: path }).expect("validate");
    }

    #[test]
    fn test_validate_command_rejects_bad_reference() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("task.bddl");
        std::fs::write(
            &path,
            r#"
            (define (problem ghost)
              (:domain robosuite)
              (:objects milk_1 - milk)
              (:goal (and (on milk_1 ghost_zone)))
            )
            "#,
        )
        .expect("write");
        assert!(run_validate_command(ValidateArgs { file: path }).is_err());
    }
}
