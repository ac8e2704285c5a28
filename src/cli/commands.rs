//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - init: create a workspace for a task
//! - run: drive the agent until the task is done
//! - status: show the agent-written status
//! - check: verify the agent binary is installed

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use wiggum::domain::WorkMode;

/// Wiggum - runs a coding agent in a fresh-context loop until the task is done
#[derive(Parser, Debug)]
#[command(name = "wiggum")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project root holding the .wiggum workspace (default: current directory)
    #[arg(short, long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a workspace for a task
    Init {
        /// What the agent should accomplish
        task: String,

        /// loop (one checklist item per iteration) or iterative (autonomous)
        #[arg(short, long, default_value = "loop")]
        mode: WorkMode,

        /// Iteration limit stored in the workspace
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Notification URL stored in the workspace
        #[arg(long)]
        notify_url: Option<String>,

        /// Replace an existing workspace
        #[arg(short, long)]
        force: bool,
    },

    /// Run iterations until complete, stagnant or out of iterations
    Run {
        /// Override the workspace iteration limit
        #[arg(short = 'n', long)]
        max_iterations: Option<u32>,

        /// Pause between iterations in milliseconds
        #[arg(long, conflicts_with = "no_delay")]
        delay_ms: Option<u64>,

        /// Start the next iteration immediately
        #[arg(long)]
        no_delay: bool,

        /// Show tool activity as the agent works
        #[arg(short, long, conflicts_with = "interactive")]
        stream: bool,

        /// Hand the terminal to the agent each iteration
        #[arg(short, long)]
        interactive: bool,
    },

    /// Show the current status record
    Status,

    /// Check that the agent binary is available
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["wiggum"]).is_err());
    }

    #[test]
    fn test_global_options() {
        let cli = Cli::try_parse_from(["wiggum", "-v", "-c", "/tmp/w.yml", "-w", "/src/app", "status"]).unwrap();
        assert!(cli.is_verbose());
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/w.yml")));
        assert_eq!(cli.workspace, Some(PathBuf::from("/src/app")));
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn test_init_defaults() {
        let cli = Cli::try_parse_from(["wiggum", "init", "Port the parser"]).unwrap();
        match cli.command {
            Commands::Init {
                task,
                mode,
                max_iterations,
                notify_url,
                force,
            } => {
                assert_eq!(task, "Port the parser");
                assert_eq!(mode, WorkMode::Loop);
                assert!(max_iterations.is_none());
                assert!(notify_url.is_none());
                assert!(!force);
            }
            _ => panic!("Expected init command"),
        }
    }

    #[test]
    fn test_init_iterative() {
        let cli = Cli::try_parse_from([
            "wiggum",
            "init",
            "Tidy docs",
            "--mode",
            "iterative",
            "--max-iterations",
            "12",
            "--force",
        ])
        .unwrap();
        match cli.command {
            Commands::Init {
                mode,
                max_iterations,
                force,
                ..
            } => {
                assert_eq!(mode, WorkMode::Iterative);
                assert_eq!(max_iterations, Some(12));
                assert!(force);
            }
            _ => panic!("Expected init command"),
        }
    }

    #[test]
    fn test_init_rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["wiggum", "init", "x", "--mode", "forever"]).is_err());
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::try_parse_from(["wiggum", "run", "-n", "3", "--no-delay", "--stream"]).unwrap();
        match cli.command {
            Commands::Run {
                max_iterations,
                delay_ms,
                no_delay,
                stream,
                interactive,
            } => {
                assert_eq!(max_iterations, Some(3));
                assert!(delay_ms.is_none());
                assert!(no_delay);
                assert!(stream);
                assert!(!interactive);
            }
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_run_conflicts() {
        assert!(Cli::try_parse_from(["wiggum", "run", "--stream", "--interactive"]).is_err());
        assert!(Cli::try_parse_from(["wiggum", "run", "--delay-ms", "5", "--no-delay"]).is_err());
    }

    #[test]
    fn test_check_command() {
        let cli = Cli::try_parse_from(["wiggum", "check"]).unwrap();
        assert!(matches!(cli.command, Commands::Check));
    }

    #[test]
    fn test_help_works() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_version_flag() {
        let result = Cli::try_parse_from(["wiggum", "--version"]);
        assert!(result.is_err());
    }
}
