//! Command-line interface definition using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Parley - turn-based collaboration between interactive CLI agents
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to state directory
    #[arg(short, long, env = "PARLEY_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a conversation between agents
    Run {
        /// The task the participants discuss
        #[arg(short, long, required = true)]
        task: String,

        /// Comma-separated participant profile names, or "all"
        #[arg(short, long, default_value = "all")]
        participants: String,

        /// Maximum number of completed turns
        #[arg(short, long, default_value_t = 12)]
        max_turns: u32,

        /// Transcript output path (default: under the state directory)
        #[arg(long)]
        transcript: Option<PathBuf>,
    },

    /// Show configured agent profiles
    Agents,
}

impl Cli {
    /// Returns the state directory path, using default if not specified.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".parley"))
                .unwrap_or_else(|| PathBuf::from(".parley"))
        })
    }

    /// Returns the log level based on verbosity.
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_verifies() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::parse_from(["parley", "run", "--task", "plan the refactor"]);
        match cli.command {
            Commands::Run {
                task,
                participants,
                max_turns,
                transcript,
            } => {
                assert_eq!(task, "plan the refactor");
                assert_eq!(participants, "all");
                assert_eq!(max_turns, 12);
                assert!(transcript.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_run_with_participants() {
        let cli = Cli::parse_from([
            "parley",
            "run",
            "--task",
            "t",
            "--participants",
            "claude,aider",
            "--max-turns",
            "6",
        ]);
        match cli.command {
            Commands::Run {
                participants,
                max_turns,
                ..
            } => {
                assert_eq!(participants, "claude,aider");
                assert_eq!(max_turns, 6);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_agents() {
        let cli = Cli::parse_from(["parley", "agents"]);
        assert!(matches!(cli.command, Commands::Agents));
    }

    #[test]
    fn test_state_dir_override() {
        let cli = Cli::parse_from(["parley", "--state-dir", "/tmp/parley-test", "agents"]);
        assert_eq!(cli.state_dir(), PathBuf::from("/tmp/parley-test"));
    }

    #[test]
    fn test_log_level_from_verbosity() {
        let cli = Cli::parse_from(["parley", "agents"]);
        assert_eq!(cli.log_level(), tracing::Level::WARN);
        let cli = Cli::parse_from(["parley", "-vv", "agents"]);
        assert_eq!(cli.log_level(), tracing::Level::DEBUG);
    }
}
