//! Command handlers for CLI subcommands.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use parley_agents::{find_profile, load_profiles, AgentProfile};
use parley_convo::{ConversationConfig, Coordinator};
use parley_session::{shutdown_all, start_session, Dispatcher};
use parley_tmux::TmuxTransport;

use crate::cli::Commands;

/// Result type for command operations.
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Execute a CLI command.
pub async fn execute(command: Commands, state_dir: &Path) -> Result<()> {
    match command {
        Commands::Run {
            task,
            participants,
            max_turns,
            transcript,
        } => cmd_run(state_dir, &task, &participants, max_turns, transcript).await,
        Commands::Agents => cmd_agents(state_dir),
    }
}

/// Directory holding on-disk agent profiles.
fn profile_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("agents")
}

async fn cmd_run(
    state_dir: &Path,
    task: &str,
    participants: &str,
    max_turns: u32,
    transcript: Option<PathBuf>,
) -> Result<()> {
    let profiles = load_profiles(&profile_dir(state_dir))?;
    let selected = select_participants(&profiles, participants)?;

    let transcript_path = match transcript {
        Some(path) => path,
        None => {
            let dir = state_dir.join("transcripts");
            fs::create_dir_all(&dir)?;
            dir.join(format!("{}.json", Utc::now().format("%Y%m%d-%H%M%S")))
        }
    };

    info!(
        participants = selected.len(),
        max_turns,
        transcript = %transcript_path.display(),
        "starting conversation"
    );

    let mut dispatcher = Dispatcher::new();
    for profile in &selected {
        let session = format!("parley-{}", profile.name);
        println!("Starting '{}' in tmux session {}...", profile.name, session);
        let started = async {
            let transport = TmuxTransport::new(session)?;
            let lease = start_session(profile.clone(), Box::new(transport)).await?;
            Ok::<_, Box<dyn std::error::Error>>(lease)
        }
        .await;

        match started {
            Ok(lease) => dispatcher.register(profile.name.clone(), lease)?,
            Err(e) => {
                // A partial fleet is useless; tear down what came up
                shutdown_all(&mut dispatcher);
                return Err(format!("failed to start '{}': {}", profile.name, e).into());
            }
        }
    }

    let names: Vec<String> = selected.iter().map(|p| p.name.clone()).collect();
    let config = ConversationConfig::new(task)
        .with_max_turns(max_turns)
        .with_transcript_path(&transcript_path);

    let mut coordinator = Coordinator::new(dispatcher, names, config)?;
    let result = coordinator.run().await;
    shutdown_all(coordinator.dispatcher_mut());

    match result {
        Ok(outcome) => {
            println!("Conversation ended: {:?}", outcome);
            println!("Transcript: {}", transcript_path.display());
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "conversation aborted");
            Err(e.into())
        }
    }
}

fn select_participants(profiles: &[AgentProfile], spec: &str) -> Result<Vec<AgentProfile>> {
    let selected: Vec<AgentProfile> = if spec.trim() == "all" {
        profiles.to_vec()
    } else {
        spec.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|name| find_profile(profiles, name).cloned())
            .collect::<std::result::Result<_, _>>()?
    };

    if selected.len() < 2 {
        return Err(format!(
            "a conversation needs at least two participants, got {}",
            selected.len()
        )
        .into());
    }
    Ok(selected)
}

fn cmd_agents(state_dir: &Path) -> Result<()> {
    let profiles = load_profiles(&profile_dir(state_dir))?;

    println!("Configured agent profiles:");
    for profile in &profiles {
        println!("\n  {} ({})", profile.name, profile.launch_command());
        println!(
            "    ready: {:?}  loading: {:?}",
            profile.ready_indicators, profile.loading_indicators
        );
        if let Some(marker) = &profile.response_marker {
            println!("    response marker: {:?}", marker);
        }
        println!(
            "    timeouts: startup {}s, response {}s",
            profile.startup_timeout_secs, profile.response_timeout_secs
        );
    }
    println!("\nDrop *.json files into {} to add or override profiles.", profile_dir(state_dir).display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_agents::builtin_profiles;

    #[test]
    fn test_select_all() {
        let profiles = builtin_profiles();
        let selected = select_participants(&profiles, "all").unwrap();
        assert_eq!(selected.len(), profiles.len());
    }

    #[test]
    fn test_select_by_name() {
        let profiles = builtin_profiles();
        let selected = select_participants(&profiles, "claude, shell").unwrap();
        let names: Vec<&str> = selected.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["claude", "shell"]);
    }

    #[test]
    fn test_select_unknown_name_errors() {
        let profiles = builtin_profiles();
        assert!(select_participants(&profiles, "claude,nope").is_err());
    }

    #[test]
    fn test_select_single_participant_errors() {
        let profiles = builtin_profiles();
        assert!(select_participants(&profiles, "claude").is_err());
    }
}
