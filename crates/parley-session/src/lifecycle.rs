//! Session startup and teardown.

use tracing::{info, warn};

use parley_agents::AgentProfile;
use parley_tmux::SessionTransport;

use crate::dispatcher::Dispatcher;
use crate::error::{Result, SessionError};
use crate::lease::AutomationLease;
use crate::poller::{wait_startup, WaitOutcome};

/// Create the session, launch the agent command, and wait for its
/// first readiness.
///
/// On startup timeout the session is killed and
/// `SessionError::StartupTimeout` is returned.
pub async fn start_session(
    profile: AgentProfile,
    transport: Box<dyn SessionTransport>,
) -> Result<AutomationLease> {
    info!(
        session = %transport.name(),
        command = %profile.launch_command(),
        width = profile.pane_width,
        height = profile.pane_height,
        "starting agent session"
    );

    transport.start(profile.pane_width, profile.pane_height)?;
    transport.send_text(&profile.launch_command())?;
    transport.send_submit(&profile.submit_key)?;

    let name = transport.name().to_string();
    let timeout_secs = profile.startup_timeout_secs;
    let lease = AutomationLease::new(transport, profile);

    match wait_startup(&lease).await? {
        WaitOutcome::Ready => {
            info!(session = %name, "agent session ready");
            Ok(lease)
        }
        WaitOutcome::TimedOut => {
            warn!(session = %name, timeout_secs, "agent never became ready, killing session");
            if let Err(e) = lease.kill() {
                warn!(session = %name, error = %e, "failed to kill session");
            }
            Err(SessionError::StartupTimeout { name, timeout_secs })
        }
    }
}

/// Kill every registered session, removing them from the dispatcher.
pub fn shutdown_all(dispatcher: &mut Dispatcher) {
    let names: Vec<String> = dispatcher.names().iter().map(|s| s.to_string()).collect();
    for name in names {
        if let Some(lease) = dispatcher.remove(&name) {
            if let Err(e) = lease.kill() {
                warn!(participant = %name, error = %e, "failed to kill session");
            } else {
                info!(participant = %name, "session killed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::mock::MockTransport;
    use std::time::Duration;

    fn startup_profile() -> AgentProfile {
        let mut profile = AgentProfile::new("test", "test-agent")
            .with_ready_indicators(vec!["$".to_string()]);
        profile.startup_timeout_secs = 2;
        profile.check_interval_ms = 50;
        profile.stable_checks = 2;
        profile.text_enter_delay_ms = 0;
        profile.post_text_delay_ms = 0;
        profile
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_session_success() {
        let (transport, control) = MockTransport::new("agent-a");
        control.push_snapshot("booting\n");
        control.push_snapshot("ready\n$ ");

        let lease = start_session(startup_profile(), Box::new(transport))
            .await
            .unwrap();

        assert_eq!(lease.session_name(), "agent-a");
        assert!(!lease.is_paused());
        // The launch command was typed and submitted
        assert_eq!(control.sent(), vec![("test-agent".to_string(), true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_session_timeout_kills_session() {
        let (transport, control) = MockTransport::new("agent-a");
        // Buffer keeps changing and never shows the prompt
        for i in 0..100 {
            control.push_snapshot(&format!("boot line {}\n", i));
        }

        let result = start_session(startup_profile(), Box::new(transport)).await;
        assert!(matches!(
            result,
            Err(SessionError::StartupTimeout { timeout_secs: 2, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_all() {
        let mut dispatcher = Dispatcher::new();
        let (transport, control) = MockTransport::new("agent-a");
        control.push_snapshot("$ ");
        let lease = start_session(startup_profile(), Box::new(transport))
            .await
            .unwrap();
        dispatcher.register("alice", lease).unwrap();

        shutdown_all(&mut dispatcher);
        assert!(dispatcher.names().is_empty());
    }
}
