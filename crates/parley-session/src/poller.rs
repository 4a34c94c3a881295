//! Bounded readiness wait over a leased session.
//!
//! The coordinator blocks here after each dispatch: snapshots of the
//! visible buffer are fed into a fresh readiness detector at the
//! profile's check interval until the agent settles or the response
//! timeout elapses. Timeouts are reported as a value, not an error;
//! callers decide whether to proceed with whatever text is visible.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use parley_agents::{ReadinessDetector, ReadinessState};

use crate::error::Result;
use crate::lease::AutomationLease;

/// Terminal result of a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The agent finished and is awaiting input.
    Ready,
    /// The timeout elapsed first.
    TimedOut,
}

impl WaitOutcome {
    /// Whether the agent reached readiness.
    pub fn is_ready(&self) -> bool {
        matches!(self, WaitOutcome::Ready)
    }
}

/// Wait for the session to become ready, bounded by the profile's
/// response timeout.
pub async fn wait_ready(lease: &AutomationLease) -> Result<WaitOutcome> {
    let delay = lease.profile().post_text_delay();
    if !delay.is_zero() {
        sleep(delay).await;
    }
    wait_with_timeout(lease, lease.profile().response_timeout()).await
}

/// Wait for the session's first readiness after launch, bounded by the
/// profile's startup timeout.
pub async fn wait_startup(lease: &AutomationLease) -> Result<WaitOutcome> {
    wait_with_timeout(lease, lease.profile().startup_timeout()).await
}

async fn wait_with_timeout(lease: &AutomationLease, timeout: Duration) -> Result<WaitOutcome> {
    let profile = lease.profile();
    let mut detector = ReadinessDetector::new(profile);
    let interval = profile.check_interval();
    let deadline = Instant::now() + timeout;

    debug!(
        session = %lease.session_name(),
        timeout_secs = timeout.as_secs(),
        interval_ms = interval.as_millis(),
        "waiting for readiness"
    );

    loop {
        let snapshot = lease.capture_visible()?;
        let state = detector.observe(&snapshot, Instant::now().into_std());
        if state == ReadinessState::Ready {
            debug!(session = %lease.session_name(), "session ready");
            return Ok(WaitOutcome::Ready);
        }

        if Instant::now() >= deadline {
            warn!(
                session = %lease.session_name(),
                timeout_secs = timeout.as_secs(),
                "readiness wait timed out"
            );
            return Ok(WaitOutcome::TimedOut);
        }

        sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::mock::MockTransport;
    use parley_agents::AgentProfile;

    fn fast_profile() -> AgentProfile {
        let mut profile = AgentProfile::new("test", "test-cmd")
            .with_ready_indicators(vec!["$".to_string()])
            .with_loading_indicators(vec!["Working".to_string()])
            .with_settle_time(Duration::from_millis(200))
            .with_response_timeout(Duration::from_secs(2));
        profile.check_interval_ms = 50;
        profile.stable_checks = 2;
        profile.post_text_delay_ms = 0;
        profile
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_ready_after_loading_settles() {
        let (transport, control) = MockTransport::new("a");
        let lease = AutomationLease::new(Box::new(transport), fast_profile());

        control.push_snapshot("Working for 2s\n");
        control.push_snapshot("Working for 3s\n");
        control.push_snapshot("answer\n$ ");
        // Queue exhausted: the last snapshot repeats, loading stays absent

        let outcome = wait_ready(&lease).await.unwrap();
        assert_eq!(outcome, WaitOutcome::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_ready_stable_buffer_no_loading() {
        let (transport, control) = MockTransport::new("a");
        let lease = AutomationLease::new(Box::new(transport), fast_profile());

        // No loading fingerprint ever appears; stability decides
        control.push_snapshot("answer\n$ ");

        let outcome = wait_ready(&lease).await.unwrap();
        assert_eq!(outcome, WaitOutcome::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_when_never_ready() {
        let (transport, control) = MockTransport::new("a");
        let lease = AutomationLease::new(Box::new(transport), fast_profile());

        control.push_snapshot("Working for 1s\n");

        let outcome = wait_ready(&lease).await.unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }
}
