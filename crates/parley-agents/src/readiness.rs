//! Readiness detection for one agent session.
//!
//! Interactive agents give no structured completion signal, only an
//! unreliable textual fingerprint: spinner glyphs, "Working for Ns"
//! status lines, a prompt character. The detector consumes successive
//! buffer snapshots and decides when the agent has truly finished
//! producing output, as opposed to merely pausing between animation
//! frames.
//!
//! All fingerprints are matched against the *tail* of the buffer only.
//! Matching anywhere in the capture lets an old echoed prompt or a
//! stale marker earlier in a long response falsely signal completion.

use std::time::Instant;

use tracing::trace;

use crate::profile::AgentProfile;

/// Number of trailing buffer lines fingerprints are matched against.
const TAIL_LINES: usize = 6;

/// Detector verdict for one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    /// The agent is still producing output (or has not settled yet).
    Busy,
    /// The agent has finished and is awaiting the next input.
    Ready,
}

/// State machine deciding readiness from successive buffer snapshots.
///
/// The caller polls the session at a fixed interval, feeds each capture
/// into [`observe`](ReadinessDetector::observe), and enforces the
/// overall response timeout itself.
#[derive(Debug)]
pub struct ReadinessDetector {
    ready_indicators: Vec<String>,
    loading_indicators: Vec<String>,
    complete_markers: Vec<String>,
    settle_time: std::time::Duration,
    stable_checks: u32,
    /// A loading fingerprint has been observed at least once.
    loading_seen: bool,
    /// When the loading fingerprint was last seen to disappear.
    settle_started: Option<Instant>,
    last_snapshot: Option<String>,
    unchanged_polls: u32,
}

impl ReadinessDetector {
    /// Create a detector configured from an agent profile.
    pub fn new(profile: &AgentProfile) -> Self {
        Self {
            ready_indicators: profile.ready_indicators.clone(),
            loading_indicators: profile.loading_indicators.clone(),
            complete_markers: profile.response_complete_markers.clone(),
            settle_time: profile.settle_time(),
            stable_checks: profile.stable_checks,
            loading_seen: false,
            settle_started: None,
            last_snapshot: None,
            unchanged_polls: 0,
        }
    }

    /// Feed one buffer snapshot taken at `now`.
    pub fn observe(&mut self, snapshot: &str, now: Instant) -> ReadinessState {
        let tail = buffer_tail(snapshot, TAIL_LINES);
        let loading_active = contains_any(&tail, &self.loading_indicators);

        if loading_active {
            self.loading_seen = true;
            // A spinner that blinks off for one poll cycle must not be
            // mistaken for completion: any reappearance voids the timer.
            self.settle_started = None;
        } else if self.loading_seen && self.settle_started.is_none() {
            self.settle_started = Some(now);
        }

        match &self.last_snapshot {
            Some(last) if last == snapshot => self.unchanged_polls += 1,
            _ => self.unchanged_polls = 0,
        }
        self.last_snapshot = Some(snapshot.to_string());

        let complete = self.completion_predicate(&tail);
        trace!(
            loading_active,
            loading_seen = self.loading_seen,
            unchanged_polls = self.unchanged_polls,
            complete,
            "readiness poll"
        );

        if loading_active || !complete {
            return ReadinessState::Busy;
        }

        // Loading fingerprint came and went: require continuous absence
        // for the full settle duration, nothing less.
        if self.loading_seen {
            if let Some(started) = self.settle_started {
                if now.duration_since(started) >= self.settle_time {
                    return ReadinessState::Ready;
                }
            }
            return ReadinessState::Busy;
        }

        // No loading fingerprint ever observed: accept a buffer that has
        // stopped changing for enough polls.
        if self.unchanged_polls >= self.stable_checks {
            return ReadinessState::Ready;
        }

        ReadinessState::Busy
    }

    /// Whether the buffer tail looks like a finished response.
    fn completion_predicate(&self, tail: &str) -> bool {
        let markers_ok =
            self.complete_markers.is_empty() || contains_any(tail, &self.complete_markers);
        let ready_ok =
            self.ready_indicators.is_empty() || contains_any(tail, &self.ready_indicators);
        markers_ok && ready_ok
    }
}

/// The last `n` lines of a buffer, trailing blank lines excluded.
fn buffer_tail(buffer: &str, n: usize) -> String {
    let lines: Vec<&str> = buffer.lines().collect();
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map(|i| i + 1)
        .unwrap_or(0);
    let start = end.saturating_sub(n);
    lines[start..end].join("\n")
}

fn contains_any(text: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| !n.is_empty() && text.contains(n.as_str()))
}
