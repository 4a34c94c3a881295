//! Dispatch layer: a registry of named leases plus queue reconciliation.
//!
//! The dispatcher keeps its own pending queue per participant,
//! separate from the lease's internal queue. It holds work here before
//! ever touching the transport when a lease is already paused; the
//! lease's own queue exists to protect the narrow window where a human
//! attaches inside an actual send. Collapsing the two would either
//! over-block call sites or miss the transport-level race.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::lease::{AutomationLease, LeaseStatus, PendingSend, SendOutcome};

/// Which queue absorbed a command that did not reach the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueSource {
    /// Held at the dispatcher before touching the transport.
    Orchestrator,
    /// Queued inside the lease (send-time race against a human attach).
    Controller,
}

/// Result of a dispatch attempt.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// The command reached the transport.
    pub dispatched: bool,
    /// The command was queued instead.
    pub queued: bool,
    /// Which queue absorbed it, when queued.
    pub queue_source: Option<QueueSource>,
    /// Human-readable reason for queueing.
    pub reason: Option<String>,
    /// Attached clients at decision time.
    pub attached_clients: Vec<String>,
    /// Total commands now pending for this participant (both queues).
    pub pending: usize,
}

impl DispatchOutcome {
    fn sent(pending: usize) -> Self {
        Self {
            dispatched: true,
            queued: false,
            queue_source: None,
            reason: None,
            attached_clients: Vec::new(),
            pending,
        }
    }

    fn queued(source: QueueSource, status: &LeaseStatus, pending: usize) -> Self {
        Self {
            dispatched: false,
            queued: true,
            queue_source: Some(source),
            reason: status.reason.clone(),
            attached_clients: status.attached_clients.clone(),
            pending,
        }
    }
}

/// Maximum dispatcher-held commands per participant.
const MAX_HELD: usize = 32;

/// Name-to-lease registry with two-level queueing.
#[derive(Debug, Default)]
pub struct Dispatcher {
    leases: HashMap<String, AutomationLease>,
    held: HashMap<String, VecDeque<PendingSend>>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a lease under a participant name.
    pub fn register(&mut self, name: impl Into<String>, lease: AutomationLease) -> Result<()> {
        let name = name.into();
        if self.leases.contains_key(&name) {
            return Err(SessionError::SessionExists(name));
        }
        info!(participant = %name, session = %lease.session_name(), "registered session");
        self.leases.insert(name, lease);
        Ok(())
    }

    /// Remove a participant's lease, returning it.
    pub fn remove(&mut self, name: &str) -> Option<AutomationLease> {
        self.held.remove(name);
        self.leases.remove(name)
    }

    /// Registered participant names.
    pub fn names(&self) -> Vec<&str> {
        self.leases.keys().map(|s| s.as_str()).collect()
    }

    /// Whether a participant is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.leases.contains_key(name)
    }

    /// Borrow a participant's lease.
    pub fn lease(&self, name: &str) -> Result<&AutomationLease> {
        self.leases
            .get(name)
            .ok_or_else(|| SessionError::SessionNotFound(name.to_string()))
    }

    /// Mutably borrow a participant's lease.
    pub fn lease_mut(&mut self, name: &str) -> Result<&mut AutomationLease> {
        self.leases
            .get_mut(name)
            .ok_or_else(|| SessionError::SessionNotFound(name.to_string()))
    }

    /// Total pending commands for a participant across both queues.
    pub fn pending_count(&self, name: &str) -> usize {
        let held = self.held.get(name).map(|q| q.len()).unwrap_or(0);
        let lease = self
            .leases
            .get(name)
            .map(|l| l.pending_count())
            .unwrap_or(0);
        held + lease
    }

    /// Dispatch a command to a named participant.
    ///
    /// If the lease already reports paused, the command is held at the
    /// dispatcher without touching the transport. Otherwise the send is
    /// attempted; a lease-side queue result is reported with
    /// `QueueSource::Controller`.
    pub fn dispatch(&mut self, name: &str, text: &str, submit: bool) -> Result<DispatchOutcome> {
        let lease = self
            .leases
            .get_mut(name)
            .ok_or_else(|| SessionError::SessionNotFound(name.to_string()))?;

        if !lease.session_exists() {
            return Err(SessionError::SessionDead(name.to_string()));
        }

        // Fresh attach check: a human seen here means the command is held
        // before the transport is ever touched
        let status = lease.refresh()?;
        if status.paused {
            let held = self.held.entry(name.to_string()).or_default();
            if held.len() >= MAX_HELD {
                warn!(participant = %name, "held queue full, dropping oldest command");
                held.pop_front();
            }
            held.push_back(PendingSend {
                text: text.to_string(),
                submit,
            });
            let pending = held.len() + status.pending;
            debug!(participant = %name, pending, "lease paused, holding at orchestrator");
            return Ok(DispatchOutcome::queued(
                QueueSource::Orchestrator,
                &status,
                pending,
            ));
        }

        match lease.try_send(text, submit)? {
            SendOutcome::Sent => {
                debug!(participant = %name, "command dispatched");
                Ok(DispatchOutcome::sent(self.pending_count(name)))
            }
            SendOutcome::Queued => {
                // Re-poll to report the lease-side race accurately
                let status = self.leases[name].status();
                let pending = self.pending_count(name);
                debug!(participant = %name, pending, "lease queued at send time");
                Ok(DispatchOutcome::queued(
                    QueueSource::Controller,
                    &status,
                    pending,
                ))
            }
        }
    }

    /// Flush one participant's queues once its lease reports unpaused.
    ///
    /// The lease resumes (replaying its own queue) first, then
    /// dispatcher-held commands follow, stopping at the first failure
    /// or re-pause. Returns how many commands were sent.
    pub fn drain_pending(&mut self, name: &str) -> Result<usize> {
        let lease = self
            .leases
            .get_mut(name)
            .ok_or_else(|| SessionError::SessionNotFound(name.to_string()))?;

        let mut sent = lease.resume(true)?;
        if lease.is_paused() {
            return Ok(sent);
        }

        if let Some(mut held) = self.held.remove(name) {
            let lease = self
                .leases
                .get_mut(name)
                .ok_or_else(|| SessionError::SessionNotFound(name.to_string()))?;
            while let Some(cmd) = held.pop_front() {
                match lease.try_send(&cmd.text, cmd.submit) {
                    Ok(SendOutcome::Sent) => sent += 1,
                    Ok(SendOutcome::Queued) => {
                        // Re-paused mid-drain; the command now sits in the
                        // lease queue, the rest stays held
                        break;
                    }
                    Err(e) => {
                        warn!(participant = %name, error = %e, "drain send failed");
                        held.push_front(cmd);
                        break;
                    }
                }
            }
            if !held.is_empty() {
                self.held.insert(name.to_string(), held);
            }
        }

        Ok(sent)
    }

    /// Flush every participant's queues; per-participant failures are
    /// logged and do not stop the others.
    pub fn drain_all(&mut self) -> usize {
        let names: Vec<String> = self.leases.keys().cloned().collect();
        let mut total = 0;
        for name in names {
            match self.drain_pending(&name) {
                Ok(sent) => total += sent,
                Err(e) => {
                    warn!(participant = %name, error = %e, "drain failed");
                }
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::mock::MockTransport;
    use parley_agents::AgentProfile;

    fn test_profile() -> AgentProfile {
        let mut profile = AgentProfile::new("test", "test-cmd");
        profile.text_enter_delay_ms = 0;
        profile.post_text_delay_ms = 0;
        profile
    }

    fn dispatcher_with(names: &[&str]) -> (Dispatcher, Vec<crate::lease::mock::MockControl>) {
        let mut dispatcher = Dispatcher::new();
        let mut controls = Vec::new();
        for name in names {
            let (transport, control) = MockTransport::new(name);
            let lease = AutomationLease::new(Box::new(transport), test_profile());
            dispatcher.register(*name, lease).unwrap();
            controls.push(control);
        }
        (dispatcher, controls)
    }

    #[test]
    fn test_dispatch_to_unpaused_lease() {
        let (mut dispatcher, controls) = dispatcher_with(&["alice"]);

        let outcome = dispatcher.dispatch("alice", "hello", true).unwrap();
        assert!(outcome.dispatched);
        assert!(!outcome.queued);
        assert_eq!(outcome.pending, 0);
        assert_eq!(controls[0].sent(), vec![("hello".to_string(), true)]);
    }

    #[test]
    fn test_dispatch_unknown_participant() {
        let (mut dispatcher, _controls) = dispatcher_with(&["alice"]);
        let result = dispatcher.dispatch("bob", "hello", true);
        assert!(matches!(result, Err(SessionError::SessionNotFound(_))));
    }

    #[test]
    fn test_dispatch_dead_session() {
        let (mut dispatcher, _controls) = dispatcher_with(&["alice"]);
        dispatcher.lease("alice").unwrap().kill().unwrap();

        let result = dispatcher.dispatch("alice", "hello", true);
        assert!(matches!(result, Err(SessionError::SessionDead(_))));
    }

    #[test]
    fn test_attached_human_holds_at_orchestrator() {
        let (mut dispatcher, controls) = dispatcher_with(&["alice"]);

        // Human attaches before the dispatch: the fresh attach check
        // pauses the lease and the command never touches the transport
        controls[0].attach("/dev/ttys001");
        let outcome = dispatcher.dispatch("alice", "first", true).unwrap();
        assert!(outcome.queued);
        assert_eq!(outcome.queue_source, Some(QueueSource::Orchestrator));
        assert_eq!(outcome.attached_clients, vec!["/dev/ttys001".to_string()]);

        let outcome = dispatcher.dispatch("alice", "second", true).unwrap();
        assert!(outcome.queued);
        assert_eq!(outcome.queue_source, Some(QueueSource::Orchestrator));
        assert_eq!(outcome.pending, 2);
        assert!(controls[0].sent().is_empty());
    }

    #[test]
    fn test_mid_send_race_reports_controller_source() {
        let (mut dispatcher, controls) = dispatcher_with(&["alice"]);

        // No client at check time; the send fails and the re-check finds
        // a human: the lease absorbed the command
        controls[0].fail_next_send_with_attach("/dev/ttys002");
        let outcome = dispatcher.dispatch("alice", "raced", true).unwrap();

        assert!(outcome.queued);
        assert_eq!(outcome.queue_source, Some(QueueSource::Controller));
        assert_eq!(outcome.pending, 1);
        assert!(controls[0].sent().is_empty());
    }

    #[test]
    fn test_drain_pending_sends_both_queues_in_order() {
        let (mut dispatcher, controls) = dispatcher_with(&["alice"]);

        controls[0].attach("/dev/ttys001");
        dispatcher.dispatch("alice", "first", true).unwrap();
        dispatcher.dispatch("alice", "held-1", true).unwrap();
        dispatcher.dispatch("alice", "held-2", true).unwrap();

        controls[0].detach_all();
        let sent = dispatcher.drain_pending("alice").unwrap();

        assert_eq!(sent, 3);
        assert_eq!(dispatcher.pending_count("alice"), 0);
        assert_eq!(
            controls[0].sent(),
            vec![
                ("first".to_string(), true),
                ("held-1".to_string(), true),
                ("held-2".to_string(), true),
            ]
        );
    }

    #[test]
    fn test_drain_pending_noop_while_attached() {
        let (mut dispatcher, controls) = dispatcher_with(&["alice"]);

        controls[0].attach("/dev/ttys001");
        dispatcher.dispatch("alice", "queued", true).unwrap();
        dispatcher.dispatch("alice", "held", true).unwrap();

        let sent = dispatcher.drain_pending("alice").unwrap();
        assert_eq!(sent, 0);
        assert_eq!(dispatcher.pending_count("alice"), 2);
        assert!(controls[0].sent().is_empty());
    }

    #[test]
    fn test_drain_stops_on_reattach() {
        let (mut dispatcher, controls) = dispatcher_with(&["alice"]);

        controls[0].attach("/dev/ttys001");
        dispatcher.dispatch("alice", "queued", true).unwrap();
        dispatcher.dispatch("alice", "held-1", true).unwrap();
        dispatcher.dispatch("alice", "held-2", true).unwrap();
        controls[0].detach_all();

        // Human comes back right after the first command goes out
        controls[0].attach_after_sends(1, "/dev/ttys001");
        let sent = dispatcher.drain_pending("alice").unwrap();

        assert_eq!(sent, 1);
        assert_eq!(dispatcher.pending_count("alice"), 2);
        assert_eq!(controls[0].sent(), vec![("queued".to_string(), true)]);
    }

    #[test]
    fn test_drain_all_covers_every_participant() {
        let (mut dispatcher, controls) = dispatcher_with(&["alice", "bob"]);

        controls[0].attach("/dev/ttys001");
        controls[1].attach("/dev/ttys002");
        dispatcher.dispatch("alice", "a1", true).unwrap();
        dispatcher.dispatch("bob", "b1", true).unwrap();
        controls[0].detach_all();
        controls[1].detach_all();

        let total = dispatcher.drain_all();
        assert_eq!(total, 2);
        assert_eq!(controls[0].sent(), vec![("a1".to_string(), true)]);
        assert_eq!(controls[1].sent(), vec![("b1".to_string(), true)]);
    }

    #[test]
    fn test_register_duplicate_rejected() {
        let (mut dispatcher, _controls) = dispatcher_with(&["alice"]);
        let (transport, _control) = MockTransport::new("alice");
        let lease = AutomationLease::new(Box::new(transport), test_profile());
        let result = dispatcher.register("alice", lease);
        assert!(matches!(result, Err(SessionError::SessionExists(_))));
    }

    #[test]
    fn test_remove_clears_held_queue() {
        let (mut dispatcher, controls) = dispatcher_with(&["alice"]);
        controls[0].attach("/dev/ttys001");
        dispatcher.dispatch("alice", "queued", true).unwrap();
        dispatcher.dispatch("alice", "held", true).unwrap();

        assert!(dispatcher.remove("alice").is_some());
        assert!(!dispatcher.contains("alice"));
        assert_eq!(dispatcher.pending_count("alice"), 0);
    }
}
