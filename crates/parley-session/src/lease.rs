//! The automation lease: cooperative arbitration between automated
//! sends and an attached human.
//!
//! A lease wraps exactly one session transport and holds the exclusive
//! right to type into it. The moment a human client attaches, the
//! lease pauses and automation commands queue instead of reaching the
//! terminal; the human always wins, with no forced override. Queued
//! commands replay in order once the human detaches and the lease is
//! resumed.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use parley_agents::AgentProfile;
use parley_tmux::SessionTransport;

use crate::error::Result;

/// Maximum queued commands per lease; oldest dropped on overflow.
const MAX_PENDING: usize = 32;

/// Pause reason recorded when a human client is detected.
pub const PAUSE_MANUAL_ATTACH: &str = "manual-attach";

/// One not-yet-sent command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    /// Literal text to type.
    pub text: String,
    /// Whether to follow the text with the submit key.
    pub submit: bool,
}

/// Outcome of a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The command reached the transport.
    Sent,
    /// The command was appended to the pending queue.
    Queued,
}

/// Read-only snapshot of a lease's state.
#[derive(Debug, Clone)]
pub struct LeaseStatus {
    /// Whether automation is currently paused.
    pub paused: bool,
    /// Why the lease paused, if it is paused.
    pub reason: Option<String>,
    /// Human clients attached at the last check.
    pub attached_clients: Vec<String>,
    /// Number of queued commands.
    pub pending: usize,
}

/// Pause/resume/queue wrapper granting exclusive automated-send rights
/// over one session.
pub struct AutomationLease {
    transport: Box<dyn SessionTransport>,
    profile: AgentProfile,
    paused: bool,
    pause_reason: Option<String>,
    attached: Vec<String>,
    pending: VecDeque<PendingSend>,
}

impl std::fmt::Debug for AutomationLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomationLease")
            .field("session", &self.transport.name())
            .field("paused", &self.paused)
            .field("reason", &self.pause_reason)
            .field("attached", &self.attached.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl AutomationLease {
    /// Wrap a transport with lease semantics.
    pub fn new(transport: Box<dyn SessionTransport>, profile: AgentProfile) -> Self {
        Self {
            transport,
            profile,
            paused: false,
            pause_reason: None,
            attached: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    /// The wrapped session's name.
    pub fn session_name(&self) -> &str {
        self.transport.name()
    }

    /// The agent profile for this session.
    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    /// Whether automation is paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Number of queued commands.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether the underlying session still exists.
    pub fn session_exists(&self) -> bool {
        self.transport.exists()
    }

    /// Capture the session's visible buffer.
    pub fn capture_visible(&self) -> Result<String> {
        Ok(self.transport.capture_visible()?)
    }

    /// Capture the session's full scrollback.
    pub fn capture_scrollback(&self) -> Result<String> {
        Ok(self.transport.capture_scrollback()?)
    }

    /// Destroy the underlying session.
    pub fn kill(&self) -> Result<()> {
        Ok(self.transport.kill()?)
    }

    /// Re-check the transport's attached clients, pausing if a human
    /// has appeared, and return the fresh status.
    ///
    /// Pausing is automatic; resuming never is. A detach only takes
    /// effect through an explicit [`resume`](Self::resume).
    pub fn refresh(&mut self) -> Result<LeaseStatus> {
        let clients = self.transport.attached_clients()?;
        if !clients.is_empty() {
            self.pause_for_clients(clients);
        } else if !self.paused {
            self.attached.clear();
        }
        Ok(self.status())
    }

    /// Read-only status, polled by the dispatch layer.
    pub fn status(&self) -> LeaseStatus {
        LeaseStatus {
            paused: self.paused,
            reason: self.pause_reason.clone(),
            attached_clients: self.attached.clone(),
            pending: self.pending.len(),
        }
    }

    /// Attempt to send a command, queueing it if a human holds the
    /// session.
    ///
    /// The attached-clients check happens fresh on every call: the
    /// pause flag can be flipped from outside the coordinator's
    /// control flow (a human attaching a terminal), so a cached answer
    /// is never trusted. If the transport send fails and a client
    /// turns out to have attached mid-send, the command is queued
    /// rather than treated as a hard error.
    pub fn try_send(&mut self, text: &str, submit: bool) -> Result<SendOutcome> {
        if self.paused {
            self.enqueue(text, submit);
            return Ok(SendOutcome::Queued);
        }

        let clients = self.transport.attached_clients()?;
        if !clients.is_empty() {
            self.pause_for_clients(clients);
            self.enqueue(text, submit);
            return Ok(SendOutcome::Queued);
        }
        self.attached.clear();

        match self.send_now(text, submit) {
            Ok(()) => Ok(SendOutcome::Sent),
            Err(e) => {
                // Check-then-act race: a human may have attached inside
                // the send call. Re-check before declaring failure.
                let clients = self.transport.attached_clients().unwrap_or_default();
                if !clients.is_empty() {
                    warn!(
                        session = %self.transport.name(),
                        "send failed during human attach, queueing command"
                    );
                    self.pause_for_clients(clients);
                    self.enqueue(text, submit);
                    return Ok(SendOutcome::Queued);
                }
                Err(e)
            }
        }
    }

    /// Clear the paused state if no clients remain attached, optionally
    /// replaying queued commands in FIFO order.
    ///
    /// The drain stops at the first failure or re-pause, leaving the
    /// remainder queued; returns how many commands were sent.
    pub fn resume(&mut self, flush_pending: bool) -> Result<usize> {
        if !self.paused {
            // Resuming an unpaused lease is a no-op.
            return Ok(0);
        }

        let clients = self.transport.attached_clients()?;
        if !clients.is_empty() {
            debug!(
                session = %self.transport.name(),
                clients = clients.len(),
                "clients still attached, staying paused"
            );
            self.attached = clients;
            return Ok(0);
        }

        info!(
            session = %self.transport.name(),
            pending = self.pending.len(),
            "resuming automation"
        );
        self.paused = false;
        self.pause_reason = None;
        self.attached.clear();

        if !flush_pending {
            return Ok(0);
        }

        let mut sent = 0;
        while let Some(cmd) = self.pending.pop_front() {
            match self.try_send(&cmd.text, cmd.submit) {
                Ok(SendOutcome::Sent) => sent += 1,
                Ok(SendOutcome::Queued) => {
                    // try_send re-queued it at the back; restore order by
                    // rotating it to the front along with anything after it
                    if let Some(requeued) = self.pending.pop_back() {
                        self.pending.push_front(requeued);
                    }
                    break;
                }
                Err(e) => {
                    warn!(
                        session = %self.transport.name(),
                        error = %e,
                        "send failed mid-drain, leaving remainder queued"
                    );
                    self.pending.push_front(cmd);
                    break;
                }
            }
        }
        Ok(sent)
    }

    fn pause_for_clients(&mut self, clients: Vec<String>) {
        if !self.paused {
            info!(
                session = %self.transport.name(),
                clients = clients.len(),
                "human attached, pausing automation"
            );
        }
        self.paused = true;
        self.pause_reason = Some(PAUSE_MANUAL_ATTACH.to_string());
        self.attached = clients;
    }

    fn enqueue(&mut self, text: &str, submit: bool) {
        if self.pending.len() >= MAX_PENDING {
            warn!(
                session = %self.transport.name(),
                "pending queue full, dropping oldest command"
            );
            self.pending.pop_front();
        }
        self.pending.push_back(PendingSend {
            text: text.to_string(),
            submit,
        });
    }

    /// Type the text and issue the submit keystroke(s).
    fn send_now(&self, text: &str, submit: bool) -> Result<()> {
        self.transport.send_text(text)?;
        if submit {
            let delay = self.profile.text_enter_delay();
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            self.transport.send_submit(&self.profile.submit_key)?;
            if let Some(fallback) = &self.profile.fallback_submit_key {
                self.transport.send_submit(fallback)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted transport used across the session-layer tests.

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use parley_tmux::{Result as TmuxResult, SessionTransport, TmuxError};

    /// Shared handle for steering a [`MockTransport`] from a test.
    #[derive(Clone, Default)]
    pub struct MockControl {
        inner: Arc<Mutex<MockState>>,
    }

    #[derive(Default)]
    struct MockState {
        clients: Vec<String>,
        sent: Vec<(String, bool)>,
        snapshots: VecDeque<String>,
        last_snapshot: String,
        fail_next_send: bool,
        /// Client that appears at the moment a send fails (simulates a
        /// human attaching inside the send call).
        attach_on_fail: Option<String>,
        /// Client that appears once this many sends have succeeded
        /// (simulates a human attaching mid-drain).
        attach_after_sends: Option<(usize, String)>,
        exists: bool,
    }

    impl MockControl {
        pub fn attach(&self, tty: &str) {
            self.inner.lock().unwrap().clients.push(tty.to_string());
        }

        pub fn detach_all(&self) {
            self.inner.lock().unwrap().clients.clear();
        }

        pub fn fail_next_send(&self) {
            self.inner.lock().unwrap().fail_next_send = true;
        }

        pub fn fail_next_send_with_attach(&self, tty: &str) {
            let mut state = self.inner.lock().unwrap();
            state.fail_next_send = true;
            state.attach_on_fail = Some(tty.to_string());
        }

        pub fn attach_after_sends(&self, count: usize, tty: &str) {
            self.inner.lock().unwrap().attach_after_sends = Some((count, tty.to_string()));
        }

        pub fn sent(&self) -> Vec<(String, bool)> {
            self.inner.lock().unwrap().sent.clone()
        }

        pub fn push_snapshot(&self, snapshot: &str) {
            self.inner
                .lock()
                .unwrap()
                .snapshots
                .push_back(snapshot.to_string());
        }
    }

    pub struct MockTransport {
        name: String,
        control: MockControl,
    }

    impl MockTransport {
        pub fn new(name: &str) -> (Self, MockControl) {
            let control = MockControl::default();
            control.inner.lock().unwrap().exists = true;
            (
                Self {
                    name: name.to_string(),
                    control: control.clone(),
                },
                control,
            )
        }
    }

    impl SessionTransport for MockTransport {
        fn name(&self) -> &str {
            &self.name
        }

        fn start(&self, _width: u32, _height: u32) -> TmuxResult<()> {
            self.control.inner.lock().unwrap().exists = true;
            Ok(())
        }

        fn send_text(&self, text: &str) -> TmuxResult<()> {
            let mut state = self.control.inner.lock().unwrap();
            if state.fail_next_send {
                state.fail_next_send = false;
                if let Some(tty) = state.attach_on_fail.take() {
                    state.clients.push(tty);
                }
                return Err(TmuxError::CommandFailed("send rejected".to_string()));
            }
            state.sent.push((text.to_string(), false));
            if let Some((count, tty)) = state.attach_after_sends.clone() {
                if state.sent.len() >= count {
                    state.clients.push(tty);
                    state.attach_after_sends = None;
                }
            }
            Ok(())
        }

        fn send_submit(&self, _key: &str) -> TmuxResult<()> {
            let mut state = self.control.inner.lock().unwrap();
            if let Some(last) = state.sent.last_mut() {
                last.1 = true;
            }
            Ok(())
        }

        fn capture_visible(&self) -> TmuxResult<String> {
            let mut state = self.control.inner.lock().unwrap();
            if let Some(next) = state.snapshots.pop_front() {
                state.last_snapshot = next;
            }
            Ok(state.last_snapshot.clone())
        }

        fn capture_scrollback(&self) -> TmuxResult<String> {
            self.capture_visible()
        }

        fn attached_clients(&self) -> TmuxResult<Vec<String>> {
            Ok(self.control.inner.lock().unwrap().clients.clone())
        }

        fn exists(&self) -> bool {
            self.control.inner.lock().unwrap().exists
        }

        fn kill(&self) -> TmuxResult<()> {
            self.control.inner.lock().unwrap().exists = false;
            Ok(())
        }
    }
}
