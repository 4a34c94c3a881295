//! The session transport trait and its tmux-backed implementation.

use std::process::{Command, Output};
use std::time::Duration;

use tracing::{debug, trace};

use crate::retry::with_backoff;
use crate::session::{PaneSize, TmuxClient};
use crate::{Result, TmuxError};

/// Retry budget for idempotent capture-style calls.
const CAPTURE_ATTEMPTS: u32 = 3;
const CAPTURE_BACKOFF: Duration = Duration::from_millis(50);

/// Transport over one long-lived interactive agent session.
///
/// Literal text and the submit keystroke are deliberately separate
/// calls: sending text and newline in a single send-keys makes many
/// interactive agents treat the newline as a line continuation instead
/// of a submission.
pub trait SessionTransport: Send {
    /// Session name this transport drives.
    fn name(&self) -> &str;

    /// Create the underlying session at the given pane size.
    fn start(&self, width: u32, height: u32) -> Result<()>;

    /// Type literal text into the session without submitting it.
    fn send_text(&self, text: &str) -> Result<()>;

    /// Send a named key signal (e.g. "Enter", "C-m").
    fn send_submit(&self, key: &str) -> Result<()>;

    /// Read the currently visible buffer.
    fn capture_visible(&self) -> Result<String>;

    /// Read the full scrollback plus the visible buffer.
    fn capture_scrollback(&self) -> Result<String>;

    /// List terminal identifiers of attached human clients.
    fn attached_clients(&self) -> Result<Vec<String>>;

    /// Whether the session still exists.
    fn exists(&self) -> bool;

    /// Destroy the session.
    fn kill(&self) -> Result<()>;
}

/// `SessionTransport` implementation that shells out to tmux.
#[derive(Debug)]
pub struct TmuxTransport {
    /// Path to tmux binary.
    tmux_path: String,
    /// Target session name.
    session: String,
}

impl TmuxTransport {
    /// Create a transport for the named session.
    ///
    /// # Errors
    ///
    /// Returns `TmuxError::NotFound` if tmux is not available in PATH.
    pub fn new(session: impl Into<String>) -> Result<Self> {
        let tmux_path = Self::find_tmux()?;
        debug!(path = %tmux_path, "tmux found");
        Ok(Self {
            tmux_path,
            session: session.into(),
        })
    }

    /// Check if tmux is available in PATH.
    pub fn is_available() -> bool {
        Self::find_tmux().is_ok()
    }

    fn find_tmux() -> Result<String> {
        which::which("tmux")
            .map(|p| p.to_string_lossy().to_string())
            .map_err(|_| TmuxError::NotFound)
    }

    /// Run a tmux command and return the output.
    fn run_tmux(&self, args: &[&str]) -> Result<Output> {
        trace!(args = ?args, "running tmux command");
        let output = Command::new(&self.tmux_path).args(args).output()?;
        trace!(
            status = %output.status,
            stdout_len = output.stdout.len(),
            stderr_len = output.stderr.len(),
            "tmux command completed"
        );
        Ok(output)
    }

    /// Run a tmux command and check for success.
    fn run_tmux_checked(&self, args: &[&str]) -> Result<String> {
        let output = self.run_tmux(args)?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            if stderr.contains("session not found") || stderr.contains("no server running") {
                Err(TmuxError::SessionNotFound(self.session.clone()))
            } else {
                Err(TmuxError::CommandFailed(stderr))
            }
        }
    }

    /// Current pane size of the session's active pane.
    pub fn pane_size(&self) -> Result<PaneSize> {
        let output = self.run_tmux_checked(&[
            "display-message",
            "-p",
            "-t",
            &self.session,
            "#{pane_width}:#{pane_height}",
        ])?;
        PaneSize::parse(&output)
    }

    fn capture(&self, full_scrollback: bool) -> Result<String> {
        with_backoff(CAPTURE_ATTEMPTS, CAPTURE_BACKOFF, || {
            let mut args = vec!["capture-pane", "-t", self.session.as_str(), "-p"];
            if full_scrollback {
                args.push("-S");
                args.push("-");
            }
            self.run_tmux_checked(&args)
        })
    }
}

impl SessionTransport for TmuxTransport {
    fn name(&self) -> &str {
        &self.session
    }

    fn start(&self, width: u32, height: u32) -> Result<()> {
        debug!(session = %self.session, width, height, "creating tmux session");

        let width_arg = width.to_string();
        let height_arg = height.to_string();
        self.run_tmux_checked(&[
            "new-session",
            "-d",
            "-s",
            &self.session,
            "-x",
            &width_arg,
            "-y",
            &height_arg,
        ])?;

        if !self.exists() {
            return Err(TmuxError::CommandFailed(format!(
                "session '{}' was not created",
                self.session
            )));
        }
        Ok(())
    }

    fn send_text(&self, text: &str) -> Result<()> {
        debug!(session = %self.session, len = text.len(), "sending literal text");
        self.run_tmux_checked(&["send-keys", "-t", &self.session, "-l", "--", text])?;
        Ok(())
    }

    fn send_submit(&self, key: &str) -> Result<()> {
        debug!(session = %self.session, key = %key, "sending submit key");
        self.run_tmux_checked(&["send-keys", "-t", &self.session, key])?;
        Ok(())
    }

    fn capture_visible(&self) -> Result<String> {
        self.capture(false)
    }

    fn capture_scrollback(&self) -> Result<String> {
        self.capture(true)
    }

    fn attached_clients(&self) -> Result<Vec<String>> {
        let output = match with_backoff(CAPTURE_ATTEMPTS, CAPTURE_BACKOFF, || {
            self.run_tmux_checked(&[
                "list-clients",
                "-t",
                &self.session,
                "-F",
                "#{client_tty}:#{client_created}",
            ])
        }) {
            Ok(output) => output,
            // No server (or no such session) means nobody is attached
            Err(TmuxError::SessionNotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut clients = Vec::new();
        for line in output.lines() {
            if line.is_empty() {
                continue;
            }
            match TmuxClient::parse(line) {
                Ok(client) => clients.push(client.tty),
                Err(e) => {
                    tracing::warn!(line = %line, error = %e, "failed to parse client");
                }
            }
        }
        Ok(clients)
    }

    fn exists(&self) -> bool {
        let output = self.run_tmux(&["has-session", "-t", &self.session]);
        matches!(output, Ok(o) if o.status.success())
    }

    fn kill(&self) -> Result<()> {
        debug!(session = %self.session, "destroying tmux session");

        if !self.exists() {
            return Err(TmuxError::SessionNotFound(self.session.clone()));
        }

        self.run_tmux_checked(&["kill-session", "-t", &self.session])?;
        Ok(())
    }
}
