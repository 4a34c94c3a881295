//! Per-agent configuration profiles.
//!
//! A profile captures everything Parley needs to know about one kind of
//! interactive CLI agent: how to launch it, which textual fingerprints
//! mark it as loading or ready, how to recognize the start of its
//! response, and how patient to be. The indicator strings are opaque
//! literals matched against the tail of the screen buffer; they change
//! between agent versions and UI modes, which is why they live in
//! configuration rather than code.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AgentError, Result};

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_response_timeout_secs() -> u64 {
    120
}

fn default_check_interval_ms() -> u64 {
    500
}

fn default_stable_checks() -> u32 {
    3
}

fn default_settle_time_ms() -> u64 {
    2000
}

fn default_submit_key() -> String {
    "Enter".to_string()
}

fn default_text_enter_delay_ms() -> u64 {
    100
}

fn default_post_text_delay_ms() -> u64 {
    300
}

// Panes are sized generously so agents don't adaptively truncate wide
// tabular output.
fn default_pane_width() -> u32 {
    200
}

fn default_pane_height() -> u32 {
    50
}

/// Configuration for one kind of interactive CLI agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Profile name, used as the participant/session key.
    pub name: String,
    /// Command used to launch the agent.
    pub command: String,
    /// Arguments for the launch command.
    #[serde(default)]
    pub args: Vec<String>,
    /// How long to wait for the agent to become ready after launch.
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
    /// How long to wait for a response before giving up on the turn.
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,
    /// Poll interval while waiting for readiness.
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    /// Consecutive unchanged polls that count as a stable buffer.
    #[serde(default = "default_stable_checks")]
    pub stable_checks: u32,
    /// Continuous absence of loading indicators required before ready.
    #[serde(default = "default_settle_time_ms")]
    pub settle_time_ms: u64,
    /// Strings whose presence in the buffer tail means "awaiting input".
    #[serde(default)]
    pub ready_indicators: Vec<String>,
    /// Strings whose presence in the buffer tail means "still working".
    #[serde(default)]
    pub loading_indicators: Vec<String>,
    /// Strings marking a finished response in the buffer tail.
    #[serde(default)]
    pub response_complete_markers: Vec<String>,
    /// Literal prefixing genuine response output, used to split the
    /// echoed prompt from the response body.
    #[serde(default)]
    pub response_marker: Option<String>,
    /// Key signal that submits typed input.
    #[serde(default = "default_submit_key")]
    pub submit_key: String,
    /// Secondary confirm keystroke for agents whose editor needs one.
    #[serde(default)]
    pub fallback_submit_key: Option<String>,
    /// Delay between typing text and sending the submit key.
    #[serde(default = "default_text_enter_delay_ms")]
    pub text_enter_delay_ms: u64,
    /// Delay after submitting before the first readiness poll.
    #[serde(default = "default_post_text_delay_ms")]
    pub post_text_delay_ms: u64,
    /// Pane width in columns.
    #[serde(default = "default_pane_width")]
    pub pane_width: u32,
    /// Pane height in rows.
    #[serde(default = "default_pane_height")]
    pub pane_height: u32,
}

impl AgentProfile {
    /// Create a profile with default timings and no indicators.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            startup_timeout_secs: default_startup_timeout_secs(),
            response_timeout_secs: default_response_timeout_secs(),
            check_interval_ms: default_check_interval_ms(),
            stable_checks: default_stable_checks(),
            settle_time_ms: default_settle_time_ms(),
            ready_indicators: Vec::new(),
            loading_indicators: Vec::new(),
            response_complete_markers: Vec::new(),
            response_marker: None,
            submit_key: default_submit_key(),
            fallback_submit_key: None,
            text_enter_delay_ms: default_text_enter_delay_ms(),
            post_text_delay_ms: default_post_text_delay_ms(),
            pane_width: default_pane_width(),
            pane_height: default_pane_height(),
        }
    }

    /// Sets the ready indicators.
    pub fn with_ready_indicators(mut self, indicators: Vec<String>) -> Self {
        self.ready_indicators = indicators;
        self
    }

    /// Sets the loading indicators.
    pub fn with_loading_indicators(mut self, indicators: Vec<String>) -> Self {
        self.loading_indicators = indicators;
        self
    }

    /// Sets the response-complete markers.
    pub fn with_complete_markers(mut self, markers: Vec<String>) -> Self {
        self.response_complete_markers = markers;
        self
    }

    /// Sets the response marker.
    pub fn with_response_marker(mut self, marker: impl Into<String>) -> Self {
        self.response_marker = Some(marker.into());
        self
    }

    /// Sets the response timeout.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets the settle time.
    pub fn with_settle_time(mut self, settle: Duration) -> Self {
        self.settle_time_ms = settle.as_millis() as u64;
        self
    }

    /// Startup timeout as a `Duration`.
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Response timeout as a `Duration`.
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    /// Readiness poll interval as a `Duration`.
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Settle time as a `Duration`.
    pub fn settle_time(&self) -> Duration {
        Duration::from_millis(self.settle_time_ms)
    }

    /// Delay between text entry and submit as a `Duration`.
    pub fn text_enter_delay(&self) -> Duration {
        Duration::from_millis(self.text_enter_delay_ms)
    }

    /// Delay after submit before polling as a `Duration`.
    pub fn post_text_delay(&self) -> Duration {
        Duration::from_millis(self.post_text_delay_ms)
    }

    /// Full launch command line.
    pub fn launch_command(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// Built-in profile for Claude Code.
pub fn claude_code() -> AgentProfile {
    AgentProfile::new("claude", "claude")
        .with_loading_indicators(vec![
            "esc to interrupt".to_string(),
            "Thinking".to_string(),
            "✻".to_string(),
            "✢".to_string(),
        ])
        .with_ready_indicators(vec!["❯".to_string(), "? for shortcuts".to_string()])
        .with_complete_markers(vec!["⏺".to_string()])
        .with_response_marker("⏺")
}

/// Built-in profile for Aider.
pub fn aider() -> AgentProfile {
    AgentProfile::new("aider", "aider")
        .with_loading_indicators(vec!["Waiting for".to_string(), "Thinking".to_string()])
        .with_ready_indicators(vec![">".to_string()])
}

/// Built-in profile for a plain shell, mostly useful in smoke tests.
pub fn shell() -> AgentProfile {
    AgentProfile::new("shell", "bash")
        .with_ready_indicators(vec!["$".to_string()])
        .with_response_timeout(Duration::from_secs(30))
        .with_settle_time(Duration::from_millis(500))
}

/// All compiled-in profiles.
pub fn builtin_profiles() -> Vec<AgentProfile> {
    vec![claude_code(), aider(), shell()]
}

/// Load profiles from `*.json` files in `dir`, merged over the
/// built-ins. A file profile with the same name replaces the built-in.
///
/// A missing directory yields just the built-ins.
pub fn load_profiles(dir: &Path) -> Result<Vec<AgentProfile>> {
    let mut profiles = builtin_profiles();

    if !dir.is_dir() {
        debug!(dir = %dir.display(), "no profile directory, using built-ins");
        return Ok(profiles);
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let contents = fs::read_to_string(&path)?;
        match serde_json::from_str::<AgentProfile>(&contents) {
            Ok(profile) => {
                debug!(name = %profile.name, path = %path.display(), "loaded agent profile");
                profiles.retain(|p| p.name != profile.name);
                profiles.push(profile);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unparseable profile");
            }
        }
    }

    Ok(profiles)
}

/// Find a profile by name.
pub fn find_profile<'a>(profiles: &'a [AgentProfile], name: &str) -> Result<&'a AgentProfile> {
    profiles
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| AgentError::ProfileNotFound(name.to_string()))
}
