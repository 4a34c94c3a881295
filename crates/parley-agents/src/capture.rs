//! Splitting captured output into prompt echo and response body.
//!
//! What a capture window contains after a turn: the agent's echo of the
//! prompt it was just sent, the genuine response, and usually the
//! prompt line for the agent's *next* turn. Only the middle part is
//! the turn's content.

use tracing::trace;

use crate::profile::AgentProfile;

/// A turn's captured output, separated into echo and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitResponse {
    /// Echo of the prompt that was typed into the session.
    pub prompt_echo: String,
    /// The agent's actual response text.
    pub body: String,
}

/// Split raw captured text into `{prompt_echo, body}`.
///
/// If the profile carries a response marker, the body starts at its
/// first occurrence. Otherwise everything before the first
/// content-bearing line (non-empty, not part of the echoed prompt) is
/// treated as echo. A trailing prompt line for the agent's next turn
/// is stripped from the body either way; it is an artifact of the
/// capture window, not part of this turn's content.
pub fn split_response(raw: &str, sent_prompt: &str, profile: &AgentProfile) -> SplitResponse {
    let (echo, body) = match profile
        .response_marker
        .as_deref()
        .filter(|m| !m.is_empty())
        .and_then(|m| raw.find(m))
    {
        Some(idx) => (raw[..idx].to_string(), raw[idx..].to_string()),
        None => split_heuristic(raw, sent_prompt),
    };

    let body = strip_trailing_prompt(&body, &profile.ready_indicators);
    trace!(
        echo_len = echo.len(),
        body_len = body.len(),
        "split captured output"
    );

    SplitResponse {
        prompt_echo: echo.trim_end().to_string(),
        body,
    }
}

/// Fallback split when no marker is configured or found: echo is the
/// leading run of lines that are blank or appear inside the sent
/// prompt (echoes of long prompts arrive wrapped, so each wrapped
/// segment is a substring of the prompt).
fn split_heuristic(raw: &str, sent_prompt: &str) -> (String, String) {
    let mut offset = 0;
    for line in raw.split_inclusive('\n') {
        let trimmed = line.trim();
        let is_echo = trimmed.is_empty() || sent_prompt.contains(trimmed);
        if !is_echo {
            break;
        }
        offset += line.len();
    }
    (raw[..offset].to_string(), raw[offset..].to_string())
}

/// Drop a trailing ready-prompt line (plus surrounding blanks).
fn strip_trailing_prompt(body: &str, ready_indicators: &[String]) -> String {
    let mut lines: Vec<&str> = body.lines().collect();

    while matches!(lines.last(), Some(l) if l.trim().is_empty()) {
        lines.pop();
    }
    if let Some(last) = lines.last() {
        let is_prompt = ready_indicators
            .iter()
            .any(|r| !r.is_empty() && last.contains(r.as_str()));
        if is_prompt {
            lines.pop();
            while matches!(lines.last(), Some(l) if l.trim().is_empty()) {
                lines.pop();
            }
        }
    }
    lines.join("\n")
}
