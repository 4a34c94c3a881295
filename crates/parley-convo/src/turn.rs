//! Turn records and the bounded turn log.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default number of turns retained in the log.
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

/// One speaker's complete prompt-response exchange.
///
/// Immutable once appended to the log. A `queued` turn records a
/// dispatch attempt that was absorbed by a queue instead of reaching
/// the agent; it carries no response and is never broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Monotonic, conversation-wide sequence index, starting at 1.
    pub index: u64,
    /// Participant who spoke (or whose dispatch was queued).
    pub speaker: String,
    /// The conversation topic at the time of the turn.
    pub topic: String,
    /// Prompt text actually sent (or held for later delivery).
    pub prompt: String,
    /// Echo of the prompt as it appeared in the capture.
    pub prompt_echo: String,
    /// The agent's response body, echo and trailing prompt stripped.
    pub response: String,
    /// The dispatch was queued behind a human, not sent.
    pub queued: bool,
    /// The response signalled agreement.
    pub consensus: bool,
    /// The response signalled disagreement.
    pub conflict: bool,
    /// The line that triggered the conflict verdict.
    pub conflict_reason: Option<String>,
    /// When the turn was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Append-only turn history, bounded with FIFO eviction.
#[derive(Debug)]
pub struct TurnLog {
    turns: VecDeque<Turn>,
    limit: usize,
    next_index: u64,
}

impl TurnLog {
    /// Create a log retaining at most `limit` turns.
    pub fn new(limit: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            limit: limit.max(1),
            next_index: 1,
        }
    }

    /// The index the next appended turn will receive.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Append a turn, evicting the oldest if the log is full.
    ///
    /// The turn's index must be the log's current next index; the log
    /// owns the numbering.
    pub fn append(&mut self, turn: Turn) {
        debug_assert_eq!(turn.index, self.next_index);
        if self.turns.len() >= self.limit {
            if let Some(evicted) = self.turns.pop_front() {
                debug!(index = evicted.index, "evicted oldest turn from log");
            }
        }
        self.next_index = turn.index + 1;
        self.turns.push_back(turn);
    }

    /// Number of retained turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the log holds no turns.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Iterate retained turns, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// The most recently appended turn.
    pub fn last(&self) -> Option<&Turn> {
        self.turns.back()
    }
}

impl Default for TurnLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn make_turn(index: u64, speaker: &str, response: &str) -> Turn {
        Turn {
            index,
            speaker: speaker.to_string(),
            topic: "test topic".to_string(),
            prompt: format!("prompt {}", index),
            prompt_echo: String::new(),
            response: response.to_string(),
            queued: false,
            consensus: false,
            conflict: false,
            conflict_reason: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_append_assigns_monotonic_indices() {
        let mut log = TurnLog::new(10);
        assert_eq!(log.next_index(), 1);

        log.append(make_turn(1, "a", "one"));
        assert_eq!(log.next_index(), 2);
        log.append(make_turn(2, "b", "two"));

        assert_eq!(log.len(), 2);
        assert_eq!(log.last().unwrap().index, 2);
    }

    #[test]
    fn test_eviction_is_fifo() {
        let mut log = TurnLog::new(3);
        for i in 1..=5 {
            log.append(make_turn(i, "a", &format!("r{}", i)));
        }

        assert_eq!(log.len(), 3);
        let indices: Vec<u64> = log.iter().map(|t| t.index).collect();
        assert_eq!(indices, vec![3, 4, 5]);
        // Numbering continues past evicted turns
        assert_eq!(log.next_index(), 6);
    }

    #[test]
    fn test_turn_serde_roundtrip() {
        let turn = make_turn(7, "alice", "the answer");
        let json = serde_json::to_string(&turn).unwrap();
        let back: Turn = serde_json::from_str(&json).unwrap();
        assert_eq!(back.index, 7);
        assert_eq!(back.speaker, "alice");
        assert_eq!(back.response, "the answer");
    }
}
