//! Transcript persistence.
//!
//! The transcript is the audit trail of a conversation: every turn,
//! including queued attempts and timeouts, in order. It is rewritten
//! after each recorded turn so a crash mid-conversation still leaves a
//! legible file.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::turn::Turn;

/// How a conversation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationOutcome {
    /// A turn signalled agreement.
    Consensus,
    /// A turn signalled disagreement.
    Conflict,
    /// The turn budget was exhausted.
    MaxTurns,
    /// Fewer than two participants remained.
    ParticipantRemoved,
}

/// A complete, replayable record of one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// Conversation id.
    pub id: Uuid,
    /// The task the participants were given.
    pub topic: String,
    /// Participants at conversation start.
    pub participants: Vec<String>,
    /// When the conversation started.
    pub started_at: DateTime<Utc>,
    /// When the conversation finished, once it has.
    pub finished_at: Option<DateTime<Utc>>,
    /// How the conversation ended, once it has.
    pub outcome: Option<ConversationOutcome>,
    /// Every recorded turn, queued attempts included.
    pub turns: Vec<Turn>,
}

impl Transcript {
    /// Start a transcript for a new conversation.
    pub fn new(topic: impl Into<String>, participants: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            participants,
            started_at: Utc::now(),
            finished_at: None,
            outcome: None,
            turns: Vec::new(),
        }
    }

    /// Record a turn.
    pub fn record(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Mark the conversation finished.
    pub fn finish(&mut self, outcome: ConversationOutcome) {
        self.outcome = Some(outcome);
        self.finished_at = Some(Utc::now());
    }

    /// Write the transcript as pretty JSON, atomically (temp file then
    /// rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), turns = self.turns.len(), "transcript saved");
        Ok(())
    }

    /// Load a transcript from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}
