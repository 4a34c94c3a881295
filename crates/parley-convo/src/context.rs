//! Prompt assembly with per-participant context windowing.
//!
//! A participant's own session already retains everything it has said
//! and been told; re-sending old turns only inflates prompts. The
//! builder tracks, per participant, the last turn index already
//! incorporated into that participant's context, and a prompt carries
//! exactly the turns strictly between that index and the turn being
//! built. A participant who has never spoken gets the full retained
//! history, since all of it is new to them.

use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use crate::mailbox::MailboxEntry;
use crate::turn::TurnLog;

/// Builds prompts and tracks each participant's context watermark.
#[derive(Debug, Default)]
pub struct ContextBuilder {
    last_heard: HashMap<String, u64>,
}

impl ContextBuilder {
    /// Create a builder with no recorded watermarks.
    pub fn new() -> Self {
        Self::default()
    }

    /// The last turn index a participant has incorporated (0 if they
    /// have never spoken).
    pub fn last_heard(&self, name: &str) -> u64 {
        self.last_heard.get(name).copied().unwrap_or(0)
    }

    /// Record that a participant's context now covers everything up to
    /// and including `turn_index`.
    pub fn mark_heard(&mut self, name: &str, turn_index: u64) {
        self.last_heard.insert(name.to_string(), turn_index);
    }

    /// Forget a participant's watermark.
    pub fn forget(&mut self, name: &str) {
        self.last_heard.remove(name);
    }

    /// Build the prompt for `speaker`'s next turn, to be recorded at
    /// index `next_index`.
    ///
    /// The mailbox governs delivery and bounding; the turn log backfills
    /// anything the mailbox no longer holds (overflow, or a first-time
    /// speaker whose mailbox predates registration). Each turn index in
    /// the window appears exactly once, in order, and nothing at or
    /// below the speaker's watermark is ever included.
    pub fn build(
        &self,
        speaker: &str,
        topic: &str,
        log: &TurnLog,
        additions: &[MailboxEntry],
        next_index: u64,
    ) -> String {
        let floor = self.last_heard(speaker);

        let mut window: BTreeMap<u64, (String, String)> = BTreeMap::new();
        for entry in additions {
            if entry.turn_index > floor && entry.turn_index < next_index {
                window.insert(entry.turn_index, (entry.from.clone(), entry.body.clone()));
            }
        }
        for turn in log.iter() {
            if turn.queued || turn.speaker == speaker {
                continue;
            }
            if turn.index <= floor || turn.index >= next_index {
                continue;
            }
            window
                .entry(turn.index)
                .or_insert_with(|| (turn.speaker.clone(), turn.response.clone()));
        }

        trace!(
            speaker = %speaker,
            floor,
            next_index,
            window = window.len(),
            "built context window"
        );

        let mut prompt = format!("Task: {}", topic);
        if !window.is_empty() {
            prompt.push_str("\n\nUpdates from the other participants:");
            for (from, body) in window.values() {
                prompt.push_str(&format!("\n\n[{}]\n{}", from, body));
            }
        }
        prompt.push_str("\n\nReply with your next contribution to the discussion.");
        prompt
    }
}
