//! Conversation events.

use crate::turn::Turn;

/// Events emitted by a running conversation.
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    /// A turn signalled agreement and ended the conversation.
    Consensus {
        /// The turn that triggered it.
        turn: Turn,
    },
    /// A turn signalled disagreement and ended the conversation.
    Conflict {
        /// The turn that triggered it.
        turn: Turn,
        /// The line that carried the disagreement.
        reason: String,
    },
    /// A speaker's dispatch was queued behind a human.
    Queued {
        /// The speaker whose turn is on hold.
        speaker: String,
    },
    /// A participant was removed from the rotation after repeated
    /// failures.
    ParticipantRemoved {
        /// The removed participant.
        speaker: String,
    },
}

impl ConversationEvent {
    /// Returns true if this event ends the conversation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConversationEvent::Consensus { .. } | ConversationEvent::Conflict { .. }
        )
    }
}
