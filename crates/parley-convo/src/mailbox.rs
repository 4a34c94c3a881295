//! Per-participant mailboxes and the message router.
//!
//! After each completed turn the response body is delivered to every
//! *other* participant's mailbox, where it waits until that
//! participant's next prompt is built. Mailboxes are bounded; on
//! overflow the oldest entry is dropped with a warning, never an
//! error. Queued turns are never delivered at all.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

/// Default mailbox capacity.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 8;

/// One undelivered cross-agent update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxEntry {
    /// Index of the turn the body came from.
    pub turn_index: u64,
    /// Speaker of that turn.
    pub from: String,
    /// The turn's response body.
    pub body: String,
}

/// Routes turn responses into bounded per-participant mailboxes.
#[derive(Debug)]
pub struct MessageRouter {
    mailboxes: HashMap<String, VecDeque<MailboxEntry>>,
    capacity: usize,
}

impl MessageRouter {
    /// Create a router with the given per-mailbox capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            mailboxes: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Register a participant, creating its empty mailbox.
    pub fn register(&mut self, name: impl Into<String>) {
        self.mailboxes.entry(name.into()).or_default();
    }

    /// Remove a participant and its mailbox.
    pub fn unregister(&mut self, name: &str) {
        self.mailboxes.remove(name);
    }

    /// Deliver a turn's response body to every registered participant
    /// except the speaker.
    pub fn deliver(&mut self, from: &str, turn_index: u64, body: &str) {
        for (name, mailbox) in &mut self.mailboxes {
            if name == from {
                continue;
            }
            if mailbox.len() >= self.capacity {
                warn!(
                    participant = %name,
                    "mailbox full, dropping oldest entry"
                );
                mailbox.pop_front();
            }
            mailbox.push_back(MailboxEntry {
                turn_index,
                from: from.to_string(),
                body: body.to_string(),
            });
        }
        debug!(from = %from, turn_index, "delivered turn to mailboxes");
    }

    /// Drain a participant's mailbox, returning its entries oldest
    /// first. Draining an empty (or unknown) mailbox is a no-op.
    pub fn prepare_additions(&mut self, name: &str) -> Vec<MailboxEntry> {
        match self.mailboxes.get_mut(name) {
            Some(mailbox) => mailbox.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /// Number of entries waiting for a participant.
    pub fn pending(&self, name: &str) -> usize {
        self.mailboxes.get(name).map(|m| m.len()).unwrap_or(0)
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new(DEFAULT_MAILBOX_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router_with(names: &[&str]) -> MessageRouter {
        let mut router = MessageRouter::default();
        for name in names {
            router.register(*name);
        }
        router
    }

    #[test]
    fn test_deliver_skips_speaker() {
        let mut router = router_with(&["a", "b", "c"]);
        router.deliver("a", 1, "hello");

        assert_eq!(router.pending("a"), 0);
        assert_eq!(router.pending("b"), 1);
        assert_eq!(router.pending("c"), 1);
    }

    #[test]
    fn test_drain_returns_oldest_first_and_empties() {
        let mut router = router_with(&["a", "b"]);
        router.deliver("a", 1, "one");
        router.deliver("a", 2, "two");

        let additions = router.prepare_additions("b");
        assert_eq!(additions.len(), 2);
        assert_eq!(additions[0].turn_index, 1);
        assert_eq!(additions[1].turn_index, 2);
        assert_eq!(router.pending("b"), 0);
    }

    #[test]
    fn test_drain_empty_mailbox_is_noop() {
        let mut router = router_with(&["a", "b"]);
        assert!(router.prepare_additions("b").is_empty());
        assert!(router.prepare_additions("b").is_empty());
        // Unknown participants drain to nothing as well
        assert!(router.prepare_additions("ghost").is_empty());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut router = MessageRouter::new(3);
        router.register("a");
        router.register("b");

        for i in 1..=5 {
            router.deliver("a", i, &format!("update {}", i));
        }

        let additions = router.prepare_additions("b");
        let indices: Vec<u64> = additions.iter().map(|e| e.turn_index).collect();
        assert_eq!(indices, vec![3, 4, 5]);
    }

    #[test]
    fn test_unregister_removes_mailbox() {
        let mut router = router_with(&["a", "b"]);
        router.deliver("a", 1, "hello");
        router.unregister("b");

        assert_eq!(router.pending("b"), 0);
        router.deliver("a", 2, "again");
        assert_eq!(router.pending("b"), 0);
    }
}
