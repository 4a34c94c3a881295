//! Turn coordination for Parley conversations.
//!
//! This crate turns a set of leased agent sessions into a bounded,
//! turn-based conversation:
//! - [`turn`]: immutable turn records and the bounded turn log
//! - [`mailbox`]: per-participant mailboxes and the message router
//! - [`context`]: prompt assembly with per-participant context
//!   windowing (`last heard` watermarks)
//! - [`detect`]: keyword-level consensus/conflict detection
//! - [`coordinator`]: the round-robin turn coordinator
//! - [`event`]: conversation events for observers
//! - [`transcript`]: the persisted, replayable conversation record

pub mod context;
pub mod coordinator;
pub mod detect;
pub mod error;
pub mod event;
pub mod mailbox;
pub mod transcript;
pub mod turn;

pub use context::ContextBuilder;
pub use coordinator::{ConversationConfig, Coordinator};
pub use detect::{assess, Assessment};
pub use error::{ConvoError, Result};
pub use event::ConversationEvent;
pub use mailbox::{MailboxEntry, MessageRouter};
pub use transcript::{ConversationOutcome, Transcript};
pub use turn::{Turn, TurnLog};
