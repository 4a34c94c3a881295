//! Automation lease and dispatch layer for Parley.
//!
//! This crate arbitrates access to agent sessions:
//! - [`lease`]: pause/resume-on-human-attach semantics with an
//!   outbound command queue per session
//! - [`dispatcher`]: a name-to-lease registry with a second,
//!   orchestrator-level queue and queued-vs-sent reconciliation
//! - [`poller`]: the bounded readiness wait that feeds buffer
//!   snapshots into the detector
//! - [`lifecycle`]: session startup (launch + first readiness) and
//!   teardown

pub mod dispatcher;
pub mod error;
pub mod lease;
pub mod lifecycle;
pub mod poller;

pub use dispatcher::{DispatchOutcome, Dispatcher, QueueSource};
pub use error::{Result, SessionError};
pub use lease::{AutomationLease, LeaseStatus, PendingSend, SendOutcome, PAUSE_MANUAL_ATTACH};
pub use lifecycle::{shutdown_all, start_session};
pub use poller::{wait_ready, wait_startup, WaitOutcome};
