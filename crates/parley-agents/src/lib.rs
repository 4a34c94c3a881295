//! Agent profiles, readiness detection, and response capture for Parley.
//!
//! This crate knows *about* agents without touching a terminal:
//! - [`profile`]: per-agent configuration (launch command, textual
//!   fingerprints, timings, pane geometry), with built-in profiles and
//!   JSON file loading
//! - [`readiness`]: the state machine that decides, from successive
//!   buffer snapshots, whether an agent has finished responding
//! - [`capture`]: splitting a raw capture into prompt echo and
//!   response body

pub mod capture;
pub mod error;
pub mod profile;
pub mod readiness;

pub use capture::{split_response, SplitResponse};
pub use error::{AgentError, Result};
pub use profile::{builtin_profiles, find_profile, load_profiles, AgentProfile};
pub use readiness::{ReadinessDetector, ReadinessState};
