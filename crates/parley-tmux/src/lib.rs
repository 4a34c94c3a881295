//! Tmux session transport for Parley.
//!
//! This crate drives one interactive agent process inside a detached
//! tmux session:
//! - Create and destroy sessions at a fixed pane size
//! - Type literal text and issue submit keystrokes as separate calls
//! - Capture the visible buffer or the full scrollback
//! - List attached human clients (used to yield automation control)
//!
//! # Example
//!
//! ```no_run
//! use parley_tmux::{SessionTransport, TmuxTransport};
//!
//! let transport = TmuxTransport::new("reviewer").expect("tmux not found");
//! transport.start(200, 50).unwrap();
//!
//! transport.send_text("summarize the open issues").unwrap();
//! transport.send_submit("Enter").unwrap();
//!
//! let screen = transport.capture_visible().unwrap();
//! println!("{}", screen);
//!
//! transport.kill().unwrap();
//! ```

pub mod error;
pub mod retry;
pub mod session;
pub mod transport;

pub use error::{Result, TmuxError};
pub use session::{PaneSize, TmuxClient};
pub use transport::{SessionTransport, TmuxTransport};
