//! Bounded exponential backoff for transport calls.

use std::time::Duration;

use tracing::warn;

use crate::Result;

/// Retry an idempotent transport call with bounded exponential backoff.
///
/// Only safe for read-style operations (capture, list). Never wrap a
/// send in this: a retried send-keys can double-type input.
pub fn with_backoff<T, F>(attempts: u32, base: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut delay = base;
    let mut last_err = None;

    for attempt in 0..attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt + 1 < attempts {
                    warn!(attempt = attempt + 1, error = %e, "transport call failed, retrying");
                    std::thread::sleep(delay);
                    delay *= 2;
                }
                last_err = Some(e);
            }
        }
    }

    // attempts >= 1 guarantees last_err is set
    Err(last_err.unwrap_or(crate::TmuxError::CommandFailed(
        "retry with zero attempts".to_string(),
    )))
}
