//! Parsed tmux pane and client data structures.

use chrono::{DateTime, TimeZone, Utc};

use crate::{Result, TmuxError};

/// Size of a pane in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaneSize {
    /// Width in columns.
    pub width: u32,
    /// Height in rows.
    pub height: u32,
}

impl PaneSize {
    /// Parse from tmux display output.
    ///
    /// Expected format: `pane_width:pane_height`
    pub fn parse(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.trim().split(':').collect();
        if parts.len() != 2 {
            return Err(TmuxError::ParseError(format!(
                "invalid pane size format: {}",
                line
            )));
        }

        let width: u32 = parts[0]
            .parse()
            .map_err(|_| TmuxError::ParseError(format!("invalid pane width: {}", parts[0])))?;
        let height: u32 = parts[1]
            .parse()
            .map_err(|_| TmuxError::ParseError(format!("invalid pane height: {}", parts[1])))?;

        Ok(Self { width, height })
    }
}

/// A human client attached to a tmux session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxClient {
    /// Client terminal identifier (tty path).
    pub tty: String,
    /// When the client attached.
    pub attached_at: DateTime<Utc>,
}

impl TmuxClient {
    /// Parse a client from tmux list-clients output line.
    ///
    /// Expected format: `client_tty:client_created`
    pub fn parse(line: &str) -> Result<Self> {
        let (tty, timestamp) = line.rsplit_once(':').ok_or_else(|| {
            TmuxError::ParseError(format!("invalid client format: {}", line))
        })?;

        let timestamp: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| TmuxError::ParseError(format!("invalid timestamp: {}", timestamp)))?;

        let attached_at = Utc
            .timestamp_opt(timestamp, 0)
            .single()
            .ok_or_else(|| TmuxError::ParseError(format!("invalid timestamp: {}", timestamp)))?;

        Ok(Self {
            tty: tty.to_string(),
            attached_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pane_size_valid() {
        let size = PaneSize::parse("200:50").unwrap();
        assert_eq!(size.width, 200);
        assert_eq!(size.height, 50);
    }

    #[test]
    fn test_parse_pane_size_trailing_newline() {
        let size = PaneSize::parse("120:40\n").unwrap();
        assert_eq!(size.width, 120);
        assert_eq!(size.height, 40);
    }

    #[test]
    fn test_parse_pane_size_invalid_format() {
        assert!(PaneSize::parse("200").is_err());
        assert!(PaneSize::parse("200:50:1").is_err());
        assert!(PaneSize::parse("wide:50").is_err());
    }

    #[test]
    fn test_parse_client_valid() {
        let client = TmuxClient::parse("/dev/ttys004:1706000000").unwrap();
        assert_eq!(client.tty, "/dev/ttys004");
        assert_eq!(client.attached_at.timestamp(), 1706000000);
    }

    #[test]
    fn test_parse_client_tty_with_colons() {
        // rsplit keeps colons inside the tty path intact
        let client = TmuxClient::parse("/dev/pts:extra/7:1706000001").unwrap();
        assert_eq!(client.tty, "/dev/pts:extra/7");
        assert_eq!(client.attached_at.timestamp(), 1706000001);
    }

    #[test]
    fn test_parse_client_invalid() {
        assert!(TmuxClient::parse("noseparator").is_err());
        assert!(TmuxClient::parse("/dev/ttys004:notanumber").is_err());
    }

    #[test]
    fn test_parse_multiple_clients() {
        let output = "/dev/ttys001:1706000000\n/dev/ttys002:1706000005";
        let clients: Vec<TmuxClient> = output
            .lines()
            .filter(|l| !l.is_empty())
            .map(TmuxClient::parse)
            .collect::<Result<Vec<_>>>()
            .unwrap();

        assert_eq!(clients.len(), 2);
        assert_eq!(clients[0].tty, "/dev/ttys001");
        assert_eq!(clients[1].tty, "/dev/ttys002");
    }
}
