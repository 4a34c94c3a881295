//! Natural-language agreement and disagreement detection.
//!
//! "Consensus" here is keyword-level agreement detection between
//! conversation participants, nothing stronger. When a response
//! triggers both keyword sets, consensus wins; the conflict verdict is
//! only reached when no agreement keyword is present.

use tracing::debug;

/// Keywords that signal agreement.
const CONSENSUS_KEYWORDS: &[&str] = &["consensus", "we agree", "agreement reached", "aligned"];

/// Keywords that signal disagreement.
const CONFLICT_KEYWORDS: &[&str] = &["disagree", "blocker", "conflict", "cannot", "reject"];

/// Verdict over one turn's response text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Assessment {
    /// An agreement keyword was found.
    pub consensus: bool,
    /// A disagreement keyword was found (and no agreement keyword).
    pub conflict: bool,
    /// The line containing the first disagreement keyword.
    pub reason: Option<String>,
}

/// Assess a response body for consensus or conflict signals.
pub fn assess(text: &str) -> Assessment {
    let lowered = text.to_lowercase();

    if CONSENSUS_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        debug!("consensus keyword detected");
        return Assessment {
            consensus: true,
            ..Assessment::default()
        };
    }

    for keyword in CONFLICT_KEYWORDS {
        if let Some(line) = lowered
            .lines()
            .position(|l| l.contains(keyword))
            .and_then(|i| text.lines().nth(i))
        {
            debug!(keyword, "conflict keyword detected");
            return Assessment {
                consensus: false,
                conflict: true,
                reason: Some(line.trim().to_string()),
            };
        }
    }

    Assessment::default()
}
