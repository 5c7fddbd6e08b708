//! Terminal-status policy.
//!
//! Trackers disagree on what "finished" is called, so the check is injected
//! into the engine instead of being baked in.

/// Vocabulary used when `TERMINAL_STATUSES` is not set.
pub const DEFAULT_TERMINAL_STATUSES: [&str; 3] = ["closed", "resolved", "done"];

/// Decides whether a status name means the issue is finished.
pub trait TerminalPredicate: Send + Sync {
    fn is_terminal(&self, status: &str) -> bool;
}

impl<F> TerminalPredicate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_terminal(&self, status: &str) -> bool {
        self(status)
    }
}

/// Case-insensitive substring match against a configurable vocabulary.
///
/// "Resolved - Won't Fix" is terminal under the default vocabulary because it
/// contains "resolved".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TerminalStatuses {
    terms: Vec<String>,
}

impl TerminalStatuses {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { terms }
    }

    /// Parses a comma-separated list such as `"closed, resolved,done"`.
    pub fn parse(s: &str) -> Self {
        Self::new(s.split(','))
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }
}

impl Default for TerminalStatuses {
    fn default() -> Self {
        Self::new(DEFAULT_TERMINAL_STATUSES)
    }
}

impl TerminalPredicate for TerminalStatuses {
    fn is_terminal(&self, status: &str) -> bool {
        let status = status.to_lowercase();
        self.terms.iter().any(|term| status.contains(term.as_str()))
    }
}
