//! Record of what the agent has done so far, fed back into every prompt.

/// One completed iteration: where we were, what we ran, what came of it.
///
/// The outcome is either the description of the page we ended up on or the
/// kind name of a recoverable execution error.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub previous_page: String,
    pub command: String,
    pub outcome: String,
}

/// Append-only, oldest first. Grows without bound for the life of the run.
#[derive(Debug, Default)]
pub struct HistoryLog {
    entries: Vec<HistoryEntry>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &mut self,
        previous_page: impl Into<String>,
        command: impl Into<String>,
        outcome: impl Into<String>,
    ) {
        self.entries.push(HistoryEntry {
            previous_page: previous_page.into(),
            command: command.into(),
            outcome: outcome.into(),
        });
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One line per entry, oldest first. The command itself is kept out of
    /// the rendered line; it lives in the entry for inspection.
    pub fn rendered_lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| format!("{} : {}", e.previous_page, e.outcome))
            .collect()
    }
}
