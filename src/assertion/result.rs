//! Assertion outcomes and the scenario result log
//!
//! An [`AssertionResult`] is constructed once by the assertion layer and
//! appended to the owning scenario's log; it is never mutated afterwards.
//! Failures are data, not errors — a failing result contributes to the
//! scenario's pass/fail disposition but never unwinds the pipeline.

use std::fmt;

/// Immutable outcome of one assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionResult {
    passed: bool,
    message: String,
    optional: bool,
    details: Option<String>,
}

impl AssertionResult {
    /// A passing assertion
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            optional: false,
            details: None,
        }
    }

    /// A failing assertion that counts toward the scenario's disposition
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            optional: false,
            details: None,
        }
    }

    /// A failing assertion recorded for information only
    pub fn fail_optional(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            optional: true,
            details: None,
        }
    }

    /// Attach detail text (expected/actual dump, transport error, ...)
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// True iff this result drags the scenario into a failed disposition
    pub fn counts_as_failure(&self) -> bool {
        !self.passed && !self.optional
    }
}

impl fmt::Display for AssertionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed {
            "✓"
        } else if self.optional {
            "~"
        } else {
            "✗"
        };
        write!(f, "{} {}", mark, self.message)?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

/// One entry in a scenario's ordered log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// Free-form commentary (step labels, skip notices)
    Comment(String),
    /// An assertion outcome
    Result(AssertionResult),
}

impl LogEntry {
    /// The assertion result, if this entry carries one
    pub fn result(&self) -> Option<&AssertionResult> {
        match self {
            Self::Result(r) => Some(r),
            Self::Comment(_) => None,
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comment(text) => write!(f, "# {}", text),
            Self::Result(result) => write!(f, "{}", result),
        }
    }
}

/// Append-only ordered log owned by one scenario
#[derive(Debug, Default)]
pub struct ScenarioLog {
    entries: Vec<LogEntry>,
}

impl ScenarioLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_result(&mut self, result: AssertionResult) {
        self.entries.push(LogEntry::Result(result));
    }

    pub fn comment(&mut self, text: impl Into<String>) {
        self.entries.push(LogEntry::Comment(text.into()));
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Any non-optional failing result recorded so far
    pub fn has_failure(&self) -> bool {
        self.entries
            .iter()
            .filter_map(LogEntry::result)
            .any(AssertionResult::counts_as_failure)
    }

    pub fn pass_count(&self) -> usize {
        self.entries
            .iter()
            .filter_map(LogEntry::result)
            .filter(|r| r.passed())
            .count()
    }

    pub fn fail_count(&self) -> usize {
        self.entries
            .iter()
            .filter_map(LogEntry::result)
            .filter(|r| r.counts_as_failure())
            .count()
    }
}
