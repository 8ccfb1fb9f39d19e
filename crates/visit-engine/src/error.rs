//! Error types for scheduling operations.

use thiserror::Error;

use crate::model::OccurrenceKey;

/// Outcome of one occurrence in a batch that failed partway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedOccurrence {
    pub key: OccurrenceKey,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid recurrence rule: {0}")]
    InvalidRule(String),

    #[error("Invalid anchor occurrence: {0}")]
    InvalidAnchor(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid occurrence key '{0}', expected YYYY-MM-DDTHH:MM")]
    InvalidKey(String),

    #[error("Recurrence generates more than {cap} occurrences")]
    RecurrenceTooLarge { cap: usize },

    #[error("Unknown occurrence(s): {}", join_keys(.0))]
    UnknownOccurrence(Vec<OccurrenceKey>),

    #[error("Unresolved conflicts on occurrence(s): {}", join_keys(.0))]
    UnresolvedConflicts(Vec<OccurrenceKey>),

    #[error("Nothing selected to commit")]
    EmptySelection,

    #[error("Occurrence(s) requested for commit are not selected: {}", join_keys(.0))]
    SelectionMismatch(Vec<OccurrenceKey>),

    #[error("Preview session is closed ({0})")]
    SessionClosed(&'static str),

    #[error("Commit timed out after {timeout_ms} ms; no visits were written")]
    CommitTimeout { timeout_ms: u64 },

    #[error("Commit cancelled; no visits were written")]
    CommitCancelled,

    #[error("Visit sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error(
        "Partial commit failure: {} created, {} failed ({})",
        .created.len(),
        .failed.len(),
        describe_failures(.failed)
    )]
    PartialCommitFailure {
        created: Vec<(OccurrenceKey, String)>,
        failed: Vec<FailedOccurrence>,
    },
}

impl ScheduleError {
    /// Whether retrying the same commit may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScheduleError::CommitTimeout { .. }
                | ScheduleError::CommitCancelled
                | ScheduleError::SinkUnavailable(_)
                | ScheduleError::PartialCommitFailure { .. }
        )
    }
}

fn join_keys(keys: &[OccurrenceKey]) -> String {
    keys.iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_failures(failed: &[FailedOccurrence]) -> String {
    failed
        .iter()
        .map(|f| format!("{}: {}", f.key, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
