//! Atomic batch commit of a preview's selected occurrences.
//!
//! Validation (session state, selection, unresolved conflicts) is local and
//! side-effect free. The persistence step goes through a [`VisitSink`] under a
//! deadline and a cancellation token; the engine never retries on its own.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::{FailedOccurrence, Result, ScheduleError};
use crate::model::{hhmm, AuthorizationId, CandidateOccurrence, ClientId, OccurrenceKey, StaffId};
use crate::session::PreviewSession;

/// A visit ready to be persisted. Times are the preview's own wall-clock
/// values in `timezone`, never shifted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitDraft {
    pub key: OccurrenceKey,
    pub client_id: ClientId,
    pub staff_id: Option<StaffId>,
    pub authorization_id: AuthorizationId,
    pub service_code: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub units: u32,
    pub comment: String,
    pub timezone: String,
}

impl VisitDraft {
    fn from_occurrence(occurrence: &CandidateOccurrence, timezone: &str) -> Self {
        Self {
            key: occurrence.key,
            client_id: occurrence.client_id.clone(),
            staff_id: occurrence.staff_id.clone(),
            authorization_id: occurrence.authorization_id.clone(),
            service_code: occurrence.service_code.clone(),
            date: occurrence.date,
            start_time: occurrence.start_time,
            end_time: occurrence.end_time,
            units: occurrence.units,
            comment: occurrence.comment.clone(),
            timezone: timezone.to_string(),
        }
    }
}

/// Failure reported by a [`VisitSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The whole batch was rejected; nothing was written.
    Unavailable(String),
    /// Some drafts failed. `created` lists those that were persisted, which
    /// may be none when the sink refused the batch after a per-draft check.
    Partial {
        created: Vec<(OccurrenceKey, String)>,
        failed: Vec<FailedOccurrence>,
    },
}

/// Write-only "create visits batch" sink.
///
/// Implementations persist the batch atomically: on `Ok` every draft is
/// visible, and identifiers are returned in draft order. If the returned
/// future is dropped before completing (timeout or cancellation), nothing may
/// become visible.
#[async_trait]
pub trait VisitSink: Send + Sync {
    async fn create_batch(&self, drafts: &[VisitDraft]) -> std::result::Result<Vec<String>, SinkError>;
}

/// Commit request: which selected occurrences to persist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    /// Must be a subset of the current selection. `None` commits the whole selection.
    #[serde(default)]
    pub keys: Option<Vec<OccurrenceKey>>,
    /// Overrides the coordinator's default deadline.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// One persisted visit, echoing the wall-clock times from the preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittedVisit {
    pub key: OccurrenceKey,
    pub visit_id: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReceipt {
    /// In occurrence order.
    pub visits: Vec<CommittedVisit>,
}

impl CommitReceipt {
    pub fn visit_ids(&self) -> Vec<&str> {
        self.visits.iter().map(|v| v.visit_id.as_str()).collect()
    }

    pub fn visit_id(&self, key: &OccurrenceKey) -> Option<&str> {
        self.visits
            .iter()
            .find(|v| &v.key == key)
            .map(|v| v.visit_id.as_str())
    }
}

/// Validates previews and persists them through a [`VisitSink`].
pub struct CommitCoordinator<S> {
    sink: S,
    timeout: Duration,
}

impl<S: VisitSink> CommitCoordinator<S> {
    pub fn new(sink: S, config: &EngineConfig) -> Self {
        Self {
            sink,
            timeout: config.commit_timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Check that `request` could be committed from `session` right now,
    /// returning the drafts that would be sent.
    ///
    /// # Errors
    /// [`ScheduleError::SessionClosed`], [`ScheduleError::UnknownOccurrence`],
    /// [`ScheduleError::SelectionMismatch`], [`ScheduleError::EmptySelection`]
    /// or [`ScheduleError::UnresolvedConflicts`].
    pub fn validate(&self, session: &PreviewSession, request: &CommitRequest) -> Result<Vec<VisitDraft>> {
        let preview = session.preview()?;

        let targets: BTreeSet<OccurrenceKey> = match &request.keys {
            None => preview.selected().clone(),
            Some(keys) => {
                let unknown: Vec<OccurrenceKey> =
                    keys.iter().filter(|k| !preview.contains(k)).copied().collect();
                if !unknown.is_empty() {
                    return Err(ScheduleError::UnknownOccurrence(unknown));
                }
                let unselected: Vec<OccurrenceKey> =
                    keys.iter().filter(|k| !preview.is_selected(k)).copied().collect();
                if !unselected.is_empty() {
                    return Err(ScheduleError::SelectionMismatch(unselected));
                }
                keys.iter().copied().collect()
            }
        };

        if targets.is_empty() {
            return Err(ScheduleError::EmptySelection);
        }

        // Gated on the whole selection, as `can_commit` is, even for a subset commit.
        let blocked = preview.unresolved_selected();
        if !blocked.is_empty() {
            return Err(ScheduleError::UnresolvedConflicts(blocked));
        }

        Ok(preview
            .occurrences()
            .iter()
            .filter(|o| targets.contains(&o.key))
            .map(|o| VisitDraft::from_occurrence(o, preview.facility_timezone()))
            .collect())
    }

    /// Persist the requested occurrences as one batch.
    ///
    /// On success the session is closed. On [`ScheduleError::CommitTimeout`],
    /// [`ScheduleError::CommitCancelled`] or [`ScheduleError::SinkUnavailable`]
    /// the session stays open and unchanged. On
    /// [`ScheduleError::PartialCommitFailure`] the session stays open with the
    /// persisted occurrences removed, so a retry covers only the failed subset.
    pub async fn commit(
        &self,
        session: &mut PreviewSession,
        request: &CommitRequest,
        cancel: &CancellationToken,
    ) -> Result<CommitReceipt> {
        let drafts = self.validate(session, request)?;
        let timeout = request
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.timeout);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(occurrences = drafts.len(), "commit cancelled");
                return Err(ScheduleError::CommitCancelled);
            }
            result = tokio::time::timeout(timeout, self.sink.create_batch(&drafts)) => result,
        };

        let Ok(result) = outcome else {
            let timeout_ms = timeout.as_millis() as u64;
            warn!(occurrences = drafts.len(), timeout_ms, "commit timed out");
            return Err(ScheduleError::CommitTimeout { timeout_ms });
        };

        match result {
            Ok(ids) if ids.len() > drafts.len() => {
                warn!(drafts = drafts.len(), ids = ids.len(), "visit sink returned surplus identifiers");
                Err(ScheduleError::SinkUnavailable(format!(
                    "sink returned {} identifiers for {} visits",
                    ids.len(),
                    drafts.len()
                )))
            }
            Ok(ids) if ids.len() == drafts.len() => {
                let visits = drafts
                    .iter()
                    .zip(ids)
                    .map(|(draft, visit_id)| CommittedVisit {
                        key: draft.key,
                        visit_id,
                        date: draft.date,
                        start_time: draft.start_time,
                        end_time: draft.end_time,
                    })
                    .collect();
                session.finish();
                info!(committed = drafts.len(), "committed visit batch");
                Ok(CommitReceipt { visits })
            }
            Ok(ids) => {
                // A sink that under-reports identifiers has written an unknown
                // subset; surface it per occurrence instead of guessing.
                let created: Vec<(OccurrenceKey, String)> =
                    drafts.iter().map(|d| d.key).zip(ids).collect();
                let failed = drafts[created.len()..]
                    .iter()
                    .map(|d| FailedOccurrence {
                        key: d.key,
                        reason: "sink returned no identifier".to_string(),
                    })
                    .collect();
                Err(self.partial_failure(session, created, failed))
            }
            Err(SinkError::Partial { created, failed }) => Err(self.partial_failure(session, created, failed)),
            Err(SinkError::Unavailable(reason)) => {
                warn!(%reason, "visit sink rejected batch");
                Err(ScheduleError::SinkUnavailable(reason))
            }
        }
    }

    fn partial_failure(
        &self,
        session: &mut PreviewSession,
        created: Vec<(OccurrenceKey, String)>,
        failed: Vec<FailedOccurrence>,
    ) -> ScheduleError {
        warn!(created = created.len(), failed = failed.len(), "partial commit failure");
        if let Ok(preview) = session.preview_mut() {
            let persisted: BTreeSet<OccurrenceKey> = created.iter().map(|(k, _)| *k).collect();
            preview.occurrences.retain(|o| !persisted.contains(&o.key));
            preview.conflicts.retain(|c| !persisted.contains(&c.occurrence_key));
            preview.selected.retain(|k| !persisted.contains(k));
        }
        ScheduleError::PartialCommitFailure { created, failed }
    }
}
