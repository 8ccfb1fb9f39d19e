//! Tests for commit validation, atomic persistence, deadlines and cancellation.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use visit_engine::{
    AnchorOccurrence, AuthorizationId, AuthorizationWindow, CancellationToken, ClientId, Commitment,
    CommitCoordinator, CommitRequest, ConflictKind, EndCondition, EngineConfig, FailedOccurrence,
    InMemoryDirectory, OccurrenceKey, PreviewBuilder, PreviewSession, RecurrenceRule, ScheduleError,
    SessionStatus, SinkError, StaffId, VisitDraft, VisitSink,
};

// ── Helpers ─────────────────────────────────────────────────────────────────

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn key(day: u32) -> OccurrenceKey {
    OccurrenceKey::new(d(2024, 6, day), t(9, 0))
}

fn anchor() -> AnchorOccurrence {
    AnchorOccurrence {
        client_id: ClientId::new("C"),
        staff_id: Some(StaffId::new("S")),
        authorization_id: AuthorizationId::new("AUTH-1"),
        service_code: "PCA".to_string(),
        date: d(2024, 6, 3),
        start_time: t(9, 0),
        end_time: t(11, 0),
        units: 8,
        comment: String::new(),
    }
}

fn directory() -> InMemoryDirectory {
    InMemoryDirectory::new(
        vec![Commitment {
            visit_id: "V-EXISTING".to_string(),
            client_id: ClientId::new("OTHER"),
            staff_id: Some(StaffId::new("S")),
            date: d(2024, 6, 5),
            start_time: t(10, 0),
            end_time: t(12, 0),
        }],
        vec![AuthorizationWindow {
            id: AuthorizationId::new("AUTH-1"),
            client_id: ClientId::new("C"),
            service_code: "PCA".to_string(),
            start_date: d(2024, 1, 1),
            end_date: d(2024, 12, 31),
            authorized_units: 1000,
            used_units: 0,
        }],
    )
}

/// Session over Mon/Wed x4 from 2024-06-03; 06-05 carries a staff conflict.
fn session(dir: &InMemoryDirectory) -> PreviewSession {
    let builder = PreviewBuilder::new(dir, dir, EngineConfig::default());
    let rule = RecurrenceRule::weekly(1, [1, 3], EndCondition::EndAfterOccurrences(4));
    PreviewSession::new(builder.build(&anchor(), Some(&rule)).unwrap())
}

/// Remove the conflicted 06-05 occurrence so the session is committable.
fn committable_session(dir: &InMemoryDirectory) -> PreviewSession {
    let builder = PreviewBuilder::new(dir, dir, EngineConfig::default());
    let mut session = session(dir);
    session.editor(builder.detector()).unwrap().remove(&[key(5)]).unwrap();
    session
}

/// Records every batch and assigns sequential identifiers.
#[derive(Default)]
struct RecordingSink {
    batches: Mutex<Vec<Vec<VisitDraft>>>,
}

#[async_trait]
impl VisitSink for RecordingSink {
    async fn create_batch(&self, drafts: &[VisitDraft]) -> Result<Vec<String>, SinkError> {
        let mut batches = self.batches.lock().unwrap();
        let offset: usize = batches.iter().map(|b| b.len()).sum();
        batches.push(drafts.to_vec());
        Ok((0..drafts.len()).map(|i| format!("visit-{}", offset + i + 1)).collect())
    }
}

/// Never finishes within any reasonable deadline.
struct StalledSink;

#[async_trait]
impl VisitSink for StalledSink {
    async fn create_batch(&self, _drafts: &[VisitDraft]) -> Result<Vec<String>, SinkError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

/// Persists everything except drafts on `fail_on`.
struct FlakySink {
    fail_on: NaiveDate,
}

#[async_trait]
impl VisitSink for FlakySink {
    async fn create_batch(&self, drafts: &[VisitDraft]) -> Result<Vec<String>, SinkError> {
        let (bad, good): (Vec<&VisitDraft>, Vec<&VisitDraft>) = drafts.iter().partition(|d| d.date == self.fail_on);
        if bad.is_empty() {
            return Ok(drafts.iter().map(|d| format!("visit-{}", d.key)).collect());
        }
        Err(SinkError::Partial {
            created: good.iter().map(|d| (d.key, format!("visit-{}", d.key))).collect(),
            failed: bad
                .iter()
                .map(|d| FailedOccurrence {
                    key: d.key,
                    reason: "constraint violation".to_string(),
                })
                .collect(),
        })
    }
}

/// Hands back one identifier more than it was given drafts.
struct SurplusSink;

#[async_trait]
impl VisitSink for SurplusSink {
    async fn create_batch(&self, drafts: &[VisitDraft]) -> Result<Vec<String>, SinkError> {
        Ok((0..=drafts.len()).map(|i| format!("visit-{i}")).collect())
    }
}

struct DownSink;

#[async_trait]
impl VisitSink for DownSink {
    async fn create_batch(&self, _drafts: &[VisitDraft]) -> Result<Vec<String>, SinkError> {
        Err(SinkError::Unavailable("connection refused".to_string()))
    }
}

// ── Validation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn unresolved_conflicts_block_commit() {
    let dir = directory();
    let mut session = session(&dir);
    let coordinator = CommitCoordinator::new(RecordingSink::default(), &EngineConfig::default());

    let err = coordinator
        .commit(&mut session, &CommitRequest::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ScheduleError::UnresolvedConflicts(ref keys) if keys == &vec![key(5)]));
    assert!(coordinator.sink().batches.lock().unwrap().is_empty(), "nothing sent on validation failure");
    assert!(session.is_open());
}

#[tokio::test]
async fn subset_commit_blocked_while_selection_has_unresolved_conflict() {
    let dir = directory();
    let mut session = session(&dir);
    assert!(!session.preview().unwrap().can_commit());
    let coordinator = CommitCoordinator::new(RecordingSink::default(), &EngineConfig::default());
    let request = CommitRequest {
        keys: Some(vec![key(3)]),
        timeout_ms: None,
    };

    let err = coordinator
        .commit(&mut session, &request, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ScheduleError::UnresolvedConflicts(ref keys) if keys == &vec![key(5)]));
    assert!(coordinator.sink().batches.lock().unwrap().is_empty());
    assert!(session.is_open());
}

#[tokio::test]
async fn empty_selection_rejected() {
    let dir = directory();
    let builder = PreviewBuilder::new(&dir, &dir, EngineConfig::default());
    let mut session = session(&dir);
    session.editor(builder.detector()).unwrap().deselect_all();
    let coordinator = CommitCoordinator::new(RecordingSink::default(), &EngineConfig::default());

    let err = coordinator
        .commit(&mut session, &CommitRequest::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ScheduleError::EmptySelection));
}

#[tokio::test]
async fn requested_keys_must_be_selected() {
    let dir = directory();
    let builder = PreviewBuilder::new(&dir, &dir, EngineConfig::default());
    let mut session = committable_session(&dir);
    session.editor(builder.detector()).unwrap().deselect(&[key(12)]).unwrap();
    let coordinator = CommitCoordinator::new(RecordingSink::default(), &EngineConfig::default());

    let request = CommitRequest {
        keys: Some(vec![key(3), key(12)]),
        timeout_ms: None,
    };
    let err = coordinator
        .commit(&mut session, &request, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ScheduleError::SelectionMismatch(ref keys) if keys == &vec![key(12)]));

    let request = CommitRequest {
        keys: Some(vec![key(5)]),
        timeout_ms: None,
    };
    let err = coordinator
        .commit(&mut session, &request, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ScheduleError::UnknownOccurrence(_)));
}

#[tokio::test]
async fn acknowledged_conflict_allows_commit() {
    let dir = directory();
    let builder = PreviewBuilder::new(&dir, &dir, EngineConfig::default());
    let mut session = session(&dir);
    session
        .editor(builder.detector())
        .unwrap()
        .acknowledge(&[key(5)], ConflictKind::StaffDoubleBooked)
        .unwrap();
    let coordinator = CommitCoordinator::new(RecordingSink::default(), &EngineConfig::default());

    let receipt = coordinator
        .commit(&mut session, &CommitRequest::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(receipt.visits.len(), 4);
}

// ── Persistence ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn commit_persists_selected_as_one_batch() {
    let dir = directory();
    let mut session = committable_session(&dir);
    let coordinator = CommitCoordinator::new(RecordingSink::default(), &EngineConfig::default());

    let receipt = coordinator
        .commit(&mut session, &CommitRequest::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(receipt.visit_ids(), vec!["visit-1", "visit-2", "visit-3"]);
    assert_eq!(receipt.visit_id(&key(10)), Some("visit-2"));
    let batches = coordinator.sink().batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    let dates: Vec<NaiveDate> = batches[0].iter().map(|d| d.date).collect();
    assert_eq!(dates, vec![d(2024, 6, 3), d(2024, 6, 10), d(2024, 6, 12)]);
}

#[tokio::test]
async fn commit_echoes_wall_clock_times() {
    let dir = directory();
    let mut session = committable_session(&dir);
    let config = EngineConfig {
        facility_timezone: "America/Chicago".to_string(),
        ..EngineConfig::default()
    };
    let coordinator = CommitCoordinator::new(RecordingSink::default(), &config);

    let receipt = coordinator
        .commit(&mut session, &CommitRequest::default(), &CancellationToken::new())
        .await
        .unwrap();

    for visit in &receipt.visits {
        assert_eq!((visit.start_time, visit.end_time), (t(9, 0), t(11, 0)));
    }
    let json = serde_json::to_value(&receipt).unwrap();
    assert_eq!(json["visits"][0]["startTime"], "09:00");
    assert_eq!(json["visits"][0]["endTime"], "11:00");
    let batches = coordinator.sink().batches.lock().unwrap();
    assert!(batches[0].iter().all(|d| d.start_time == t(9, 0) && d.end_time == t(11, 0)));
}

#[tokio::test]
async fn committed_session_is_closed() {
    let dir = directory();
    let mut session = committable_session(&dir);
    let coordinator = CommitCoordinator::new(RecordingSink::default(), &EngineConfig::default());
    let cancel = CancellationToken::new();

    coordinator
        .commit(&mut session, &CommitRequest::default(), &cancel)
        .await
        .unwrap();

    assert_eq!(session.status(), SessionStatus::Committed);
    let err = coordinator
        .commit(&mut session, &CommitRequest::default(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ScheduleError::SessionClosed(_)));
}

#[tokio::test]
async fn subset_commit_sends_only_requested_keys() {
    let dir = directory();
    let mut session = committable_session(&dir);
    let coordinator = CommitCoordinator::new(RecordingSink::default(), &EngineConfig::default());
    let request = CommitRequest {
        keys: Some(vec![key(10)]),
        timeout_ms: None,
    };

    let receipt = coordinator
        .commit(&mut session, &request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(receipt.visits.len(), 1);
    assert_eq!(receipt.visits[0].key, key(10));
}

// ── Failures ────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn stalled_sink_times_out_and_session_stays_open() {
    let dir = directory();
    let mut session = committable_session(&dir);
    let coordinator =
        CommitCoordinator::new(StalledSink, &EngineConfig::default()).with_timeout(Duration::from_millis(250));

    let err = coordinator
        .commit(&mut session, &CommitRequest::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ScheduleError::CommitTimeout { timeout_ms: 250 }));
    assert!(err.is_retryable());
    assert!(session.is_open());
    assert_eq!(session.preview().unwrap().occurrences().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn per_request_timeout_overrides_default() {
    let dir = directory();
    let mut session = committable_session(&dir);
    let coordinator = CommitCoordinator::new(StalledSink, &EngineConfig::default());
    let request = CommitRequest {
        keys: None,
        timeout_ms: Some(10),
    };

    let err = coordinator
        .commit(&mut session, &request, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ScheduleError::CommitTimeout { timeout_ms: 10 }));
}

#[tokio::test(start_paused = true)]
async fn cancellation_aborts_slow_commit() {
    let dir = directory();
    let mut session = committable_session(&dir);
    let coordinator = CommitCoordinator::new(StalledSink, &EngineConfig::default());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = coordinator
        .commit(&mut session, &CommitRequest::default(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ScheduleError::CommitCancelled));
    assert!(session.is_open());
}

#[tokio::test]
async fn partial_failure_reports_per_occurrence_and_keeps_failed_subset() {
    let dir = directory();
    let mut session = committable_session(&dir);
    let coordinator = CommitCoordinator::new(
        FlakySink {
            fail_on: d(2024, 6, 10),
        },
        &EngineConfig::default(),
    );
    let cancel = CancellationToken::new();

    let err = coordinator
        .commit(&mut session, &CommitRequest::default(), &cancel)
        .await
        .unwrap_err();

    match &err {
        ScheduleError::PartialCommitFailure { created, failed } => {
            let created: Vec<OccurrenceKey> = created.iter().map(|(k, _)| *k).collect();
            assert_eq!(created, vec![key(3), key(12)]);
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].key, key(10));
            assert_eq!(failed[0].reason, "constraint violation");
        }
        other => panic!("expected partial failure, got {other:?}"),
    }
    assert!(err.to_string().contains("constraint violation"));

    // Only the failed occurrence remains for a retry.
    let preview = session.preview().unwrap();
    let remaining: Vec<OccurrenceKey> = preview.occurrences().iter().map(|o| o.key).collect();
    assert_eq!(remaining, vec![key(10)]);
    assert!(preview.is_selected(&key(10)));
}

#[tokio::test]
async fn surplus_identifiers_are_a_sink_error() {
    let dir = directory();
    let mut session = committable_session(&dir);
    let coordinator = CommitCoordinator::new(SurplusSink, &EngineConfig::default());

    let err = coordinator
        .commit(&mut session, &CommitRequest::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ScheduleError::SinkUnavailable(ref reason) if reason.contains("4 identifiers for 3")));
    assert!(session.is_open());
}

#[tokio::test]
async fn unavailable_sink_leaves_session_untouched() {
    let dir = directory();
    let mut session = committable_session(&dir);
    let coordinator = CommitCoordinator::new(DownSink, &EngineConfig::default());

    let err = coordinator
        .commit(&mut session, &CommitRequest::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ScheduleError::SinkUnavailable(_)));
    assert_eq!(session.preview().unwrap().occurrences().len(), 3);
}
