//! # visit-engine
//!
//! Recurring-visit scheduling for home-care operations.
//!
//! Expands an anchor visit and a recurrence rule into concrete occurrences,
//! checks each against existing commitments and its service authorization,
//! lets an operator edit the resulting preview, and commits the selected
//! occurrences as one atomic batch.
//!
//! ## Modules
//!
//! - [`model`]: identities, anchor and candidate occurrences, occurrence keys
//! - [`rule`]: recurrence rules and their validation
//! - [`expander`]: anchor + rule → ordered list of dates
//! - [`directory`]: read-only commitment and authorization lookups
//! - [`conflict`]: double-booking and authorization conflict detection
//! - [`preview`]: `SchedulePreview` and `PreviewBuilder`
//! - [`editor`]: select / deselect / remove / reassign / acknowledge edits
//! - [`session`]: caller-owned preview lifecycle (open, committed, abandoned)
//! - [`commit`]: validated, deadline-bounded batch commit (feature `commit`)
//! - [`config`]: engine configuration
//! - [`error`]: error types
//!
//! ## Example
//!
//! ```
//! use chrono::{NaiveDate, NaiveTime};
//! use visit_engine::{
//!     AnchorOccurrence, AuthorizationId, ClientId, EndCondition, EngineConfig,
//!     InMemoryDirectory, PreviewBuilder, RecurrenceRule, StaffId,
//! };
//!
//! let directory = InMemoryDirectory::default();
//! let builder = PreviewBuilder::new(&directory, &directory, EngineConfig::default());
//! let anchor = AnchorOccurrence {
//!     client_id: ClientId::new("C"),
//!     staff_id: Some(StaffId::new("S")),
//!     authorization_id: AuthorizationId::new("A"),
//!     service_code: "PCA".to_string(),
//!     date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
//!     start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
//!     end_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
//!     units: 8,
//!     comment: String::new(),
//! };
//! let rule = RecurrenceRule::weekly(1, [1, 3], EndCondition::EndAfterOccurrences(4));
//!
//! let preview = builder.build(&anchor, Some(&rule)).unwrap();
//! assert_eq!(preview.occurrences().len(), 4);
//! // Authorization "A" is not in the directory, so every occurrence is flagged.
//! assert!(!preview.can_commit());
//! ```

#[cfg(feature = "commit")]
pub mod commit;
pub mod config;
pub mod conflict;
pub mod directory;
pub mod editor;
pub mod error;
pub mod expander;
pub mod model;
pub mod preview;
pub mod rule;
pub mod session;

#[cfg(feature = "commit")]
pub use commit::{CommitCoordinator, CommitReceipt, CommitRequest, CommittedVisit, SinkError, VisitDraft, VisitSink};
pub use config::EngineConfig;
pub use conflict::{ConflictDescriptor, ConflictDetector, ConflictKind};
pub use directory::{AuthorizationLookup, AuthorizationWindow, Commitment, CommitmentLookup, InMemoryDirectory};
pub use editor::{EditRequest, PreviewEditor};
pub use error::{FailedOccurrence, ScheduleError};
pub use expander::{expand, expand_dates, DEFAULT_MAX_OCCURRENCES};
pub use model::{AnchorOccurrence, AuthorizationId, CandidateOccurrence, ClientId, OccurrenceKey, StaffId, TimeRange};
pub use preview::{BuildRequest, PreviewBuilder, PreviewResponse, SchedulePreview};
pub use rule::{EndCondition, Frequency, RecurrenceRule};
pub use session::{PreviewSession, SessionStatus};

/// Re-exported so callers can construct cancellation tokens for [`CommitCoordinator::commit`].
#[cfg(feature = "commit")]
pub use tokio_util::sync::CancellationToken;
