//! Schedule previews -- the editable, unpersisted draft set of occurrences with
//! their conflicts and the operator's selection.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::EngineConfig;
use crate::conflict::{ConflictDescriptor, ConflictDetector};
use crate::directory::{AuthorizationLookup, CommitmentLookup};
use crate::error::Result;
use crate::expander::expand_dates;
use crate::model::{AnchorOccurrence, CandidateOccurrence, OccurrenceKey};
use crate::rule::RecurrenceRule;

/// Draft occurrences, their conflicts and the selected subset.
///
/// Invariants, re-established after every edit:
/// - occurrences are in ascending key order with unique keys;
/// - every conflict and every selected key refers to an existing occurrence;
/// - conflicts are ordered by occurrence, then kind.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulePreview {
    pub(crate) occurrences: Vec<CandidateOccurrence>,
    pub(crate) conflicts: Vec<ConflictDescriptor>,
    pub(crate) selected: BTreeSet<OccurrenceKey>,
    pub(crate) facility_timezone: String,
}

impl SchedulePreview {
    pub fn occurrences(&self) -> &[CandidateOccurrence] {
        &self.occurrences
    }

    pub fn occurrence(&self, key: &OccurrenceKey) -> Option<&CandidateOccurrence> {
        self.position(key).map(|i| &self.occurrences[i])
    }

    pub fn contains(&self, key: &OccurrenceKey) -> bool {
        self.position(key).is_some()
    }

    pub fn conflicts(&self) -> &[ConflictDescriptor] {
        &self.conflicts
    }

    pub fn conflicts_for<'s>(&'s self, key: &'s OccurrenceKey) -> impl Iterator<Item = &'s ConflictDescriptor> + 's {
        self.conflicts.iter().filter(move |c| &c.occurrence_key == key)
    }

    pub fn selected(&self) -> &BTreeSet<OccurrenceKey> {
        &self.selected
    }

    pub fn is_selected(&self, key: &OccurrenceKey) -> bool {
        self.selected.contains(key)
    }

    pub fn facility_timezone(&self) -> &str {
        &self.facility_timezone
    }

    /// Selected occurrences carrying at least one unresolved conflict, in order.
    pub fn unresolved_selected(&self) -> Vec<OccurrenceKey> {
        let blocked: BTreeSet<OccurrenceKey> = self
            .conflicts
            .iter()
            .filter(|c| !c.resolved && self.selected.contains(&c.occurrence_key))
            .map(|c| c.occurrence_key)
            .collect();
        blocked.into_iter().collect()
    }

    /// True iff something is selected and no selected occurrence has an
    /// unresolved conflict.
    pub fn can_commit(&self) -> bool {
        !self.selected.is_empty() && self.unresolved_selected().is_empty()
    }

    pub fn response(&self) -> PreviewResponse {
        PreviewResponse {
            occurrences: self.occurrences.clone(),
            conflicts: self.conflicts.clone(),
            selected: self.selected.iter().copied().collect(),
            can_commit: self.can_commit(),
        }
    }

    pub(crate) fn position(&self, key: &OccurrenceKey) -> Option<usize> {
        self.occurrences.binary_search_by(|o| o.key.cmp(key)).ok()
    }

    /// Units already planned on `index`'s authorization by earlier occurrences.
    pub(crate) fn units_planned_before(&self, index: usize) -> u32 {
        let authorization = &self.occurrences[index].authorization_id;
        self.occurrences[..index]
            .iter()
            .filter(|o| &o.authorization_id == authorization)
            .map(|o| o.units)
            .fold(0u32, u32::saturating_add)
    }

    pub(crate) fn sort_conflicts(&mut self) {
        self.conflicts.sort_by_key(|c| (c.occurrence_key, c.kind));
    }
}

/// Serializable view handed back to the operator's client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub occurrences: Vec<CandidateOccurrence>,
    pub conflicts: Vec<ConflictDescriptor>,
    pub selected: Vec<OccurrenceKey>,
    pub can_commit: bool,
}

/// Build request: the anchor plus an optional recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub anchor: AnchorOccurrence,
    #[serde(default)]
    pub rule: Option<RecurrenceRule>,
}

/// Expands recurrences and checks every candidate for conflicts.
pub struct PreviewBuilder<'a> {
    detector: ConflictDetector<'a>,
    config: EngineConfig,
}

impl<'a> PreviewBuilder<'a> {
    pub fn new(
        commitments: &'a (dyn CommitmentLookup + 'a),
        authorizations: &'a (dyn AuthorizationLookup + 'a),
        config: EngineConfig,
    ) -> Self {
        let detector = ConflictDetector::new(commitments, authorizations)
            .with_cumulative_units(config.cumulative_authorization_units);
        Self { detector, config }
    }

    /// The detector used by this builder, for re-validation during edits.
    pub fn detector(&self) -> &ConflictDetector<'a> {
        &self.detector
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Build a preview with every generated occurrence selected.
    ///
    /// Expands once, then checks each candidate in date order.
    ///
    /// # Errors
    /// [`ScheduleError::InvalidAnchor`](crate::ScheduleError::InvalidAnchor),
    /// [`ScheduleError::InvalidRule`](crate::ScheduleError::InvalidRule) or
    /// [`ScheduleError::RecurrenceTooLarge`](crate::ScheduleError::RecurrenceTooLarge);
    /// all are raised before any conflict lookup happens.
    pub fn build(&self, anchor: &AnchorOccurrence, rule: Option<&RecurrenceRule>) -> Result<SchedulePreview> {
        anchor.validate()?;
        let dates = expand_dates(anchor.date, rule, self.config.max_occurrences)?;

        let occurrences: Vec<CandidateOccurrence> =
            dates.into_iter().map(|date| anchor.occurrence_on(date)).collect();
        let selected = occurrences.iter().map(|o| o.key).collect();

        let mut preview = SchedulePreview {
            occurrences,
            conflicts: Vec::new(),
            selected,
            facility_timezone: self.config.facility_timezone.clone(),
        };

        let mut conflicts = Vec::new();
        for (index, occurrence) in preview.occurrences.iter().enumerate() {
            conflicts.extend(self.detector.check(occurrence, preview.units_planned_before(index)));
        }
        preview.conflicts = conflicts;
        preview.sort_conflicts();

        info!(
            client = %anchor.client_id,
            occurrences = preview.occurrences.len(),
            conflicts = preview.conflicts.len(),
            "built schedule preview"
        );
        Ok(preview)
    }

    pub fn build_request(&self, request: &BuildRequest) -> Result<SchedulePreview> {
        self.build(&request.anchor, request.rule.as_ref())
    }
}
