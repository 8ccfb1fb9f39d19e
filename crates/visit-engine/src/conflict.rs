//! Conflict detection for candidate occurrences.
//!
//! Checks a candidate against existing commitments (staff and client
//! double-booking, half-open overlap) and against its authorization (date
//! window, remaining units, ownership). Detection is a pure read: it is safe
//! to call repeatedly to re-validate after an edit.
//!
//! At most one descriptor is produced per `(occurrence, kind)`; several
//! findings of the same kind are folded into one message.

use serde::{Deserialize, Serialize};

use crate::directory::{AuthorizationLookup, Commitment, CommitmentLookup};
use crate::model::{hhmm, CandidateOccurrence, OccurrenceKey, TimeRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    StaffDoubleBooked,
    ClientDoubleBooked,
    OutsideAuthorizationWindow,
    Other,
}

/// A scheduling problem attached to exactly one occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDescriptor {
    pub occurrence_key: OccurrenceKey,
    pub kind: ConflictKind,
    pub message: String,
    /// Starts `false`; set only by explicit operator acknowledgement.
    pub resolved: bool,
}

impl ConflictDescriptor {
    pub fn new(occurrence_key: OccurrenceKey, kind: ConflictKind, message: impl Into<String>) -> Self {
        Self {
            occurrence_key,
            kind,
            message: message.into(),
            resolved: false,
        }
    }
}

/// Checks candidates against the directory lookups.
pub struct ConflictDetector<'a> {
    commitments: &'a (dyn CommitmentLookup + 'a),
    authorizations: &'a (dyn AuthorizationLookup + 'a),
    cumulative_units: bool,
}

impl<'a> ConflictDetector<'a> {
    pub fn new(
        commitments: &'a (dyn CommitmentLookup + 'a),
        authorizations: &'a (dyn AuthorizationLookup + 'a),
    ) -> Self {
        Self {
            commitments,
            authorizations,
            cumulative_units: true,
        }
    }

    /// Whether units planned earlier in the same preview reduce the remaining
    /// authorized units. When off, only persisted usage counts.
    pub fn with_cumulative_units(mut self, cumulative: bool) -> Self {
        self.cumulative_units = cumulative;
        self
    }

    /// Return every conflict that applies to `candidate`, in kind order.
    ///
    /// `units_planned_before` is the sum of units of occurrences that precede
    /// `candidate` in the same preview and draw on the same authorization.
    pub fn check(&self, candidate: &CandidateOccurrence, units_planned_before: u32) -> Vec<ConflictDescriptor> {
        let mut conflicts = Vec::new();
        conflicts.extend(self.check_staff(candidate));
        conflicts.extend(self.check_client(candidate));
        conflicts.extend(self.check_authorization(candidate, units_planned_before));
        conflicts
    }

    fn check_staff(&self, candidate: &CandidateOccurrence) -> Option<ConflictDescriptor> {
        let staff = candidate.staff_id.as_ref()?;
        let range = candidate.time_range();
        let clashes: Vec<String> = self
            .commitments
            .for_staff(staff, candidate.date)
            .iter()
            .filter(|c| c.time_range().overlaps(&range))
            .map(|c| describe_commitment(c, &range))
            .collect();
        if clashes.is_empty() {
            return None;
        }
        Some(ConflictDescriptor::new(
            candidate.key,
            ConflictKind::StaffDoubleBooked,
            format!("staff {staff} already booked: {}", clashes.join(", ")),
        ))
    }

    fn check_client(&self, candidate: &CandidateOccurrence) -> Option<ConflictDescriptor> {
        let range = candidate.time_range();
        let clashes: Vec<String> = self
            .commitments
            .for_client(&candidate.client_id, candidate.date)
            .iter()
            .filter(|c| c.time_range().overlaps(&range))
            .map(|c| describe_commitment(c, &range))
            .collect();
        if clashes.is_empty() {
            return None;
        }
        Some(ConflictDescriptor::new(
            candidate.key,
            ConflictKind::ClientDoubleBooked,
            format!("client {} already has a visit: {}", candidate.client_id, clashes.join(", ")),
        ))
    }

    fn check_authorization(&self, candidate: &CandidateOccurrence, units_planned_before: u32) -> Vec<ConflictDescriptor> {
        let Some(auth) = self.authorizations.authorization(&candidate.authorization_id) else {
            return vec![ConflictDescriptor::new(
                candidate.key,
                ConflictKind::Other,
                format!("authorization {} not found", candidate.authorization_id),
            )];
        };

        let mut other = Vec::new();
        if auth.client_id != candidate.client_id {
            other.push(format!(
                "authorization {} belongs to client {}, not {}",
                auth.id, auth.client_id, candidate.client_id
            ));
        }
        if auth.service_code != candidate.service_code {
            other.push(format!(
                "authorization {} covers service {}, not {}",
                auth.id, auth.service_code, candidate.service_code
            ));
        }

        let mut outside = Vec::new();
        if !auth.covers(candidate.date) {
            outside.push(format!(
                "{} is outside authorization {} ({} to {})",
                candidate.date, auth.id, auth.start_date, auth.end_date
            ));
        }
        let planned = if self.cumulative_units { units_planned_before } else { 0 };
        let remaining = auth.remaining_units().saturating_sub(planned);
        if candidate.units > remaining {
            outside.push(format!(
                "{} units requested but only {} remain on authorization {}",
                candidate.units, remaining, auth.id
            ));
        }

        let mut conflicts = Vec::new();
        if !outside.is_empty() {
            conflicts.push(ConflictDescriptor::new(
                candidate.key,
                ConflictKind::OutsideAuthorizationWindow,
                outside.join("; "),
            ));
        }
        if !other.is_empty() {
            conflicts.push(ConflictDescriptor::new(candidate.key, ConflictKind::Other, other.join("; ")));
        }
        conflicts
    }
}

fn describe_commitment(c: &Commitment, candidate: &TimeRange) -> String {
    format!(
        "visit {} {}-{} ({} min overlap)",
        c.visit_id,
        hhmm::format(&c.start_time),
        hhmm::format(&c.end_time),
        c.time_range().overlap_minutes(candidate)
    )
}
