//! Read-only directory lookups consumed by conflict detection.
//!
//! The engine never owns client, staff or authorization records. It reads
//! them through these traits; the calling layer backs them with whatever
//! store it has. [`InMemoryDirectory`] is a serde-loadable snapshot used by
//! the CLI, the WASM bindings and tests.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::model::{hhmm, AuthorizationId, ClientId, StaffId, TimeRange};

/// An existing, already persisted visit that a candidate may collide with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commitment {
    /// Identifier of the persisted visit, echoed in conflict messages.
    pub visit_id: String,
    pub client_id: ClientId,
    #[serde(default)]
    pub staff_id: Option<StaffId>,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
}

impl Commitment {
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }
}

/// A service authorization: the date window and unit budget a client may be
/// served under for one service code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationWindow {
    pub id: AuthorizationId,
    pub client_id: ClientId,
    pub service_code: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub authorized_units: u32,
    /// Units already consumed by persisted visits.
    #[serde(default)]
    pub used_units: u32,
}

impl AuthorizationWindow {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    /// Units left once persisted usage is accounted for.
    pub fn remaining_units(&self) -> u32 {
        self.authorized_units.saturating_sub(self.used_units)
    }
}

/// "Existing commitments for staff/client on date X".
pub trait CommitmentLookup {
    fn for_staff(&self, staff: &StaffId, date: NaiveDate) -> Vec<Commitment>;
    fn for_client(&self, client: &ClientId, date: NaiveDate) -> Vec<Commitment>;
}

/// Authorization window and remaining-units lookup.
pub trait AuthorizationLookup {
    fn authorization(&self, id: &AuthorizationId) -> Option<AuthorizationWindow>;
}

/// Snapshot of commitments and authorizations held in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InMemoryDirectory {
    #[serde(default)]
    pub commitments: Vec<Commitment>,
    #[serde(default)]
    pub authorizations: Vec<AuthorizationWindow>,
}

impl InMemoryDirectory {
    pub fn new(commitments: Vec<Commitment>, authorizations: Vec<AuthorizationWindow>) -> Self {
        Self {
            commitments,
            authorizations,
        }
    }

    /// Parse a snapshot from JSON (`{"commitments": [...], "authorizations": [...]}`).
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn add_commitment(&mut self, commitment: Commitment) {
        self.commitments.push(commitment);
    }

    pub fn add_authorization(&mut self, authorization: AuthorizationWindow) {
        self.authorizations.push(authorization);
    }
}

impl CommitmentLookup for InMemoryDirectory {
    fn for_staff(&self, staff: &StaffId, date: NaiveDate) -> Vec<Commitment> {
        self.commitments
            .iter()
            .filter(|c| c.date == date && c.staff_id.as_ref() == Some(staff))
            .cloned()
            .collect()
    }

    fn for_client(&self, client: &ClientId, date: NaiveDate) -> Vec<Commitment> {
        self.commitments
            .iter()
            .filter(|c| c.date == date && &c.client_id == client)
            .cloned()
            .collect()
    }
}

impl AuthorizationLookup for InMemoryDirectory {
    fn authorization(&self, id: &AuthorizationId) -> Option<AuthorizationWindow> {
        // Last entry wins for duplicate ids.
        self.authorizations.iter().rev().find(|a| &a.id == id).cloned()
    }
}
