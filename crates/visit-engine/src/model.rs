//! Core value types: identities, the anchor occurrence, candidate occurrences
//! and their stable keys.
//!
//! All times are facility-local wall-clock values (`NaiveDate` + `NaiveTime`).
//! Nothing here is shifted through a timezone; consumers compare on wall-clock
//! time, so the `HH:MM` the operator typed is the `HH:MM` that gets persisted.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, ScheduleError};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Client (care recipient) identity from the client directory.
    ClientId
);
string_id!(
    /// Staff (caregiver) identity from the staff directory.
    StaffId
);
string_id!(
    /// Reference to a service authorization.
    AuthorizationId
);

/// Serde adapter for wall-clock times as `HH:MM` (also accepts `HH:MM:SS`).
pub mod hhmm {
    use super::*;

    pub fn format(t: &NaiveTime) -> String {
        t.format("%H:%M").to_string()
    }

    pub fn parse(s: &str) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(s, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
            .ok()
    }

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&format(t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid wall-clock time '{raw}', expected HH:MM")))
    }
}

/// Half-open wall-clock interval `[start, end)` within one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Two ranges overlap iff `a.start < b.end && b.start < a.end`.
    /// Adjacent ranges (one ends exactly when the other starts) do not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn overlap_minutes(&self, other: &TimeRange) -> i64 {
        if !self.overlaps(other) {
            return 0;
        }
        (self.end.min(other.end) - self.start.max(other.start)).num_minutes()
    }
}

/// Stable synthetic identity of an occurrence before it is persisted.
///
/// Assigned once at expansion time from `(date, start)` and never recomputed
/// from display strings. Renders as `YYYY-MM-DDTHH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OccurrenceKey {
    pub date: NaiveDate,
    pub start: NaiveTime,
}

impl OccurrenceKey {
    pub fn new(date: NaiveDate, start: NaiveTime) -> Self {
        // Seconds never participate in identity.
        let start = start.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(start);
        Self { date, start }
    }
}

impl fmt::Display for OccurrenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}T{}", self.date.format("%Y-%m-%d"), hhmm::format(&self.start))
    }
}

impl FromStr for OccurrenceKey {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ScheduleError::InvalidKey(s.to_string());
        let (date, time) = s.split_once('T').ok_or_else(invalid)?;
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| invalid())?;
        let time = hhmm::parse(time).ok_or_else(invalid)?;
        Ok(OccurrenceKey::new(date, time))
    }
}

impl Serialize for OccurrenceKey {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OccurrenceKey {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid occurrence key '{raw}', expected YYYY-MM-DDTHH:MM")))
    }
}

/// The first, explicitly specified visit from which a recurrence is expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorOccurrence {
    pub client_id: ClientId,
    /// May be left unassigned and filled in later via reassignment.
    #[serde(default)]
    pub staff_id: Option<StaffId>,
    pub authorization_id: AuthorizationId,
    pub service_code: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub units: u32,
    #[serde(default)]
    pub comment: String,
}

impl AnchorOccurrence {
    /// Start must strictly precede end within the same calendar day.
    pub fn validate(&self) -> Result<()> {
        if self.start_time >= self.end_time {
            return Err(ScheduleError::InvalidAnchor(format!(
                "start {} must be before end {}",
                hhmm::format(&self.start_time),
                hhmm::format(&self.end_time)
            )));
        }
        // Keys drop seconds, so visit times must be whole minutes.
        for (label, time) in [("start", self.start_time), ("end", self.end_time)] {
            if time.second() != 0 || time.nanosecond() != 0 {
                return Err(ScheduleError::InvalidAnchor(format!(
                    "{label} time {time} must be a whole minute"
                )));
            }
        }
        Ok(())
    }

    /// Derive the candidate for `date`, inheriting every other anchor field.
    pub fn occurrence_on(&self, date: NaiveDate) -> CandidateOccurrence {
        CandidateOccurrence {
            key: OccurrenceKey::new(date, self.start_time),
            client_id: self.client_id.clone(),
            staff_id: self.staff_id.clone(),
            authorization_id: self.authorization_id.clone(),
            service_code: self.service_code.clone(),
            date,
            start_time: self.start_time,
            end_time: self.end_time,
            units: self.units,
            comment: self.comment.clone(),
        }
    }
}

/// One concrete date/time instance of a recurring visit, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateOccurrence {
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
}

impl CandidateOccurrence {
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }
}
