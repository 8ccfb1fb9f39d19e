//! Recurrence rule definition and validation.

use std::collections::BTreeSet;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScheduleError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frequency {
    Week,
    Month,
}

/// Exactly one end condition terminates a recurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndCondition {
    /// Inclusive: an occurrence falling exactly on this date is emitted.
    EndOnDate(NaiveDate),
    /// Total occurrences emitted, the anchor included.
    EndAfterOccurrences(u32),
}

/// How an anchor occurrence repeats.
///
/// `days_of_week` uses `0 = Sunday .. 6 = Saturday` and must be non-empty for
/// [`Frequency::Week`] and empty for [`Frequency::Month`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceRule {
    pub interval: u32,
    pub frequency: Frequency,
    #[serde(default)]
    pub days_of_week: BTreeSet<u8>,
    pub end_condition: EndCondition,
    /// Dates dropped from the expansion (e.g., agency holidays). They do not
    /// count toward [`EndCondition::EndAfterOccurrences`].
    #[serde(default)]
    pub exclude_dates: BTreeSet<NaiveDate>,
}

impl RecurrenceRule {
    pub fn weekly(interval: u32, days_of_week: impl IntoIterator<Item = u8>, end: EndCondition) -> Self {
        Self {
            interval,
            frequency: Frequency::Week,
            days_of_week: days_of_week.into_iter().collect(),
            end_condition: end,
            exclude_dates: BTreeSet::new(),
        }
    }

    pub fn monthly(interval: u32, end: EndCondition) -> Self {
        Self {
            interval,
            frequency: Frequency::Month,
            days_of_week: BTreeSet::new(),
            end_condition: end,
            exclude_dates: BTreeSet::new(),
        }
    }

    pub fn excluding(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.exclude_dates.extend(dates);
        self
    }

    /// Check the rule's own invariants against the anchor date it will expand from.
    ///
    /// # Errors
    /// Returns [`ScheduleError::InvalidRule`] describing the first violation found.
    pub fn validate(&self, anchor_date: NaiveDate) -> Result<()> {
        if self.interval == 0 {
            return Err(ScheduleError::InvalidRule("interval must be at least 1".to_string()));
        }

        match self.frequency {
            Frequency::Week => {
                if self.days_of_week.is_empty() {
                    return Err(ScheduleError::InvalidRule(
                        "weekly recurrence requires at least one day of week".to_string(),
                    ));
                }
                if let Some(bad) = self.days_of_week.iter().find(|&&d| d > 6) {
                    return Err(ScheduleError::InvalidRule(format!(
                        "day of week {bad} out of range (0=Sunday..6=Saturday)"
                    )));
                }
            }
            Frequency::Month => {
                if !self.days_of_week.is_empty() {
                    return Err(ScheduleError::InvalidRule(
                        "days of week are only valid for weekly recurrence".to_string(),
                    ));
                }
            }
        }

        match self.end_condition {
            EndCondition::EndAfterOccurrences(0) => {
                return Err(ScheduleError::InvalidRule(
                    "occurrence count must be at least 1".to_string(),
                ));
            }
            EndCondition::EndOnDate(end) if end < anchor_date => {
                return Err(ScheduleError::InvalidRule(format!(
                    "end date {end} is before anchor date {anchor_date}"
                )));
            }
            _ => {}
        }

        if self.exclude_dates.contains(&anchor_date) {
            return Err(ScheduleError::InvalidRule(format!(
                "anchor date {anchor_date} cannot be excluded"
            )));
        }

        Ok(())
    }

    /// The rule's weekdays in ascending `0 = Sunday` order.
    pub fn weekdays(&self) -> impl Iterator<Item = Weekday> + '_ {
        self.days_of_week.iter().filter_map(|&d| weekday_from_index(d))
    }
}

/// `0 = Sunday .. 6 = Saturday`.
pub fn weekday_from_index(index: u8) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}
