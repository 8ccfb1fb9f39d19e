//! Recurrence expansion -- turns an anchor date plus a [`RecurrenceRule`] into
//! the ordered list of candidate visit dates.
//!
//! Pure and eager: recurrence windows are bounded, so the full list is
//! materialized up front and checked against a hard safety cap. Output dates
//! are strictly ascending and unique, and the anchor date is always first.

use chrono::{Datelike, Days, Months, NaiveDate};
use tracing::debug;

use crate::error::{Result, ScheduleError};
use crate::model::AnchorOccurrence;
use crate::rule::{EndCondition, Frequency, RecurrenceRule};

/// Default safety cap on generated dates (one year of daily visits).
pub const DEFAULT_MAX_OCCURRENCES: usize = 366;

/// Expand an anchor occurrence with the default safety cap.
///
/// See [`expand_dates`] for the semantics.
pub fn expand(anchor: &AnchorOccurrence, rule: Option<&RecurrenceRule>) -> Result<Vec<NaiveDate>> {
    expand_dates(anchor.date, rule, DEFAULT_MAX_OCCURRENCES)
}

/// Expand `anchor` by `rule` into concrete dates.
///
/// - No rule: the single anchor date.
/// - [`Frequency::Week`]: from the anchor's week (weeks start on Sunday), step
///   `interval` weeks at a time, emitting every configured weekday in ascending
///   order. Weekdays earlier than the anchor in its own week are skipped; the
///   anchor itself is emitted even when its weekday is not configured.
/// - [`Frequency::Month`]: step `interval` months from the anchor, keeping the
///   day of month and clamping to the month's last day when it is shorter
///   (Jan 31 → Feb 29 in a leap year).
///
/// # Errors
/// Returns [`ScheduleError::InvalidRule`] if the rule fails validation, and
/// [`ScheduleError::RecurrenceTooLarge`] if more than `max_occurrences` dates
/// would be generated. The result is never silently truncated.
pub fn expand_dates(
    anchor: NaiveDate,
    rule: Option<&RecurrenceRule>,
    max_occurrences: usize,
) -> Result<Vec<NaiveDate>> {
    let Some(rule) = rule else {
        return Ok(vec![anchor]);
    };
    rule.validate(anchor)?;

    if let EndCondition::EndAfterOccurrences(count) = rule.end_condition {
        if count as usize > max_occurrences {
            return Err(ScheduleError::RecurrenceTooLarge { cap: max_occurrences });
        }
    }

    let mut out = Emitter {
        dates: vec![anchor],
        rule,
        cap: max_occurrences,
    };

    if !out.is_complete() {
        match rule.frequency {
            Frequency::Week => expand_weekly(anchor, rule, &mut out)?,
            Frequency::Month => expand_monthly(anchor, rule, &mut out)?,
        }
    }

    debug!(
        anchor = %anchor,
        frequency = ?rule.frequency,
        interval = rule.interval,
        generated = out.dates.len(),
        "expanded recurrence"
    );
    Ok(out.dates)
}

/// Accumulates dates and enforces termination and the safety cap.
struct Emitter<'a> {
    dates: Vec<NaiveDate>,
    rule: &'a RecurrenceRule,
    cap: usize,
}

enum Step {
    Continue,
    Done,
}

impl Emitter<'_> {
    fn is_complete(&self) -> bool {
        match self.rule.end_condition {
            EndCondition::EndAfterOccurrences(count) => self.dates.len() >= count as usize,
            EndCondition::EndOnDate(_) => false,
        }
    }

    fn offer(&mut self, date: NaiveDate) -> Result<Step> {
        if let EndCondition::EndOnDate(end) = self.rule.end_condition {
            if date > end {
                return Ok(Step::Done);
            }
        }
        if self.rule.exclude_dates.contains(&date) {
            return Ok(Step::Continue);
        }
        if self.dates.len() >= self.cap {
            return Err(ScheduleError::RecurrenceTooLarge { cap: self.cap });
        }
        self.dates.push(date);
        if self.is_complete() {
            Ok(Step::Done)
        } else {
            Ok(Step::Continue)
        }
    }

    /// The calendar ran out before the rule terminated. Every later date is
    /// past an end date, so only an unreached count is an error.
    fn exhausted(&self, last: NaiveDate) -> Result<()> {
        match self.rule.end_condition {
            EndCondition::EndOnDate(_) => Ok(()),
            EndCondition::EndAfterOccurrences(_) => Err(ScheduleError::InvalidRule(format!(
                "recurrence runs past the supported calendar range after {last}"
            ))),
        }
    }
}

fn expand_weekly(anchor: NaiveDate, rule: &RecurrenceRule, out: &mut Emitter<'_>) -> Result<()> {
    let week_start = anchor - Days::new(anchor.weekday().num_days_from_sunday() as u64);
    let stride = 7 * rule.interval as u64;

    for period in 0u64.. {
        let Some(base) = period
            .checked_mul(stride)
            .and_then(|days| week_start.checked_add_days(Days::new(days)))
        else {
            return out.exhausted(anchor);
        };

        for weekday in rule.weekdays() {
            let Some(date) = base.checked_add_days(Days::new(weekday.num_days_from_sunday() as u64)) else {
                return out.exhausted(anchor);
            };
            if date <= anchor {
                continue;
            }
            if let Step::Done = out.offer(date)? {
                return Ok(());
            }
        }
    }
    Ok(())
}

fn expand_monthly(anchor: NaiveDate, rule: &RecurrenceRule, out: &mut Emitter<'_>) -> Result<()> {
    for step in 1u32.. {
        // Always offset from the anchor so a clamp (31 → 29) never drifts later months.
        let Some(date) = step
            .checked_mul(rule.interval)
            .and_then(|months| anchor.checked_add_months(Months::new(months)))
        else {
            return out.exhausted(anchor);
        };
        if let Step::Done = out.offer(date)? {
            return Ok(());
        }
    }
    Ok(())
}
