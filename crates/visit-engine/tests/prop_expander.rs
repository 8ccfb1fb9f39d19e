//! Property-based tests for recurrence expansion and interval overlap.
//!
//! These check invariants that must hold for any valid rule, not just the
//! worked examples in `expander_tests.rs`.

use chrono::{Datelike, NaiveDate, NaiveTime};
use proptest::prelude::*;
use visit_engine::{expand_dates, EndCondition, RecurrenceRule, ScheduleError, TimeRange};

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Anchor dates in 2023-2026; day up to 31, invalid combos filtered.
fn arb_anchor() -> impl Strategy<Value = NaiveDate> {
    (2023i32..=2026, 1u32..=12, 1u32..=31).prop_filter_map("valid date", |(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
}

fn arb_days() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::btree_set(0u8..=6, 1..=7).prop_map(|s| s.into_iter().collect())
}

fn arb_end(anchor: NaiveDate) -> impl Strategy<Value = EndCondition> {
    prop_oneof![
        (1u32..=60).prop_map(EndCondition::EndAfterOccurrences),
        (0u64..=400).prop_map(move |days| EndCondition::EndOnDate(anchor + chrono::Days::new(days))),
    ]
}

fn arb_rule() -> impl Strategy<Value = (NaiveDate, RecurrenceRule)> {
    arb_anchor().prop_flat_map(|anchor| {
        let weekly = (1u32..=4, arb_days(), arb_end(anchor))
            .prop_map(|(interval, days, end)| RecurrenceRule::weekly(interval, days, end));
        let monthly = (1u32..=6, arb_end(anchor)).prop_map(|(interval, end)| RecurrenceRule::monthly(interval, end));
        (Just(anchor), prop_oneof![weekly, monthly])
    })
}

fn arb_range() -> impl Strategy<Value = TimeRange> {
    (0u32..24 * 60 - 1)
        .prop_flat_map(|start| (Just(start), start + 1..24 * 60))
        .prop_map(|(s, e)| {
            let t = |m: u32| NaiveTime::from_hms_opt(m / 60, m % 60, 0).unwrap_or(NaiveTime::MIN);
            // 24:00 is not representable; end at 23:59 instead.
            TimeRange::new(t(s), t(e.min(24 * 60 - 1)))
        })
}

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Expansion is idempotent and order-stable
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(config())]

    #[test]
    fn expansion_is_idempotent((anchor, rule) in arb_rule()) {
        let first = expand_dates(anchor, Some(&rule), 366);
        let second = expand_dates(anchor, Some(&rule), 366);
        match (first, second) {
            (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
            (Err(ScheduleError::RecurrenceTooLarge { .. }), Err(ScheduleError::RecurrenceTooLarge { .. })) => {}
            (a, b) => prop_assert!(false, "diverging results: {:?} vs {:?}", a, b),
        }
    }
}

// ---------------------------------------------------------------------------
// Output is strictly ascending, starts at the anchor and respects the end
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(config())]

    #[test]
    fn expansion_is_strictly_ascending_from_anchor((anchor, rule) in arb_rule()) {
        if let Ok(dates) = expand_dates(anchor, Some(&rule), 366) {
            prop_assert_eq!(dates.first(), Some(&anchor), "anchor must be first");
            for pair in dates.windows(2) {
                prop_assert!(pair[0] < pair[1], "not strictly ascending: {} !< {}", pair[0], pair[1]);
            }
            match rule.end_condition {
                EndCondition::EndAfterOccurrences(n) => prop_assert_eq!(dates.len(), n as usize),
                EndCondition::EndOnDate(end) => prop_assert!(dates.iter().all(|d| *d <= end)),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Weekly: every non-anchor date falls on a configured weekday
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(config())]

    #[test]
    fn weekly_dates_match_configured_weekdays(
        anchor in arb_anchor(),
        days in arb_days(),
        interval in 1u32..=3,
        count in 1u32..=40,
    ) {
        let rule = RecurrenceRule::weekly(interval, days.clone(), EndCondition::EndAfterOccurrences(count));
        let dates = expand_dates(anchor, Some(&rule), 366).unwrap();
        prop_assert!(dates.contains(&anchor));
        for date in dates.iter().skip(1) {
            let dow = date.weekday().num_days_from_sunday() as u8;
            prop_assert!(days.contains(&dow), "{} has weekday {} not in {:?}", date, dow, days);
        }
    }
}

// ---------------------------------------------------------------------------
// Monthly: day of month is kept or clamped to the month's last day
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(config())]

    #[test]
    fn monthly_keeps_or_clamps_day(anchor in arb_anchor(), interval in 1u32..=6, count in 1u32..=24) {
        let rule = RecurrenceRule::monthly(interval, EndCondition::EndAfterOccurrences(count));
        let dates = expand_dates(anchor, Some(&rule), 366).unwrap();
        for date in &dates {
            if date.day() != anchor.day() {
                prop_assert!(date.day() < anchor.day());
                let next = *date + chrono::Days::new(1);
                prop_assert_ne!(next.month(), date.month(), "{} clamped but is not month end", date);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Overlap is symmetric and adjacency never overlaps
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(config())]

    #[test]
    fn overlap_is_symmetric(a in arb_range(), b in arb_range()) {
        prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
        prop_assert_eq!(a.overlap_minutes(&b), b.overlap_minutes(&a));
    }

    #[test]
    fn adjacent_ranges_never_overlap(a in arb_range()) {
        let after = TimeRange::new(a.end, NaiveTime::from_hms_opt(23, 59, 0).unwrap());
        if after.start < after.end {
            prop_assert!(!a.overlaps(&after));
        }
    }

    #[test]
    fn non_empty_range_overlaps_itself(a in arb_range()) {
        if a.start < a.end {
            prop_assert!(a.overlaps(&a));
        }
    }
}
