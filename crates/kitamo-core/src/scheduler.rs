//! Pure date arithmetic for recurrence rules.
//!
//! Shared by the materializer and the projector so that simulated occurrences
//! always land on the same dates as persisted ones.

use chrono::{Datelike, Duration, NaiveDate};

use kitamo_domain::{add_months, days_in_month, Periodicity, RecurrenceRule};

/// Upper bound on the number of steps taken while walking a single rule.
pub const MAX_OCCURRENCES: usize = 20_000;

/// Next occurrence strictly after `from`.
///
/// Month-based cadences keep the rule's start day where the target month has
/// it and clamp to the month's last day otherwise, so a rule started on the
/// 31st yields Feb 28 and then Mar 31.
pub fn next_date(from: NaiveDate, rule: &RecurrenceRule) -> NaiveDate {
    match rule.periodicity {
        Periodicity::Monthly => step_months(from, 1, rule.start_date),
        Periodicity::Biweekly => from + Duration::days(15),
        Periodicity::EveryNDays { days } => from + Duration::days(i64::from(days.max(1))),
        Periodicity::EveryNMonths { months } => step_months(from, months.max(1), rule.start_date),
    }
}

/// False once the rule is switched off or `at` lies after its end date.
pub fn is_active(rule: &RecurrenceRule, at: NaiveDate) -> bool {
    if !rule.active {
        return false;
    }
    match rule.end_date {
        Some(end) => at <= end,
        None => true,
    }
}

fn step_months(from: NaiveDate, months: u32, anchor: NaiveDate) -> NaiveDate {
    let shifted = add_months(from, months as i32);
    let day = anchor
        .day()
        .min(days_in_month(shifted.year(), shifted.month()));
    shifted.with_day(day).unwrap_or(shifted)
}

/// Occurrence dates of `rule` strictly after `after`, in order.
///
/// The walk always starts at the rule's start date, which is the date of the
/// declaring transaction and is never yielded. Dates listed in the rule's
/// exceptions are skipped. The stream ends when the rule stops being active or
/// after [`MAX_OCCURRENCES`] steps.
pub fn occurrences_after(rule: &RecurrenceRule, after: NaiveDate) -> Occurrences<'_> {
    Occurrences {
        rule,
        after,
        cursor: rule.start_date,
        steps: 0,
    }
}

/// Iterator returned by [`occurrences_after`].
#[derive(Debug, Clone)]
pub struct Occurrences<'a> {
    rule: &'a RecurrenceRule,
    after: NaiveDate,
    cursor: NaiveDate,
    steps: usize,
}

impl Iterator for Occurrences<'_> {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.steps >= MAX_OCCURRENCES {
                return None;
            }
            self.steps += 1;
            let next = next_date(self.cursor, self.rule);
            if next <= self.cursor || !is_active(self.rule, next) {
                self.steps = MAX_OCCURRENCES;
                return None;
            }
            self.cursor = next;
            if next > self.after && !self.rule.is_exception(next) {
                return Some(next);
            }
        }
    }
}
