//! Declaring recurrence rules and maintaining their metadata.

use chrono::NaiveDate;
use tracing::info;
use uuid::Uuid;

use kitamo_domain::{add_months, Periodicity, RecurrenceRule, Transaction};

use crate::{storage::RuleRepository, CoreError};

pub const MAX_INTERVAL_DAYS: u32 = 366;
pub const MAX_INTERVAL_MONTHS: u32 = 120;
pub const MAX_REPEAT_TIMES: u32 = 120;

/// Tags that only mark an entry as recurring; the rule link already says so.
const RESERVED_TAGS: [&str; 2] = ["recorrente", "recurring"];

/// How a user asked for a transaction to repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrenceRequest {
    /// Explicit cadence with an optional end date.
    Custom {
        periodicity: Option<Periodicity>,
        end_date: Option<NaiveDate>,
    },
    /// Monthly and open-ended.
    FixedExpense,
    /// `times` occurrences, `every_months` apart, counting the first one.
    Repeat { times: u32, every_months: u32 },
}

impl RecurrenceRequest {
    /// Cadence and end date the request resolves to for a series starting on `start`.
    pub fn resolve(
        &self,
        start: NaiveDate,
    ) -> Result<(Periodicity, Option<NaiveDate>), CoreError> {
        match *self {
            RecurrenceRequest::Custom {
                periodicity,
                end_date,
            } => {
                let periodicity = periodicity.ok_or_else(|| {
                    CoreError::Validation("recurrence requires a periodicity".into())
                })?;
                validate_interval(periodicity)?;
                Ok((periodicity, end_date))
            }
            RecurrenceRequest::FixedExpense => Ok((Periodicity::EveryNMonths { months: 1 }, None)),
            RecurrenceRequest::Repeat {
                times,
                every_months,
            } => {
                if !(2..=MAX_REPEAT_TIMES).contains(&times) {
                    return Err(CoreError::Validation(format!(
                        "repeat count must be between 2 and {MAX_REPEAT_TIMES}, got {times}"
                    )));
                }
                let periodicity = Periodicity::EveryNMonths {
                    months: every_months,
                };
                validate_interval(periodicity)?;
                let end = add_months(start, (every_months * (times - 1)) as i32);
                Ok((periodicity, Some(end)))
            }
        }
    }
}

fn validate_interval(periodicity: Periodicity) -> Result<(), CoreError> {
    match periodicity {
        Periodicity::EveryNDays { days } if !(1..=MAX_INTERVAL_DAYS).contains(&days) => {
            Err(CoreError::Validation(format!(
                "day interval must be between 1 and {MAX_INTERVAL_DAYS}, got {days}"
            )))
        }
        Periodicity::EveryNMonths { months } if !(1..=MAX_INTERVAL_MONTHS).contains(&months) => {
            Err(CoreError::Validation(format!(
                "month interval must be between 1 and {MAX_INTERVAL_MONTHS}, got {months}"
            )))
        }
        _ => Ok(()),
    }
}

/// Trims, strips leading `#`, collapses inner whitespace and removes
/// case-insensitive duplicates and reserved tags.
pub fn sanitize_tags<I, T>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    let mut seen = Vec::new();
    let mut result = Vec::new();
    for raw in tags {
        let value = raw.as_ref().trim().trim_start_matches('#');
        let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
        if value.is_empty() {
            continue;
        }
        let key = value.to_lowercase();
        if RESERVED_TAGS.contains(&key.as_str()) || seen.contains(&key) {
            continue;
        }
        seen.push(key);
        result.push(value);
    }
    result
}

/// Stateless helpers for rule declaration and maintenance.
pub struct RecurrenceService;

impl RecurrenceService {
    /// Builds the rule declared by `template` with `request`.
    ///
    /// The rule starts on the template's date, which becomes its first
    /// occurrence. End dates before `today` or before the start are rejected.
    pub fn declare(
        template: &Transaction,
        request: &RecurrenceRequest,
        today: NaiveDate,
    ) -> Result<RecurrenceRule, CoreError> {
        let (periodicity, end_date) = request.resolve(template.date)?;
        if let Some(end) = end_date {
            if end < today {
                return Err(CoreError::Validation(format!(
                    "recurrence end date {end} is in the past"
                )));
            }
        }

        let mut rule = RecurrenceRule::new(
            template.account_id,
            template.kind,
            template.amount,
            template.description.clone(),
            periodicity,
            template.date,
        )
        .with_end_date(end_date);
        rule.category_id = template.category_id;
        rule.tags = template.tags.clone();
        rule.validate()?;
        Ok(rule)
    }

    /// Turns generation of a rule on or off. Stored occurrences stay.
    pub fn set_active<S>(
        store: &S,
        rule_id: Uuid,
        active: bool,
    ) -> Result<RecurrenceRule, CoreError>
    where
        S: RuleRepository + ?Sized,
    {
        let mut rule = store
            .find_rule(rule_id)?
            .ok_or(CoreError::RuleNotFound(rule_id))?;
        if rule.active != active {
            rule.active = active;
            store.save_rule(&rule)?;
            info!(rule = %rule_id, active, "rule activation changed");
        }
        Ok(rule)
    }

    /// Keeps `date` from being generated or projected again.
    ///
    /// Returns whether the date was newly recorded.
    pub fn skip_date<S>(store: &S, rule_id: Uuid, date: NaiveDate) -> Result<bool, CoreError>
    where
        S: RuleRepository + ?Sized,
    {
        let mut rule = store
            .find_rule(rule_id)?
            .ok_or(CoreError::RuleNotFound(rule_id))?;
        if !rule.skip(date) {
            return Ok(false);
        }
        store.save_rule(&rule)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use kitamo_domain::TransactionKind;

    use super::*;
    use crate::InMemoryStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn template(on: NaiveDate) -> Transaction {
        Transaction::new(
            Uuid::new_v4(),
            TransactionKind::Expense,
            dec!(59.90),
            "Gym",
            on,
        )
    }

    #[test]
    fn custom_without_periodicity_is_rejected() {
        let request = RecurrenceRequest::Custom {
            periodicity: None,
            end_date: None,
        };
        let today = date(2025, 1, 1);
        let err = RecurrenceService::declare(&template(today), &request, today).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn past_end_date_is_rejected() {
        let request = RecurrenceRequest::Custom {
            periodicity: Some(Periodicity::Monthly),
            end_date: Some(date(2025, 1, 31)),
        };
        let today = date(2025, 2, 1);
        assert!(RecurrenceService::declare(&template(date(2025, 1, 1)), &request, today).is_err());
    }

    #[test]
    fn end_before_start_is_rejected() {
        let request = RecurrenceRequest::Custom {
            periodicity: Some(Periodicity::Monthly),
            end_date: Some(date(2025, 3, 1)),
        };
        let today = date(2025, 2, 1);
        assert!(RecurrenceService::declare(&template(date(2025, 4, 1)), &request, today).is_err());
    }

    #[test]
    fn out_of_range_intervals_are_rejected() {
        for periodicity in [
            Periodicity::EveryNDays { days: 0 },
            Periodicity::EveryNDays { days: 367 },
            Periodicity::EveryNMonths { months: 121 },
        ] {
            let request = RecurrenceRequest::Custom {
                periodicity: Some(periodicity),
                end_date: None,
            };
            assert!(request.resolve(date(2025, 1, 1)).is_err(), "{periodicity:?}");
        }
    }

    #[test]
    fn fixed_expense_is_monthly_and_open_ended() {
        let rule = RecurrenceService::declare(
            &template(date(2025, 1, 10)),
            &RecurrenceRequest::FixedExpense,
            date(2025, 1, 10),
        )
        .unwrap();
        assert_eq!(rule.periodicity, Periodicity::EveryNMonths { months: 1 });
        assert_eq!(rule.end_date, None);
        assert_eq!(rule.start_date, date(2025, 1, 10));
    }

    #[test]
    fn repeat_computes_end_date() {
        let request = RecurrenceRequest::Repeat {
            times: 4,
            every_months: 2,
        };
        let (periodicity, end) = request.resolve(date(2025, 1, 31)).unwrap();
        assert_eq!(periodicity, Periodicity::EveryNMonths { months: 2 });
        assert_eq!(end, Some(date(2025, 7, 31)));

        let once = RecurrenceRequest::Repeat {
            times: 1,
            every_months: 1,
        };
        assert!(once.resolve(date(2025, 1, 31)).is_err());
    }

    #[test]
    fn tags_are_sanitized() {
        let tags = sanitize_tags([
            " #Home ",
            "home",
            "two   words",
            "#",
            "Recorrente",
            "recurring",
        ]);
        assert_eq!(tags, vec!["Home".to_string(), "two words".to_string()]);
    }

    #[test]
    fn skip_date_and_deactivate() {
        let store = InMemoryStore::new();
        let rule = RecurrenceService::declare(
            &template(date(2025, 1, 10)),
            &RecurrenceRequest::FixedExpense,
            date(2025, 1, 10),
        )
        .unwrap();
        store.save_rule(&rule).unwrap();

        assert!(RecurrenceService::skip_date(&store, rule.id, date(2025, 2, 10)).unwrap());
        assert!(!RecurrenceService::skip_date(&store, rule.id, date(2025, 2, 10)).unwrap());
        let stopped = RecurrenceService::set_active(&store, rule.id, false).unwrap();
        assert!(!stopped.active);
        assert!(matches!(
            RecurrenceService::set_active(&store, Uuid::new_v4(), true),
            Err(CoreError::RuleNotFound(_))
        ));
    }
}
