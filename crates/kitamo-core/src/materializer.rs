//! Persists the missing occurrences of a rule up to a lookahead horizon.

use chrono::NaiveDate;
use tracing::{debug, info};
use uuid::Uuid;

use kitamo_domain::{add_months, RecurrenceRule, Transaction};

use crate::{
    scheduler,
    storage::{RuleRepository, TransactionRepository},
    CoreError,
};

/// Default lookahead used by the daily job.
pub const DEFAULT_HORIZON_MONTHS: u32 = 12;

/// Expands rules into concrete pending transactions.
///
/// Safe to call repeatedly: occurrences already stored for a `(rule, date)`
/// pair are skipped, including ones a concurrent run created in between.
pub struct Materializer;

impl Materializer {
    /// Date before which every occurrence must exist after an extension.
    pub fn target_date(today: NaiveDate, horizon_months: u32) -> NaiveDate {
        add_months(today, horizon_months as i32)
    }

    /// Loads `rule_id` and extends it. A missing rule is a no-op.
    pub fn extend<S>(
        store: &S,
        rule_id: Uuid,
        horizon_months: u32,
        today: NaiveDate,
    ) -> Result<usize, CoreError>
    where
        S: TransactionRepository + RuleRepository + ?Sized,
    {
        match store.find_rule(rule_id)? {
            Some(rule) => Self::extend_rule(store, &rule, horizon_months, today),
            None => {
                info!(rule = %rule_id, "rule not found; nothing to materialize");
                Ok(0)
            }
        }
    }

    /// Creates the occurrences of `rule` missing before `today + horizon_months`.
    ///
    /// Walks the whole grid from the rule's start date. Edits can leave the
    /// latest stored occurrence past grid dates that were never created, so
    /// every date up to it is checked; later dates cannot be stored yet.
    ///
    /// Returns how many transactions were created.
    pub fn extend_rule<S>(
        store: &S,
        rule: &RecurrenceRule,
        horizon_months: u32,
        today: NaiveDate,
    ) -> Result<usize, CoreError>
    where
        S: TransactionRepository + ?Sized,
    {
        rule.validate()?;
        if !rule.active {
            debug!(rule = %rule.id, "rule inactive; skipping");
            return Ok(0);
        }

        let target = Self::target_date(today, horizon_months);
        let latest = store.find_latest_date(rule.id)?;

        let mut created = 0;
        let dates = scheduler::occurrences_after(rule, rule.start_date);
        for date in dates.take_while(|date| *date < target) {
            let may_exist = latest.is_some_and(|latest| date <= latest);
            if may_exist && store.exists_on_date(rule.id, date)? {
                continue;
            }
            match store.create_transaction(Transaction::occurrence_of(rule, date)) {
                Ok(_) => created += 1,
                Err(CoreError::DuplicateOccurrence { .. }) => {
                    debug!(rule = %rule.id, %date, "occurrence created concurrently; skipping");
                }
                Err(err) => return Err(err),
            }
        }

        if created > 0 {
            debug!(rule = %rule.id, created, %target, "materialized occurrences");
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use kitamo_domain::{Periodicity, TransactionKind, TransactionStatus};

    use super::*;
    use crate::{storage::TransactionFilter, InMemoryStore};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rent(start: NaiveDate) -> RecurrenceRule {
        RecurrenceRule::new(
            Uuid::new_v4(),
            TransactionKind::Expense,
            dec!(100.00),
            "Rent",
            Periodicity::Monthly,
            start,
        )
    }

    #[test]
    fn month_end_rule_materializes_clamped_dates() {
        let store = InMemoryStore::new();
        let rule = rent(date(2025, 1, 31));
        store.save_rule(&rule).unwrap();

        let created = Materializer::extend(&store, rule.id, 3, date(2025, 2, 1)).unwrap();
        assert_eq!(created, 3);

        let txns = store
            .find_transactions(&TransactionFilter::for_rule(rule.id))
            .unwrap();
        let dates: Vec<_> = txns.iter().map(|t| t.date).collect();
        assert_eq!(
            dates,
            vec![date(2025, 2, 28), date(2025, 3, 31), date(2025, 4, 30)]
        );
        assert!(txns.iter().all(|t| t.status == TransactionStatus::Pending));
    }

    #[test]
    fn second_extension_creates_nothing() {
        let store = InMemoryStore::new();
        let rule = rent(date(2025, 1, 10));
        store.save_rule(&rule).unwrap();

        let today = date(2025, 1, 10);
        assert!(Materializer::extend(&store, rule.id, 12, today).unwrap() > 0);
        assert_eq!(Materializer::extend(&store, rule.id, 12, today).unwrap(), 0);
    }

    #[test]
    fn fills_grid_dates_below_an_off_grid_occurrence() {
        let store = InMemoryStore::new();
        let rule = rent(date(2025, 1, 10));
        store.save_rule(&rule).unwrap();
        store
            .create_transaction(Transaction::occurrence_of(&rule, date(2025, 6, 20)))
            .unwrap();

        let created = Materializer::extend(&store, rule.id, 4, date(2025, 1, 10)).unwrap();
        assert_eq!(created, 3);
        let dates: Vec<_> = store
            .find_transactions(&TransactionFilter::for_rule(rule.id))
            .unwrap()
            .iter()
            .map(|t| t.date)
            .collect();
        assert_eq!(
            dates,
            vec![date(2025, 2, 10), date(2025, 3, 10), date(2025, 4, 10), date(2025, 6, 20)]
        );
    }

    #[test]
    fn missing_rule_is_a_noop() {
        let store = InMemoryStore::new();
        let created = Materializer::extend(&store, Uuid::new_v4(), 12, date(2025, 1, 1)).unwrap();
        assert_eq!(created, 0);
    }

    #[test]
    fn stops_at_end_date() {
        let store = InMemoryStore::new();
        let rule = rent(date(2025, 1, 5)).with_end_date(Some(date(2025, 3, 5)));
        store.save_rule(&rule).unwrap();

        let created = Materializer::extend(&store, rule.id, 12, date(2025, 1, 5)).unwrap();
        assert_eq!(created, 2);
    }

    #[test]
    fn inactive_rule_creates_nothing() {
        let store = InMemoryStore::new();
        let mut rule = rent(date(2025, 1, 5));
        rule.active = false;
        store.save_rule(&rule).unwrap();

        assert_eq!(
            Materializer::extend(&store, rule.id, 12, date(2025, 1, 5)).unwrap(),
            0
        );
    }

    #[test]
    fn invalid_rule_is_rejected() {
        let store = InMemoryStore::new();
        let rule = rent(date(2025, 1, 5)).with_end_date(Some(date(2024, 1, 1)));
        let err = Materializer::extend_rule(&store, &rule, 12, date(2025, 1, 5)).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
