//! Standalone recurring templates, advanced by a daily job through `next_run`.
//!
//! These predate recurrence rules and are not linked to the transactions they
//! produce; they only remember when they should fire next.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::{add_months, Identifiable, TransactionKind};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    #[default]
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn next_date(self, from: NaiveDate) -> NaiveDate {
        match self {
            Frequency::Daily => from + Duration::days(1),
            Frequency::Weekly => from + Duration::weeks(1),
            Frequency::Monthly => add_months(from, 1),
            Frequency::Yearly => add_months(from, 12),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecurringTemplate {
    pub id: Uuid,
    pub account_id: Uuid,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    pub kind: TransactionKind,
    pub description: String,
    pub amount: Decimal,
    #[serde(default)]
    pub frequency: Frequency,
    pub next_run: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default = "RecurringTemplate::default_active")]
    pub active: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RecurringTemplate {
    pub fn new(
        account_id: Uuid,
        kind: TransactionKind,
        amount: Decimal,
        description: impl Into<String>,
        frequency: Frequency,
        next_run: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            category_id: None,
            kind,
            description: description.into(),
            amount,
            frequency,
            next_run,
            end_date: None,
            active: true,
            tags: Vec::new(),
        }
    }

    pub fn default_active() -> bool {
        true
    }

    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.active && self.next_run <= today
    }
}

impl Identifiable for RecurringTemplate {
    fn id(&self) -> Uuid {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_steps() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(
            Frequency::Daily.next_date(start),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
        assert_eq!(
            Frequency::Weekly.next_date(start),
            NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
        );
        assert_eq!(
            Frequency::Yearly.next_date(start),
            NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()
        );
    }
}
