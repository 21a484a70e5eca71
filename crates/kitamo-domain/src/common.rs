//! Shared traits, calendar utilities, and enums for ledger primitives.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Exposes a stable identifier for entities stored in the ledger.
pub trait Identifiable {
    fn id(&self) -> Uuid;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
/// Direction of a ledger entry relative to its account.
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    /// Status a transaction of this kind takes once it has been settled.
    pub fn settled_status(self) -> TransactionStatus {
        match self {
            TransactionKind::Income => TransactionStatus::Received,
            TransactionKind::Expense => TransactionStatus::Paid,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
/// Settlement state of a transaction.
pub enum TransactionStatus {
    #[default]
    Pending,
    Paid,
    Received,
}

impl TransactionStatus {
    /// Paid and received entries are the ones reflected in an account's cached balance.
    pub fn is_effective(self) -> bool {
        matches!(self, TransactionStatus::Paid | TransactionStatus::Received)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Paid => "paid",
            TransactionStatus::Received => "received",
        };
        f.write_str(label)
    }
}

/// Adds calendar months to `date`, clamping the day to the last day of the
/// target month instead of overflowing into the following one.
pub fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    let month_index = date.year() * 12 + date.month0() as i32 + months;
    let year = month_index.div_euclid(12);
    let month = month_index.rem_euclid(12) as u32 + 1;
    let day = date.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(date)
}

/// Number of days in the given month, accounting for leap years.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .map(|first_next| (first_next - Duration::days(1)).day())
        .unwrap_or(28)
}
