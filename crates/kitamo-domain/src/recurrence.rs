//! Recurrence rules: templates that expand into a stream of dated transactions.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{de::Deserializer, Deserialize, Serialize};
use uuid::Uuid;

use crate::common::{Identifiable, TransactionKind};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// Supported repetition cadences.
pub enum Periodicity {
    #[default]
    Monthly,
    /// Every 15 days.
    Biweekly,
    EveryNDays {
        days: u32,
    },
    EveryNMonths {
        months: u32,
    },
}

impl Periodicity {
    pub fn label(&self) -> String {
        match self {
            Periodicity::Monthly => "Monthly".into(),
            Periodicity::Biweekly => "Biweekly".into(),
            Periodicity::EveryNDays { days: 1 } => "Daily".into(),
            Periodicity::EveryNDays { days } => format!("Every {days} days"),
            Periodicity::EveryNMonths { months: 1 } => "Monthly".into(),
            Periodicity::EveryNMonths { months } => format!("Every {months} months"),
        }
    }

    fn has_valid_interval(&self) -> bool {
        match self {
            Periodicity::Monthly | Periodicity::Biweekly => true,
            Periodicity::EveryNDays { days } => *days >= 1,
            Periodicity::EveryNMonths { months } => *months >= 1,
        }
    }
}

impl fmt::Display for Periodicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[derive(Deserialize)]
struct RawPeriodicity {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    days: Option<u32>,
    #[serde(default)]
    months: Option<u32>,
}

// Unknown or missing cadences fall back to monthly; a missing companion
// interval is kept as zero so `RecurrenceRule::validate` can report it.
impl<'de> Deserialize<'de> for Periodicity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<RawPeriodicity>::deserialize(deserializer)?;
        let Some(raw) = raw else {
            return Ok(Periodicity::default());
        };
        let kind = raw.kind.unwrap_or_default().trim().to_ascii_lowercase();
        Ok(match kind.as_str() {
            "biweekly" => Periodicity::Biweekly,
            "every_n_days" => Periodicity::EveryNDays {
                days: raw.days.unwrap_or(0),
            },
            "every_n_months" => Periodicity::EveryNMonths {
                months: raw.months.unwrap_or(0),
            },
            _ => Periodicity::Monthly,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Describes a repeating transaction. Edits replace the stored record as a whole.
pub struct RecurrenceRule {
    pub id: Uuid,
    pub account_id: Uuid,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub description: String,
    #[serde(default)]
    pub periodicity: Periodicity,
    pub start_date: NaiveDate,
    /// Inclusive; `None` repeats forever.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default = "RecurrenceRule::default_active")]
    pub active: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Occurrence dates that were detached or deleted and must not be generated again.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exceptions: Vec<NaiveDate>,
}

impl RecurrenceRule {
    pub fn new(
        account_id: Uuid,
        kind: TransactionKind,
        amount: Decimal,
        description: impl Into<String>,
        periodicity: Periodicity,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            category_id: None,
            kind,
            amount,
            description: description.into(),
            periodicity,
            start_date,
            end_date: None,
            active: true,
            tags: Vec::new(),
            exceptions: Vec::new(),
        }
    }

    pub fn with_end_date(mut self, end_date: Option<NaiveDate>) -> Self {
        self.end_date = end_date;
        self
    }

    pub fn default_active() -> bool {
        true
    }

    pub fn is_exception(&self, date: NaiveDate) -> bool {
        self.exceptions.contains(&date)
    }

    /// Records a skipped occurrence, returning whether it was newly added.
    pub fn skip(&mut self, date: NaiveDate) -> bool {
        if self.is_exception(date) {
            return false;
        }
        self.exceptions.push(date);
        self.exceptions.sort();
        true
    }

    /// Checks the structural invariants a stored rule must satisfy.
    pub fn validate(&self) -> Result<(), RuleValidationError> {
        if !self.periodicity.has_valid_interval() {
            return Err(RuleValidationError::ZeroInterval(self.periodicity));
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(RuleValidationError::EndBeforeStart {
                    start: self.start_date,
                    end,
                });
            }
        }
        if self.amount <= Decimal::ZERO {
            return Err(RuleValidationError::NonPositiveAmount(self.amount));
        }
        Ok(())
    }
}

impl Identifiable for RecurrenceRule {
    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleValidationError {
    ZeroInterval(Periodicity),
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
    NonPositiveAmount(Decimal),
}

impl fmt::Display for RuleValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleValidationError::ZeroInterval(periodicity) => {
                write!(f, "{periodicity:?} requires an interval of at least 1")
            }
            RuleValidationError::EndBeforeStart { start, end } => {
                write!(f, "end date {end} is before start date {start}")
            }
            RuleValidationError::NonPositiveAmount(amount) => {
                write!(f, "amount must be positive, got {amount}")
            }
        }
    }
}

impl std::error::Error for RuleValidationError {}
