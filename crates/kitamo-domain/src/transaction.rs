//! Domain models for concrete ledger entries and their link to a rule or plan.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    common::{Identifiable, TransactionKind, TransactionStatus},
    money,
    recurrence::{Periodicity, RecurrenceRule},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    pub kind: TransactionKind,
    #[serde(default)]
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub description: String,
    pub date: NaiveDate,
    /// Payment date, set while the entry is effective.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<TransactionOrigin>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
/// What generated a transaction. An entry belongs to at most one rule or one plan.
pub enum TransactionOrigin {
    Recurrence {
        rule_id: Uuid,
        #[serde(default)]
        mirror: RecurrenceMirror,
    },
    Installment {
        plan_id: Uuid,
        index: u32,
        total: u32,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
/// Copy of the rule's cadence kept on each occurrence so it can be shown without a join.
pub struct RecurrenceMirror {
    #[serde(default)]
    pub periodicity: Periodicity,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl RecurrenceMirror {
    pub fn of(rule: &RecurrenceRule) -> Self {
        Self {
            periodicity: rule.periodicity,
            end_date: rule.end_date,
        }
    }
}

impl Transaction {
    pub fn new(
        account_id: Uuid,
        kind: TransactionKind,
        amount: Decimal,
        description: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            category_id: None,
            kind,
            status: TransactionStatus::Pending,
            amount,
            description: description.into(),
            date,
            paid_at: None,
            origin: None,
            tags: Vec::new(),
        }
    }

    /// Builds the pending occurrence of `rule` scheduled on `date`.
    pub fn occurrence_of(rule: &RecurrenceRule, date: NaiveDate) -> Self {
        let mut txn = Self::new(
            rule.account_id,
            rule.kind,
            rule.amount,
            rule.description.clone(),
            date,
        );
        txn.category_id = rule.category_id;
        txn.tags = rule.tags.clone();
        txn.origin = Some(TransactionOrigin::Recurrence {
            rule_id: rule.id,
            mirror: RecurrenceMirror::of(rule),
        });
        txn
    }

    pub fn recurrence_rule_id(&self) -> Option<Uuid> {
        match self.origin {
            Some(TransactionOrigin::Recurrence { rule_id, .. }) => Some(rule_id),
            _ => None,
        }
    }

    pub fn installment_plan_id(&self) -> Option<Uuid> {
        match self.origin {
            Some(TransactionOrigin::Installment { plan_id, .. }) => Some(plan_id),
            _ => None,
        }
    }

    /// Returns `(index, total)` for installment entries, 1-based.
    pub fn installment_position(&self) -> Option<(u32, u32)> {
        match self.origin {
            Some(TransactionOrigin::Installment { index, total, .. }) => Some((index, total)),
            _ => None,
        }
    }

    pub fn installment_label(&self) -> Option<String> {
        self.installment_position()
            .map(|(index, total)| format!("Installment {index}/{total}"))
    }

    pub fn is_effective(&self) -> bool {
        self.status.is_effective()
    }

    /// Signed effect on the owning account once effective.
    pub fn signed_amount(&self) -> Decimal {
        money::signed(self.kind, self.amount)
    }

    /// Marks the entry paid or received depending on its kind.
    pub fn settle(&mut self, on: NaiveDate) {
        self.status = self.kind.settled_status();
        self.paid_at = Some(on);
    }

    pub fn reopen(&mut self) {
        self.status = TransactionStatus::Pending;
        self.paid_at = None;
    }

    /// Unlinks the entry from its rule or plan, turning it into a standalone transaction.
    pub fn detach(&mut self) {
        self.origin = None;
    }
}

impl Identifiable for Transaction {
    fn id(&self) -> Uuid {
        self.id
    }
}
