//! Repository ports the engine reads and writes through.
//!
//! Implementations must be `Send + Sync`; every call is atomic with respect to
//! the store. `AccountRepository::update_account` additionally serializes all
//! balance mutations of one account.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use kitamo_domain::{
    Account, InstallmentPlan, RecurrenceMirror, RecurrenceRule, RecurringTemplate, Transaction,
    TransactionKind, TransactionOrigin, TransactionStatus,
};

use crate::CoreError;

/// Selects transactions by origin, account, status and date window.
///
/// Every populated field must match; an empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilter {
    pub rule_id: Option<Uuid>,
    pub plan_id: Option<Uuid>,
    pub account_ids: Option<Vec<Uuid>>,
    pub status: Option<TransactionStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Lowest installment index (inclusive) to match within a plan.
    pub min_installment_index: Option<u32>,
}

impl TransactionFilter {
    pub fn for_rule(rule_id: Uuid) -> Self {
        Self {
            rule_id: Some(rule_id),
            ..Self::default()
        }
    }

    pub fn for_plan(plan_id: Uuid) -> Self {
        Self {
            plan_id: Some(plan_id),
            ..Self::default()
        }
    }

    pub fn for_accounts(account_ids: Vec<Uuid>) -> Self {
        Self {
            account_ids: Some(account_ids),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restricts to dates within `[from, to]`, both ends inclusive.
    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.date_from = Some(from);
        self.date_to = Some(to);
        self
    }

    pub fn from_date(mut self, from: NaiveDate) -> Self {
        self.date_from = Some(from);
        self
    }

    pub fn from_index(mut self, index: u32) -> Self {
        self.min_installment_index = Some(index);
        self
    }

    pub fn matches(&self, txn: &Transaction) -> bool {
        if let Some(rule_id) = self.rule_id {
            if txn.recurrence_rule_id() != Some(rule_id) {
                return false;
            }
        }
        if let Some(plan_id) = self.plan_id {
            if txn.installment_plan_id() != Some(plan_id) {
                return false;
            }
        }
        if let Some(ids) = &self.account_ids {
            if !ids.contains(&txn.account_id) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if txn.status != status {
                return false;
            }
        }
        if let Some(from) = self.date_from {
            if txn.date < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if txn.date > to {
                return false;
            }
        }
        if let Some(min_index) = self.min_installment_index {
            match txn.installment_position() {
                Some((index, _)) if index >= min_index => {}
                _ => return false,
            }
        }
        true
    }
}

/// Field changes applied to every transaction matched by a bulk update.
///
/// `None` leaves a field untouched. `category_id: Some(None)` clears the category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionPatch {
    pub account_id: Option<Uuid>,
    pub category_id: Option<Option<Uuid>>,
    pub kind: Option<TransactionKind>,
    pub amount: Option<Decimal>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    /// New cadence copy for recurrence occurrences. Ignored on other entries.
    pub mirror: Option<RecurrenceMirror>,
}

impl TransactionPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, txn: &mut Transaction) {
        if let Some(account_id) = self.account_id {
            txn.account_id = account_id;
        }
        if let Some(category_id) = self.category_id {
            txn.category_id = category_id;
        }
        if let Some(kind) = self.kind {
            txn.kind = kind;
            if txn.status.is_effective() {
                txn.status = kind.settled_status();
            }
        }
        if let Some(amount) = self.amount {
            txn.amount = amount;
        }
        if let Some(description) = &self.description {
            txn.description = description.clone();
        }
        if let Some(tags) = &self.tags {
            txn.tags = tags.clone();
        }
        if let Some(mirror) = self.mirror {
            if let Some(TransactionOrigin::Recurrence { mirror: current, .. }) = txn.origin.as_mut()
            {
                *current = mirror;
            }
        }
    }
}

pub trait TransactionRepository: Send + Sync {
    fn find_transaction(&self, id: Uuid) -> Result<Option<Transaction>, CoreError>;
    /// Matching transactions ordered by date, then id.
    fn find_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, CoreError>;
    /// Date of the latest occurrence of `rule_id`, if any.
    fn find_latest_date(&self, rule_id: Uuid) -> Result<Option<NaiveDate>, CoreError>;
    fn exists_on_date(&self, rule_id: Uuid, date: NaiveDate) -> Result<bool, CoreError>;
    /// Fails with [`CoreError::DuplicateOccurrence`] when an occurrence of the
    /// same rule already sits on the same date.
    fn create_transaction(&self, txn: Transaction) -> Result<Transaction, CoreError>;
    fn update_transaction(&self, txn: &Transaction) -> Result<(), CoreError>;
    /// Applies `patch` to every match and returns the updated rows.
    fn bulk_update(
        &self,
        filter: &TransactionFilter,
        patch: &TransactionPatch,
    ) -> Result<Vec<Transaction>, CoreError>;
    /// Removes every match and returns the removed rows.
    fn delete_transactions(&self, filter: &TransactionFilter)
        -> Result<Vec<Transaction>, CoreError>;
    fn delete_transaction(&self, id: Uuid) -> Result<Option<Transaction>, CoreError>;
}

pub trait RuleRepository: Send + Sync {
    fn find_rule(&self, id: Uuid) -> Result<Option<RecurrenceRule>, CoreError>;
    /// Inserts or replaces by id.
    fn save_rule(&self, rule: &RecurrenceRule) -> Result<(), CoreError>;
    fn rules(&self) -> Result<Vec<RecurrenceRule>, CoreError>;
}

pub trait PlanRepository: Send + Sync {
    fn find_plan(&self, id: Uuid) -> Result<Option<InstallmentPlan>, CoreError>;
    fn save_plan(&self, plan: &InstallmentPlan) -> Result<(), CoreError>;
}

pub trait AccountRepository: Send + Sync {
    fn find_account(&self, id: Uuid) -> Result<Option<Account>, CoreError>;
    fn accounts(&self) -> Result<Vec<Account>, CoreError>;
    fn save_account(&self, account: &Account) -> Result<(), CoreError>;
    /// Runs `update` on the stored account while holding its lock.
    ///
    /// Returns `false` when the account does not exist.
    fn update_account(
        &self,
        id: Uuid,
        update: &mut dyn FnMut(&mut Account),
    ) -> Result<bool, CoreError>;
}

pub trait TemplateRepository: Send + Sync {
    fn templates(&self) -> Result<Vec<RecurringTemplate>, CoreError>;
    fn save_template(&self, template: &RecurringTemplate) -> Result<(), CoreError>;
}

/// Everything the engine needs from a backend.
pub trait LedgerStore:
    TransactionRepository + RuleRepository + PlanRepository + AccountRepository + TemplateRepository
{
}

impl<T> LedgerStore for T where
    T: TransactionRepository
        + RuleRepository
        + PlanRepository
        + AccountRepository
        + TemplateRepository
{
}
