//! In-process store backed by a single [`Ledger`] behind a mutex.

use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use uuid::Uuid;

use kitamo_domain::{
    Account, InstallmentPlan, Ledger, RecurrenceRule, RecurringTemplate, Transaction,
};

use crate::{
    storage::{
        AccountRepository, PlanRepository, RuleRepository, TemplateRepository, TransactionFilter,
        TransactionPatch, TransactionRepository,
    },
    CoreError,
};

/// Thread-safe store over an owned ledger snapshot.
///
/// Every repository call takes the lock once, so each call is atomic and all
/// balance updates are serialized.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    ledger: Mutex<Ledger>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ledger(ledger: Ledger) -> Self {
        Self {
            ledger: Mutex::new(ledger),
        }
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> Result<Ledger, CoreError> {
        Ok(self.lock()?.clone())
    }

    /// Replaces the whole state, e.g. after restoring a backup.
    pub fn replace(&self, ledger: Ledger) -> Result<(), CoreError> {
        *self.lock()? = ledger;
        Ok(())
    }

    /// Runs `f` against the locked ledger and marks it updated when `f` succeeds.
    pub fn with_ledger<R>(
        &self,
        f: impl FnOnce(&mut Ledger) -> Result<R, CoreError>,
    ) -> Result<R, CoreError> {
        let mut ledger = self.lock()?;
        let result = f(&mut ledger)?;
        ledger.touch();
        Ok(result)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Ledger>, CoreError> {
        self.ledger
            .lock()
            .map_err(|_| CoreError::Storage("ledger lock poisoned".into()))
    }

    fn read<R>(&self, f: impl FnOnce(&Ledger) -> R) -> Result<R, CoreError> {
        let ledger = self.lock()?;
        Ok(f(&ledger))
    }
}

fn sort_by_date(txns: &mut [Transaction]) {
    txns.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
}

impl TransactionRepository for InMemoryStore {
    fn find_transaction(&self, id: Uuid) -> Result<Option<Transaction>, CoreError> {
        self.read(|ledger| ledger.transactions.iter().find(|t| t.id == id).cloned())
    }

    fn find_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, CoreError> {
        let mut found = self.read(|ledger| {
            ledger
                .transactions
                .iter()
                .filter(|t| filter.matches(t))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        sort_by_date(&mut found);
        Ok(found)
    }

    fn find_latest_date(&self, rule_id: Uuid) -> Result<Option<NaiveDate>, CoreError> {
        self.read(|ledger| {
            ledger
                .transactions
                .iter()
                .filter(|t| t.recurrence_rule_id() == Some(rule_id))
                .map(|t| t.date)
                .max()
        })
    }

    fn exists_on_date(&self, rule_id: Uuid, date: NaiveDate) -> Result<bool, CoreError> {
        self.read(|ledger| {
            ledger
                .transactions
                .iter()
                .any(|t| t.recurrence_rule_id() == Some(rule_id) && t.date == date)
        })
    }

    fn create_transaction(&self, txn: Transaction) -> Result<Transaction, CoreError> {
        self.with_ledger(|ledger| {
            if let Some(rule_id) = txn.recurrence_rule_id() {
                let taken = ledger
                    .transactions
                    .iter()
                    .any(|t| t.recurrence_rule_id() == Some(rule_id) && t.date == txn.date);
                if taken {
                    return Err(CoreError::DuplicateOccurrence {
                        rule_id,
                        date: txn.date,
                    });
                }
            }
            if ledger.transactions.iter().any(|t| t.id == txn.id) {
                return Err(CoreError::InvalidOperation(format!(
                    "transaction {} already exists",
                    txn.id
                )));
            }
            ledger.transactions.push(txn.clone());
            Ok(txn)
        })
    }

    fn update_transaction(&self, txn: &Transaction) -> Result<(), CoreError> {
        self.with_ledger(|ledger| {
            if let Some(rule_id) = txn.recurrence_rule_id() {
                let taken = ledger.transactions.iter().any(|t| {
                    t.id != txn.id && t.recurrence_rule_id() == Some(rule_id) && t.date == txn.date
                });
                if taken {
                    return Err(CoreError::DuplicateOccurrence {
                        rule_id,
                        date: txn.date,
                    });
                }
            }
            let slot = ledger
                .transactions
                .iter_mut()
                .find(|t| t.id == txn.id)
                .ok_or(CoreError::TransactionNotFound(txn.id))?;
            *slot = txn.clone();
            Ok(())
        })
    }

    fn bulk_update(
        &self,
        filter: &TransactionFilter,
        patch: &TransactionPatch,
    ) -> Result<Vec<Transaction>, CoreError> {
        let mut updated = self.with_ledger(|ledger| {
            Ok(ledger
                .transactions
                .iter_mut()
                .filter(|t| filter.matches(t))
                .map(|t| {
                    patch.apply(t);
                    t.clone()
                })
                .collect::<Vec<_>>())
        })?;
        sort_by_date(&mut updated);
        Ok(updated)
    }

    fn delete_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, CoreError> {
        let mut removed = self.with_ledger(|ledger| {
            let (gone, kept): (Vec<_>, Vec<_>) = ledger
                .transactions
                .drain(..)
                .partition(|t| filter.matches(t));
            ledger.transactions = kept;
            Ok(gone)
        })?;
        sort_by_date(&mut removed);
        Ok(removed)
    }

    fn delete_transaction(&self, id: Uuid) -> Result<Option<Transaction>, CoreError> {
        self.with_ledger(|ledger| {
            let position = ledger.transactions.iter().position(|t| t.id == id);
            Ok(position.map(|index| ledger.transactions.remove(index)))
        })
    }
}

impl RuleRepository for InMemoryStore {
    fn find_rule(&self, id: Uuid) -> Result<Option<RecurrenceRule>, CoreError> {
        self.read(|ledger| ledger.rules.iter().find(|r| r.id == id).cloned())
    }

    fn save_rule(&self, rule: &RecurrenceRule) -> Result<(), CoreError> {
        self.with_ledger(|ledger| {
            match ledger.rules.iter_mut().find(|r| r.id == rule.id) {
                Some(slot) => *slot = rule.clone(),
                None => ledger.rules.push(rule.clone()),
            }
            Ok(())
        })
    }

    fn rules(&self) -> Result<Vec<RecurrenceRule>, CoreError> {
        self.read(|ledger| ledger.rules.clone())
    }
}

impl PlanRepository for InMemoryStore {
    fn find_plan(&self, id: Uuid) -> Result<Option<InstallmentPlan>, CoreError> {
        self.read(|ledger| ledger.plans.iter().find(|p| p.id == id).cloned())
    }

    fn save_plan(&self, plan: &InstallmentPlan) -> Result<(), CoreError> {
        self.with_ledger(|ledger| {
            match ledger.plans.iter_mut().find(|p| p.id == plan.id) {
                Some(slot) => *slot = plan.clone(),
                None => ledger.plans.push(plan.clone()),
            }
            Ok(())
        })
    }
}

impl AccountRepository for InMemoryStore {
    fn find_account(&self, id: Uuid) -> Result<Option<Account>, CoreError> {
        self.read(|ledger| ledger.accounts.iter().find(|a| a.id == id).cloned())
    }

    fn accounts(&self) -> Result<Vec<Account>, CoreError> {
        self.read(|ledger| ledger.accounts.clone())
    }

    fn save_account(&self, account: &Account) -> Result<(), CoreError> {
        self.with_ledger(|ledger| {
            match ledger.accounts.iter_mut().find(|a| a.id == account.id) {
                Some(slot) => *slot = account.clone(),
                None => ledger.accounts.push(account.clone()),
            }
            Ok(())
        })
    }

    fn update_account(
        &self,
        id: Uuid,
        update: &mut dyn FnMut(&mut Account),
    ) -> Result<bool, CoreError> {
        self.with_ledger(|ledger| match ledger.accounts.iter_mut().find(|a| a.id == id) {
            Some(account) => {
                update(account);
                Ok(true)
            }
            None => Ok(false),
        })
    }
}

impl TemplateRepository for InMemoryStore {
    fn templates(&self) -> Result<Vec<RecurringTemplate>, CoreError> {
        self.read(|ledger| ledger.templates.clone())
    }

    fn save_template(&self, template: &RecurringTemplate) -> Result<(), CoreError> {
        self.with_ledger(|ledger| {
            match ledger.templates.iter_mut().find(|t| t.id == template.id) {
                Some(slot) => *slot = template.clone(),
                None => ledger.templates.push(template.clone()),
            }
            Ok(())
        })
    }
}
