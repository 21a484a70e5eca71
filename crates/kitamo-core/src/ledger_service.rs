//! Ledger mutations: creating, editing, settling and deleting transactions.
//!
//! Every mutation keeps cached balances correct by reverting the stored state
//! of each affected transaction before the write and applying the new state
//! after it.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use kitamo_domain::{
    money::round_cents, InstallmentPlan, RecurrenceMirror, RecurrenceRule, Transaction,
    TransactionKind, TransactionOrigin, TransactionStatus, MAX_INSTALLMENTS,
};

use crate::{
    balance::{BalanceAdjuster, Direction},
    installment_service::{installment_description, InstallmentSplitter},
    materializer::{Materializer, DEFAULT_HORIZON_MONTHS},
    recurrence_service::{sanitize_tags, RecurrenceRequest, RecurrenceService},
    storage::{LedgerStore, TransactionFilter, TransactionPatch},
    CoreError,
};

/// A transaction as submitted by the user, before any rule or plan exists.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionDraft {
    pub account_id: Uuid,
    pub category_id: Option<Uuid>,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub description: String,
    pub date: NaiveDate,
    pub paid: bool,
    pub tags: Vec<String>,
    pub recurrence: Option<RecurrenceRequest>,
    pub installments: Option<u32>,
}

impl TransactionDraft {
    pub fn new(
        account_id: Uuid,
        kind: TransactionKind,
        amount: Decimal,
        description: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            account_id,
            category_id: None,
            kind,
            amount,
            description: description.into(),
            date,
            paid: false,
            tags: Vec::new(),
            recurrence: None,
            installments: None,
        }
    }

    pub fn with_category(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn paid(mut self) -> Self {
        self.paid = true;
        self
    }

    pub fn recurring(mut self, request: RecurrenceRequest) -> Self {
        self.recurrence = Some(request);
        self
    }

    pub fn in_installments(mut self, count: u32) -> Self {
        self.installments = Some(count);
        self
    }
}

/// Which members of a series an edit reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditScope {
    /// Only the edited entry, which leaves its rule or plan.
    #[default]
    ThisOne,
    /// The edited entry and every later member of the series.
    Future,
    /// Every member of the series.
    All,
}

/// Requested field changes. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionChanges {
    pub account_id: Option<Uuid>,
    pub category_id: Option<Option<Uuid>>,
    pub kind: Option<TransactionKind>,
    pub amount: Option<Decimal>,
    pub description: Option<String>,
    /// Applies to the edited entry only.
    pub date: Option<NaiveDate>,
    /// Applies to the edited entry only.
    pub paid: Option<bool>,
    pub tags: Option<Vec<String>>,
    /// New cadence for the rule behind a recurring entry.
    pub recurrence: Option<RecurrenceRequest>,
}

impl TransactionChanges {
    fn series_patch(&self, mirror: Option<RecurrenceMirror>) -> TransactionPatch {
        TransactionPatch {
            account_id: self.account_id,
            category_id: self.category_id,
            kind: self.kind,
            amount: self.amount,
            description: self.description.clone(),
            tags: self.tags.clone(),
            mirror,
        }
    }

    /// Applies every change except the recurrence to a single entry.
    fn apply_to(&self, txn: &mut Transaction, today: NaiveDate) {
        let patch = self.series_patch(None);
        patch.apply(txn);
        if let Some(date) = self.date {
            txn.date = date;
        }
        match self.paid {
            Some(true) if !txn.is_effective() => txn.settle(today),
            Some(false) => txn.reopen(),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedEntry {
    pub transaction: Transaction,
    pub rule: Option<RecurrenceRule>,
    pub plan: Option<InstallmentPlan>,
    /// Occurrences or installments created besides `transaction`.
    pub generated: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    pub transaction: Transaction,
    /// Transactions rewritten by the edit, the edited one included.
    pub affected: usize,
    /// Occurrences created while re-extending the rule.
    pub generated: usize,
}

/// Mutation layer over a [`LedgerStore`].
#[derive(Debug, Clone, Copy)]
pub struct LedgerService {
    horizon_months: u32,
}

impl Default for LedgerService {
    fn default() -> Self {
        Self::new(DEFAULT_HORIZON_MONTHS)
    }
}

impl LedgerService {
    pub fn new(horizon_months: u32) -> Self {
        Self { horizon_months }
    }

    pub fn horizon_months(&self) -> u32 {
        self.horizon_months
    }

    /// Records `draft`, declaring its rule or plan and expanding it.
    pub fn create<S>(
        &self,
        store: &S,
        draft: TransactionDraft,
        today: NaiveDate,
    ) -> Result<CreatedEntry, CoreError>
    where
        S: LedgerStore + ?Sized,
    {
        if draft.recurrence.is_some() && draft.installments.is_some() {
            return Err(CoreError::Validation(
                "a transaction cannot be both recurring and split into installments".into(),
            ));
        }
        let amount = validate_amount(draft.amount)?;
        let description = validate_description(&draft.description)?;
        let account = store
            .find_account(draft.account_id)?
            .ok_or(CoreError::AccountNotFound(draft.account_id))?;

        let mut txn = Transaction::new(account.id, draft.kind, amount, description, draft.date);
        txn.category_id = draft.category_id;
        txn.tags = sanitize_tags(&draft.tags);
        if draft.paid {
            txn.settle(today);
        }

        if let Some(request) = draft.recurrence {
            let rule = RecurrenceService::declare(&txn, &request, today)?;
            txn.origin = Some(TransactionOrigin::Recurrence {
                rule_id: rule.id,
                mirror: RecurrenceMirror::of(&rule),
            });
            store.save_rule(&rule)?;
            let txn = store.create_transaction(txn)?;
            BalanceAdjuster::adjust_stored(store, &txn, Direction::Apply)?;
            let generated = Materializer::extend_rule(store, &rule, self.horizon_months, today)?;
            info!(rule = %rule.id, generated, "recurring transaction created");
            return Ok(CreatedEntry {
                transaction: txn,
                rule: Some(rule),
                plan: None,
                generated,
            });
        }

        if let Some(count) = draft.installments {
            if txn.kind != TransactionKind::Expense {
                return Err(CoreError::Validation(
                    "only expenses can be split into installments".into(),
                ));
            }
            if !(2..=MAX_INSTALLMENTS).contains(&count) {
                return Err(CoreError::Validation(format!(
                    "installment count must be between 2 and {MAX_INSTALLMENTS}, got {count}"
                )));
            }
            let plan = InstallmentPlan {
                id: Uuid::new_v4(),
                account_id: account.id,
                category_id: txn.category_id,
                description: txn.description.clone(),
                total_amount: amount,
                installment_count: count,
                first_installment_date: InstallmentSplitter::first_installment_date(
                    &account, txn.date,
                ),
                tags: txn.tags.clone(),
            };
            let installments = InstallmentSplitter::create_installments(store, &plan, &txn)?;
            for installment in &installments {
                BalanceAdjuster::adjust_stored(store, installment, Direction::Apply)?;
            }
            let mut installments = installments.into_iter();
            let first = installments.next().ok_or_else(|| {
                CoreError::InvalidOperation("plan produced no installments".into())
            })?;
            info!(plan = %plan.id, count, "installment purchase created");
            return Ok(CreatedEntry {
                transaction: first,
                rule: None,
                plan: Some(plan),
                generated: installments.len(),
            });
        }

        let txn = store.create_transaction(txn)?;
        BalanceAdjuster::adjust_stored(store, &txn, Direction::Apply)?;
        debug!(transaction = %txn.id, "transaction created");
        Ok(CreatedEntry {
            transaction: txn,
            rule: None,
            plan: None,
            generated: 0,
        })
    }

    /// Edits `id` and, depending on `scope`, the rest of its series.
    ///
    /// Standalone entries ignore the scope. Date and payment changes only
    /// ever touch the edited entry.
    pub fn edit<S>(
        &self,
        store: &S,
        id: Uuid,
        scope: EditScope,
        changes: TransactionChanges,
        today: NaiveDate,
    ) -> Result<EditOutcome, CoreError>
    where
        S: LedgerStore + ?Sized,
    {
        let txn = store
            .find_transaction(id)?
            .ok_or(CoreError::TransactionNotFound(id))?;
        let changes = self.normalize_changes(store, changes)?;

        match (txn.origin.clone(), scope) {
            (None, _) => self.edit_single(store, txn, false, changes, today),
            (Some(_), EditScope::ThisOne) => self.edit_single(store, txn, true, changes, today),
            (Some(TransactionOrigin::Recurrence { rule_id, .. }), _) => {
                self.edit_rule_series(store, txn, rule_id, scope, changes, today)
            }
            (Some(TransactionOrigin::Installment { plan_id, index, .. }), _) => {
                self.edit_plan_series(store, txn, plan_id, index, scope, changes, today)
            }
        }
    }

    /// Flips an entry between pending and paid or received.
    pub fn toggle_paid<S>(
        &self,
        store: &S,
        id: Uuid,
        today: NaiveDate,
    ) -> Result<Transaction, CoreError>
    where
        S: LedgerStore + ?Sized,
    {
        let mut txn = store
            .find_transaction(id)?
            .ok_or(CoreError::TransactionNotFound(id))?;
        BalanceAdjuster::adjust_stored(store, &txn, Direction::Revert)?;
        if txn.is_effective() {
            txn.reopen();
        } else {
            txn.settle(today);
        }
        store.update_transaction(&txn)?;
        BalanceAdjuster::adjust_stored(store, &txn, Direction::Apply)?;
        debug!(transaction = %txn.id, status = %txn.status, "payment toggled");
        Ok(txn)
    }

    /// Removes an entry. A deleted rule occurrence is not generated again and
    /// a deleted installment leaves its plan total equal to the rest.
    pub fn delete<S>(&self, store: &S, id: Uuid) -> Result<Transaction, CoreError>
    where
        S: LedgerStore + ?Sized,
    {
        let txn = store
            .find_transaction(id)?
            .ok_or(CoreError::TransactionNotFound(id))?;
        BalanceAdjuster::adjust_stored(store, &txn, Direction::Revert)?;
        if let Some(rule_id) = txn.recurrence_rule_id() {
            skip_if_rule_exists(store, rule_id, txn.date)?;
        }
        store.delete_transaction(id)?;
        if let Some(plan_id) = txn.installment_plan_id() {
            resync_plan_total(store, plan_id)?;
        }
        debug!(transaction = %id, "transaction deleted");
        Ok(txn)
    }

    fn normalize_changes<S>(
        &self,
        store: &S,
        mut changes: TransactionChanges,
    ) -> Result<TransactionChanges, CoreError>
    where
        S: LedgerStore + ?Sized,
    {
        if let Some(amount) = changes.amount {
            changes.amount = Some(validate_amount(amount)?);
        }
        if let Some(description) = &changes.description {
            changes.description = Some(validate_description(description)?);
        }
        if let Some(tags) = &changes.tags {
            changes.tags = Some(sanitize_tags(tags));
        }
        if let Some(account_id) = changes.account_id {
            if store.find_account(account_id)?.is_none() {
                return Err(CoreError::AccountNotFound(account_id));
            }
        }
        Ok(changes)
    }

    /// Edits one entry, detaching it from its series first when it has one.
    fn edit_single<S>(
        &self,
        store: &S,
        mut txn: Transaction,
        detach: bool,
        changes: TransactionChanges,
        today: NaiveDate,
    ) -> Result<EditOutcome, CoreError>
    where
        S: LedgerStore + ?Sized,
    {
        if changes.recurrence.is_some() {
            return Err(CoreError::InvalidOperation(
                "the schedule can only change for future or all occurrences of a recurring entry"
                    .into(),
            ));
        }
        BalanceAdjuster::adjust_stored(store, &txn, Direction::Revert)?;
        let left_plan = txn.installment_plan_id().filter(|_| detach);
        if detach {
            if let Some(rule_id) = txn.recurrence_rule_id() {
                skip_if_rule_exists(store, rule_id, txn.date)?;
            }
            txn.detach();
            debug!(transaction = %txn.id, "entry detached from its series");
        }
        changes.apply_to(&mut txn, today);
        store.update_transaction(&txn)?;
        BalanceAdjuster::adjust_stored(store, &txn, Direction::Apply)?;
        if let Some(plan_id) = left_plan {
            resync_plan_total(store, plan_id)?;
        }
        Ok(EditOutcome {
            transaction: txn,
            affected: 1,
            generated: 0,
        })
    }

    fn edit_rule_series<S>(
        &self,
        store: &S,
        edited: Transaction,
        rule_id: Uuid,
        scope: EditScope,
        changes: TransactionChanges,
        today: NaiveDate,
    ) -> Result<EditOutcome, CoreError>
    where
        S: LedgerStore + ?Sized,
    {
        let mut rule = store
            .find_rule(rule_id)?
            .ok_or(CoreError::RuleNotFound(rule_id))?;

        let final_date = changes.date.unwrap_or(edited.date);
        let schedule = match changes.recurrence {
            Some(request) => {
                let (periodicity, end_date) = request.resolve(final_date)?;
                if let Some(end) = end_date {
                    if end < today {
                        return Err(CoreError::Validation(format!(
                            "recurrence end date {end} is in the past"
                        )));
                    }
                }
                Some((periodicity, end_date))
            }
            None => None,
        };
        let schedule_changed = schedule
            .map(|(periodicity, end_date)| {
                periodicity != rule.periodicity || end_date != rule.end_date
            })
            .unwrap_or(false);
        if final_date != edited.date && store.exists_on_date(rule_id, final_date)? {
            return Err(CoreError::InvalidOperation(format!(
                "rule {rule_id} already has an occurrence on {final_date}"
            )));
        }

        // Rule first, so it is validated before any balance moves and the
        // mirror written below matches it.
        if let Some(account_id) = changes.account_id {
            rule.account_id = account_id;
        }
        if let Some(category_id) = changes.category_id {
            rule.category_id = category_id;
        }
        if let Some(kind) = changes.kind {
            rule.kind = kind;
        }
        if let Some(amount) = changes.amount {
            rule.amount = amount;
        }
        if let Some(description) = &changes.description {
            rule.description = description.clone();
        }
        if let Some(tags) = &changes.tags {
            rule.tags = tags.clone();
        }
        if let Some((periodicity, end_date)) = schedule.filter(|_| schedule_changed) {
            rule.periodicity = periodicity;
            rule.end_date = end_date;
            rule.start_date = final_date;
        }
        rule.validate()?;

        let filter = match scope {
            EditScope::Future => TransactionFilter::for_rule(rule_id).from_date(edited.date),
            _ => TransactionFilter::for_rule(rule_id),
        };
        let before = store.find_transactions(&filter)?;
        for txn in &before {
            BalanceAdjuster::adjust_stored(store, txn, Direction::Revert)?;
        }

        let mirror = schedule_changed.then(|| RecurrenceMirror::of(&rule));
        let patch = changes.series_patch(mirror);
        let mut affected = store.bulk_update(&filter, &patch)?;

        let mut current = store
            .find_transaction(edited.id)?
            .ok_or(CoreError::TransactionNotFound(edited.id))?;
        if final_date != current.date {
            rule.skip(current.date);
            current.date = final_date;
        }
        match changes.paid {
            Some(true) if !current.is_effective() => current.settle(today),
            Some(false) => current.reopen(),
            _ => {}
        }
        store.update_transaction(&current)?;
        if let Some(slot) = affected.iter_mut().find(|t| t.id == current.id) {
            *slot = current.clone();
        }

        for txn in &affected {
            BalanceAdjuster::adjust_stored(store, txn, Direction::Apply)?;
        }

        if schedule_changed {
            let stale = store.delete_transactions(
                &TransactionFilter::for_rule(rule_id)
                    .with_status(TransactionStatus::Pending)
                    .from_date(final_date + Duration::days(1)),
            )?;
            debug!(rule = %rule_id, removed = stale.len(), "pending occurrences rescheduled");
        }
        store.save_rule(&rule)?;
        let generated = Materializer::extend_rule(store, &rule, self.horizon_months, today)?;

        info!(
            rule = %rule_id,
            ?scope,
            affected = affected.len(),
            generated,
            "recurring series edited"
        );
        Ok(EditOutcome {
            transaction: current,
            affected: affected.len(),
            generated,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn edit_plan_series<S>(
        &self,
        store: &S,
        edited: Transaction,
        plan_id: Uuid,
        index: u32,
        scope: EditScope,
        changes: TransactionChanges,
        today: NaiveDate,
    ) -> Result<EditOutcome, CoreError>
    where
        S: LedgerStore + ?Sized,
    {
        if changes.recurrence.is_some() {
            return Err(CoreError::InvalidOperation(
                "installment entries cannot be made recurring".into(),
            ));
        }
        if changes.kind == Some(TransactionKind::Income) {
            return Err(CoreError::Validation("installments must remain expenses".into()));
        }
        let mut plan = store
            .find_plan(plan_id)?
            .ok_or(CoreError::PlanNotFound(plan_id))?;

        let filter = match scope {
            EditScope::Future => TransactionFilter::for_plan(plan_id).from_index(index),
            _ => TransactionFilter::for_plan(plan_id),
        };
        let siblings = store.find_transactions(&filter)?;
        if !siblings.iter().any(|txn| txn.id == edited.id) {
            return Err(CoreError::TransactionNotFound(edited.id));
        }

        // Amount stays per installment so the plan keeps adding up.
        let patch = TransactionPatch {
            account_id: changes.account_id,
            category_id: changes.category_id,
            tags: changes.tags.clone(),
            ..TransactionPatch::default()
        };
        let base_description = changes
            .description
            .clone()
            .unwrap_or_else(|| plan.description.clone());

        let mut affected = Vec::with_capacity(siblings.len());
        let mut edited_after = None;
        for stored in siblings {
            let mut txn = stored.clone();
            patch.apply(&mut txn);
            if changes.description.is_some() {
                if let Some((position, total)) = txn.installment_position() {
                    txn.description = installment_description(&base_description, position, total);
                }
            }
            if txn.id == edited.id {
                if let Some(amount) = changes.amount {
                    txn.amount = amount;
                }
                if let Some(date) = changes.date {
                    txn.date = date;
                }
                match changes.paid {
                    Some(true) if !txn.is_effective() => txn.settle(today),
                    Some(false) => txn.reopen(),
                    _ => {}
                }
                edited_after = Some(txn.clone());
            }
            // Per row, so a failed write leaves balances matching storage.
            BalanceAdjuster::adjust_stored(store, &stored, Direction::Revert)?;
            if let Err(err) = store.update_transaction(&txn) {
                BalanceAdjuster::adjust_stored(store, &stored, Direction::Apply)?;
                return Err(err);
            }
            BalanceAdjuster::adjust_stored(store, &txn, Direction::Apply)?;
            affected.push(txn);
        }

        if let Some(account_id) = changes.account_id {
            plan.account_id = account_id;
        }
        if let Some(category_id) = changes.category_id {
            plan.category_id = category_id;
        }
        if let Some(tags) = &changes.tags {
            plan.tags = tags.clone();
        }
        plan.description = base_description;
        plan.total_amount = plan_member_total(store, plan_id)?;
        store.save_plan(&plan)?;

        let transaction = edited_after.ok_or(CoreError::TransactionNotFound(edited.id))?;
        info!(plan = %plan_id, ?scope, affected = affected.len(), "installment series edited");
        Ok(EditOutcome {
            transaction,
            affected: affected.len(),
            generated: 0,
        })
    }
}

fn validate_amount(amount: Decimal) -> Result<Decimal, CoreError> {
    let amount = round_cents(amount);
    if amount <= Decimal::ZERO {
        return Err(CoreError::Validation(format!(
            "amount must be at least 0.01, got {amount}"
        )));
    }
    Ok(amount)
}

fn validate_description(description: &str) -> Result<String, CoreError> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("description is required".into()));
    }
    Ok(trimmed.to_string())
}

fn plan_member_total<S>(store: &S, plan_id: Uuid) -> Result<Decimal, CoreError>
where
    S: LedgerStore + ?Sized,
{
    Ok(store
        .find_transactions(&TransactionFilter::for_plan(plan_id))?
        .iter()
        .map(|txn| txn.amount)
        .sum())
}

/// Sets the plan total to the sum of the installments still attached to it.
fn resync_plan_total<S>(store: &S, plan_id: Uuid) -> Result<(), CoreError>
where
    S: LedgerStore + ?Sized,
{
    let Some(mut plan) = store.find_plan(plan_id)? else {
        return Ok(());
    };
    plan.total_amount = plan_member_total(store, plan_id)?;
    store.save_plan(&plan)?;
    debug!(plan = %plan_id, total = %plan.total_amount, "plan total resynced");
    Ok(())
}

fn skip_if_rule_exists<S>(store: &S, rule_id: Uuid, date: NaiveDate) -> Result<(), CoreError>
where
    S: LedgerStore + ?Sized,
{
    match RecurrenceService::skip_date(store, rule_id, date) {
        Ok(_) | Err(CoreError::RuleNotFound(_)) => Ok(()),
        Err(err) => Err(err),
    }
}
