//! Splits one purchase into dated installments whose amounts add up exactly.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use tracing::debug;

use kitamo_domain::{
    add_months, days_in_month, money::round_cents, Account, InstallmentPlan, Transaction,
    TransactionOrigin, TransactionStatus, MAX_INSTALLMENTS,
};

use crate::{
    storage::{PlanRepository, TransactionRepository},
    CoreError,
};

pub struct InstallmentSplitter;

impl InstallmentSplitter {
    /// Date of the first installment of a purchase made on `purchase` from `account`.
    ///
    /// Credit cards bill a purchase made on or before the closing day in the
    /// same month and later purchases in the next one, on the due day clamped
    /// to the month length. Cards without billing days fall back to one month
    /// after the purchase; other accounts use the purchase date.
    pub fn first_installment_date(account: &Account, purchase: NaiveDate) -> NaiveDate {
        if !account.is_credit_card() {
            return purchase;
        }
        let Some((closing_day, due_day)) = account.billing_days() else {
            return add_months(purchase, 1);
        };
        let cycle = if purchase.day() <= closing_day {
            purchase
        } else {
            add_months(purchase.with_day(1).unwrap_or(purchase), 1)
        };
        let day = due_day.min(days_in_month(cycle.year(), cycle.month()));
        NaiveDate::from_ymd_opt(cycle.year(), cycle.month(), day).unwrap_or(cycle)
    }

    /// Per-installment amounts; the rounding remainder goes to the first one.
    pub fn split_amounts(total: Decimal, count: u32) -> Result<Vec<Decimal>, CoreError> {
        validate_count(count)?;
        if total <= Decimal::ZERO {
            return Err(CoreError::Validation(format!(
                "installment total must be positive, got {total}"
            )));
        }
        let total = round_cents(total);
        let per_installment = round_cents(total / Decimal::from(count));
        let remainder = total - per_installment * Decimal::from(count);

        let mut amounts = vec![per_installment; count as usize];
        amounts[0] += remainder;
        Ok(amounts)
    }

    /// Builds every installment of `plan`.
    ///
    /// Installment 1 keeps the identity, status, payment date and description
    /// of `template`; the others are new pending rows one calendar month apart.
    pub fn split(
        plan: &InstallmentPlan,
        template: &Transaction,
    ) -> Result<Vec<Transaction>, CoreError> {
        let count = plan.installment_count;
        let amounts = Self::split_amounts(plan.total_amount, count)?;

        let installments = amounts
            .into_iter()
            .zip(1..=count)
            .map(|(amount, index)| {
                let date = add_months(plan.first_installment_date, (index - 1) as i32);
                let mut txn = if index == 1 {
                    template.clone()
                } else {
                    let mut next = Transaction::new(
                        plan.account_id,
                        template.kind,
                        amount,
                        installment_description(&plan.description, index, count),
                        date,
                    );
                    next.status = TransactionStatus::Pending;
                    next.paid_at = None;
                    next
                };
                txn.account_id = plan.account_id;
                txn.category_id = plan.category_id;
                txn.tags = plan.tags.clone();
                txn.amount = amount;
                txn.date = date;
                txn.origin = Some(TransactionOrigin::Installment {
                    plan_id: plan.id,
                    index,
                    total: count,
                });
                txn
            })
            .collect();
        Ok(installments)
    }

    /// Saves `plan` and stores its installments.
    ///
    /// Installment 1 replaces `template` when it is already stored and is
    /// created otherwise. Balances are left to the caller.
    pub fn create_installments<S>(
        store: &S,
        plan: &InstallmentPlan,
        template: &Transaction,
    ) -> Result<Vec<Transaction>, CoreError>
    where
        S: TransactionRepository + PlanRepository + ?Sized,
    {
        let installments = Self::split(plan, template)?;
        store.save_plan(plan)?;
        for txn in &installments {
            if txn.id == template.id && store.find_transaction(txn.id)?.is_some() {
                store.update_transaction(txn)?;
            } else {
                store.create_transaction(txn.clone())?;
            }
        }
        debug!(
            plan = %plan.id,
            count = plan.installment_count,
            total = %plan.total_amount,
            "installments created"
        );
        Ok(installments)
    }
}

/// Description carried by installment `index` of `count`.
pub fn installment_description(base: &str, index: u32, count: u32) -> String {
    if index <= 1 {
        base.to_string()
    } else {
        format!("{base} ({index}/{count})")
    }
}

fn validate_count(count: u32) -> Result<(), CoreError> {
    if !(2..=MAX_INSTALLMENTS).contains(&count) {
        return Err(CoreError::Validation(format!(
            "installment count must be between 2 and {MAX_INSTALLMENTS}, got {count}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use kitamo_domain::{AccountKind, TransactionKind};

    use super::*;
    use crate::InMemoryStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn card(closing_day: Option<u32>, due_day: Option<u32>) -> Account {
        Account::new(
            "Card",
            AccountKind::CreditCard {
                closing_day,
                due_day,
            },
            Decimal::ZERO,
        )
    }

    fn plan(total: Decimal, count: u32, first: NaiveDate) -> InstallmentPlan {
        InstallmentPlan {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            category_id: None,
            description: "Laptop".into(),
            total_amount: total,
            installment_count: count,
            first_installment_date: first,
            tags: vec!["tech".into()],
        }
    }

    #[test]
    fn remainder_goes_to_first_installment() {
        let amounts = InstallmentSplitter::split_amounts(dec!(100.00), 3).unwrap();
        assert_eq!(amounts, vec![dec!(33.34), dec!(33.33), dec!(33.33)]);
    }

    #[test]
    fn negative_remainder_is_absorbed_too() {
        let amounts = InstallmentSplitter::split_amounts(dec!(200.00), 3).unwrap();
        assert_eq!(amounts, vec![dec!(66.66), dec!(66.67), dec!(66.67)]);
        assert_eq!(amounts.iter().copied().sum::<Decimal>(), dec!(200.00));
    }

    #[test]
    fn rejects_out_of_range_counts() {
        assert!(InstallmentSplitter::split_amounts(dec!(10), 1).is_err());
        assert!(InstallmentSplitter::split_amounts(dec!(10), 100).is_err());
        assert!(InstallmentSplitter::split_amounts(dec!(0), 2).is_err());
    }

    #[test]
    fn plain_account_uses_purchase_date() {
        let wallet = Account::new("Wallet", AccountKind::Wallet, Decimal::ZERO);
        let purchase = date(2025, 3, 20);
        assert_eq!(
            InstallmentSplitter::first_installment_date(&wallet, purchase),
            purchase
        );
    }

    #[test]
    fn card_purchase_before_closing_stays_in_cycle() {
        let card = card(Some(10), Some(17));
        assert_eq!(
            InstallmentSplitter::first_installment_date(&card, date(2025, 3, 10)),
            date(2025, 3, 17)
        );
    }

    #[test]
    fn card_purchase_after_closing_rolls_over() {
        let card = card(Some(10), Some(17));
        assert_eq!(
            InstallmentSplitter::first_installment_date(&card, date(2025, 3, 11)),
            date(2025, 4, 17)
        );
    }

    #[test]
    fn card_due_day_is_clamped() {
        let card = card(Some(5), Some(31));
        assert_eq!(
            InstallmentSplitter::first_installment_date(&card, date(2025, 3, 31)),
            date(2025, 4, 30)
        );
        assert_eq!(
            InstallmentSplitter::first_installment_date(&card, date(2025, 1, 31)),
            date(2025, 2, 28)
        );
    }

    #[test]
    fn card_without_billing_days_adds_a_month() {
        let card = card(None, Some(0));
        assert_eq!(
            InstallmentSplitter::first_installment_date(&card, date(2025, 1, 31)),
            date(2025, 2, 28)
        );
    }

    #[test]
    fn split_keeps_template_identity_on_first_installment() {
        let plan = plan(dec!(100.00), 3, date(2025, 1, 31));
        let mut template = Transaction::new(
            plan.account_id,
            TransactionKind::Expense,
            dec!(100.00),
            "Laptop",
            date(2025, 1, 31),
        );
        template.settle(date(2025, 1, 31));

        let rows = InstallmentSplitter::split(&plan, &template).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].id, template.id);
        assert_eq!(rows[0].status, TransactionStatus::Paid);
        assert_eq!(rows[0].amount, dec!(33.34));
        assert_eq!(rows[1].status, TransactionStatus::Pending);
        assert!(rows[1].paid_at.is_none());
        assert_eq!(rows[1].description, "Laptop (2/3)");
        let dates: Vec<_> = rows.iter().map(|t| t.date).collect();
        assert_eq!(
            dates,
            vec![date(2025, 1, 31), date(2025, 2, 28), date(2025, 3, 31)]
        );
        assert!(rows
            .iter()
            .all(|t| t.installment_plan_id() == Some(plan.id) && t.recurrence_rule_id().is_none()));
        assert_eq!(rows[2].installment_position(), Some((3, 3)));
    }

    #[test]
    fn create_installments_replaces_stored_template() {
        let store = InMemoryStore::new();
        let plan = plan(dec!(90.00), 2, date(2025, 5, 1));
        let template = Transaction::new(
            plan.account_id,
            TransactionKind::Expense,
            dec!(90.00),
            "Laptop",
            date(2025, 5, 1),
        );
        store.create_transaction(template.clone()).unwrap();

        InstallmentSplitter::create_installments(&store, &plan, &template).unwrap();

        let stored = store
            .find_transactions(&crate::TransactionFilter::for_plan(plan.id))
            .unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(store.find_plan(plan.id).unwrap(), Some(plan));
        assert_eq!(
            store.find_transaction(template.id).unwrap().unwrap().amount,
            dec!(45.00)
        );
    }
}
