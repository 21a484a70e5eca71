//! Keeps each account's cached balance in step with its effective transactions.

use rust_decimal::Decimal;
use tracing::warn;

use kitamo_domain::{Account, Transaction};

use crate::{storage::AccountRepository, CoreError};

/// Whether a transaction's effect is being added or taken back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Apply,
    Revert,
}

impl Direction {
    pub fn sign(self) -> Decimal {
        match self {
            Direction::Apply => Decimal::ONE,
            Direction::Revert => Decimal::NEGATIVE_ONE,
        }
    }
}

/// Applies or reverts the cash effect of single transactions.
///
/// Callers revert the old state before an update or delete and apply the new
/// state afterwards.
pub struct BalanceAdjuster;

impl BalanceAdjuster {
    /// Signed change `txn` makes to its account in `direction`; zero while pending.
    pub fn delta(txn: &Transaction, direction: Direction) -> Decimal {
        if !txn.is_effective() {
            return Decimal::ZERO;
        }
        txn.signed_amount() * direction.sign()
    }

    pub fn adjust(account: &mut Account, txn: &Transaction, direction: Direction) {
        account.current_balance += Self::delta(txn, direction);
    }

    /// Adjusts the stored account of `txn` under the store's per-account lock.
    ///
    /// A transaction whose account no longer exists is logged and ignored.
    pub fn adjust_stored<S>(
        store: &S,
        txn: &Transaction,
        direction: Direction,
    ) -> Result<(), CoreError>
    where
        S: AccountRepository + ?Sized,
    {
        let delta = Self::delta(txn, direction);
        if delta.is_zero() {
            return Ok(());
        }
        let found = store.update_account(txn.account_id, &mut |account| {
            account.current_balance += delta;
        })?;
        if !found {
            warn!(
                account = %txn.account_id,
                transaction = %txn.id,
                "balance adjustment skipped; account missing"
            );
        }
        Ok(())
    }

    /// Initial balance plus the signed sum of the account's effective transactions.
    pub fn recompute<'a>(
        account: &Account,
        transactions: impl IntoIterator<Item = &'a Transaction>,
    ) -> Decimal {
        transactions
            .into_iter()
            .filter(|txn| txn.account_id == account.id)
            .fold(account.initial_balance, |balance, txn| {
                balance + Self::delta(txn, Direction::Apply)
            })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use kitamo_domain::{AccountKind, TransactionKind};

    use super::*;
    use crate::InMemoryStore;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn checking() -> Account {
        Account::new("Checking", AccountKind::Checking, dec!(500.00))
    }

    #[test]
    fn pending_transactions_do_not_move_balance() {
        let mut account = checking();
        let txn = Transaction::new(
            account.id,
            TransactionKind::Expense,
            dec!(80.00),
            "Groceries",
            today(),
        );
        BalanceAdjuster::adjust(&mut account, &txn, Direction::Apply);
        assert_eq!(account.current_balance, dec!(500.00));
    }

    #[test]
    fn apply_then_revert_is_symmetric() {
        let mut account = checking();
        let mut salary = Transaction::new(
            account.id,
            TransactionKind::Income,
            dec!(1200.00),
            "Salary",
            today(),
        );
        salary.settle(today());

        BalanceAdjuster::adjust(&mut account, &salary, Direction::Apply);
        assert_eq!(account.current_balance, dec!(1700.00));
        BalanceAdjuster::adjust(&mut account, &salary, Direction::Revert);
        assert_eq!(account.current_balance, dec!(500.00));
    }

    #[test]
    fn expense_subtracts() {
        let mut account = checking();
        let mut rent = Transaction::new(
            account.id,
            TransactionKind::Expense,
            dec!(700.00),
            "Rent",
            today(),
        );
        rent.settle(today());
        BalanceAdjuster::adjust(&mut account, &rent, Direction::Apply);
        assert_eq!(account.current_balance, dec!(-200.00));
    }

    #[test]
    fn stored_adjustment_updates_account() {
        let store = InMemoryStore::new();
        let account = checking();
        store.save_account(&account).unwrap();
        let mut txn = Transaction::new(
            account.id,
            TransactionKind::Expense,
            dec!(20.00),
            "Coffee",
            today(),
        );
        txn.settle(today());

        BalanceAdjuster::adjust_stored(&store, &txn, Direction::Apply).unwrap();
        let stored = store.find_account(account.id).unwrap().unwrap();
        assert_eq!(stored.current_balance, dec!(480.00));
    }

    #[test]
    fn recompute_counts_only_effective_rows() {
        let account = checking();
        let mut paid = Transaction::new(
            account.id,
            TransactionKind::Expense,
            dec!(50.00),
            "Paid",
            today(),
        );
        paid.settle(today());
        let pending = Transaction::new(
            account.id,
            TransactionKind::Expense,
            dec!(75.00),
            "Pending",
            today(),
        );
        let other = Transaction::new(
            uuid::Uuid::new_v4(),
            TransactionKind::Income,
            dec!(10.00),
            "Elsewhere",
            today(),
        );
        let balance = BalanceAdjuster::recompute(&account, [&paid, &pending, &other]);
        assert_eq!(balance, dec!(450.00));
    }
}
