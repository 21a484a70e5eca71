//! Read-only balance projection.
//!
//! Starts from cached account balances and walks forward day by day, adding
//! stored pending transactions and the occurrences rules would generate but
//! have not been materialized yet. Nothing is written.

use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use tracing::{debug, warn};
use uuid::Uuid;

use kitamo_domain::{
    add_months, days_in_month, money, Account, TransactionKind, TransactionStatus,
};

use crate::{
    scheduler,
    storage::{AccountRepository, RuleRepository, TransactionFilter, TransactionRepository},
    CoreError,
};

/// Which accounts a projection covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionScope {
    Account(Uuid),
    /// Cash-like accounts counted toward net worth. Credit cards are excluded.
    NetWorth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyBalance {
    pub date: NaiveDate,
    /// Balance at the end of `date`.
    pub balance: Decimal,
}

/// A rule occurrence counted by the projection without being stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedOccurrence {
    pub rule_id: Uuid,
    pub account_id: Uuid,
    pub date: NaiveDate,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub description: String,
}

impl SimulatedOccurrence {
    pub fn signed_amount(&self) -> Decimal {
        money::signed(self.kind, self.amount)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub scope: ProjectionScope,
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Sum of the cached balances of the scope's accounts.
    pub start_balance: Decimal,
    pub daily: Vec<DailyBalance>,
    pub closing_balance: Decimal,
    pub first_negative_date: Option<NaiveDate>,
    pub simulated: Vec<SimulatedOccurrence>,
}

impl Projection {
    pub fn balance_on(&self, date: NaiveDate) -> Option<Decimal> {
        self.daily
            .iter()
            .find(|entry| entry.date == date)
            .map(|entry| entry.balance)
    }

    /// Alert when the balance first goes negative within `within_days` of `today`.
    pub fn alert(&self, today: NaiveDate, within_days: u32) -> Option<BalanceAlert> {
        let date = self.first_negative_date?;
        let days_ahead = (date - today).num_days();
        if days_ahead > i64::from(within_days) {
            return None;
        }
        let balance = self.balance_on(date)?;
        Some(BalanceAlert {
            scope: self.scope,
            date,
            balance,
            days_ahead: days_ahead.max(0),
        })
    }
}

/// Raised when a projected balance turns negative soon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceAlert {
    pub scope: ProjectionScope,
    pub date: NaiveDate,
    pub balance: Decimal,
    pub days_ahead: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthlyBalance {
    pub year: i32,
    pub month: u32,
    /// Projected balance on the last day of the month.
    pub closing_balance: Decimal,
}

/// Spending pace and month-end estimate for the current month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthOutlook {
    pub scope: ProjectionScope,
    /// Expenses settled since the first of the month, per elapsed day.
    pub average_daily_spend: Decimal,
    /// `average_daily_spend` over the days left in the month.
    pub projected_spend: Decimal,
    pub estimated_month_end_balance: Decimal,
    pub first_negative_date: Option<NaiveDate>,
}

pub struct BalanceProjector;

impl BalanceProjector {
    /// Projected end-of-day balances for every date in `[from, to]`.
    ///
    /// `from` is the current date: cached balances already include every
    /// effective transaction, so only pending rows and simulated occurrences
    /// dated within the window are added.
    pub fn project_daily_series<S>(
        store: &S,
        scope: ProjectionScope,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Projection, CoreError>
    where
        S: TransactionRepository + RuleRepository + AccountRepository + ?Sized,
    {
        if to < from {
            return Err(CoreError::Validation(format!(
                "projection end {to} is before its start {from}"
            )));
        }

        let accounts = Self::scope_accounts(store, scope)?;
        let account_ids: Vec<Uuid> = accounts.iter().map(|a| a.id).collect();
        let start_balance: Decimal = accounts.iter().map(|a| a.current_balance).sum();

        let mut deltas: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
        let pending = store.find_transactions(
            &TransactionFilter::for_accounts(account_ids.clone())
                .with_status(TransactionStatus::Pending)
                .between(from, to),
        )?;
        for txn in &pending {
            *deltas.entry(txn.date).or_default() += txn.signed_amount();
        }

        let simulated = Self::simulate(store, &account_ids, from, to)?;
        for occurrence in &simulated {
            *deltas.entry(occurrence.date).or_default() += occurrence.signed_amount();
        }

        let mut balance = start_balance;
        let mut first_negative_date = None;
        let mut daily = Vec::with_capacity((to - from).num_days() as usize + 1);
        let mut date = from;
        while date <= to {
            if let Some(delta) = deltas.get(&date) {
                balance += *delta;
            }
            if first_negative_date.is_none() && balance < Decimal::ZERO {
                first_negative_date = Some(date);
            }
            daily.push(DailyBalance { date, balance });
            date += Duration::days(1);
        }

        debug!(
            ?scope,
            %from,
            %to,
            pending = pending.len(),
            simulated = simulated.len(),
            "projection computed"
        );

        Ok(Projection {
            scope,
            from,
            to,
            start_balance,
            daily,
            closing_balance: balance,
            first_negative_date,
            simulated,
        })
    }

    /// Projected balance at the end of `as_of`, walking from `today`.
    pub fn project_balance<S>(
        store: &S,
        scope: ProjectionScope,
        today: NaiveDate,
        as_of: NaiveDate,
    ) -> Result<Decimal, CoreError>
    where
        S: TransactionRepository + RuleRepository + AccountRepository + ?Sized,
    {
        Ok(Self::project_daily_series(store, scope, today, as_of)?.closing_balance)
    }

    /// Month-end balances for the current month and the `months - 1` after it.
    pub fn project_monthly<S>(
        store: &S,
        scope: ProjectionScope,
        today: NaiveDate,
        months: u32,
    ) -> Result<Vec<MonthlyBalance>, CoreError>
    where
        S: TransactionRepository + RuleRepository + AccountRepository + ?Sized,
    {
        if months == 0 {
            return Ok(Vec::new());
        }
        let last_month = add_months(today, months as i32 - 1);
        let to = last_day_of_month(last_month);
        let projection = Self::project_daily_series(store, scope, today, to)?;

        let mut monthly = Vec::with_capacity(months as usize);
        for entry in &projection.daily {
            if entry.date == last_day_of_month(entry.date) {
                monthly.push(MonthlyBalance {
                    year: entry.date.year(),
                    month: entry.date.month(),
                    closing_balance: entry.balance,
                });
            }
        }
        Ok(monthly)
    }

    /// Outlook from `today` to the end of its month.
    pub fn month_outlook<S>(
        store: &S,
        scope: ProjectionScope,
        today: NaiveDate,
    ) -> Result<MonthOutlook, CoreError>
    where
        S: TransactionRepository + RuleRepository + AccountRepository + ?Sized,
    {
        let month_start = today.with_day(1).unwrap_or(today);
        let month_end = last_day_of_month(today);
        let projection = Self::project_daily_series(store, scope, today, month_end)?;

        let account_ids = Self::scope_accounts(store, scope)?
            .into_iter()
            .map(|account| account.id)
            .collect();
        let spent: Decimal = store
            .find_transactions(
                &TransactionFilter::for_accounts(account_ids).with_status(TransactionStatus::Paid),
            )?
            .iter()
            .filter(|txn| txn.kind == TransactionKind::Expense)
            .filter(|txn| {
                txn.paid_at
                    .is_some_and(|paid| paid >= month_start && paid <= today)
            })
            .map(|txn| txn.amount)
            .sum();

        let days_elapsed = Decimal::from(today.day());
        let days_left = Decimal::from((month_end - today).num_days());
        let average_daily_spend = money::round_cents(spent / days_elapsed);

        Ok(MonthOutlook {
            scope,
            average_daily_spend,
            projected_spend: money::round_cents(average_daily_spend * days_left),
            estimated_month_end_balance: projection.closing_balance,
            first_negative_date: projection.first_negative_date,
        })
    }

    fn scope_accounts<S>(store: &S, scope: ProjectionScope) -> Result<Vec<Account>, CoreError>
    where
        S: AccountRepository + ?Sized,
    {
        match scope {
            ProjectionScope::Account(id) => {
                let account = store
                    .find_account(id)?
                    .ok_or(CoreError::AccountNotFound(id))?;
                Ok(vec![account])
            }
            ProjectionScope::NetWorth => Ok(store
                .accounts()?
                .into_iter()
                .filter(Account::counts_toward_net_worth)
                .collect()),
        }
    }

    /// Occurrences in `[from, to]` of rules booked on `account_ids` that have
    /// no stored transaction on their date.
    ///
    /// Rules failing validation are skipped so one bad record cannot block
    /// the projection.
    fn simulate<S>(
        store: &S,
        account_ids: &[Uuid],
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SimulatedOccurrence>, CoreError>
    where
        S: TransactionRepository + RuleRepository + ?Sized,
    {
        let mut simulated = Vec::new();
        for rule in store.rules()? {
            if !account_ids.contains(&rule.account_id) || !rule.active {
                continue;
            }
            if let Err(err) = rule.validate() {
                warn!(rule = %rule.id, error = %err, "ignoring malformed rule in projection");
                continue;
            }

            let stored: HashSet<NaiveDate> = store
                .find_transactions(&TransactionFilter::for_rule(rule.id).between(from, to))?
                .into_iter()
                .map(|txn| txn.date)
                .collect();

            let after = from - Duration::days(1);
            simulated.extend(
                scheduler::occurrences_after(&rule, after)
                    .take_while(|date| *date <= to)
                    .filter(|date| !stored.contains(date))
                    .map(|date| SimulatedOccurrence {
                        rule_id: rule.id,
                        account_id: rule.account_id,
                        date,
                        kind: rule.kind,
                        amount: rule.amount,
                        description: rule.description.clone(),
                    }),
            );
        }
        simulated.sort_by(|a, b| a.date.cmp(&b.date).then(a.rule_id.cmp(&b.rule_id)));
        Ok(simulated)
    }
}

fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let day = days_in_month(date.year(), date.month());
    date.with_day(day).unwrap_or(date)
}
