//! Property-based tests for the recurrence and projection engine.
//!
//! Run with: cargo test -p kitamo-core --test engine_properties

use chrono::{Datelike, Duration, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use kitamo_core::{
    scheduler, AccountRepository, BalanceAdjuster, BalanceProjector, Direction, InMemoryStore,
    InstallmentSplitter, Materializer, ProjectionScope, RuleRepository, TransactionFilter,
    TransactionRepository,
};
use kitamo_domain::{
    add_months, days_in_month, Account, AccountKind, Periodicity, RecurrenceRule, Transaction,
    TransactionKind,
};

// ============================================================================
// Arbitrary generators
// ============================================================================

fn arb_positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|n| Decimal::new(n, 2))
}

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (2023i32..2027i32, 1u32..13u32, 1u32..32u32).prop_map(|(y, m, d)| {
        let day = d.min(days_in_month(y, m));
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    })
}

fn arb_periodicity() -> impl Strategy<Value = Periodicity> {
    prop_oneof![
        Just(Periodicity::Monthly),
        Just(Periodicity::Biweekly),
        (1u32..60u32).prop_map(|days| Periodicity::EveryNDays { days }),
        (1u32..13u32).prop_map(|months| Periodicity::EveryNMonths { months }),
    ]
}

fn arb_kind() -> impl Strategy<Value = TransactionKind> {
    prop_oneof![Just(TransactionKind::Income), Just(TransactionKind::Expense)]
}

fn arb_rule(account_id: Uuid) -> impl Strategy<Value = RecurrenceRule> {
    (
        arb_kind(),
        arb_positive_amount(),
        arb_periodicity(),
        arb_date(),
        prop::option::of(0i64..800i64),
    )
        .prop_map(move |(kind, amount, periodicity, start, end_offset)| {
            RecurrenceRule::new(account_id, kind, amount, "Generated", periodicity, start)
                .with_end_date(end_offset.map(|days| start + Duration::days(days)))
        })
}

fn store_with_account() -> (InMemoryStore, Account) {
    let store = InMemoryStore::new();
    let account = Account::new("Checking", AccountKind::Checking, Decimal::new(100_000, 2));
    store.save_account(&account).unwrap();
    (store, account)
}

/// Dates `next_date` yields from the start, while active and before `target`.
fn expected_dates(rule: &RecurrenceRule, target: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut cursor = rule.start_date;
    loop {
        cursor = scheduler::next_date(cursor, rule);
        if !scheduler::is_active(rule, cursor) || cursor >= target {
            break;
        }
        dates.push(cursor);
    }
    dates
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Installments always add up to the purchase total to the cent.
    #[test]
    fn installment_amounts_sum_to_total(
        total in arb_positive_amount(),
        count in 2u32..=99u32,
    ) {
        let amounts = InstallmentSplitter::split_amounts(total, count).unwrap();
        prop_assert_eq!(amounts.len(), count as usize);
        prop_assert_eq!(amounts.iter().copied().sum::<Decimal>(), total);
        for amount in &amounts[1..] {
            prop_assert_eq!(*amount, amounts[1]);
        }
    }

    /// Card purchases land on the due day of the purchase cycle or the next one.
    #[test]
    fn card_first_installment_follows_billing_cycle(
        closing in 1u32..=31u32,
        due in 1u32..=31u32,
        purchase in arb_date(),
    ) {
        let card = Account::new(
            "Card",
            AccountKind::CreditCard { closing_day: Some(closing), due_day: Some(due) },
            Decimal::ZERO,
        );
        let first = InstallmentSplitter::first_installment_date(&card, purchase);
        let cycle = if purchase.day() <= closing {
            purchase
        } else {
            add_months(purchase.with_day(1).unwrap(), 1)
        };
        prop_assert_eq!((first.year(), first.month()), (cycle.year(), cycle.month()));
        prop_assert_eq!(first.day(), due.min(days_in_month(cycle.year(), cycle.month())));
    }

    /// After one extension every expected occurrence exists exactly once, and
    /// a second extension creates nothing.
    #[test]
    fn extension_is_complete_and_idempotent(
        rule in arb_rule(Uuid::new_v4()),
        today_offset in 0i64..400i64,
        horizon in 1u32..=24u32,
    ) {
        let store = InMemoryStore::new();
        store.save_rule(&rule).unwrap();
        let today = rule.start_date + Duration::days(today_offset);

        let created = Materializer::extend(&store, rule.id, horizon, today).unwrap();
        let stored: Vec<NaiveDate> = store
            .find_transactions(&TransactionFilter::for_rule(rule.id))
            .unwrap()
            .iter()
            .map(|txn| txn.date)
            .collect();
        let expected = expected_dates(&rule, Materializer::target_date(today, horizon));

        prop_assert_eq!(created, expected.len());
        prop_assert_eq!(stored, expected);
        prop_assert_eq!(Materializer::extend(&store, rule.id, horizon, today).unwrap(), 0);
    }

    /// Simulated and materialized occurrences give the same projected balance.
    #[test]
    fn projection_matches_materialization(
        seed_rule in arb_rule(Uuid::nil()),
        today_offset in 0i64..400i64,
        horizon in 1u32..=24u32,
        as_of_fraction in 0u32..100u32,
    ) {
        let (store, account) = store_with_account();
        let rule = RecurrenceRule { account_id: account.id, ..seed_rule };
        store.save_rule(&rule).unwrap();
        let today = rule.start_date + Duration::days(today_offset);
        let target = Materializer::target_date(today, horizon);
        let span = (target - today).num_days() - 1;
        let as_of = today + Duration::days(span * i64::from(as_of_fraction) / 100);
        let scope = ProjectionScope::Account(account.id);

        let simulated = BalanceProjector::project_balance(&store, scope, today, as_of).unwrap();
        Materializer::extend(&store, rule.id, horizon, today).unwrap();
        let projection =
            BalanceProjector::project_daily_series(&store, scope, today, as_of).unwrap();

        prop_assert!(projection.simulated.is_empty());
        prop_assert_eq!(projection.closing_balance, simulated);
    }

    /// Applying and reverting a transaction leaves the balance untouched.
    #[test]
    fn adjuster_apply_revert_is_symmetric(
        amount in arb_positive_amount(),
        kind in arb_kind(),
        settled in any::<bool>(),
        on in arb_date(),
    ) {
        let mut account = Account::new("Wallet", AccountKind::Wallet, Decimal::new(12_345, 2));
        let mut txn = Transaction::new(account.id, kind, amount, "Any", on);
        if settled {
            txn.settle(on);
        }
        let before = account.current_balance;

        BalanceAdjuster::adjust(&mut account, &txn, Direction::Apply);
        BalanceAdjuster::adjust(&mut account, &txn, Direction::Revert);
        prop_assert_eq!(account.current_balance, before);

        BalanceAdjuster::adjust(&mut account, &txn, Direction::Revert);
        BalanceAdjuster::adjust(&mut account, &txn, Direction::Apply);
        prop_assert_eq!(account.current_balance, before);
    }
}
