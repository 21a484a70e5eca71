use std::fs;

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use tempfile::tempdir;

use kitamo_core::{
    AccountRepository, CoreError, LedgerService, Materializer, RecurrenceRequest, RuleRepository,
    TransactionDraft, TransactionFilter, TransactionRepository,
};
use kitamo_domain::{Account, AccountKind, Periodicity, RecurrenceRule, TransactionKind};
use kitamo_storage_json::JsonLedgerStore;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn opening_empty_directory_starts_blank() {
    let dir = tempdir().expect("tempdir");
    let store = JsonLedgerStore::open(dir.path().join("data")).expect("open store");

    assert!(store.accounts().expect("accounts").is_empty());
    assert!(!store.ledger_path().exists());
    assert!(store.backups_dir().is_dir());
}

#[test]
fn mutations_survive_reopen() {
    let dir = tempdir().expect("tempdir");
    let account = Account::new("Checking", AccountKind::Checking, dec!(1000.00));
    let rule_id = {
        let store = JsonLedgerStore::open(dir.path().to_path_buf()).expect("open store");
        store.save_account(&account).expect("save account");
        let draft = TransactionDraft::new(
            account.id,
            TransactionKind::Expense,
            dec!(80.00),
            "Internet",
            date(2025, 1, 5),
        )
        .recurring(RecurrenceRequest::FixedExpense)
        .paid();
        let created = LedgerService::new(3)
            .create(&store, draft, date(2025, 1, 5))
            .expect("create recurring");
        created.rule.expect("rule declared").id
    };

    let reopened = JsonLedgerStore::open(dir.path().to_path_buf()).expect("reopen store");
    let stored = reopened
        .find_account(account.id)
        .expect("load account")
        .expect("account exists");
    assert_eq!(stored.current_balance, dec!(920.00));
    assert!(reopened.find_rule(rule_id).expect("load rule").is_some());
    let dates: Vec<_> = reopened
        .find_transactions(&TransactionFilter::for_rule(rule_id))
        .expect("occurrences")
        .iter()
        .map(|txn| txn.date)
        .collect();
    assert_eq!(
        dates,
        vec![date(2025, 1, 5), date(2025, 2, 5), date(2025, 3, 5)]
    );
}

#[test]
fn duplicate_occurrence_is_rejected_and_not_written() {
    let dir = tempdir().expect("tempdir");
    let store = JsonLedgerStore::open(dir.path().to_path_buf()).expect("open store");
    let account = Account::new("Checking", AccountKind::Checking, dec!(0));
    store.save_account(&account).expect("save account");
    let rule = RecurrenceRule::new(
        account.id,
        TransactionKind::Expense,
        dec!(10.00),
        "Coffee club",
        Periodicity::Monthly,
        date(2025, 1, 1),
    );
    store.save_rule(&rule).expect("save rule");

    assert_eq!(
        Materializer::extend(&store, rule.id, 2, date(2025, 1, 1)).expect("extend"),
        1
    );
    let on_disk = fs::read_to_string(store.ledger_path()).expect("read ledger");
    let err = store
        .create_transaction(kitamo_domain::Transaction::occurrence_of(
            &rule,
            date(2025, 2, 1),
        ))
        .unwrap_err();
    assert!(matches!(err, CoreError::DuplicateOccurrence { .. }));
    assert_eq!(
        fs::read_to_string(store.ledger_path()).expect("read ledger"),
        on_disk
    );
}

#[test]
fn backups_are_listed_newest_first_and_pruned() {
    let dir = tempdir().expect("tempdir");
    let store =
        JsonLedgerStore::open_with_retention(dir.path().to_path_buf(), 3).expect("open store");

    let mut written = Vec::new();
    for idx in 0..5 {
        let account = Account::new(format!("Account {idx}"), AccountKind::Wallet, dec!(0));
        store.save_account(&account).expect("save account");
        written.push(store.backup(Some("manual")).expect("backup").id);
    }

    let listed: Vec<_> = store
        .list_backups()
        .expect("list backups")
        .into_iter()
        .map(|info| info.id)
        .collect();
    assert_eq!(listed.len(), 3);
    assert_eq!(listed, written[2..].iter().rev().cloned().collect::<Vec<_>>());
    assert!(listed.iter().all(|id| id.ends_with("_manual.json")));
}

#[test]
fn restore_replaces_live_ledger() {
    let dir = tempdir().expect("tempdir");
    let store = JsonLedgerStore::open(dir.path().to_path_buf()).expect("open store");
    let first = Account::new("Checking", AccountKind::Checking, dec!(10.00));
    store.save_account(&first).expect("save account");
    let backup = store.backup(None).expect("backup");

    let second = Account::new("Savings", AccountKind::Savings, dec!(20.00));
    store.save_account(&second).expect("save account");
    assert_eq!(store.accounts().expect("accounts").len(), 2);

    let restored = store.restore(&backup.id).expect("restore");
    assert_eq!(restored.accounts.len(), 1);
    assert_eq!(store.accounts().expect("accounts").len(), 1);

    let reopened = JsonLedgerStore::open(dir.path().to_path_buf()).expect("reopen");
    assert_eq!(reopened.accounts().expect("accounts"), vec![first]);

    assert!(matches!(
        store.restore("ledger_missing.json"),
        Err(CoreError::Storage(_))
    ));
}

#[test]
fn corrupt_ledger_fails_to_open() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("ledger.json"), "{ broken").expect("write garbage");

    assert!(matches!(
        JsonLedgerStore::open(dir.path().to_path_buf()),
        Err(CoreError::Serde(_))
    ));
}
