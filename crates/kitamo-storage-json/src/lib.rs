use std::{
    cmp::Reverse,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use kitamo_core::{
    storage::{
        AccountRepository, PlanRepository, RuleRepository, TemplateRepository, TransactionFilter,
        TransactionPatch, TransactionRepository,
    },
    CoreError, InMemoryStore,
};
use kitamo_domain::{
    Account, InstallmentPlan, Ledger, RecurrenceRule, RecurringTemplate, Transaction,
};

const LEDGER_FILE_STEM: &str = "ledger";
const FILE_EXTENSION: &str = "json";
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S%3f";
const TMP_SUFFIX: &str = "tmp";
pub const DEFAULT_RETENTION: usize = 5;

/// A backup file under the store's backups directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    /// File name, used to restore the backup.
    pub id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub size_bytes: u64,
    pub path: PathBuf,
}

/// Ledger kept in memory and mirrored to a JSON document on disk.
///
/// Every mutating repository call rewrites the document through a temp file
/// and a rename, so a crash never leaves a half-written ledger behind.
#[derive(Debug)]
pub struct JsonLedgerStore {
    ledger_path: PathBuf,
    backups_dir: PathBuf,
    retention: usize,
    inner: InMemoryStore,
    write_lock: Mutex<()>,
}

impl JsonLedgerStore {
    /// Opens `<data_dir>/ledger.json`, starting empty when the file is missing.
    pub fn open(data_dir: PathBuf) -> Result<Self, CoreError> {
        Self::open_with_retention(data_dir, DEFAULT_RETENTION)
    }

    pub fn open_with_retention(data_dir: PathBuf, retention: usize) -> Result<Self, CoreError> {
        let backups_dir = data_dir.join("backups");
        fs::create_dir_all(&data_dir)?;
        fs::create_dir_all(&backups_dir)?;
        let ledger_path = data_dir.join(format!("{LEDGER_FILE_STEM}.{FILE_EXTENSION}"));
        let ledger = if ledger_path.exists() {
            load_ledger_from_path(&ledger_path)?
        } else {
            Ledger::default()
        };
        debug!(path = %ledger_path.display(), "ledger opened");
        Ok(Self {
            ledger_path,
            backups_dir,
            retention: retention.max(1),
            inner: InMemoryStore::from_ledger(ledger),
            write_lock: Mutex::new(()),
        })
    }

    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    pub fn snapshot(&self) -> Result<Ledger, CoreError> {
        self.inner.snapshot()
    }

    /// Writes the current state to disk.
    pub fn flush(&self) -> Result<(), CoreError> {
        let _guard = self.lock_writes()?;
        let ledger = self.inner.snapshot()?;
        save_ledger_to_path(&ledger, &self.ledger_path)
    }

    /// Copies the current state into a timestamped backup and prunes old ones.
    pub fn backup(&self, note: Option<&str>) -> Result<BackupInfo, CoreError> {
        let _guard = self.lock_writes()?;
        let ledger = self.inner.snapshot()?;

        // Names must sort in creation order even when calls share a millisecond.
        let now = Utc::now();
        let mut stamp = match self.list_backups()?.first().and_then(|b| b.created_at) {
            Some(newest) if newest >= now => newest + Duration::milliseconds(1),
            _ => now,
        };
        let (file_name, path) = loop {
            let file_name = backup_file_name(stamp, note);
            let path = self.backups_dir.join(&file_name);
            if !path.exists() {
                break (file_name, path);
            }
            stamp += Duration::milliseconds(1);
        };
        let json = serialize_ledger(&ledger)?;
        let tmp = tmp_path(&path);
        write_file(&tmp, &json)?;
        fs::rename(&tmp, &path)?;
        info!(backup = %file_name, "ledger backup written");

        self.prune_backups()?;
        Ok(BackupInfo {
            created_at: parse_backup_timestamp(&file_name),
            size_bytes: json.len() as u64,
            id: file_name,
            path,
        })
    }

    /// Backups, newest first.
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>, CoreError> {
        if !self.backups_dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.backups_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file()
                || path.extension().and_then(|ext| ext.to_str()) != Some(FILE_EXTENSION)
            {
                continue;
            }
            if let Some(file_name) = path.file_name().and_then(|name| name.to_str()) {
                entries.push(BackupInfo {
                    id: file_name.to_string(),
                    created_at: parse_backup_timestamp(file_name),
                    size_bytes: entry.metadata().map(|meta| meta.len()).unwrap_or(0),
                    path: path.clone(),
                });
            }
        }
        entries.sort_by(|a, b| {
            Reverse(a.created_at)
                .cmp(&Reverse(b.created_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(entries)
    }

    /// Replaces the live ledger with the backup named `backup_id`.
    pub fn restore(&self, backup_id: &str) -> Result<Ledger, CoreError> {
        let path = self.backups_dir.join(backup_id);
        if !path.is_file() {
            return Err(CoreError::Storage(format!(
                "backup `{backup_id}` not found"
            )));
        }
        let ledger = load_ledger_from_path(&path)?;

        let _guard = self.lock_writes()?;
        save_ledger_to_path(&ledger, &self.ledger_path)?;
        self.inner.replace(ledger.clone())?;
        info!(backup = %backup_id, "ledger restored from backup");
        Ok(ledger)
    }

    fn prune_backups(&self) -> Result<(), CoreError> {
        for entry in self.list_backups()?.into_iter().skip(self.retention) {
            debug!(backup = %entry.id, "pruning old backup");
            fs::remove_file(entry.path)?;
        }
        Ok(())
    }

    fn lock_writes(&self) -> Result<MutexGuard<'_, ()>, CoreError> {
        self.write_lock
            .lock()
            .map_err(|_| CoreError::Storage("ledger write lock poisoned".into()))
    }

    /// Persists after a successful mutation and hands its result back.
    fn persisted<T>(&self, result: T) -> Result<T, CoreError> {
        self.flush()?;
        Ok(result)
    }
}

impl TransactionRepository for JsonLedgerStore {
    fn find_transaction(&self, id: Uuid) -> Result<Option<Transaction>, CoreError> {
        self.inner.find_transaction(id)
    }

    fn find_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, CoreError> {
        self.inner.find_transactions(filter)
    }

    fn find_latest_date(&self, rule_id: Uuid) -> Result<Option<NaiveDate>, CoreError> {
        self.inner.find_latest_date(rule_id)
    }

    fn exists_on_date(&self, rule_id: Uuid, date: NaiveDate) -> Result<bool, CoreError> {
        self.inner.exists_on_date(rule_id, date)
    }

    fn create_transaction(&self, txn: Transaction) -> Result<Transaction, CoreError> {
        let created = self.inner.create_transaction(txn)?;
        self.persisted(created)
    }

    fn update_transaction(&self, txn: &Transaction) -> Result<(), CoreError> {
        self.inner.update_transaction(txn)?;
        self.flush()
    }

    fn bulk_update(
        &self,
        filter: &TransactionFilter,
        patch: &TransactionPatch,
    ) -> Result<Vec<Transaction>, CoreError> {
        let updated = self.inner.bulk_update(filter, patch)?;
        if updated.is_empty() {
            return Ok(updated);
        }
        self.persisted(updated)
    }

    fn delete_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, CoreError> {
        let removed = self.inner.delete_transactions(filter)?;
        if removed.is_empty() {
            return Ok(removed);
        }
        self.persisted(removed)
    }

    fn delete_transaction(&self, id: Uuid) -> Result<Option<Transaction>, CoreError> {
        match self.inner.delete_transaction(id)? {
            Some(removed) => self.persisted(Some(removed)),
            None => Ok(None),
        }
    }
}

impl RuleRepository for JsonLedgerStore {
    fn find_rule(&self, id: Uuid) -> Result<Option<RecurrenceRule>, CoreError> {
        self.inner.find_rule(id)
    }

    fn save_rule(&self, rule: &RecurrenceRule) -> Result<(), CoreError> {
        self.inner.save_rule(rule)?;
        self.flush()
    }

    fn rules(&self) -> Result<Vec<RecurrenceRule>, CoreError> {
        self.inner.rules()
    }
}

impl PlanRepository for JsonLedgerStore {
    fn find_plan(&self, id: Uuid) -> Result<Option<InstallmentPlan>, CoreError> {
        self.inner.find_plan(id)
    }

    fn save_plan(&self, plan: &InstallmentPlan) -> Result<(), CoreError> {
        self.inner.save_plan(plan)?;
        self.flush()
    }
}

impl AccountRepository for JsonLedgerStore {
    fn find_account(&self, id: Uuid) -> Result<Option<Account>, CoreError> {
        self.inner.find_account(id)
    }

    fn accounts(&self) -> Result<Vec<Account>, CoreError> {
        self.inner.accounts()
    }

    fn save_account(&self, account: &Account) -> Result<(), CoreError> {
        self.inner.save_account(account)?;
        self.flush()
    }

    fn update_account(
        &self,
        id: Uuid,
        update: &mut dyn FnMut(&mut Account),
    ) -> Result<bool, CoreError> {
        if !self.inner.update_account(id, update)? {
            return Ok(false);
        }
        self.persisted(true)
    }
}

impl TemplateRepository for JsonLedgerStore {
    fn templates(&self) -> Result<Vec<RecurringTemplate>, CoreError> {
        self.inner.templates()
    }

    fn save_template(&self, template: &RecurringTemplate) -> Result<(), CoreError> {
        self.inner.save_template(template)?;
        self.flush()
    }
}

/// Saves a ledger to an arbitrary path on disk.
pub fn save_ledger_to_path(ledger: &Ledger, path: &Path) -> Result<(), CoreError> {
    let tmp = tmp_path(path);
    write_file(&tmp, &serialize_ledger(ledger)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Loads a ledger from the provided filesystem path.
pub fn load_ledger_from_path(path: &Path) -> Result<Ledger, CoreError> {
    let data = fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(|err| CoreError::Serde(err.to_string()))
}

fn backup_file_name(stamp: DateTime<Utc>, note: Option<&str>) -> String {
    let mut stem = format!(
        "{LEDGER_FILE_STEM}_{}",
        stamp.format(BACKUP_TIMESTAMP_FORMAT)
    );
    if let Some(label) = sanitize_backup_note(note) {
        stem.push('_');
        stem.push_str(&label);
    }
    format!("{stem}.{FILE_EXTENSION}")
}

fn sanitize_backup_note(note: Option<&str>) -> Option<String> {
    let raw = note?.trim();
    let mut sanitized = String::new();
    let mut last_dash = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            sanitized.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !sanitized.is_empty() && !last_dash {
            sanitized.push('-');
            last_dash = true;
        }
    }
    let trimmed = sanitized.trim_matches('-');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Reads `ledger_<YYYYMMDD>_<HHMMSSmmm>[_note].json`.
fn parse_backup_timestamp(name: &str) -> Option<DateTime<Utc>> {
    let stem = name
        .strip_suffix(&format!(".{FILE_EXTENSION}"))?
        .strip_prefix(&format!("{LEDGER_FILE_STEM}_"))?;
    let mut segments = stem.split('_');
    let date = segments.next()?;
    let time = segments.next()?;
    if !is_digits(date, 8) || !is_digits(time, 9) {
        return None;
    }
    let (seconds, millis) = time.split_at(6);
    let naive = NaiveDateTime::parse_from_str(&format!("{date}{seconds}"), "%Y%m%d%H%M%S").ok()?;
    let millis: i64 = millis.parse().ok()?;
    Some(DateTime::from_naive_utc_and_offset(naive, Utc) + Duration::milliseconds(millis))
}

fn is_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.chars().all(|c| c.is_ascii_digit())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{existing}.{TMP_SUFFIX}"),
        None => TMP_SUFFIX.to_string(),
    };
    tmp.set_extension(ext);
    tmp
}

fn write_file(path: &Path, data: &str) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(data.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

fn serialize_ledger(ledger: &Ledger) -> Result<String, CoreError> {
    serde_json::to_string_pretty(ledger).map_err(|err| CoreError::Serde(err.to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn backup_names_round_trip_their_timestamp() {
        let stamp =
            Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap() + Duration::milliseconds(42);
        let name = backup_file_name(stamp, Some("Before daily run!"));
        assert_eq!(name, "ledger_20250309_140507042_before-daily-run.json");
        assert_eq!(parse_backup_timestamp(&name), Some(stamp));
    }

    #[test]
    fn unrelated_files_have_no_timestamp() {
        assert_eq!(parse_backup_timestamp("ledger.json"), None);
        assert_eq!(parse_backup_timestamp("notes_20250309_1405.json"), None);
        assert_eq!(sanitize_backup_note(Some("  !!  ")), None);
    }
}
