//! Application façade: one ledger on disk, the engine services and a clock.

use std::path::PathBuf;

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use kitamo_config::{Config, ConfigManager};
use kitamo_core::{
    AccountRepository, BalanceAlert, BalanceCorrection, BalanceProjector, Clock, CreatedEntry,
    DailyReport, EditOutcome, EditScope, LedgerService, MonthOutlook, MonthlyBalance, Projection,
    ProjectionScope, RecurrenceService, ScheduledJobs, SystemClock, TransactionChanges,
    TransactionDraft,
};
use kitamo_domain::{Account, RecurrenceRule, Transaction};
use kitamo_storage_json::JsonLedgerStore;

use crate::KitamoError;

pub struct Kitamo<C: Clock = SystemClock> {
    config: Config,
    store: JsonLedgerStore,
    clock: C,
    ledger: LedgerService,
    jobs: ScheduledJobs,
}

impl Kitamo<SystemClock> {
    /// Loads `<base>/config/config.json` and opens the ledger it points to.
    ///
    /// Without a configured `data_dir` the ledger lives in `base`.
    pub fn open_in(base: PathBuf) -> Result<Self, KitamoError> {
        let manager = ConfigManager::with_base_dir(base.clone())?;
        let mut config = manager.load()?;
        if config.data_dir.is_none() {
            config.data_dir = Some(base);
        }
        Self::open(config)
    }

    pub fn open(config: Config) -> Result<Self, KitamoError> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> Kitamo<C> {
    pub fn with_clock(config: Config, clock: C) -> Result<Self, KitamoError> {
        config.validate()?;
        let data_dir = config.resolve_data_dir();
        let store = JsonLedgerStore::open_with_retention(data_dir, config.backup_retention)?;
        info!(
            path = %store.ledger_path().display(),
            horizon_months = config.horizon_months,
            "ledger ready"
        );
        Ok(Self {
            ledger: LedgerService::new(config.horizon_months),
            jobs: ScheduledJobs::new(config.horizon_months),
            config,
            store,
            clock,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &JsonLedgerStore {
        &self.store
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn add_account(&self, account: Account) -> Result<Account, KitamoError> {
        self.store.save_account(&account)?;
        Ok(account)
    }

    pub fn accounts(&self) -> Result<Vec<Account>, KitamoError> {
        Ok(self.store.accounts()?)
    }

    pub fn create(&self, draft: TransactionDraft) -> Result<CreatedEntry, KitamoError> {
        Ok(self.ledger.create(&self.store, draft, self.today())?)
    }

    pub fn edit(
        &self,
        id: Uuid,
        scope: EditScope,
        changes: TransactionChanges,
    ) -> Result<EditOutcome, KitamoError> {
        Ok(self
            .ledger
            .edit(&self.store, id, scope, changes, self.today())?)
    }

    pub fn toggle_paid(&self, id: Uuid) -> Result<Transaction, KitamoError> {
        Ok(self.ledger.toggle_paid(&self.store, id, self.today())?)
    }

    pub fn delete(&self, id: Uuid) -> Result<Transaction, KitamoError> {
        Ok(self.ledger.delete(&self.store, id)?)
    }

    pub fn set_rule_active(
        &self,
        rule_id: Uuid,
        active: bool,
    ) -> Result<RecurrenceRule, KitamoError> {
        Ok(RecurrenceService::set_active(&self.store, rule_id, active)?)
    }

    /// Daily series over the configured projection window.
    pub fn project(&self, scope: ProjectionScope) -> Result<Projection, KitamoError> {
        let today = self.today();
        let to = today + Duration::days(i64::from(self.config.projection_days));
        Ok(BalanceProjector::project_daily_series(
            &self.store,
            scope,
            today,
            to,
        )?)
    }

    pub fn project_balance(
        &self,
        scope: ProjectionScope,
        as_of: NaiveDate,
    ) -> Result<Decimal, KitamoError> {
        Ok(BalanceProjector::project_balance(
            &self.store,
            scope,
            self.today(),
            as_of,
        )?)
    }

    pub fn project_monthly(
        &self,
        scope: ProjectionScope,
        months: u32,
    ) -> Result<Vec<MonthlyBalance>, KitamoError> {
        Ok(BalanceProjector::project_monthly(
            &self.store,
            scope,
            self.today(),
            months,
        )?)
    }

    pub fn month_outlook(&self, scope: ProjectionScope) -> Result<MonthOutlook, KitamoError> {
        Ok(BalanceProjector::month_outlook(
            &self.store,
            scope,
            self.today(),
        )?)
    }

    /// Alert when `scope` goes negative within the configured alert window.
    pub fn balance_alert(
        &self,
        scope: ProjectionScope,
    ) -> Result<Option<BalanceAlert>, KitamoError> {
        let alert = self
            .project(scope)?
            .alert(self.today(), self.config.alert_window_days);
        if let Some(alert) = &alert {
            warn!(
                ?scope,
                date = %alert.date,
                balance = %alert.balance,
                "projected balance turns negative"
            );
        }
        Ok(alert)
    }

    /// Backs up the ledger, then extends every rule and fires due templates.
    pub fn run_daily(&self) -> Result<DailyReport, KitamoError> {
        self.store.backup(Some("daily"))?;
        Ok(self.jobs.run_daily(&self.store, self.today())?)
    }

    pub fn recalculate_balances(&self) -> Result<Vec<BalanceCorrection>, KitamoError> {
        Ok(self.jobs.recalculate_balances(&self.store)?)
    }
}
