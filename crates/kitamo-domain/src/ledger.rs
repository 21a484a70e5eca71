//! Persisted aggregate holding every record the engine reads or writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    account::Account, installment::InstallmentPlan, recurrence::RecurrenceRule,
    template::RecurringTemplate, transaction::Transaction,
};

pub const LEDGER_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ledger {
    #[serde(default = "Ledger::schema_version_default")]
    pub schema_version: u32,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub rules: Vec<RecurrenceRule>,
    #[serde(default)]
    pub plans: Vec<InstallmentPlan>,
    #[serde(default)]
    pub templates: Vec<RecurringTemplate>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    pub updated_at: DateTime<Utc>,
}

impl Ledger {
    pub fn schema_version_default() -> u32 {
        LEDGER_SCHEMA_VERSION
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            schema_version: LEDGER_SCHEMA_VERSION,
            accounts: Vec::new(),
            rules: Vec::new(),
            plans: Vec::new(),
            templates: Vec::new(),
            transactions: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}
