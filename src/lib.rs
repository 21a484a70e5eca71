#![doc(test(attr(deny(warnings))))]

//! Kitamo turns recurring bills, installment purchases and one-off entries
//! into a materialized ledger and projects account balances forward.
//!
//! The engine lives in `kitamo-core`; this crate wires it to the JSON store,
//! the configuration file, a clock and tracing.

pub mod app;
pub mod errors;
pub mod utils;

pub use app::Kitamo;
pub use errors::KitamoError;

pub use kitamo_config::{Config, ConfigManager};
pub use kitamo_core::{
    BalanceAlert, DailyReport, EditOutcome, EditScope, MonthOutlook, MonthlyBalance,
    Projection, ProjectionScope, RecurrenceRequest, TransactionChanges, TransactionDraft,
};
pub use kitamo_storage_json::JsonLedgerStore;

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing with the default filter and emits a startup log.
pub fn init() {
    init_with_filter(&Config::default_log_filter());
}

/// Same as [`init`] with an explicit filter directive, e.g. `kitamo=debug`.
pub fn init_with_filter(filter: &str) {
    INIT_TRACING.call_once(|| {
        utils::init_tracing(filter);
        tracing::info!("Kitamo tracing initialized.");
    });
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_does_not_panic() {
        super::init();
        super::init_with_filter("kitamo=debug");
    }
}
