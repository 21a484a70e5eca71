//! kitamo-core
//!
//! Recurrence, installment and balance-projection engine for the Kitamo ledger.
//! Depends on kitamo-domain. No terminal I/O and no direct storage: every
//! operation reads and writes through the repository ports in [`storage`].

pub mod balance;
pub mod error;
pub mod installment_service;
pub mod ledger_service;
pub mod materializer;
pub mod memory;
pub mod projection;
pub mod recurrence_service;
pub mod scheduled_jobs;
pub mod scheduler;
pub mod storage;
pub mod time;

pub use balance::*;
pub use error::CoreError;
pub use installment_service::*;
pub use ledger_service::*;
pub use materializer::*;
pub use memory::InMemoryStore;
pub use projection::*;
pub use recurrence_service::*;
pub use scheduled_jobs::*;
pub use storage::*;
pub use time::*;
