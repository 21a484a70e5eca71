//! kitamo-domain
//!
//! Plain data records for the Kitamo ledger engine (accounts, recurrence rules,
//! installment plans, standalone templates, transactions).
//! No I/O, no storage. Only data types, enums and calendar helpers.

pub mod account;
pub mod common;
pub mod installment;
pub mod ledger;
pub mod money;
pub mod recurrence;
pub mod template;
pub mod transaction;

pub use account::*;
pub use common::*;
pub use installment::*;
pub use ledger::*;
pub use recurrence::*;
pub use template::*;
pub use transaction::*;
