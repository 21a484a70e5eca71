//! Account records as seen by the engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::Identifiable;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
/// Enumerates the supported account families.
pub enum AccountKind {
    Wallet,
    Checking,
    Savings,
    /// Billing cycle closes on `closing_day` and the invoice is due on `due_day`.
    /// Either may be unset for cards created without billing information.
    CreditCard {
        #[serde(default)]
        closing_day: Option<u32>,
        #[serde(default)]
        due_day: Option<u32>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub kind: AccountKind,
    pub initial_balance: Decimal,
    /// Running cache: initial balance plus the signed sum of effective transactions.
    pub current_balance: Decimal,
    #[serde(default)]
    pub archived: bool,
    #[serde(default = "Account::default_include_in_net_worth")]
    pub include_in_net_worth: bool,
}

impl Account {
    pub fn new(name: impl Into<String>, kind: AccountKind, initial_balance: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            initial_balance,
            current_balance: initial_balance,
            archived: false,
            include_in_net_worth: Self::default_include_in_net_worth(),
        }
    }

    pub fn default_include_in_net_worth() -> bool {
        true
    }

    pub fn is_credit_card(&self) -> bool {
        matches!(self.kind, AccountKind::CreditCard { .. })
    }

    /// Returns `(closing_day, due_day)` when both are configured with non-zero values.
    pub fn billing_days(&self) -> Option<(u32, u32)> {
        match self.kind {
            AccountKind::CreditCard {
                closing_day: Some(closing),
                due_day: Some(due),
            } if closing > 0 && due > 0 => Some((closing, due)),
            _ => None,
        }
    }

    /// Cash-like, non-archived accounts the user has not excluded from totals.
    pub fn counts_toward_net_worth(&self) -> bool {
        !self.is_credit_card() && !self.archived && self.include_in_net_worth
    }
}

impl Identifiable for Account {
    fn id(&self) -> Uuid {
        self.id
    }
}
