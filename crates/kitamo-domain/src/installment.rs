//! Installment plans: one purchase split into a fixed number of monthly parts.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::Identifiable;

/// Highest installment count accepted for a single purchase.
pub const MAX_INSTALLMENTS: u32 = 99;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstallmentPlan {
    pub id: Uuid,
    pub account_id: Uuid,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    pub description: String,
    /// Sum of every installment amount, to the cent.
    pub total_amount: Decimal,
    pub installment_count: u32,
    pub first_installment_date: NaiveDate,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Identifiable for InstallmentPlan {
    fn id(&self) -> Uuid {
        self.id
    }
}
