use chrono::NaiveDate;
use kitamo_domain::RuleValidationError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(Uuid),
    #[error("Recurrence rule not found: {0}")]
    RuleNotFound(Uuid),
    #[error("Installment plan not found: {0}")]
    PlanNotFound(Uuid),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    /// Raised by storage when the `(rule_id, date)` uniqueness constraint is violated.
    #[error("Occurrence of rule {rule_id} on {date} already exists")]
    DuplicateOccurrence { rule_id: Uuid, date: NaiveDate },
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serde(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RuleValidationError> for CoreError {
    fn from(err: RuleValidationError) -> Self {
        CoreError::Validation(err.to_string())
    }
}
