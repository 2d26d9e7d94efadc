use crate::domain::money::Money;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("{entity} '{key}' not found or inactive")]
    NotFound { entity: &'static str, key: String },
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Money, available: Money },
    #[error("Payment of {amount} exceeds total debt of {total_debt}")]
    Overpayment { amount: Money, total_debt: Money },
    #[error("Invalid term: {0} installments")]
    InvalidTerm(i64),
    #[error("Division by zero while computing {0}")]
    DivisionByZero(&'static str),
    #[error("Concurrent modification of {entity} '{key}'")]
    ConcurrencyConflict { entity: &'static str, key: String },
    #[error("Operation number counter exhausted")]
    CounterExhausted,
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn conflict(entity: &'static str, key: impl Into<String>) -> Self {
        Self::ConcurrencyConflict {
            entity,
            key: key.into(),
        }
    }

    pub fn overflow(operation: &str) -> Self {
        Self::ValidationError(format!("Amount out of range in {operation}"))
    }

    /// Whether the caller of a mutating primitive may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LedgerError {
    fn from(err: rocksdb::Error) -> Self {
        Self::InternalError(Box::new(err))
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::InternalError(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(LedgerError::conflict("account", "ACC-1").is_retryable());
        assert!(!LedgerError::not_found("account", "ACC-1").is_retryable());
        assert!(!LedgerError::CounterExhausted.is_retryable());
    }

    #[test]
    fn test_not_found_message_names_entity() {
        let err = LedgerError::not_found("credit", "CR-9");
        assert_eq!(err.to_string(), "credit 'CR-9' not found or inactive");
    }
}
