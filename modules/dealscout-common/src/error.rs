use thiserror::Error;

/// Machine-readable error kind carried in API envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    BudgetExceeded,
    Timeout,
    Provider,
    Persistence,
    Config,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::BudgetExceeded => "budget_exceeded",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Provider => "external_provider_error",
            ErrorKind::Persistence => "persistence_error",
            ErrorKind::Config => "config_error",
            ErrorKind::Internal => "internal_error",
        }
    }
}

#[derive(Error, Debug)]
pub enum DealScoutError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl DealScoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DealScoutError::Validation(_) => ErrorKind::Validation,
            DealScoutError::NotFound(_) => ErrorKind::NotFound,
            DealScoutError::BudgetExceeded(_) => ErrorKind::BudgetExceeded,
            DealScoutError::Timeout(_) => ErrorKind::Timeout,
            DealScoutError::Provider(_) => ErrorKind::Provider,
            DealScoutError::Persistence(_) => ErrorKind::Persistence,
            DealScoutError::Config(_) => ErrorKind::Config,
            DealScoutError::Anyhow(_) => ErrorKind::Internal,
        }
    }
}
