//! Error types for the ledger

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Neither wallet nor card number resolved to a client
    #[error("Client not found")]
    ClientNotFound,

    /// No currency registered under the numeric code
    #[error("Currency not found: {0}")]
    CurrencyNotFound(i32),

    /// Event channel rejected or timed out the send; nothing was persisted
    #[error("Publish failure: {0}")]
    PublishFailure(#[source] message_bus::Error),

    /// Store rejected the insert; an event may already have been emitted
    #[error("Persist failure: {0}")]
    PersistFailure(String),

    /// Malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Store read or update fault
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Scheduler setup error
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// HTTP server or signal handling fault
    #[error("Server error: {0}")]
    Server(String),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Error::Storage(format!("Migration failed: {}", err))
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<tokio_cron_scheduler::JobSchedulerError> for Error {
    fn from(err: tokio_cron_scheduler::JobSchedulerError) -> Self {
        Error::Scheduler(err.to_string())
    }
}

impl Error {
    /// Machine-readable error category
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::ClientNotFound => "client_not_found",
            Error::CurrencyNotFound(_) => "currency_not_found",
            Error::PublishFailure(_) => "publish_failure",
            Error::PersistFailure(_) => "persist_failure",
            Error::Validation(_) => "validation_error",
            Error::Storage(_) => "storage_error",
            Error::Serialization(_) => "serialization_error",
            Error::Config(_) => "config_error",
            Error::Scheduler(_) => "scheduler_error",
            Error::Server(_) => "server_error",
        }
    }
}

impl ResponseError for Error {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let message = match self {
            Error::Validation(_) => "bad input",
            _ => "operation failed",
        };

        HttpResponse::build(status_code).json(json!({
            "error": {
                "code": status_code.as_u16(),
                "message": message,
                "type": self.error_type(),
                "detail": self.to_string()
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert_eq!(
            Error::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::ClientNotFound.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            Error::CurrencyNotFound(999).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::PublishFailure(message_bus::Error::Timeout(10_000)).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_types() {
        assert_eq!(Error::ClientNotFound.error_type(), "client_not_found");
        assert_eq!(Error::CurrencyNotFound(999).to_string(), "Currency not found: 999");
        assert_eq!(Error::PersistFailure("x".into()).error_type(), "persist_failure");
    }
}
