use rusqlite::ErrorCode;
use std::collections::BTreeMap;
use thiserror::Error;

pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Failure kinds surfaced by every domain operation.
#[derive(Debug, Error)]
pub enum AcademyError {
    #[error("{message}")]
    Validation { message: String, fields: FieldErrors },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Permission(String),

    #[error("Database write failed: {0}")]
    Transaction(#[source] rusqlite::Error),

    #[error("Stored data is malformed: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for AcademyError {
    fn from(error: rusqlite::Error) -> Self {
        match &error {
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..) => Self::Storage(error.to_string()),
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                Self::Conflict(format!("Write rejected by a database constraint: {error}"))
            }
            _ => Self::Transaction(error),
        }
    }
}

impl From<serde_json::Error> for AcademyError {
    fn from(error: serde_json::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

pub type DomainResult<T> = std::result::Result<T, AcademyError>;

impl AcademyError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            fields: FieldErrors::new(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission(message.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Permission(_) => "permission_denied",
            Self::Transaction(_) => "transaction_error",
            Self::Storage(_) => "storage_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transaction(_))
    }

    pub fn fields(&self) -> Option<&FieldErrors> {
        match self {
            Self::Validation { fields, .. } if !fields.is_empty() => Some(fields),
            _ => None,
        }
    }
}

/// Collects field-level problems so a request is rejected with every issue at once.
#[derive(Debug, Default)]
pub struct Violations {
    fields: FieldErrors,
}

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn check(&mut self, ok: bool, field: impl Into<String>, message: impl Into<String>) {
        if !ok {
            self.add(field, message);
        }
    }

    pub fn into_result(self, message: &str) -> DomainResult<()> {
        if self.fields.is_empty() {
            return Ok(());
        }

        Err(AcademyError::Validation {
            message: message.to_string(),
            fields: self.fields,
        })
    }
}
