use std::num::ParseIntError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SieveError {
    #[error("operator {operator} is not supported")]
    UnsupportedOperator { operator: String },
    #[error("invalid operand '{value}': {source}")]
    InvalidOperand {
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("invalid requirement: {message}")]
    InvalidRequirement { message: String },
    #[error("selector parse error at {position}: {message}")]
    Parse { position: usize, message: String },
    #[error("storage error: {message}")]
    Storage { message: String },
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("validation error: {message}")]
    Validation { message: String },
}

impl SieveError {
    pub fn unsupported_operator(operator: impl Into<String>) -> Self {
        Self::UnsupportedOperator {
            operator: operator.into(),
        }
    }

    pub fn invalid_operand(value: impl Into<String>, source: ParseIntError) -> Self {
        Self::InvalidOperand {
            value: value.into(),
            source,
        }
    }

    pub fn invalid_requirement(message: impl Into<String>) -> Self {
        Self::InvalidRequirement {
            message: message.into(),
        }
    }

    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

pub type SieveResult<T> = Result<T, SieveError>;

impl From<sea_orm::DbErr> for SieveError {
    fn from(value: sea_orm::DbErr) -> Self {
        SieveError::storage(value.to_string())
    }
}
