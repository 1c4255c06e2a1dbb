use std::fmt;
use serde::Serialize;
use thiserror::Error;

/// Domain-level errors
#[derive(Debug, Error, Clone, Serialize)]
pub enum DomainError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("File error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for DomainError {
    fn from(error: std::io::Error) -> Self {
        DomainError::Io(error.to_string())
    }
}

impl From<image::ImageError> for DomainError {
    fn from(error: image::ImageError) -> Self {
        match error {
            image::ImageError::Unsupported(e) => DomainError::UnsupportedFormat(e.to_string()),
            image::ImageError::Encoding(e) => DomainError::Encode(e.to_string()),
            image::ImageError::IoError(e) => DomainError::Io(e.to_string()),
            other => DomainError::Decode(other.to_string()),
        }
    }
}

impl From<tiff::TiffError> for DomainError {
    fn from(error: tiff::TiffError) -> Self {
        DomainError::Encode(error.to_string())
    }
}

impl From<lopdf::Error> for DomainError {
    fn from(error: lopdf::Error) -> Self {
        DomainError::Pdf(error.to_string())
    }
}

impl From<tokio::task::JoinError> for DomainError {
    fn from(error: tokio::task::JoinError) -> Self {
        DomainError::Internal(format!("Task join error: {}", error))
    }
}

/// Service-level errors (application specific)
#[derive(Debug, Error, Clone, Serialize)]
pub enum ServiceError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ValidationError> for ServiceError {
    fn from(error: ValidationError) -> Self {
        ServiceError::Domain(DomainError::Validation(error))
    }
}

impl ServiceError {
    /// True when the caller sent something we refuse to process, as opposed
    /// to a failure while processing it.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServiceError::Domain(DomainError::Validation(_))
                | ServiceError::Domain(DomainError::UnsupportedFormat(_))
        )
    }
}

/// Validation errors
#[derive(Debug, Error, Clone, Serialize)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required {
        field: String,
    },

    #[error("{field} must be between {min} and {max}")]
    Range {
        field: String,
        min: String,
        max: String,
    },

    #[error("Field '{field}' contains invalid format: {reason}")]
    Format {
        field: String,
        reason: String,
    },

    #[error("Field '{field}' contains an invalid value: {reason}")]
    InvalidValue {
        field: String,
        reason: String,
    },

    #[error("File size exceeds maximum limit of {max_mb}MB")]
    FileTooLarge {
        size: u64,
        max_mb: u64,
    },

    #[error("{0}")]
    Custom(String),
}

impl ValidationError {
    pub fn required(field: &str) -> Self {
        Self::Required {
            field: field.to_string(),
        }
    }

    pub fn range<T: fmt::Display>(field: &str, min: T, max: T) -> Self {
        Self::Range {
            field: field.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }

    pub fn format(field: &str, reason: &str) -> Self {
        Self::Format {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_value(field: &str, reason: &str) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn file_too_large(size: u64, max_bytes: u64) -> Self {
        Self::FileTooLarge {
            size,
            max_mb: max_bytes / (1024 * 1024),
        }
    }

    pub fn custom(message: &str) -> Self {
        Self::Custom(message.to_string())
    }
}
