use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("{method} {path} returned {status}: {message}")]
    HttpStatusError {
        method: String,
        path: String,
        status: u16,
        message: String,
    },

    #[error("Remote object not found: {path}")]
    NotFoundError { path: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid import id '{id}' for {kind}: expected '{expected}'")]
    ImportIdError {
        kind: String,
        id: String,
        expected: String,
    },

    #[error("Timed out waiting for {what} after {attempts} attempts")]
    TimeoutError { what: String, attempts: u32 },

    #[error("Unresolved reference '{reference}' in {address}")]
    ReferenceError { address: String, reference: String },

    #[error("Unknown resource '{address}'")]
    UnknownResourceError { address: String },

    #[error("State error for {address}: {message}")]
    StateError { address: String, message: String },
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFoundError { .. })
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, ProviderError::HttpStatusError { status: 423, .. })
    }

    pub fn config(message: impl Into<String>) -> Self {
        ProviderError::ConfigError {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
