use thiserror::Error;

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors that can occur while running the relay
///
/// None of these are ever reported to a client: failures on the relay path
/// are logged and degrade to the affected message being dropped.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl RelayError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        RelayError::Protocol {
            message: message.into(),
        }
    }
}
