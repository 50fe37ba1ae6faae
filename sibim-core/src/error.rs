use thiserror::Error;

#[derive(Error, Debug)]
pub enum SibimError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Server error: {status}")]
    ServerError { status: u16 },
    #[error("Remote error in action {action}: {message}")]
    Remote { action: String, message: String },
    #[error("Malformed response for action {action}: {reason}")]
    MalformedResponse { action: String, reason: String },
    #[error("Action {action} is not supported by the {transport} transport")]
    Unsupported { action: String, transport: String },
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SibimError>;
