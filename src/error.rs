//! Error types for context window management

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, ContextError>;

/// Context window errors
///
/// Running over budget is not an error: it is reported through
/// [`WindowEvent::OverBudget`](crate::context::WindowEvent::OverBudget).
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("No active window and no window id given")]
    NoActiveWindow,

    #[error("Window not found: {0}")]
    WindowNotFound(String),

    #[error("Item {item_id} already exists in window {window_id}")]
    DuplicateItem { window_id: String, item_id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl From<serde_json::Error> for ContextError {
    fn from(err: serde_json::Error) -> Self {
        ContextError::Serialization(err.to_string())
    }
}
