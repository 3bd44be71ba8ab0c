//! Handler error taxonomy, converted to a chat message by the dispatcher.

use crate::services::ServiceError;

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// The user's input cannot be used (unknown line, bad URL, missing argument).
    #[error("{0}")]
    UserInputInvalid(String),
    /// An external dependency failed after retries.
    #[error(transparent)]
    UpstreamUnavailable(#[from] ServiceError),
    #[error("{0}")]
    Unrecoverable(String),
}

impl BotError {
    pub fn input(msg: impl Into<String>) -> Self {
        BotError::UserInputInvalid(msg.into())
    }
}
