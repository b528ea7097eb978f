use thiserror::Error;

/// Failure of a single backend round trip. Stale-response races and local
/// preconditions are not errors; callers report those through their return
/// values instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The request never produced a server response.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The server answered with a non-success status.
    #[error("server rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl RequestError {
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// Message suitable for a user-facing notification.
    pub fn user_message(&self) -> &str {
        match self {
            RequestError::Transport(message) => message,
            RequestError::Rejected { message, .. } => message,
        }
    }
}
