//! Error taxonomy for the session layer.

use crate::{client::ConnectionPhase, config::ConfigError};
use uuid::Uuid;

/// Everything a session operation can fail with.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport could not open or lost the link.
    #[error("Connection error: {0}")]
    Connection(String),
    /// A command was attempted outside the phase that allows it.
    #[error("Not connected (phase: {phase:?})")]
    NotConnected { phase: ConnectionPhase },
    #[error("The service requires authentication or profile setup (authenticationRequired)")]
    AuthenticationRequired,
    #[error("Server error: {message}")]
    Server {
        message: String,
        code: Option<String>,
    },
    #[error("Timed out waiting for a reply")]
    Timeout,
    /// The caller aborted the wait. Expected flow, not a fault.
    #[error("Wait was cancelled")]
    Cancelled,
    #[error("Chat session {session_id} error: {message}")]
    Session {
        session_id: Uuid,
        message: String,
        retryable: bool,
    },
    #[error("No open chat session {0}")]
    UnknownSession(Uuid),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl Error {
    /// Timeouts and retryable session errors may succeed if the caller tries again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout => true,
            Error::Session { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
