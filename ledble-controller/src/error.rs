use ledble_proto::EncodeError;
use uuid::Uuid;

use crate::session::{FailReason, SessionState};

/// Error reported by the platform Bluetooth stack
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<btleplug::Error> for TransportError {
    fn from(e: btleplug::Error) -> Self {
        Self::new(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("service {0} not found")]
    ServiceNotFound(Uuid),
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),
    #[error("GATT lookup failed: {0}")]
    Transport(TransportError),
}

/// Errors that end a session
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("discovery failed: {0}")]
    Discovery(TransportError),
    #[error("connect failed: {0}")]
    Connect(TransportError),
    #[error("resolve failed: {0}")]
    Resolve(#[from] ResolveError),
    /// Returned by `close` and `unstick`, after the session is gone
    #[error("disconnect failed: {0}")]
    Disconnect(TransportError),
    #[error("device disconnected")]
    Disconnected,
    #[error("session cancelled")]
    Cancelled,
    #[error("session aborted")]
    Aborted,
    #[error("session cannot start from state {0}")]
    InvalidState(SessionState),
}

impl SessionError {
    /// The failure this error leaves the session in, if any
    pub fn reason(&self) -> Option<FailReason> {
        match self {
            Self::Discovery(_) => Some(FailReason::Discovery),
            Self::Connect(_) => Some(FailReason::Connect),
            Self::Resolve(_) => Some(FailReason::Resolve),
            Self::Disconnected => Some(FailReason::Disconnected),
            Self::Cancelled => Some(FailReason::Cancelled),
            Self::Aborted => Some(FailReason::Aborted),
            Self::Disconnect(_) | Self::InvalidState(_) => None,
        }
    }
}

/// Errors of a single `send`. Only `Disconnected` and `Cancelled` end the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("write failed: {0}")]
    Transport(TransportError),
    #[error("session is not ready (state: {0})")]
    NotReady(SessionState),
    #[error("device disconnected")]
    Disconnected,
    #[error("session cancelled")]
    Cancelled,
}
