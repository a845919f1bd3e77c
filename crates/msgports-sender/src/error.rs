use msgports_port::{InvalidStateReason, PortError};

/// Errors returned to callers of `post_message`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// A transferred port, or the sending port, is in the wrong state.
    #[error("invalid state: {0}")]
    InvalidState(InvalidStateReason),

    /// Any other port-layer error.
    #[error("port error: {0}")]
    Port(PortError),
}

impl SendError {
    /// Returns the invalid-state reason, if this is an invalid-state error.
    pub fn invalid_state_reason(&self) -> Option<InvalidStateReason> {
        match self {
            Self::InvalidState(reason) => Some(*reason),
            Self::Port(err) => err.invalid_state_reason(),
        }
    }
}

impl From<PortError> for SendError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::InvalidState { reason } => Self::InvalidState(reason),
            other => Self::Port(other),
        }
    }
}

impl From<InvalidStateReason> for SendError {
    fn from(reason: InvalidStateReason) -> Self {
        Self::InvalidState(reason)
    }
}

pub type Result<T> = std::result::Result<T, SendError>;
