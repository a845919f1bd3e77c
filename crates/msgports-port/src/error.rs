use std::fmt;

use crate::port::{ChannelId, PortId};

/// Why a port (or the sender that owns it) is in the wrong state for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidStateReason {
    /// The port has been closed.
    Closed,
    /// The port has already been handed off to another owner.
    AlreadyTransferred,
    /// The same port appears more than once in one transfer list.
    DuplicateTransfer,
    /// A port cannot be transferred through itself.
    SourcePort,
    /// A port cannot be transferred through its entangled peer.
    EntangledPeer,
    /// The port used to send is closed.
    SenderClosed,
    /// The port used to send has been handed off to another owner.
    SenderTransferred,
}

impl fmt::Display for InvalidStateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Closed => "port is closed",
            Self::AlreadyTransferred => "port was already transferred",
            Self::DuplicateTransfer => "port is listed more than once",
            Self::SourcePort => "port cannot be transferred through itself",
            Self::EntangledPeer => "port cannot be transferred through its entangled peer",
            Self::SenderClosed => "sending port is closed",
            Self::SenderTransferred => "sending port was transferred",
        };
        f.write_str(text)
    }
}

/// Errors that can occur in port operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    /// The port is in the wrong state for the requested operation.
    #[error("invalid state: {reason}")]
    InvalidState { reason: InvalidStateReason },

    /// No pending channel with this id is known to the registry.
    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),

    /// The registry does not track a local port with this id.
    #[error("unknown port {0}")]
    UnknownPort(PortId),
}

impl PortError {
    pub(crate) fn invalid(reason: InvalidStateReason) -> Self {
        Self::InvalidState { reason }
    }

    /// Returns the invalid-state reason, if this is an invalid-state error.
    pub fn invalid_state_reason(&self) -> Option<InvalidStateReason> {
        match self {
            Self::InvalidState { reason } => Some(*reason),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PortError>;
