use msgports_port::{InvalidStateReason, MessagePort};

use crate::error::{Result, SendError};

/// Where a sender posts to.
///
/// The target decides whether the sender may transmit right now and what the
/// destination of a resolved message is.
pub trait DeliveryTarget {
    /// Whether the target can accept messages right now.
    fn is_ready(&self) -> bool;

    /// Whether the target can never accept messages again.
    fn is_closed(&self) -> bool {
        false
    }

    /// Reject transfers this target can never carry. Called before any port is marked.
    fn check_transfer(&self, _ports: &[MessagePort]) -> Result<()> {
        Ok(())
    }

    /// Destination recorded on the resolved message.
    fn resolve_destination(&self, requested: &str) -> String;
}

/// Posts to a named frame. Always ready.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameTarget;

impl DeliveryTarget for FrameTarget {
    fn is_ready(&self) -> bool {
        true
    }

    fn resolve_destination(&self, requested: &str) -> String {
        requested.to_string()
    }
}

/// Posts through one side of a message channel.
///
/// Ready only once the source port has an identity, which then becomes the
/// destination of every message sent through it.
#[derive(Debug, Clone)]
pub struct PortTarget {
    port: MessagePort,
}

impl PortTarget {
    pub fn new(port: MessagePort) -> Self {
        Self { port }
    }

    pub fn port(&self) -> &MessagePort {
        &self.port
    }
}

impl DeliveryTarget for PortTarget {
    fn is_ready(&self) -> bool {
        self.port.is_ready()
    }

    fn is_closed(&self) -> bool {
        self.port.is_closed()
    }

    fn check_transfer(&self, ports: &[MessagePort]) -> Result<()> {
        if self.port.is_closed() {
            return Err(SendError::InvalidState(InvalidStateReason::SenderClosed));
        }
        if self.port.is_transferred() {
            return Err(SendError::InvalidState(
                InvalidStateReason::SenderTransferred,
            ));
        }
        for port in ports {
            if port.same_port(&self.port) {
                return Err(SendError::InvalidState(InvalidStateReason::SourcePort));
            }
            if port.is_entangled_with(&self.port) {
                return Err(SendError::InvalidState(InvalidStateReason::EntangledPeer));
            }
        }
        Ok(())
    }

    fn resolve_destination(&self, requested: &str) -> String {
        match self.port.id() {
            Some(id) => id.to_string(),
            None => requested.to_string(),
        }
    }
}
