use msgports_port::{MessagePort, PortId};
use serde::{Deserialize, Serialize};

/// A message waiting to be sent, together with the ports it transfers.
///
/// The record owns its ports and is immutable once built.
#[derive(Debug)]
pub struct OutboundMessage {
    destination: String,
    payload: String,
    target_origin: String,
    ports: Vec<MessagePort>,
}

impl OutboundMessage {
    pub fn new(
        destination: impl Into<String>,
        payload: impl Into<String>,
        target_origin: impl Into<String>,
        ports: Vec<MessagePort>,
    ) -> Self {
        Self {
            destination: destination.into(),
            payload: payload.into(),
            target_origin: target_origin.into(),
            ports,
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn target_origin(&self) -> &str {
        &self.target_origin
    }

    pub fn ports(&self) -> &[MessagePort] {
        &self.ports
    }

    /// Identities of every attached port, or `None` while any of them is not ready.
    pub fn ready_port_ids(&self) -> Option<Vec<PortId>> {
        self.ports.iter().map(MessagePort::ready_id).collect()
    }

    /// True if an attached port was closed, so the record can never become ready.
    pub fn has_closed_port(&self) -> bool {
        self.ports.iter().any(MessagePort::is_closed)
    }

    pub(crate) fn into_resolved(self, destination: String, ports: Vec<PortId>) -> ResolvedMessage {
        ResolvedMessage {
            destination,
            payload: self.payload,
            target_origin: self.target_origin,
            ports,
        }
    }
}

/// A message with every port replaced by its identity, ready for the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMessage {
    pub destination: String,
    pub payload: String,
    pub target_origin: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortId>,
}
