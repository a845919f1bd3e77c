//! Entangled message ports and the registry that makes them ready.
//!
//! This is the lowest layer of msgports. A [`MessagePort`] is one side of a
//! message channel. Ports are always created in entangled pairs by a
//! [`PortRegistry`] and start out pending: they have no identity until the
//! registry finishes negotiating the channel and broadcasts
//! [`RegistryEvent::ChannelReady`].

pub mod error;
pub mod port;
pub mod registry;

pub use error::{InvalidStateReason, PortError, Result};
pub use port::{ChannelId, InboundMessage, MessageHandler, MessagePort, PortId, PortState};
pub use registry::{PortRegistry, PortService, RegistryConfig, RegistryEvent};
