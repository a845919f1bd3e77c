//! Ordered delivery of messages that transfer message ports.
//!
//! A message that carries a pending port cannot be sent until the port has an
//! identity. Rather than let later messages overtake it, the sender switches
//! into queue mode: every subsequent message is appended behind it, and the
//! queue drains strictly from the head whenever the registry reports that a
//! channel became ready.
//!
//! - [`PostMessageSender`] validates transfers and decides send-or-queue.
//! - [`DeliveryQueue`] is the FIFO with "head blocks all" semantics.
//! - [`Dispatcher`] carries registry notifications to senders.

pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod queue;
pub mod sender;
pub mod target;

pub use delivery::{ChannelDelivery, RemoteDelivery};
pub use dispatcher::{Dispatcher, ReadinessObserver};
pub use error::{Result, SendError};
pub use message::{OutboundMessage, ResolvedMessage};
pub use queue::{DeliveryQueue, DrainOutcome};
pub use sender::{PostMessageSender, PostOutcome, QueueReason, SenderConfig, Stall};
pub use target::{DeliveryTarget, FrameTarget, PortTarget};
