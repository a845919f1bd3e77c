use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{InvalidStateReason, PortError, Result};

/// Identity assigned to a port once its channel is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(u32);

impl PortId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the channel formed by an entangled pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(u64);

impl ChannelId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// Lifecycle state of a port.
///
/// `Pending -> Ready` happens once, when the registry assigns an identity.
/// `Closed` is terminal and reachable from either state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Pending,
    Ready,
    Closed,
}

/// A message received from the remote side of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub data: String,
    pub ports: Vec<PortId>,
}

impl InboundMessage {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ports: Vec::new(),
        }
    }
}

/// Receive-side callback installed on a port.
pub type MessageHandler = Box<dyn FnMut(InboundMessage) + Send>;

struct PortInner {
    state: PortState,
    id: Option<PortId>,
    transferred: bool,
    handler: Option<MessageHandler>,
    peer: Weak<Mutex<PortInner>>,
}

impl PortInner {
    fn pending() -> Self {
        Self {
            state: PortState::Pending,
            id: None,
            transferred: false,
            handler: None,
            peer: Weak::new(),
        }
    }

    fn transfer_check(&self) -> Result<()> {
        if self.state == PortState::Closed {
            return Err(PortError::invalid(InvalidStateReason::Closed));
        }
        if self.transferred {
            return Err(PortError::invalid(InvalidStateReason::AlreadyTransferred));
        }
        Ok(())
    }
}

/// One side of a message channel.
///
/// Handles are cheap to clone and all clones observe the same state. Handing a
/// port to a sender consumes that handle; the `transferred` flag catches any
/// clone that is offered for transfer again.
#[derive(Clone)]
pub struct MessagePort {
    channel: ChannelId,
    inner: Arc<Mutex<PortInner>>,
}

impl MessagePort {
    /// Create two pending ports entangled with each other.
    ///
    /// Intended for [`PortRegistry`](crate::PortRegistry) implementations; callers
    /// normally get ports from a registry.
    pub fn entangled_pair(channel: ChannelId) -> (MessagePort, MessagePort) {
        let first = Arc::new(Mutex::new(PortInner::pending()));
        let second = Arc::new(Mutex::new(PortInner::pending()));
        first.lock().peer = Arc::downgrade(&second);
        second.lock().peer = Arc::downgrade(&first);

        (
            MessagePort {
                channel,
                inner: first,
            },
            MessagePort {
                channel,
                inner: second,
            },
        )
    }

    /// The channel this port belongs to.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Assigned identity, if any. A closed port keeps the identity it had.
    pub fn id(&self) -> Option<PortId> {
        self.inner.lock().id
    }

    /// Identity, but only while the port is ready.
    pub fn ready_id(&self) -> Option<PortId> {
        let inner = self.inner.lock();
        match inner.state {
            PortState::Ready => inner.id,
            _ => None,
        }
    }

    pub fn state(&self) -> PortState {
        self.inner.lock().state
    }

    pub fn is_ready(&self) -> bool {
        self.ready_id().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == PortState::Closed
    }

    pub fn is_transferred(&self) -> bool {
        self.inner.lock().transferred
    }

    /// Check that the port could be transferred, without changing anything.
    pub fn check_transferable(&self) -> Result<()> {
        self.inner.lock().transfer_check()
    }

    /// Commit to handing this port to a new owner.
    ///
    /// Fails if the port is closed or already transferred. Once set, the flag
    /// is never cleared and the handler can no longer be replaced.
    pub fn mark_transferred(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.transfer_check()?;
        inner.transferred = true;
        Ok(())
    }

    /// Close the port. Safe to call more than once.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.state = PortState::Closed;
        inner.handler = None;
    }

    /// Give the port its identity, moving it from `Pending` to `Ready`.
    ///
    /// # Panics
    ///
    /// Panics if the port already has an identity or has been closed. Registries
    /// must check [`is_closed`](Self::is_closed) before assigning.
    pub fn assign_identity(&self, id: PortId) {
        assert!(
            self.try_assign_identity(id),
            "identity {id} assigned to a closed port"
        );
    }

    /// Assign the identity unless the port has been closed.
    ///
    /// The closed check and the assignment happen under one lock, so an owner
    /// closing the port concurrently cannot race the registry. Returns `false`
    /// and leaves the port untouched if it was closed.
    ///
    /// # Panics
    ///
    /// Panics if the port already has an identity.
    pub fn try_assign_identity(&self, id: PortId) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == PortState::Closed {
            return false;
        }
        if let Some(existing) = inner.id {
            panic!("port already has identity {existing}, refusing {id}");
        }
        inner.id = Some(id);
        inner.state = PortState::Ready;
        true
    }

    /// The entangled peer, while any handle to it is still alive.
    pub fn peer(&self) -> Option<MessagePort> {
        let peer = self.inner.lock().peer.upgrade()?;
        Some(MessagePort {
            channel: self.channel,
            inner: peer,
        })
    }

    /// True if both handles refer to the same port.
    pub fn same_port(&self, other: &MessagePort) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// True if `other` is the entangled peer of this port.
    pub fn is_entangled_with(&self, other: &MessagePort) -> bool {
        self.channel == other.channel && !self.same_port(other)
    }

    /// Install the receive-side handler.
    pub fn set_message_handler(&self, handler: MessageHandler) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.transfer_check()?;
        inner.handler = Some(handler);
        Ok(())
    }

    /// Deliver an inbound message to the installed handler.
    ///
    /// Returns `false` when the port is closed, transferred, or has no handler.
    pub fn dispatch(&self, message: InboundMessage) -> bool {
        let mut handler = {
            let mut inner = self.inner.lock();
            if inner.transfer_check().is_err() {
                return false;
            }
            match inner.handler.take() {
                Some(handler) => handler,
                None => return false,
            }
        };

        // The lock is released while the handler runs so it may call back into the port.
        handler(message);

        let mut inner = self.inner.lock();
        if inner.handler.is_none() && inner.transfer_check().is_ok() {
            inner.handler = Some(handler);
        }
        true
    }
}

impl fmt::Debug for MessagePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MessagePort")
            .field("channel", &self.channel)
            .field("id", &inner.id)
            .field("state", &inner.state)
            .field("transferred", &inner.transferred)
            .field("has_handler", &inner.handler.is_some())
            .finish()
    }
}
