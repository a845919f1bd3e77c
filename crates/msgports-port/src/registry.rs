use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{PortError, Result};
use crate::port::{ChannelId, InboundMessage, MessagePort, PortId};

/// Notification pushed from a registry to its subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEvent {
    /// Negotiation for this channel finished; its ports may now be ready.
    ChannelReady(ChannelId),
}

/// Allocates port identities and tells observers when channels become ready.
pub trait PortRegistry: Send + Sync {
    /// Create two pending ports entangled with each other.
    fn create_entangled_pair(&self) -> (MessagePort, MessagePort);

    /// The remote side now owns these identities; stop tracking them locally.
    fn release_identities(&self, ids: &[PortId]);

    /// Subscribe to readiness notifications.
    fn subscribe(&self) -> Receiver<RegistryEvent>;
}

/// Controls identity allocation in [`PortService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// First identity handed out. Identities increase by one per port.
    pub first_port_id: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { first_port_id: 1 }
    }
}

struct PendingChannel {
    channel: ChannelId,
    ports: (MessagePort, MessagePort),
}

#[derive(Default)]
struct ServiceState {
    pending: VecDeque<PendingChannel>,
    local_ports: HashMap<PortId, MessagePort>,
    subscribers: Vec<Sender<RegistryEvent>>,
}

/// In-process port registry, owned by one communication session.
///
/// Channels are created pending. Whatever performs the actual channel setup
/// calls [`complete_channel`](Self::complete_channel) when it is done, which
/// assigns identities and broadcasts [`RegistryEvent::ChannelReady`].
pub struct PortService {
    state: Mutex<ServiceState>,
    next_port_id: AtomicU32,
    next_channel_id: AtomicU64,
    config: RegistryConfig,
}

impl PortService {
    /// Create an empty registry with default config.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with explicit config.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            state: Mutex::new(ServiceState::default()),
            next_port_id: AtomicU32::new(config.first_port_id),
            next_channel_id: AtomicU64::new(1),
            config,
        }
    }

    /// Finish negotiation for a pending channel.
    ///
    /// Returns the identities allocated for the pair. A port closed while its
    /// channel was pending never receives its identity.
    pub fn complete_channel(&self, channel: ChannelId) -> Result<(PortId, PortId)> {
        let pending = {
            let mut state = self.state.lock();
            let index = state
                .pending
                .iter()
                .position(|entry| entry.channel == channel)
                .ok_or(PortError::UnknownChannel(channel))?;
            state
                .pending
                .remove(index)
                .ok_or(PortError::UnknownChannel(channel))?
        };

        let ids = self.ready_pair(pending);
        self.broadcast(RegistryEvent::ChannelReady(channel));
        Ok(ids)
    }

    /// Complete every pending channel in creation order. Returns how many completed.
    pub fn complete_all_pending(&self) -> usize {
        let drained: Vec<PendingChannel> = self.state.lock().pending.drain(..).collect();
        let count = drained.len();
        for pending in drained {
            let channel = pending.channel;
            self.ready_pair(pending);
            self.broadcast(RegistryEvent::ChannelReady(channel));
        }
        count
    }

    /// Route a message from the remote side to a local port.
    ///
    /// Returns whether a handler received it. A closed port is dropped from
    /// tracking the first time a message arrives for it.
    pub fn dispatch(&self, id: PortId, message: InboundMessage) -> Result<bool> {
        let port = {
            let mut state = self.state.lock();
            let port = state
                .local_ports
                .get(&id)
                .cloned()
                .ok_or(PortError::UnknownPort(id))?;
            if port.is_closed() {
                state.local_ports.remove(&id);
                debug!(port = %id, "inbound message for closed port; no longer tracked");
                return Ok(false);
            }
            port
        };
        let delivered = port.dispatch(message);
        if !delivered {
            debug!(port = %id, "inbound message not delivered");
        }
        Ok(delivered)
    }

    /// True while a ready port with this identity is tracked locally.
    pub fn is_tracking(&self, id: PortId) -> bool {
        self.state.lock().local_ports.contains_key(&id)
    }

    /// Channels still waiting for negotiation, oldest first.
    pub fn pending_channels(&self) -> Vec<ChannelId> {
        self.state
            .lock()
            .pending
            .iter()
            .map(|entry| entry.channel)
            .collect()
    }

    /// Get registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn ready_pair(&self, pending: PendingChannel) -> (PortId, PortId) {
        let (first, second) = pending.ports;
        let first_id = self.assign(&first);
        let second_id = self.assign(&second);
        self.prune_closed();
        debug!(
            channel = %pending.channel,
            first = %first_id,
            second = %second_id,
            "channel ready"
        );
        (first_id, second_id)
    }

    fn assign(&self, port: &MessagePort) -> PortId {
        let id = PortId::new(self.next_port_id.fetch_add(1, Ordering::Relaxed));
        if !port.try_assign_identity(id) {
            trace!(port = %id, "port closed while pending; identity not assigned");
            return id;
        }
        self.state.lock().local_ports.insert(id, port.clone());
        id
    }

    fn prune_closed(&self) {
        let mut state = self.state.lock();
        let before = state.local_ports.len();
        state.local_ports.retain(|_, port| !port.is_closed());
        let pruned = before - state.local_ports.len();
        if pruned > 0 {
            trace!(pruned, "stopped tracking closed ports");
        }
    }

    fn broadcast(&self, event: RegistryEvent) {
        let mut state = self.state.lock();
        state
            .subscribers
            .retain(|subscriber| subscriber.send(event).is_ok());
        trace!(?event, subscribers = state.subscribers.len(), "broadcast");
    }
}

impl Default for PortService {
    fn default() -> Self {
        Self::new()
    }
}

impl PortRegistry for PortService {
    fn create_entangled_pair(&self) -> (MessagePort, MessagePort) {
        let channel = ChannelId::new(self.next_channel_id.fetch_add(1, Ordering::Relaxed));
        let (first, second) = MessagePort::entangled_pair(channel);
        self.state.lock().pending.push_back(PendingChannel {
            channel,
            ports: (first.clone(), second.clone()),
        });
        debug!(%channel, "created pending channel");
        (first, second)
    }

    fn release_identities(&self, ids: &[PortId]) {
        let mut state = self.state.lock();
        for id in ids {
            if state.local_ports.remove(id).is_some() {
                trace!(port = %id, "released to remote owner");
            }
        }
    }

    fn subscribe(&self) -> Receiver<RegistryEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.state.lock().subscribers.push(tx);
        rx
    }
}
