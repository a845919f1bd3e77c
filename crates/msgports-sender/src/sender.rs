use std::sync::Arc;

use msgports_port::{InvalidStateReason, MessagePort, PortId, PortRegistry};
use tracing::{debug, trace, warn};

use crate::delivery::RemoteDelivery;
use crate::dispatcher::ReadinessObserver;
use crate::error::{Result, SendError};
use crate::message::OutboundMessage;
use crate::queue::DeliveryQueue;
use crate::target::{DeliveryTarget, FrameTarget, PortTarget};

/// Controls sender diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderConfig {
    /// Queue depth at which a warning is logged. The queue itself is unbounded.
    pub backlog_warn_threshold: usize,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            backlog_warn_threshold: 256,
        }
    }
}

/// Why a message was queued instead of sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueReason {
    /// Earlier messages are still queued.
    Backlog,
    /// The target cannot accept messages yet.
    SenderNotReady,
    /// A transferred port has no identity yet.
    PendingPorts,
}

/// What `post_message` did with an accepted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    Sent,
    Queued(QueueReason),
}

/// Snapshot of a sender whose queue is not empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stall {
    /// Messages waiting, including the head.
    pub queued: usize,
    /// Whether the target could accept messages.
    pub sender_ready: bool,
    /// The target itself is closed; nothing queued will ever be sent.
    pub sender_closed: bool,
    /// The head transfers a port that was closed while queued; it will never be sent.
    pub port_closed: bool,
}

impl Stall {
    /// True when waiting for more channels cannot unblock the queue.
    pub fn is_permanent(&self) -> bool {
        self.sender_closed || self.port_closed
    }
}

/// Validates outbound messages and delivers them in caller order.
///
/// Messages are sent immediately when nothing is queued, the target is ready,
/// and every transferred port has an identity. Otherwise they are queued and
/// sent by [`on_channel_became_ready`](Self::on_channel_became_ready).
pub struct PostMessageSender<T, D> {
    target: T,
    delivery: D,
    registry: Arc<dyn PortRegistry>,
    queue: DeliveryQueue,
    config: SenderConfig,
    backlog_warned: bool,
    delivered: u64,
}

impl<D: RemoteDelivery> PostMessageSender<FrameTarget, D> {
    /// Create a sender that posts to frames.
    pub fn for_frames(delivery: D, registry: Arc<dyn PortRegistry>) -> Self {
        Self::new(FrameTarget, delivery, registry)
    }
}

impl<D: RemoteDelivery> PostMessageSender<PortTarget, D> {
    /// Create a sender that posts through `port`.
    pub fn for_port(port: MessagePort, delivery: D, registry: Arc<dyn PortRegistry>) -> Self {
        Self::new(PortTarget::new(port), delivery, registry)
    }

    /// Post through the source port. The destination is the port's identity.
    pub fn post(
        &mut self,
        payload: impl Into<String>,
        ports: Vec<MessagePort>,
    ) -> Result<PostOutcome> {
        self.post_message("", payload, "", ports)
    }
}

impl<T: DeliveryTarget, D: RemoteDelivery> PostMessageSender<T, D> {
    /// Create a sender with default config.
    pub fn new(target: T, delivery: D, registry: Arc<dyn PortRegistry>) -> Self {
        Self::with_config(target, delivery, registry, SenderConfig::default())
    }

    /// Create a sender with explicit config.
    pub fn with_config(
        target: T,
        delivery: D,
        registry: Arc<dyn PortRegistry>,
        config: SenderConfig,
    ) -> Self {
        Self {
            target,
            delivery,
            registry,
            queue: DeliveryQueue::new(),
            config,
            backlog_warned: false,
            delivered: 0,
        }
    }

    /// Post a message, transferring `ports` with it.
    ///
    /// Fails with [`SendError::InvalidState`] if any port is closed, already
    /// transferred, or listed twice, or if the target rejects the transfer. A
    /// failed call leaves every port and the queue untouched. On success all
    /// ports are marked transferred before the send-or-queue decision.
    pub fn post_message(
        &mut self,
        destination: &str,
        payload: impl Into<String>,
        target_origin: &str,
        ports: Vec<MessagePort>,
    ) -> Result<PostOutcome> {
        self.claim_ports(&ports)?;
        let message = OutboundMessage::new(destination, payload, target_origin, ports);

        match self.send_decision(&message) {
            Ok(ids) => {
                self.transmit(message, ids);
                Ok(PostOutcome::Sent)
            }
            Err(reason) => {
                debug!(
                    ?reason,
                    ports = message.ports().len(),
                    queued = self.queue.len() + 1,
                    "queueing message"
                );
                self.queue.enqueue(message);
                self.check_backlog();
                Ok(PostOutcome::Queued(reason))
            }
        }
    }

    /// Registry notification: some channel became ready.
    ///
    /// Drains the queue from the head until the first record that is still
    /// blocked. Returns how many messages were sent.
    pub fn on_channel_became_ready(&mut self) -> usize {
        if !self.target.is_ready() {
            trace!(queued = self.queue.len(), "sender not ready; not draining");
            self.warn_if_stuck();
            return 0;
        }

        let Self {
            target,
            delivery,
            registry,
            queue,
            delivered,
            ..
        } = self;
        let outcome = queue.drain(true, |message, ids| {
            transmit(target, delivery, registry.as_ref(), message, ids);
            *delivered += 1;
        });

        if outcome.delivered > 0 {
            debug!(
                delivered = outcome.delivered,
                remaining = outcome.remaining,
                "drained queue"
            );
        }
        self.warn_if_stuck();
        if self.queue.len() < self.config.backlog_warn_threshold {
            self.backlog_warned = false;
        }
        outcome.delivered
    }

    /// Describes the queue while it is not empty.
    pub fn stall(&self) -> Option<Stall> {
        let head = self.queue.head()?;
        Some(Stall {
            queued: self.queue.len(),
            sender_ready: self.target.is_ready(),
            sender_closed: self.target.is_closed(),
            port_closed: head.has_closed_port(),
        })
    }

    /// Number of messages waiting.
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Number of messages handed to the delivery so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn delivery(&self) -> &D {
        &self.delivery
    }

    pub fn delivery_mut(&mut self) -> &mut D {
        &mut self.delivery
    }

    /// Consume the sender and return its delivery. Queued messages are dropped.
    pub fn into_delivery(self) -> D {
        if !self.queue.is_empty() {
            warn!(
                abandoned = self.queue.len(),
                "sender dropped with queued messages"
            );
        }
        self.delivery
    }

    /// Get sender configuration.
    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    fn claim_ports(&self, ports: &[MessagePort]) -> Result<()> {
        self.target.check_transfer(ports)?;

        for (index, port) in ports.iter().enumerate() {
            port.check_transferable()?;
            if ports[..index].iter().any(|earlier| earlier.same_port(port)) {
                return Err(SendError::InvalidState(
                    InvalidStateReason::DuplicateTransfer,
                ));
            }
        }

        for port in ports {
            port.mark_transferred()?;
        }
        Ok(())
    }

    fn send_decision(
        &self,
        message: &OutboundMessage,
    ) -> std::result::Result<Vec<PortId>, QueueReason> {
        if !self.queue.is_empty() {
            return Err(QueueReason::Backlog);
        }
        if !self.target.is_ready() {
            return Err(QueueReason::SenderNotReady);
        }
        message.ready_port_ids().ok_or(QueueReason::PendingPorts)
    }

    fn transmit(&mut self, message: OutboundMessage, ids: Vec<PortId>) {
        transmit(
            &self.target,
            &mut self.delivery,
            self.registry.as_ref(),
            message,
            ids,
        );
        self.delivered += 1;
    }

    fn warn_if_stuck(&self) {
        let Some(stall) = self.stall() else {
            return;
        };
        if stall.sender_closed {
            warn!(
                queued = stall.queued,
                "sending port closed with messages queued; they will never be sent"
            );
        } else if stall.port_closed {
            warn!(
                queued = stall.queued,
                "queue head transfers a closed port and will never be sent"
            );
        }
    }

    fn check_backlog(&mut self) {
        if !self.backlog_warned && self.queue.len() >= self.config.backlog_warn_threshold {
            self.backlog_warned = true;
            warn!(
                queued = self.queue.len(),
                threshold = self.config.backlog_warn_threshold,
                "delivery queue backlog"
            );
        }
    }
}

impl<T: DeliveryTarget, D: RemoteDelivery> ReadinessObserver for PostMessageSender<T, D> {
    fn on_channel_became_ready(&mut self) -> usize {
        PostMessageSender::on_channel_became_ready(self)
    }
}

fn transmit<T: DeliveryTarget, D: RemoteDelivery>(
    target: &T,
    delivery: &mut D,
    registry: &dyn PortRegistry,
    message: OutboundMessage,
    ids: Vec<PortId>,
) {
    // The remote side owns these identities from here on.
    if !ids.is_empty() {
        registry.release_identities(&ids);
    }
    let destination = target.resolve_destination(message.destination());
    let resolved = message.into_resolved(destination, ids);
    trace!(
        destination = %resolved.destination,
        ports = resolved.ports.len(),
        "delivering message"
    );
    delivery.deliver(resolved);
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::Receiver;
    use msgports_port::{PortService, RegistryEvent};

    use super::*;
    use crate::delivery::ChannelDelivery;
    use crate::message::ResolvedMessage;

    struct Harness {
        service: Arc<PortService>,
        sender: PostMessageSender<FrameTarget, ChannelDelivery>,
        rx: Receiver<ResolvedMessage>,
    }

    impl Harness {
        fn sent(&self) -> Vec<ResolvedMessage> {
            self.rx.try_iter().collect()
        }

        fn payloads(&self) -> Vec<String> {
            self.sent().into_iter().map(|msg| msg.payload).collect()
        }
    }

    fn discard(_msg: ResolvedMessage) {}

    fn harness() -> Harness {
        let service = Arc::new(PortService::new());
        let (tx, rx) = crossbeam_channel::unbounded();
        let registry: Arc<dyn PortRegistry> = service.clone();
        Harness {
            service,
            sender: PostMessageSender::for_frames(ChannelDelivery::new(tx), registry),
            rx,
        }
    }

    #[test]
    fn sends_immediately_when_nothing_blocks() {
        let mut h = harness();
        let outcome = h.sender.post_message("main", "hi", "*", Vec::new()).unwrap();
        assert_eq!(outcome, PostOutcome::Sent);
        assert_eq!(h.payloads(), vec!["hi"]);
        assert_eq!(h.sender.queued_len(), 0);
        assert_eq!(h.sender.delivered(), 1);
    }

    #[test]
    fn ready_ports_are_resolved_and_released() {
        let mut h = harness();
        let (a, b) = h.service.create_entangled_pair();
        let (first, _) = h.service.complete_channel(a.channel()).unwrap();

        let outcome = h.sender.post_message("main", "port", "*", vec![a]).unwrap();

        assert_eq!(outcome, PostOutcome::Sent);
        assert!(!h.service.is_tracking(first));
        assert!(b.id().is_some_and(|id| h.service.is_tracking(id)));
        assert_eq!(h.sent()[0].ports, vec![first]);
    }

    #[test]
    fn pending_port_switches_to_queue_mode() {
        let mut h = harness();
        let (_a, b) = h.service.create_entangled_pair();

        assert_eq!(
            h.sender.post_message("main", "1", "*", vec![b]).unwrap(),
            PostOutcome::Queued(QueueReason::PendingPorts)
        );
        assert_eq!(
            h.sender.post_message("main", "2", "*", Vec::new()).unwrap(),
            PostOutcome::Queued(QueueReason::Backlog)
        );
        assert!(h.payloads().is_empty());
        assert_eq!(h.sender.queued_len(), 2);
    }

    #[test]
    fn transfer_is_marked_even_when_queued() {
        let mut h = harness();
        let (_a, b) = h.service.create_entangled_pair();
        let alias = b.clone();

        h.sender.post_message("main", "1", "*", vec![b]).unwrap();
        assert!(alias.is_transferred());

        let err = h
            .sender
            .post_message("main", "2", "*", vec![alias])
            .unwrap_err();
        assert_eq!(
            err,
            SendError::InvalidState(InvalidStateReason::AlreadyTransferred)
        );
        assert_eq!(h.sender.queued_len(), 1);
    }

    #[test]
    fn failed_validation_marks_nothing() {
        let mut h = harness();
        let (a, b) = h.service.create_entangled_pair();
        let (c, _d) = h.service.create_entangled_pair();
        c.close();
        let (a_alias, b_alias) = (a.clone(), b.clone());

        let err = h
            .sender
            .post_message("main", "1", "*", vec![a, b, c])
            .unwrap_err();

        assert_eq!(err, SendError::InvalidState(InvalidStateReason::Closed));
        assert!(!a_alias.is_transferred());
        assert!(!b_alias.is_transferred());
        assert_eq!(h.sender.queued_len(), 0);
    }

    #[test]
    fn duplicate_port_in_one_call_is_rejected() {
        let mut h = harness();
        let (a, _b) = h.service.create_entangled_pair();
        let alias = a.clone();

        let err = h
            .sender
            .post_message("main", "1", "*", vec![a, alias.clone()])
            .unwrap_err();

        assert_eq!(
            err,
            SendError::InvalidState(InvalidStateReason::DuplicateTransfer)
        );
        assert!(!alias.is_transferred());
    }

    #[test]
    fn notification_drains_in_order() {
        let mut h = harness();
        let (a, b) = h.service.create_entangled_pair();
        h.sender.post_message("main", "1", "*", vec![b]).unwrap();
        h.sender.post_message("main", "2", "*", Vec::new()).unwrap();
        h.sender.post_message("main", "3", "*", Vec::new()).unwrap();

        h.service.complete_channel(a.channel()).unwrap();
        assert_eq!(h.sender.on_channel_became_ready(), 3);

        assert_eq!(h.payloads(), vec!["1", "2", "3"]);
        assert!(h.sender.stall().is_none());
    }

    #[test]
    fn repeated_notifications_are_harmless() {
        let mut h = harness();
        assert_eq!(h.sender.on_channel_became_ready(), 0);

        let (_a, b) = h.service.create_entangled_pair();
        h.sender.post_message("main", "1", "*", vec![b]).unwrap();
        assert_eq!(h.sender.on_channel_became_ready(), 0);
        assert_eq!(h.sender.on_channel_became_ready(), 0);
        assert!(h.payloads().is_empty());
    }

    #[test]
    fn closed_port_in_queue_reports_permanent_stall() {
        let mut h = harness();
        let (_a, b) = h.service.create_entangled_pair();
        let alias = b.clone();
        h.sender.post_message("main", "1", "*", vec![b]).unwrap();
        h.sender.post_message("main", "2", "*", Vec::new()).unwrap();

        alias.close();
        h.service.complete_all_pending();
        assert_eq!(h.sender.on_channel_became_ready(), 0);

        assert_eq!(
            h.sender.stall(),
            Some(Stall {
                queued: 2,
                sender_ready: true,
                sender_closed: false,
                port_closed: true,
            })
        );
        assert!(h.sender.stall().is_some_and(|stall| stall.is_permanent()));
    }

    #[test]
    fn closing_source_port_with_queue_is_a_permanent_stall() {
        let service = Arc::new(PortService::new());
        let (a, _b) = service.create_entangled_pair();
        let registry: Arc<dyn PortRegistry> = service.clone();
        let mut sender = PostMessageSender::for_port(a.clone(), discard, registry);

        sender.post("queued", Vec::new()).unwrap();
        a.close();
        service.complete_all_pending();
        assert_eq!(sender.on_channel_became_ready(), 0);

        assert_eq!(
            sender.stall(),
            Some(Stall {
                queued: 1,
                sender_ready: false,
                sender_closed: true,
                port_closed: false,
            })
        );
        assert!(sender.stall().is_some_and(|stall| stall.is_permanent()));
    }

    #[test]
    fn waiting_source_port_is_not_a_permanent_stall() {
        let service = Arc::new(PortService::new());
        let (a, _b) = service.create_entangled_pair();
        let registry: Arc<dyn PortRegistry> = service.clone();
        let mut sender = PostMessageSender::for_port(a, discard, registry);

        sender.post("queued", Vec::new()).unwrap();

        assert!(sender.stall().is_some_and(|stall| !stall.is_permanent()));
    }

    #[test]
    fn posting_through_handed_off_port_fails() {
        let mut h = harness();
        let (a, _b) = h.service.create_entangled_pair();
        h.service.complete_channel(a.channel()).unwrap();
        let retained = a.clone();
        h.sender
            .post_message("child", "handoff", "*", vec![a])
            .unwrap();

        let registry: Arc<dyn PortRegistry> = h.service.clone();
        let mut old_owner = PostMessageSender::for_port(retained, discard, registry);
        let err = old_owner.post("after handoff", Vec::new()).unwrap_err();

        assert_eq!(
            err,
            SendError::InvalidState(InvalidStateReason::SenderTransferred)
        );
        assert_eq!(old_owner.queued_len(), 0);
        assert_eq!(old_owner.delivered(), 0);
        assert_eq!(h.payloads(), vec!["handoff"]);
    }

    #[test]
    fn port_sender_waits_for_source_port() {
        let service = Arc::new(PortService::new());
        let events = service.subscribe();
        let (a, _b) = service.create_entangled_pair();
        let mut sent: Vec<ResolvedMessage> = Vec::new();
        {
            let registry: Arc<dyn PortRegistry> = service.clone();
            let delivery = |msg: ResolvedMessage| sent.push(msg);
            let mut sender = PostMessageSender::for_port(a.clone(), delivery, registry);

            assert_eq!(
                sender.post("hello", Vec::new()).unwrap(),
                PostOutcome::Queued(QueueReason::SenderNotReady)
            );
            assert_eq!(sender.on_channel_became_ready(), 0);

            service.complete_channel(a.channel()).unwrap();
            assert!(matches!(
                events.try_recv(),
                Ok(RegistryEvent::ChannelReady(_))
            ));
            assert_eq!(sender.on_channel_became_ready(), 1);
        }

        let id = a.id().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination, id.to_string());
        assert_eq!(sent[0].payload, "hello");
    }

    #[test]
    fn port_sender_rejects_own_port() {
        let service = Arc::new(PortService::new());
        let (a, _b) = service.create_entangled_pair();
        let registry: Arc<dyn PortRegistry> = service.clone();
        let mut sender = PostMessageSender::for_port(a.clone(), discard, registry);

        let err = sender.post("1", vec![a.clone()]).unwrap_err();

        assert_eq!(err, SendError::InvalidState(InvalidStateReason::SourcePort));
        assert!(!a.is_transferred());
    }

    #[test]
    fn posting_through_closed_port_fails() {
        let service = Arc::new(PortService::new());
        let (a, _b) = service.create_entangled_pair();
        a.close();
        let registry: Arc<dyn PortRegistry> = service.clone();
        let mut sender = PostMessageSender::for_port(a, discard, registry);

        let err = sender.post("1", Vec::new()).unwrap_err();

        assert_eq!(
            err.invalid_state_reason(),
            Some(InvalidStateReason::SenderClosed)
        );
        assert_eq!(sender.queued_len(), 0);
    }

    #[test]
    fn backlog_warning_threshold_is_configurable() {
        let service = Arc::new(PortService::new());
        let registry: Arc<dyn PortRegistry> = service.clone();
        let config = SenderConfig {
            backlog_warn_threshold: 2,
        };
        let (_a, b) = service.create_entangled_pair();
        let mut sender = PostMessageSender::with_config(FrameTarget, discard, registry, config);

        sender.post_message("main", "1", "*", vec![b]).unwrap();
        assert!(!sender.backlog_warned);
        sender.post_message("main", "2", "*", Vec::new()).unwrap();
        assert!(sender.backlog_warned);
        assert_eq!(sender.config().backlog_warn_threshold, 2);
    }
}
