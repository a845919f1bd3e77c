use std::collections::VecDeque;

use msgports_port::PortId;

use crate::message::OutboundMessage;

/// Result of one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainOutcome {
    /// Records handed to the send function.
    pub delivered: usize,
    /// Records still queued afterwards.
    pub remaining: usize,
}

/// FIFO of outbound records in caller order.
///
/// The head blocks everything behind it: draining stops at the first record
/// whose ports are not all ready instead of skipping it.
#[derive(Debug, Default)]
pub struct DeliveryQueue {
    records: VecDeque<OutboundMessage>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to the tail.
    pub fn enqueue(&mut self, record: OutboundMessage) {
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The record that blocks the queue, if any.
    pub fn head(&self) -> Option<&OutboundMessage> {
        self.records.front()
    }

    /// Send as many head records as are unblocked.
    ///
    /// Nothing is dequeued while `sender_ready` is false. Each sent record is
    /// passed to `send` with the identities of its ports, in queue order.
    pub fn drain<F>(&mut self, sender_ready: bool, mut send: F) -> DrainOutcome
    where
        F: FnMut(OutboundMessage, Vec<PortId>),
    {
        let mut delivered = 0usize;

        if sender_ready {
            while let Some(head) = self.records.front() {
                let Some(ids) = head.ready_port_ids() else {
                    break;
                };
                let Some(record) = self.records.pop_front() else {
                    break;
                };
                send(record, ids);
                delivered += 1;
            }
        }

        DrainOutcome {
            delivered,
            remaining: self.records.len(),
        }
    }
}
