use crossbeam_channel::Sender;
use tracing::warn;

use crate::message::ResolvedMessage;

/// Hands resolved messages to whatever transmits them to the remote side.
///
/// Delivery is fire-and-forget: the sender never looks at the outcome.
pub trait RemoteDelivery {
    fn deliver(&mut self, message: ResolvedMessage);
}

impl<F> RemoteDelivery for F
where
    F: FnMut(ResolvedMessage),
{
    fn deliver(&mut self, message: ResolvedMessage) {
        self(message)
    }
}

/// Forwards resolved messages into a channel, typically read by a transport thread.
#[derive(Debug, Clone)]
pub struct ChannelDelivery {
    tx: Sender<ResolvedMessage>,
    dropped: usize,
}

impl ChannelDelivery {
    pub fn new(tx: Sender<ResolvedMessage>) -> Self {
        Self { tx, dropped: 0 }
    }

    /// Messages lost because the receiving side hung up.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl RemoteDelivery for ChannelDelivery {
    fn deliver(&mut self, message: ResolvedMessage) {
        if let Err(err) = self.tx.send(message) {
            self.dropped = self.dropped.saturating_add(1);
            warn!(
                destination = %err.0.destination,
                dropped = self.dropped,
                "delivery channel disconnected"
            );
        }
    }
}
