use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use msgports_port::RegistryEvent;
use tracing::{debug, trace};

/// Something that reacts when the registry reports a ready channel.
pub trait ReadinessObserver {
    /// Returns how many messages the notification let through.
    fn on_channel_became_ready(&mut self) -> usize;
}

/// Carries registry events to senders on the caller's control thread.
///
/// The registry may complete channels from any thread; events wait in the
/// channel until the owner of the senders pumps them.
#[derive(Debug)]
pub struct Dispatcher {
    events: Receiver<RegistryEvent>,
}

impl Dispatcher {
    /// Wrap a receiver obtained from a registry subscription.
    pub fn new(events: Receiver<RegistryEvent>) -> Self {
        Self { events }
    }

    /// Handle every event already waiting, without blocking.
    ///
    /// Each event notifies every observer. Returns how many messages were sent.
    pub fn pump(&self, observers: &mut [&mut dyn ReadinessObserver]) -> usize {
        let mut sent = 0usize;
        loop {
            match self.events.try_recv() {
                Ok(event) => sent += notify(event, observers),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("registry event channel disconnected");
                    break;
                }
            }
        }
        sent
    }

    /// Wait up to `timeout` for the next event, then handle everything waiting.
    ///
    /// Returns `None` if no event arrived in time or the registry is gone.
    pub fn pump_timeout(
        &self,
        observers: &mut [&mut dyn ReadinessObserver],
        timeout: Duration,
    ) -> Option<usize> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => {
                let sent = notify(event, observers);
                Some(sent + self.pump(observers))
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("registry event channel disconnected");
                None
            }
        }
    }
}

fn notify(event: RegistryEvent, observers: &mut [&mut dyn ReadinessObserver]) -> usize {
    trace!(?event, observers = observers.len(), "dispatching");
    match event {
        RegistryEvent::ChannelReady(_) => observers
            .iter_mut()
            .map(|observer| observer.on_channel_became_ready())
            .sum(),
    }
}
