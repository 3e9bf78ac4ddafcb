//! Event system for async message handling.
//!
//! Every decoded message is published here after it has updated the state
//! mirror, whether or not it answered a command. Subscribers see messages in
//! arrival order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::protocol::{Message, MessageId};

/// Event types that can be dispatched.
#[derive(Debug, Clone)]
pub enum Event {
    /// Connection established.
    Connected,
    /// Connection lost.
    Disconnected,
    /// Message received from the device.
    Message(Message),
}

impl Event {
    /// Returns the message id if this event carries a message.
    #[must_use]
    pub const fn message_id(&self) -> Option<u16> {
        match self {
            Self::Message(msg) => Some(msg.id()),
            Self::Connected | Self::Disconnected => None,
        }
    }
}

/// A subscription to events.
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Receives the next event.
    ///
    /// Returns `None` once the dispatcher is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("event subscriber lagged, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Subscription filter for specific message types.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by message ids.
    pub message_ids: Option<Vec<u16>>,
}

impl EventFilter {
    /// Creates a filter for specific message types.
    #[must_use]
    pub fn messages(ids: &[MessageId]) -> Self {
        Self {
            message_ids: Some(ids.iter().map(|id| id.as_u16()).collect()),
        }
    }

    /// Checks if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        match &self.message_ids {
            Some(ids) => event.message_id().is_some_and(|id| ids.contains(&id)),
            None => true,
        }
    }
}

struct EventDispatcherInner {
    sender: broadcast::Sender<Event>,
}

/// Dispatches events to subscribers.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<EventDispatcherInner>,
}

impl EventDispatcher {
    /// Creates a new event dispatcher.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(EventDispatcherInner { sender }),
        }
    }

    /// Dispatches an event to all subscribers.
    pub fn dispatch(&self, event: Event) {
        // No receivers is fine
        let _ = self.inner.sender.send(event);
    }

    /// Subscribes to all events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.inner.sender.subscribe(),
        }
    }

    /// Waits for an event matching the filter with timeout.
    ///
    /// Returns `None` if the timeout expires or the channel is closed.
    pub async fn wait_for(&self, filter: EventFilter, timeout: Duration) -> Option<Event> {
        let mut subscription = self.subscribe();

        tokio::select! {
            biased;
            result = async {
                loop {
                    if let Some(event) = subscription.recv().await {
                        if filter.matches(&event) {
                            return Some(event);
                        }
                    } else {
                        return None;
                    }
                }
            } => result,
            () = tokio::time::sleep(timeout) => None,
        }
    }
}
