//! Inbound message dispatch.
//!
//! Every frame the transport delivers goes through [`Dispatcher::on_message`]
//! exactly once, in arrival order:
//!
//! 1. decode the frame; failures are counted and logged, never propagated
//! 2. run the handler registered for the message id to update the state mirror
//! 3. offer the message to the pending request, if any
//! 4. publish it on the event bus
//!
//! Ids without a handler are counted per id and otherwise ignored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::correlator::Correlator;
use crate::event::{Event, EventDispatcher};
use crate::protocol::{Message, MessageId};
use crate::state::{DeviceState, StateMirror};

/// A state-update handler for one message type.
pub type Handler = Arc<dyn Fn(&Message, &mut DeviceState) + Send + Sync>;

/// Handlers keyed by message id.
///
/// Each device variant builds its own table.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<u16, Handler>,
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.handlers.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("HandlerTable").field("ids", &ids).finish()
    }
}

impl HandlerTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `id`, replacing any previous one.
    #[must_use]
    pub fn on<F>(mut self, id: MessageId, handler: F) -> Self
    where
        F: Fn(&Message, &mut DeviceState) + Send + Sync + 'static,
    {
        self.handlers.insert(id.as_u16(), Arc::new(handler));
        self
    }

    /// Registers the plain "store latest" handler for each id.
    #[must_use]
    pub fn record(mut self, ids: &[MessageId]) -> Self {
        for id in ids {
            self = self.on(*id, |msg, state| {
                state.record(msg);
            });
        }
        self
    }

    /// Returns the handler for a raw id.
    #[must_use]
    pub fn get(&self, id: u16) -> Option<&Handler> {
        self.handlers.get(&id)
    }

    /// Returns true if a handler exists for the id.
    #[must_use]
    pub fn handles(&self, id: u16) -> bool {
        self.handlers.contains_key(&id)
    }
}

/// Dispatch counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Frames handed to the dispatcher.
    pub frames: u64,
    /// Frames that failed to decode.
    pub decode_errors: u64,
    /// Messages without a handler, by id.
    pub unknown: HashMap<u16, u64>,
}

#[derive(Default)]
struct Counters {
    frames: AtomicU64,
    decode_errors: AtomicU64,
    unknown: Mutex<HashMap<u16, u64>>,
}

/// Routes inbound frames to handlers, the correlator and subscribers.
#[derive(Clone)]
pub struct Dispatcher {
    handlers: Arc<HandlerTable>,
    state: StateMirror,
    correlator: Correlator,
    events: EventDispatcher,
    counters: Arc<Counters>,
}

impl Dispatcher {
    /// Creates a dispatcher over the given collaborators.
    #[must_use]
    pub fn new(
        handlers: HandlerTable,
        state: StateMirror,
        correlator: Correlator,
        events: EventDispatcher,
    ) -> Self {
        Self {
            handlers: Arc::new(handlers),
            state,
            correlator,
            events,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Processes one complete inbound frame.
    pub async fn on_message(&self, raw: &[u8]) {
        self.counters.frames.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("rx {}", hex::encode(raw));

        let msg = match Message::decode(raw) {
            Ok(msg) => msg,
            Err(e) => {
                self.counters.decode_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("dropping undecodable frame: {}", e);
                return;
            }
        };

        if let Some(handler) = self.handlers.get(msg.id()) {
            let mut state = self.state.write().await;
            handler(&msg, &mut *state);
        } else {
            *self
                .counters
                .unknown
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(msg.id())
                .or_default() += 1;
            tracing::debug!("no handler for message {}", msg.id());
        }

        if self.correlator.offer(&msg) {
            tracing::debug!("reply {}", msg);
        } else {
            tracing::debug!("unsolicited {}", msg);
        }

        self.events.dispatch(Event::Message(msg));
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            frames: self.counters.frames.load(Ordering::Relaxed),
            decode_errors: self.counters.decode_errors.load(Ordering::Relaxed),
            unknown: self
                .counters
                .unknown
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    /// Returns the state mirror this dispatcher writes to.
    #[must_use]
    pub const fn state(&self) -> &StateMirror {
        &self.state
    }
}
