//! Device state mirror.
//!
//! The mirror keeps the last message of each type the device sent, tagged
//! with a monotonic update sequence number. Only the dispatcher writes to it;
//! commands are never recorded here, so a device that ignores a request keeps
//! showing its real values.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockWriteGuard};
use tokio::time::Instant;

use crate::protocol::{FieldValue, Message, MessageId};

/// A value observed from the device, with its update marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading<T> {
    /// Observed value.
    pub value: T,
    /// Update sequence number; increases with every recorded message.
    pub seq: u64,
    /// When the message was received.
    pub received_at: Instant,
}

impl<T> Reading<T> {
    /// Converts the value, keeping the marker.
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reading<U> {
        Reading {
            value: f(self.value),
            seq: self.seq,
            received_at: self.received_at,
        }
    }
}

/// The last observed message of each type.
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    entries: HashMap<u16, Reading<Message>>,
    updates: u64,
}

impl DeviceState {
    /// Records `msg` as the latest of its type and returns its sequence number.
    pub fn record(&mut self, msg: &Message) -> u64 {
        self.updates += 1;
        self.entries.insert(
            msg.id(),
            Reading {
                value: msg.clone(),
                seq: self.updates,
                received_at: Instant::now(),
            },
        );
        self.updates
    }

    /// Returns the latest message with the given id.
    #[must_use]
    pub fn get(&self, id: u16) -> Option<&Reading<Message>> {
        self.entries.get(&id)
    }

    /// Returns a field of the latest message with the given id.
    #[must_use]
    pub fn field(&self, id: u16, name: &str) -> Option<Reading<FieldValue>> {
        let reading = self.entries.get(&id)?;
        let value = reading.value.field(name)?.clone();
        Some(Reading {
            value,
            seq: reading.seq,
            received_at: reading.received_at,
        })
    }

    /// Returns the number of messages recorded so far.
    #[must_use]
    pub const fn updates(&self) -> u64 {
        self.updates
    }

    /// Returns the ids with a recorded message.
    pub fn ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries.keys().copied()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared handle to one driver's [`DeviceState`].
#[derive(Debug, Clone, Default)]
pub struct StateMirror {
    inner: Arc<RwLock<DeviceState>>,
}

impl StateMirror {
    /// Creates an empty mirror.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the whole state.
    pub async fn snapshot(&self) -> DeviceState {
        self.inner.read().await.clone()
    }

    /// Returns the latest message of type `id`.
    pub async fn get(&self, id: MessageId) -> Option<Reading<Message>> {
        self.inner.read().await.get(id.as_u16()).cloned()
    }

    /// Reads a typed view of the latest message of type `id`.
    ///
    /// The value and its marker come from the same lock acquisition.
    pub async fn read<U>(
        &self,
        id: MessageId,
        view: impl FnOnce(&Message) -> Option<U>,
    ) -> Option<Reading<U>> {
        let state = self.inner.read().await;
        let reading = state.get(id.as_u16())?;
        Some(Reading {
            value: view(&reading.value)?,
            seq: reading.seq,
            received_at: reading.received_at,
        })
    }

    /// Returns a field of the latest message of type `id`.
    pub async fn field(&self, id: MessageId, name: &str) -> Option<Reading<FieldValue>> {
        self.inner.read().await.field(id.as_u16(), name)
    }

    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, DeviceState> {
        self.inner.write().await
    }
}
