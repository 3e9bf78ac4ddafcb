//! Reply correlation.
//!
//! The protocol has no sequence numbers, so a reply can only be attributed
//! by its type. A driver therefore tracks at most one pending request: arming
//! a second one while the first is outstanding fails with [`Error::Busy`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::protocol::{Message, MessageId};

/// Smallest wait accepted, so that every deadline lies in the future.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// What a pending request is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expectation {
    /// Id of the command that was sent.
    pub command_id: u16,
    /// Id of the reply that completes it.
    pub reply_id: u16,
}

impl Expectation {
    /// Decides whether `msg` completes this request.
    ///
    /// Returns `None` for unrelated messages. An `ack` only matches when it
    /// acknowledges this command, and a `nack` for this command completes
    /// the request with [`Error::Nack`].
    #[must_use]
    pub fn outcome(&self, msg: &Message) -> Option<Result<Message>> {
        let nack = MessageId::Nack.as_u16();
        if msg.id() == nack
            && self.reply_id != nack
            && msg.u16("nacked_id") == Some(self.command_id)
        {
            return Some(Err(Error::Nack {
                id: self.command_id,
                message: msg.text("nack_message").unwrap_or_default().to_owned(),
            }));
        }
        if msg.id() != self.reply_id {
            return None;
        }
        if self.reply_id == MessageId::Ack.as_u16()
            && msg.u16("acked_id") != Some(self.command_id)
        {
            return None;
        }
        Some(Ok(msg.clone()))
    }
}

struct PendingRequest {
    token: u64,
    expect: Expectation,
    deadline: Instant,
    reply: oneshot::Sender<Result<Message>>,
}

#[derive(Default)]
struct Slot {
    pending: Option<PendingRequest>,
    next_token: u64,
}

/// Single-slot reply correlator shared between callers and the dispatcher.
#[derive(Clone, Default)]
pub struct Correlator {
    slot: Arc<Mutex<Slot>>,
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("pending", &self.pending())
            .finish()
    }
}

impl Correlator {
    /// Creates an idle correlator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arms the pending request.
    ///
    /// Arm before writing the command, so that a fast reply cannot slip past.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if another request is still outstanding.
    pub fn arm(&self, expect: Expectation, timeout: Duration) -> Result<PendingReply> {
        let timeout = timeout.max(MIN_TIMEOUT);
        let now = Instant::now();
        let mut slot = self.lock();

        if let Some(current) = &slot.pending {
            if current.deadline > now {
                return Err(Error::Busy {
                    pending_id: current.expect.command_id,
                });
            }
            tracing::debug!(
                "discarding expired request for message {}",
                current.expect.command_id
            );
        }

        slot.next_token += 1;
        let token = slot.next_token;
        let deadline = now + timeout;
        let (reply, rx) = oneshot::channel();
        slot.pending = Some(PendingRequest {
            token,
            expect,
            deadline,
            reply,
        });

        Ok(PendingReply {
            correlator: self.clone(),
            token,
            deadline,
            timeout,
            rx: Some(rx),
        })
    }

    /// Offers an inbound message to the pending request.
    ///
    /// Returns true if the message completed it. A request whose deadline
    /// has passed is cleared instead, and the message counts as unsolicited.
    pub fn offer(&self, msg: &Message) -> bool {
        let mut slot = self.lock();
        let Some(current) = &slot.pending else {
            return false;
        };

        if current.deadline <= Instant::now() {
            slot.pending = None;
            return false;
        }

        let Some(outcome) = current.expect.outcome(msg) else {
            return false;
        };

        if let Some(pending) = slot.pending.take() {
            // The waiter may have been dropped; the slot is cleared either way.
            let _ = pending.reply.send(outcome);
        }
        true
    }

    /// Returns the outstanding expectation, if any.
    #[must_use]
    pub fn pending(&self) -> Option<Expectation> {
        self.lock().pending.as_ref().map(|p| p.expect)
    }

    fn clear(&self, token: u64) {
        let mut slot = self.lock();
        if slot.pending.as_ref().is_some_and(|p| p.token == token) {
            slot.pending = None;
        }
    }
}

/// Handle to an armed request. Dropping it clears the request.
#[derive(Debug)]
pub struct PendingReply {
    correlator: Correlator,
    token: u64,
    deadline: Instant,
    timeout: Duration,
    rx: Option<oneshot::Receiver<Result<Message>>>,
}

impl PendingReply {
    /// Returns the deadline.
    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Waits for the reply or the deadline, whichever comes first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] when the deadline passes, or the error the
    /// reply resolved with.
    pub async fn wait(mut self) -> Result<Message> {
        let rx = self.rx.take().ok_or(Error::ChannelClosed)?;
        match tokio::time::timeout_at(self.deadline, rx).await {
            Ok(Ok(outcome)) => outcome,
            // An expired request is discarded by `offer` or `arm`, closing the channel.
            Ok(Err(_)) if Instant::now() >= self.deadline => Err(self.timeout_error()),
            Ok(Err(_)) => Err(Error::ChannelClosed),
            Err(_) => Err(self.timeout_error()),
        }
    }

    fn timeout_error(&self) -> Error {
        Error::Timeout {
            timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.correlator.clear(self.token);
    }
}
