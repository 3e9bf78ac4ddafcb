//! In-memory transport with a scriptable simulated device.
//!
//! [`MockTransport::new`] returns the transport half, which a driver owns,
//! and a [`MockDevice`] handle used to script replies, push unsolicited
//! messages and inspect what the driver sent.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::protocol::Message;
use crate::transport::Transport;

type Responder = Box<dyn FnMut(&Message) -> Vec<Message> + Send>;

#[derive(Default)]
struct Shared {
    connected: bool,
    sent: Vec<Message>,
    responder: Option<Responder>,
    frame_tx: Option<mpsc::Sender<Bytes>>,
    backlog: Vec<Bytes>,
    fail_sends: bool,
}

impl Shared {
    fn deliver(&mut self, frame: Bytes) {
        match &self.frame_tx {
            Some(tx) => {
                if tx.try_send(frame).is_err() {
                    tracing::warn!("mock device: inbound frame dropped");
                }
            }
            None => self.backlog.push(frame),
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport half of the mock link.
pub struct MockTransport {
    shared: Arc<Mutex<Shared>>,
}

/// Device half of the mock link.
#[derive(Clone)]
pub struct MockDevice {
    shared: Arc<Mutex<Shared>>,
}

impl MockTransport {
    /// Creates a linked transport and device pair.
    #[must_use]
    pub fn new() -> (Self, MockDevice) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockDevice { shared },
        )
    }
}

impl Transport for MockTransport {
    fn connect(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            lock(&self.shared).connected = true;
            Ok(())
        })
    }

    fn disconnect(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut shared = lock(&self.shared);
            shared.connected = false;
            shared.frame_tx = None;
            Ok(())
        })
    }

    fn send(&mut self, frame: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut shared = lock(&self.shared);
            if !shared.connected {
                return Err(Error::NotConnected);
            }
            if shared.fail_sends {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "mock link down",
                )));
            }

            let msg = Message::decode(&frame)?;
            let replies = match shared.responder.as_mut() {
                Some(respond) => respond(&msg),
                None => Vec::new(),
            };
            shared.sent.push(msg);

            for reply in replies {
                let frame = reply.encode()?;
                shared.deliver(frame);
            }
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        lock(&self.shared).connected
    }

    fn take_frames(&mut self, capacity: usize) -> Option<mpsc::Receiver<Bytes>> {
        let mut shared = lock(&self.shared);
        if !shared.connected || shared.frame_tx.is_some() {
            return None;
        }

        let backlog = std::mem::take(&mut shared.backlog);
        let (tx, rx) = mpsc::channel(capacity.max(backlog.len()).max(1));
        for frame in backlog {
            // Capacity covers the backlog.
            let _ = tx.try_send(frame);
        }
        shared.frame_tx = Some(tx);
        Some(rx)
    }
}

impl MockDevice {
    /// Installs the function that answers each command the driver sends.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: FnMut(&Message) -> Vec<Message> + Send + 'static,
    {
        lock(&self.shared).responder = Some(Box::new(responder));
    }

    /// Removes the responder; commands go unanswered.
    pub fn silence(&self) {
        lock(&self.shared).responder = None;
    }

    /// Sends a message to the driver as if the device emitted it.
    pub fn push(&self, msg: &Message) {
        match msg.encode() {
            Ok(frame) => lock(&self.shared).deliver(frame),
            Err(e) => tracing::warn!("mock device: cannot encode {}: {}", msg, e),
        }
    }

    /// Sends raw bytes to the driver as one inbound frame.
    pub fn push_raw(&self, frame: impl Into<Bytes>) {
        lock(&self.shared).deliver(frame.into());
    }

    /// Returns every message the driver has sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Message> {
        lock(&self.shared).sent.clone()
    }

    /// Makes every subsequent send fail with an I/O error.
    pub fn fail_sends(&self, fail: bool) {
        lock(&self.shared).fail_sends = fail;
    }
}
