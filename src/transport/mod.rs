//! Transport layer for Ping device communication.
//!
//! A transport moves complete frames: [`Transport::send`] writes one encoded
//! frame, and [`Transport::take_frames`] hands out the stream of inbound
//! frames, already split by the stream decoder. Reconnection policy lives
//! above this layer.

pub mod mock;
pub mod serial;
pub mod udp;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::protocol::FrameDecoder;

/// Trait for transport implementations.
pub trait Transport: Send + Sync {
    /// Connects to the device.
    fn connect(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Disconnects from the device and stops the inbound stream.
    fn disconnect(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Sends one encoded frame.
    fn send(&mut self, frame: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Returns true if connected.
    fn is_connected(&self) -> bool;

    /// Starts the inbound stream and returns its receiving end.
    ///
    /// Returns `None` when not connected or when the stream was already
    /// taken for this connection.
    fn take_frames(&mut self, capacity: usize) -> Option<mpsc::Receiver<Bytes>>;
}

/// Sends every complete frame buffered in `decoder` to `tx`.
///
/// Returns false once the receiving side is gone.
pub(crate) async fn forward_frames(decoder: &mut FrameDecoder, tx: &mpsc::Sender<Bytes>) -> bool {
    loop {
        match decoder.decode() {
            Ok(Some(frame)) => {
                tracing::trace!("decoded frame: {} bytes", frame.len());
                if tx.send(frame).await.is_err() {
                    tracing::debug!("frame receiver dropped");
                    return false;
                }
            }
            Ok(None) => return true,
            Err(e) => {
                // The decoder has already skipped past the bad header.
                tracing::warn!("frame decode error: {}", e);
            }
        }
    }
}

pub use mock::{MockDevice, MockTransport};
pub use serial::{SerialConfig, SerialTransport};
pub use udp::{UdpConfig, UdpTransport};
