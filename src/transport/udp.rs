//! UDP transport implementation.
//!
//! Network-attached Ping devices exchange the same frames over UDP. A
//! datagram may hold several frames, or a frame may span datagrams, so
//! inbound data goes through the same stream decoder as serial bytes.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::protocol::FrameDecoder;
use crate::transport::{Transport, forward_frames};

/// Default port Ping devices listen on.
pub const DEFAULT_PORT: u16 = 12345;

/// Largest datagram read in one call.
const MAX_DATAGRAM_SIZE: usize = 65536;

/// Configuration for UDP transport.
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Device address.
    pub remote: SocketAddr,
    /// Local address to bind.
    pub local: SocketAddr,
}

impl UdpConfig {
    /// Creates a configuration for the given device, binding any local port.
    #[must_use]
    pub fn new(remote: SocketAddr) -> Self {
        Self {
            remote,
            local: SocketAddr::from(([0, 0, 0, 0], 0)),
        }
    }

    /// Sets the local bind address.
    #[must_use]
    pub const fn local(mut self, local: SocketAddr) -> Self {
        self.local = local;
        self
    }
}

/// UDP transport for Ping communication.
pub struct UdpTransport {
    config: UdpConfig,
    socket: Option<Arc<UdpSocket>>,
    streaming: bool,
    read_task: Option<JoinHandle<()>>,
}

impl UdpTransport {
    /// Creates a new UDP transport.
    #[must_use]
    pub const fn new(config: UdpConfig) -> Self {
        Self {
            config,
            socket: None,
            streaming: false,
            read_task: None,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &UdpConfig {
        &self.config
    }

    /// Returns the bound local address once connected.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    async fn run_recv_loop(socket: Arc<UdpSocket>, frame_tx: mpsc::Sender<Bytes>) -> Result<()> {
        let mut decoder = FrameDecoder::new();
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            let n = match socket.recv(&mut buf).await {
                Ok(n) => n,
                // ICMP port unreachable from an earlier send; the device may come back.
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                    tracing::warn!("udp device unreachable: {}", e);
                    continue;
                }
                Err(e) => {
                    tracing::error!("udp receive error: {}", e);
                    return Err(Error::Io(e));
                }
            };

            tracing::trace!("received {} bytes", n);
            decoder.feed(&buf[..n]);

            if !forward_frames(&mut decoder, &frame_tx).await {
                return Ok(());
            }
        }
    }
}

impl Transport for UdpTransport {
    fn connect(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.socket.is_some() {
                return Ok(());
            }

            tracing::info!("connecting to udp device: {}", self.config.remote);

            let socket = UdpSocket::bind(self.config.local).await?;
            socket.connect(self.config.remote).await?;
            self.socket = Some(Arc::new(socket));
            self.streaming = false;

            tracing::info!("connected to udp device");
            Ok(())
        })
    }

    fn disconnect(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if let Some(task) = self.read_task.take() {
                task.abort();
            }
            if self.socket.take().is_some() {
                tracing::info!("disconnecting from udp device");
            }
            self.streaming = false;
            Ok(())
        })
    }

    fn send(&mut self, frame: Bytes) -> BoxFuture<'_, Result<()>> {
        let socket = self.socket.clone();
        Box::pin(async move {
            let socket = socket.ok_or(Error::NotConnected)?;
            tracing::trace!("tx {}", hex::encode(&frame));
            socket.send(&frame).await?;
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    fn take_frames(&mut self, capacity: usize) -> Option<mpsc::Receiver<Bytes>> {
        if self.streaming {
            return None;
        }
        let socket = Arc::clone(self.socket.as_ref()?);
        let (frame_tx, frame_rx) = mpsc::channel(capacity.max(1));

        let task = tokio::spawn(async move {
            if let Err(e) = Self::run_recv_loop(socket, frame_tx).await {
                tracing::error!("read loop error: {}", e);
            }
        });
        self.read_task = Some(task);
        self.streaming = true;

        Some(frame_rx)
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::protocol::{FieldValue, Message, MessageId};

    #[test]
    fn test_udp_config_defaults() {
        let remote: SocketAddr = "192.168.2.2:12345".parse().unwrap();
        let config = UdpConfig::new(remote);
        assert_eq!(config.remote, remote);
        assert_eq!(config.local.port(), 0);
        assert_eq!(config.remote.port(), DEFAULT_PORT);
    }

    #[tokio::test]
    async fn test_frames_over_loopback() {
        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let device_addr = device.local_addr().unwrap();

        let config = UdpConfig::new(device_addr).local("127.0.0.1:0".parse().unwrap());
        let mut transport = UdpTransport::new(config);
        transport.connect().await.unwrap();
        let mut frames = transport.take_frames(8).unwrap();
        assert!(transport.take_frames(8).is_none());

        // Host to device
        let request = Message::new(
            MessageId::GeneralRequest,
            vec![("requested_id", FieldValue::U16(1203))],
        )
        .unwrap()
        .encode()
        .unwrap();
        transport.send(request.clone()).await.unwrap();
        let mut buf = [0u8; 64];
        let (n, host_addr) = device.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &request[..]);

        // Device to host, two frames in one datagram
        let reply = Message::new(
            MessageId::SpeedOfSound,
            vec![("sos_mm_per_sec", FieldValue::U32(1_500_000))],
        )
        .unwrap()
        .encode()
        .unwrap();
        let mut datagram = reply.to_vec();
        datagram.extend_from_slice(&reply);
        device.send_to(&datagram, host_addr).await.unwrap();

        for _ in 0..2 {
            let frame = tokio::time::timeout(Duration::from_secs(1), frames.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(frame, reply);
        }

        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_refused_send_keeps_receiving() {
        let device_addr = {
            let placeholder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            placeholder.local_addr().unwrap()
        };

        let config = UdpConfig::new(device_addr).local("127.0.0.1:0".parse().unwrap());
        let mut transport = UdpTransport::new(config);
        transport.connect().await.unwrap();
        let mut frames = transport.take_frames(8).unwrap();

        // Nobody listens yet, so the host gets a port unreachable back.
        let request = Message::new(
            MessageId::GeneralRequest,
            vec![("requested_id", FieldValue::U16(1203))],
        )
        .unwrap()
        .encode()
        .unwrap();
        let _ = transport.send(request).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let device = UdpSocket::bind(device_addr).await.unwrap();
        let reply = Message::new(
            MessageId::SpeedOfSound,
            vec![("sos_mm_per_sec", FieldValue::U32(1_500_000))],
        )
        .unwrap()
        .encode()
        .unwrap();
        let host_addr = transport.local_addr().unwrap();
        device.send_to(&reply, host_addr).await.unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(1), frames.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame, reply);
    }
}
