//! Device drivers.
//!
//! [`PingDevice`] combines a transport, the dispatcher and the command
//! handler into one driver instance. Device variants such as [`S500`] wrap
//! it and bring their own handler table.

pub mod s500;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::commands::{CommandHandler, CommandOutcome};
use crate::correlator::Correlator;
use crate::dispatch::{DispatchStats, Dispatcher, HandlerTable};
use crate::error::{Error, Result};
use crate::event::{Event, EventDispatcher, EventFilter, Subscription};
use crate::protocol::command::general_request;
use crate::protocol::{CommandDescriptor, Message, MessageId};
use crate::state::{Reading, StateMirror};
use crate::transport::{SerialConfig, SerialTransport, Transport, UdpConfig, UdpTransport};
use crate::types::{DeviceInformation, ProtocolVersion};

pub use s500::{InitReport, S500};

/// Default time to wait for a reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Driver settings.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Timeout for operations that do not take one.
    pub default_timeout: Duration,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// Capacity of the inbound frame channel.
    pub frame_capacity: usize,
    /// Source id written into outbound frames.
    pub host_id: u8,
    /// Destination id written into outbound frames.
    pub device_id: u8,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            event_capacity: 256,
            frame_capacity: 256,
            host_id: 0,
            device_id: 0,
        }
    }
}

impl DriverConfig {
    /// Sets the default timeout.
    #[must_use]
    pub const fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Sets the event channel capacity.
    #[must_use]
    pub const fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Sets the inbound frame channel capacity.
    #[must_use]
    pub const fn frame_capacity(mut self, capacity: usize) -> Self {
        self.frame_capacity = capacity;
        self
    }

    /// Sets the source and destination ids.
    #[must_use]
    pub const fn route(mut self, host_id: u8, device_id: u8) -> Self {
        self.host_id = host_id;
        self.device_id = device_id;
        self
    }
}

/// Handlers for the messages every Ping device sends.
#[must_use]
pub fn common_handlers() -> HandlerTable {
    HandlerTable::new()
        .record(&[
            MessageId::Ack,
            MessageId::DeviceInformation,
            MessageId::ProtocolVersion,
        ])
        .on(MessageId::Nack, |msg, state| {
            tracing::warn!(
                "device rejected message {}: {}",
                msg.u16("nacked_id").unwrap_or_default(),
                msg.text("nack_message").unwrap_or_default()
            );
            state.record(msg);
        })
        .on(MessageId::AsciiText, |msg, state| {
            tracing::info!("device: {}", msg.text("ascii_message").unwrap_or_default());
            state.record(msg);
        })
}

/// Driver for one Ping device on one link.
pub struct PingDevice<T> {
    transport: Arc<Mutex<T>>,
    commands: CommandHandler<T>,
    dispatcher: Dispatcher,
    events: EventDispatcher,
    config: DriverConfig,

    // Background tasks
    process_task: Option<JoinHandle<()>>,
}

impl PingDevice<SerialTransport> {
    /// Creates a driver for a serial port.
    ///
    /// # Arguments
    ///
    /// * `port` - Serial port path (e.g., "/dev/ttyUSB0")
    ///
    /// # Returns
    ///
    /// A new driver (not yet connected).
    #[must_use]
    pub fn serial(port: impl Into<String>) -> Self {
        Self::with_serial_config(SerialConfig::new(port))
    }

    /// Creates a driver with custom serial configuration.
    #[must_use]
    pub fn with_serial_config(config: SerialConfig) -> Self {
        Self::new(
            SerialTransport::new(config),
            common_handlers(),
            DriverConfig::default(),
        )
    }
}

impl PingDevice<UdpTransport> {
    /// Creates a driver for a network-attached device.
    #[must_use]
    pub fn udp(remote: SocketAddr) -> Self {
        Self::new(
            UdpTransport::new(UdpConfig::new(remote)),
            common_handlers(),
            DriverConfig::default(),
        )
    }
}

impl<T: Transport + 'static> PingDevice<T> {
    /// Creates a driver over `transport`, routing inbound messages through
    /// `handlers`.
    #[must_use]
    pub fn new(transport: T, handlers: HandlerTable, config: DriverConfig) -> Self {
        let transport = Arc::new(Mutex::new(transport));
        let correlator = Correlator::new();
        let events = EventDispatcher::new(config.event_capacity);
        let dispatcher = Dispatcher::new(
            handlers,
            StateMirror::new(),
            correlator.clone(),
            events.clone(),
        );
        let commands = CommandHandler::new(
            Arc::clone(&transport),
            correlator,
            config.host_id,
            config.device_id,
        );

        Self {
            transport,
            commands,
            dispatcher,
            events,
            config,
            process_task: None,
        }
    }

    /// Connects to the device and starts processing inbound frames.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot connect.
    pub async fn connect(&mut self) -> Result<()> {
        if self.process_task.is_some() {
            return Ok(());
        }

        let frames = {
            let mut transport = self.transport.lock().await;
            transport.connect().await?;
            transport
                .take_frames(self.config.frame_capacity)
                .ok_or(Error::NotConnected)?
        };

        let dispatcher = self.dispatcher.clone();
        let events = self.events.clone();
        let process_task = tokio::spawn(async move {
            let mut frames = frames;
            while let Some(frame) = frames.recv().await {
                dispatcher.on_message(&frame).await;
            }
            tracing::info!("inbound stream ended");
            events.dispatch(Event::Disconnected);
        });
        self.process_task = Some(process_task);

        self.events.dispatch(Event::Connected);
        Ok(())
    }

    /// Disconnects from the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails to close.
    pub async fn disconnect(&mut self) -> Result<()> {
        let was_running = self.process_task.is_some();
        if let Some(task) = self.process_task.take() {
            task.abort();
        }

        {
            let mut transport = self.transport.lock().await;
            transport.disconnect().await?;
        }

        if was_running {
            self.events.dispatch(Event::Disconnected);
        }
        Ok(())
    }

    /// Returns true if connected.
    pub async fn is_connected(&self) -> bool {
        let transport = self.transport.lock().await;
        transport.is_connected()
    }

    /// Sends a command and waits for its reply.
    ///
    /// # Errors
    ///
    /// See [`CommandHandler::send_and_await`].
    pub async fn send_and_await(
        &self,
        command: &CommandDescriptor,
        timeout: Duration,
    ) -> Result<Message> {
        self.commands.send_and_await(command, timeout).await
    }

    /// Sends a command, waits for its reply and optionally verifies the echo.
    ///
    /// # Errors
    ///
    /// See [`CommandHandler::execute`].
    pub async fn execute(
        &self,
        command: &CommandDescriptor,
        timeout: Duration,
        verify: bool,
    ) -> Result<CommandOutcome> {
        self.commands.execute(command, timeout, verify).await
    }

    /// Asks the device to send message `id` and waits for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the device does not answer in time.
    pub async fn request(&self, id: u16, timeout: Duration) -> Result<Message> {
        self.commands
            .send_and_await(&general_request(id), timeout)
            .await
    }

    /// Returns the state mirror.
    #[must_use]
    pub const fn state(&self) -> &StateMirror {
        self.dispatcher.state()
    }

    /// Returns the dispatch counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Returns the driver configuration.
    #[must_use]
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Returns the command handler for direct command access.
    #[must_use]
    pub const fn commands(&self) -> &CommandHandler<T> {
        &self.commands
    }

    /// Subscribes to events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    /// Waits for the next message of one of the given types.
    pub async fn wait_for(&self, ids: &[MessageId], timeout: Duration) -> Option<Message> {
        match self.events.wait_for(EventFilter::messages(ids), timeout).await {
            Some(Event::Message(msg)) => Some(msg),
            _ => None,
        }
    }

    /// Returns the last reported device information.
    pub async fn device_information(&self) -> Option<Reading<DeviceInformation>> {
        self.state()
            .read(MessageId::DeviceInformation, DeviceInformation::from_message)
            .await
    }

    /// Returns the last reported protocol version.
    pub async fn protocol_version(&self) -> Option<Reading<ProtocolVersion>> {
        self.state()
            .read(MessageId::ProtocolVersion, ProtocolVersion::from_message)
            .await
    }
}

impl<T> Drop for PingDevice<T> {
    fn drop(&mut self) {
        if let Some(task) = self.process_task.take() {
            task.abort();
        }
    }
}
