//! # ping-sonar
//!
//! A Rust host driver for Ping-protocol acoustic ranging devices.
//!
//! This library sends configuration commands to a sounder, waits for the
//! matching reply, optionally verifies that the device applied the
//! requested values, and keeps a mirror of everything the device reports.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Serial, UDP and in-memory transports
//! - Echo verification of command replies
//! - Event stream of every inbound message
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use ping_sonar::S500;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ping_sonar::Error> {
//!     let mut sonar = S500::serial("/dev/ttyUSB0");
//!     sonar.connect().await?;
//!
//!     let info = sonar.initialize(100).await?;
//!     println!("Firmware: {}", info.firmware);
//!
//!     let outcome = sonar
//!         .set_speed_of_sound(1_500_000, true, Duration::from_millis(500))
//!         .await?;
//!     println!("Speed of sound applied: {}", outcome.is_success());
//!
//!     if let Some(distance) = sonar.next_distance(Duration::from_secs(1)).await {
//!         println!("Distance: {}mm", distance.ping_distance_mm);
//!     }
//!
//!     sonar.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`protocol`] - Framing, message catalog, typed messages and command builders
//! - [`types`] - Typed views of command parameters and device reports
//! - [`transport`] - Transport implementations (serial, UDP, mock)
//! - [`correlator`] - Single pending request and reply matching
//! - [`verify`] - Echo verification of replies
//! - [`dispatch`] - Inbound message routing
//! - [`state`] - Device state mirror
//! - [`event`] - Async event system for inbound messages
//! - [`commands`] - Request/response round trips
//! - [`device`] - Device drivers ([`PingDevice`], [`S500`])

pub mod commands;
pub mod correlator;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod protocol;
pub mod state;
pub mod transport;
pub mod types;
pub mod verify;

// Re-exports for convenience
pub use commands::{CommandHandler, CommandOutcome};
pub use device::{DriverConfig, InitReport, PingDevice, S500};
pub use dispatch::{DispatchStats, HandlerTable};
pub use error::{Error, FrameError, Result};
pub use event::{Event, EventDispatcher, EventFilter, Subscription};
pub use protocol::{CommandDescriptor, FieldValue, Message, MessageId};
pub use state::{DeviceState, Reading, StateMirror};
pub use transport::{
    MockDevice, MockTransport, SerialConfig, SerialTransport, Transport, UdpConfig, UdpTransport,
    serial::list_ports,
};
pub use types::{
    Altitude, DeviceInformation, Distance, FirmwareVersion, PingParams, Profile, ProtocolVersion,
    Range, WATER_SOS_MM_PER_SEC,
};
pub use verify::{FieldCheck, VerificationResult};
