//! Data types for device settings and reports.
//!
//! This module contains the typed views used throughout the library:
//! - Command parameters
//! - Device identification
//! - Measurement reports

pub mod device;
pub mod measurement;
pub mod params;

pub use device::{DeviceInformation, FirmwareVersion, ProtocolVersion};
pub use measurement::{Altitude, Distance, Profile, Range};
pub use params::{PingParams, WATER_SOS_MM_PER_SEC};
