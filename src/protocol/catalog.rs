//! Message identifiers and payload layouts.
//!
//! Every payload is a fixed sequence of little-endian fields. A layout may
//! end with one variable-length field ([`FieldKind::Text`] or
//! [`FieldKind::U16Array`]) that consumes the rest of the payload.

use FieldKind::{F32, I16, Text, U8, U16, U16Array, U32};

/// Message type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum MessageId {
    // Common messages (1-99)
    /// Command acknowledged.
    Ack = 1,
    /// Command rejected.
    Nack = 2,
    /// Free-form text from the device.
    AsciiText = 3,
    /// Device type, revision and firmware version.
    DeviceInformation = 4,
    /// Protocol version implemented by the device.
    ProtocolVersion = 5,
    /// Ask the device to send a message by id.
    GeneralRequest = 6,

    // S500 control messages (1000-1199)
    /// Set the speed of sound.
    SetSpeedOfSound = 1002,
    /// Set ping parameters.
    SetPingParams = 1015,

    // S500 get messages (1200-1299)
    /// S500 firmware version.
    FwVersion = 1200,
    /// Current speed of sound.
    SpeedOfSound = 1203,
    /// Current scan range.
    Range = 1204,
    /// Current ping interval.
    PingRateMsec = 1206,
    /// Current gain setting.
    GainIndex = 1207,
    /// Distance to the bottom.
    Altitude = 1211,
    /// Processor temperature.
    ProcessorDegc = 1213,
    /// Distance report.
    Distance2 = 1223,

    // S500 profile messages (1300+)
    /// Full echo profile report.
    Profile6T = 1308,
}

impl MessageId {
    /// Every message id known to the catalog.
    pub const ALL: [Self; 17] = [
        Self::Ack,
        Self::Nack,
        Self::AsciiText,
        Self::DeviceInformation,
        Self::ProtocolVersion,
        Self::GeneralRequest,
        Self::SetSpeedOfSound,
        Self::SetPingParams,
        Self::FwVersion,
        Self::SpeedOfSound,
        Self::Range,
        Self::PingRateMsec,
        Self::GainIndex,
        Self::Altitude,
        Self::ProcessorDegc,
        Self::Distance2,
        Self::Profile6T,
    ];

    /// Attempts to parse a message id from its wire value.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Ack),
            2 => Some(Self::Nack),
            3 => Some(Self::AsciiText),
            4 => Some(Self::DeviceInformation),
            5 => Some(Self::ProtocolVersion),
            6 => Some(Self::GeneralRequest),
            1002 => Some(Self::SetSpeedOfSound),
            1015 => Some(Self::SetPingParams),
            1200 => Some(Self::FwVersion),
            1203 => Some(Self::SpeedOfSound),
            1204 => Some(Self::Range),
            1206 => Some(Self::PingRateMsec),
            1207 => Some(Self::GainIndex),
            1211 => Some(Self::Altitude),
            1213 => Some(Self::ProcessorDegc),
            1223 => Some(Self::Distance2),
            1308 => Some(Self::Profile6T),
            _ => None,
        }
    }

    /// Returns the wire value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the protocol name of the message.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Nack => "nack",
            Self::AsciiText => "ascii_text",
            Self::DeviceInformation => "device_information",
            Self::ProtocolVersion => "protocol_version",
            Self::GeneralRequest => "general_request",
            Self::SetSpeedOfSound => "set_speed_of_sound",
            Self::SetPingParams => "set_ping_params",
            Self::FwVersion => "fw_version",
            Self::SpeedOfSound => "speed_of_sound",
            Self::Range => "range",
            Self::PingRateMsec => "ping_rate_msec",
            Self::GainIndex => "gain_index",
            Self::Altitude => "altitude",
            Self::ProcessorDegc => "processor_degc",
            Self::Distance2 => "distance2",
            Self::Profile6T => "profile6_t",
        }
    }

    /// Returns the payload layout for this message.
    #[must_use]
    pub const fn layout(self) -> &'static [FieldSpec] {
        match self {
            Self::Ack => ACK,
            Self::Nack => NACK,
            Self::AsciiText => ASCII_TEXT,
            Self::DeviceInformation => DEVICE_INFORMATION,
            Self::ProtocolVersion => PROTOCOL_VERSION,
            Self::GeneralRequest => GENERAL_REQUEST,
            Self::SetSpeedOfSound | Self::SpeedOfSound => SPEED_OF_SOUND,
            Self::SetPingParams => SET_PING_PARAMS,
            Self::FwVersion => FW_VERSION,
            Self::Range => RANGE,
            Self::PingRateMsec => PING_RATE_MSEC,
            Self::GainIndex => GAIN_INDEX,
            Self::Altitude => ALTITUDE,
            Self::ProcessorDegc => PROCESSOR_DEGC,
            Self::Distance2 => DISTANCE2,
            Self::Profile6T => PROFILE6_T,
        }
    }

    /// Returns the reply a command message expects and the fields that reply
    /// echoes back, as `(request field, reply field)` pairs.
    ///
    /// Returns `None` for messages that are not commands, and for
    /// `general_request`, whose reply depends on the requested id.
    #[must_use]
    pub const fn reply(self) -> Option<(Self, &'static [(&'static str, &'static str)])> {
        match self {
            Self::SetSpeedOfSound => Some((
                Self::SpeedOfSound,
                &[("sos_mm_per_sec", "sos_mm_per_sec")],
            )),
            // No read-back message carries the full parameter set.
            Self::SetPingParams => Some((Self::Ack, &[])),
            _ => None,
        }
    }
}

impl From<MessageId> for u16 {
    fn from(id: MessageId) -> Self {
        id as Self
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u16())
    }
}

/// Wire representation of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Unsigned 8-bit.
    U8,
    /// Unsigned 16-bit, little-endian.
    U16,
    /// Unsigned 32-bit, little-endian.
    U32,
    /// Signed 16-bit, little-endian.
    I16,
    /// IEEE-754 single precision, little-endian.
    F32,
    /// Null-terminated text filling the rest of the payload.
    Text,
    /// Array of u16 values filling the rest of the payload.
    U16Array,
}

impl FieldKind {
    /// Returns the encoded width, or `None` for variable-length kinds.
    #[must_use]
    pub const fn width(self) -> Option<usize> {
        match self {
            Self::U8 => Some(1),
            Self::U16 | Self::I16 => Some(2),
            Self::U32 | Self::F32 => Some(4),
            Self::Text | Self::U16Array => None,
        }
    }
}

/// A named field in a payload layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name.
    pub name: &'static str,
    /// Wire representation.
    pub kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

/// Returns the fixed-size part of a layout in bytes.
#[must_use]
pub fn fixed_len(layout: &[FieldSpec]) -> usize {
    layout.iter().filter_map(|f| f.kind.width()).sum()
}

const ACK: &[FieldSpec] = &[field("acked_id", U16)];

const NACK: &[FieldSpec] = &[field("nacked_id", U16), field("nack_message", Text)];

const ASCII_TEXT: &[FieldSpec] = &[field("ascii_message", Text)];

const DEVICE_INFORMATION: &[FieldSpec] = &[
    field("device_type", U8),
    field("device_revision", U8),
    field("firmware_version_major", U8),
    field("firmware_version_minor", U8),
    field("firmware_version_patch", U8),
    field("reserved", U8),
];

const PROTOCOL_VERSION: &[FieldSpec] = &[
    field("version_major", U8),
    field("version_minor", U8),
    field("version_patch", U8),
    field("reserved", U8),
];

const GENERAL_REQUEST: &[FieldSpec] = &[field("requested_id", U16)];

const SPEED_OF_SOUND: &[FieldSpec] = &[field("sos_mm_per_sec", U32)];

const SET_PING_PARAMS: &[FieldSpec] = &[
    field("start_mm", U32),
    field("length_mm", U32),
    field("gain_index", I16),
    field("msec_per_ping", I16),
    field("pulse_len_usec", U16),
    field("report_id", U16),
    field("reserved", U16),
    field("chirp", U8),
    field("decimation", U8),
];

const FW_VERSION: &[FieldSpec] = &[
    field("device_type", U8),
    field("model", U8),
    field("version_major", U16),
    field("version_minor", U16),
];

const RANGE: &[FieldSpec] = &[field("start_mm", U32), field("length_mm", U32)];

const PING_RATE_MSEC: &[FieldSpec] = &[field("msec_per_ping", U16)];

const GAIN_INDEX: &[FieldSpec] = &[field("gain_index", U32)];

const ALTITUDE: &[FieldSpec] = &[field("altitude_mm", U32), field("quality", U8)];

const PROCESSOR_DEGC: &[FieldSpec] = &[field("centi_degC", U32)];

const DISTANCE2: &[FieldSpec] = &[
    field("ping_distance_mm", U32),
    field("averaged_distance_mm", U32),
    field("reserved", U16),
    field("ping_confidence", U8),
    field("averaged_distance_confidence", U8),
    field("timestamp", U32),
];

const PROFILE6_T: &[FieldSpec] = &[
    field("ping_number", U32),
    field("start_mm", U32),
    field("length_mm", U32),
    field("start_ping_hz", U32),
    field("end_ping_hz", U32),
    field("adc_sample_hz", U32),
    field("timestamp_msec", U32),
    field("spare2", U32),
    field("pulse_duration_sec", F32),
    field("analog_gain", F32),
    field("max_pwr_db", F32),
    field("min_pwr_db", F32),
    field("this_ping_depth_m", F32),
    field("smooth_depth_m", F32),
    field("fspare2", F32),
    field("ping_depth_measurement_confidence", U8),
    field("gain_index", U8),
    field("decimation", U8),
    field("smoothed_depth_measurement_confidence", U8),
    field("num_results", U16),
    field("pwr_results", U16Array),
];
