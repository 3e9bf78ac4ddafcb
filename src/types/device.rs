//! Device identification types.

use crate::protocol::{Message, MessageId};

/// Common device information (`device_information`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInformation {
    /// Device type (e.g. 1 = echosounder).
    pub device_type: u8,
    /// Hardware revision.
    pub device_revision: u8,
    /// Firmware major version.
    pub firmware_version_major: u8,
    /// Firmware minor version.
    pub firmware_version_minor: u8,
    /// Firmware patch version.
    pub firmware_version_patch: u8,
}

impl DeviceInformation {
    /// Extracts device information from a `device_information` message.
    #[must_use]
    pub fn from_message(msg: &Message) -> Option<Self> {
        if msg.message_id()? != MessageId::DeviceInformation {
            return None;
        }
        Some(Self {
            device_type: msg.u8("device_type")?,
            device_revision: msg.u8("device_revision")?,
            firmware_version_major: msg.u8("firmware_version_major")?,
            firmware_version_minor: msg.u8("firmware_version_minor")?,
            firmware_version_patch: msg.u8("firmware_version_patch")?,
        })
    }
}

/// Protocol version spoken by the device (`protocol_version`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtocolVersion {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
    /// Patch version.
    pub patch: u8,
}

impl ProtocolVersion {
    /// Extracts the version from a `protocol_version` message.
    #[must_use]
    pub fn from_message(msg: &Message) -> Option<Self> {
        if msg.message_id()? != MessageId::ProtocolVersion {
            return None;
        }
        Some(Self {
            major: msg.u8("version_major")?,
            minor: msg.u8("version_minor")?,
            patch: msg.u8("version_patch")?,
        })
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// S500 firmware version (`fw_version`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    /// Device type.
    pub device_type: u8,
    /// Device model.
    pub model: u8,
    /// Major version.
    pub major: u16,
    /// Minor version.
    pub minor: u16,
}

impl FirmwareVersion {
    /// Extracts the version from a `fw_version` message.
    #[must_use]
    pub fn from_message(msg: &Message) -> Option<Self> {
        if msg.message_id()? != MessageId::FwVersion {
            return None;
        }
        Some(Self {
            device_type: msg.u8("device_type")?,
            model: msg.u8("model")?,
            major: msg.u16("version_major")?,
            minor: msg.u16("version_minor")?,
        })
    }
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FieldValue;

    #[test]
    fn test_device_information() {
        let msg = Message::new(
            MessageId::DeviceInformation,
            vec![
                ("device_type", FieldValue::U8(1)),
                ("device_revision", FieldValue::U8(2)),
                ("firmware_version_major", FieldValue::U8(3)),
                ("firmware_version_minor", FieldValue::U8(4)),
                ("firmware_version_patch", FieldValue::U8(5)),
                ("reserved", FieldValue::U8(0)),
            ],
        )
        .unwrap();
        let info = DeviceInformation::from_message(&msg).unwrap();
        assert_eq!(info.firmware_version_major, 3);
        assert_eq!(info.firmware_version_patch, 5);
    }

    #[test]
    fn test_wrong_message_rejected() {
        let msg = Message::new(
            MessageId::Ack,
            vec![("acked_id", FieldValue::U16(5))],
        )
        .unwrap();
        assert_eq!(ProtocolVersion::from_message(&msg), None);
        assert_eq!(FirmwareVersion::from_message(&msg), None);
    }

    #[test]
    fn test_protocol_version_display() {
        let version = ProtocolVersion {
            major: 1,
            minor: 0,
            patch: 2,
        };
        assert_eq!(version.to_string(), "1.0.2");
    }
}
