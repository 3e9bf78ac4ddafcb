//! Command descriptors sent to the device.
//!
//! A [`CommandDescriptor`] is the outbound message's fields plus what the
//! driver needs to correlate and verify the reply. Builders are pure: values
//! are taken exactly as given, sentinels included, and nothing is range
//! checked beyond what the parameter types enforce.

use crate::error::FrameError;
use crate::protocol::catalog::MessageId;
use crate::protocol::message::{FieldValue, Fields, Message};
use crate::types::PingParams;

/// A command ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDescriptor {
    id: MessageId,
    fields: Fields,
    reply_id: u16,
    echoes: &'static [(&'static str, &'static str)],
}

impl CommandDescriptor {
    fn new(id: MessageId, fields: Fields) -> Self {
        let (reply, echoes) = id.reply().unwrap_or((MessageId::Ack, &[]));
        Self {
            id,
            fields,
            reply_id: reply.as_u16(),
            echoes,
        }
    }

    /// Returns the outbound message id.
    #[must_use]
    pub const fn id(&self) -> MessageId {
        self.id
    }

    /// Returns the requested field values.
    #[must_use]
    pub fn fields(&self) -> &[(&'static str, FieldValue)] {
        &self.fields
    }

    /// Looks up a requested field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find_map(|(n, v)| (*n == name).then_some(v))
    }

    /// Returns the message id of the expected reply.
    #[must_use]
    pub const fn reply_id(&self) -> u16 {
        self.reply_id
    }

    /// Returns the `(request field, reply field)` pairs the reply echoes.
    #[must_use]
    pub const fn echoes(&self) -> &'static [(&'static str, &'static str)] {
        self.echoes
    }

    /// Builds the outbound message.
    ///
    /// # Errors
    ///
    /// Returns a `FrameError` if the fields do not fit the catalog layout.
    pub fn to_message(&self, src: u8, dst: u8) -> Result<Message, FrameError> {
        Ok(Message::new(self.id, self.fields.clone())?.with_route(src, dst))
    }
}

/// Builds a `set_ping_params` command.
#[must_use]
pub fn set_ping_params(params: &PingParams) -> CommandDescriptor {
    CommandDescriptor::new(
        MessageId::SetPingParams,
        vec![
            ("start_mm", FieldValue::U32(params.start_mm)),
            ("length_mm", FieldValue::U32(params.length_mm)),
            ("gain_index", FieldValue::I16(params.gain_index)),
            ("msec_per_ping", FieldValue::I16(params.msec_per_ping)),
            ("pulse_len_usec", FieldValue::U16(params.pulse_len_usec)),
            ("report_id", FieldValue::U16(params.report_id)),
            ("reserved", FieldValue::U16(params.reserved)),
            ("chirp", FieldValue::U8(params.chirp)),
            ("decimation", FieldValue::U8(params.decimation)),
        ],
    )
}

/// Builds a `set_speed_of_sound` command (mm/s).
#[must_use]
pub fn set_speed_of_sound(sos_mm_per_sec: u32) -> CommandDescriptor {
    CommandDescriptor::new(
        MessageId::SetSpeedOfSound,
        vec![("sos_mm_per_sec", FieldValue::U32(sos_mm_per_sec))],
    )
}

/// Builds a `general_request` asking the device to send message `requested_id`.
///
/// The reply is the requested message itself, so any id is accepted,
/// including ones missing from the catalog.
#[must_use]
pub fn general_request(requested_id: u16) -> CommandDescriptor {
    CommandDescriptor {
        id: MessageId::GeneralRequest,
        fields: vec![("requested_id", FieldValue::U16(requested_id))],
        reply_id: requested_id,
        echoes: &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_are_pure() {
        let params = PingParams::default();
        assert_eq!(set_ping_params(&params), set_ping_params(&params));
        assert_eq!(set_speed_of_sound(1_500_000), set_speed_of_sound(1_500_000));
    }

    #[test]
    fn test_sentinels_kept_literally() {
        let params = PingParams {
            gain_index: -1,
            msec_per_ping: -1,
            length_mm: 0,
            ..PingParams::default()
        };
        let cmd = set_ping_params(&params);

        assert_eq!(cmd.field("gain_index"), Some(&FieldValue::I16(-1)));
        assert_eq!(cmd.field("msec_per_ping"), Some(&FieldValue::I16(-1)));
        assert_eq!(cmd.field("length_mm"), Some(&FieldValue::U32(0)));

        let msg = cmd.to_message(0, 0).unwrap();
        let decoded = Message::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.i16("gain_index"), Some(-1));
    }

    #[test]
    fn test_out_of_range_passed_through() {
        let params = PingParams {
            gain_index: 99,
            chirp: 7,
            ..PingParams::default()
        };
        let cmd = set_ping_params(&params);
        assert_eq!(cmd.field("gain_index"), Some(&FieldValue::I16(99)));
        assert_eq!(cmd.field("chirp"), Some(&FieldValue::U8(7)));
    }

    #[test]
    fn test_reply_expectations() {
        let sos = set_speed_of_sound(1_550_000);
        assert_eq!(sos.reply_id(), MessageId::SpeedOfSound.as_u16());
        assert_eq!(sos.echoes(), &[("sos_mm_per_sec", "sos_mm_per_sec")]);

        let ping = set_ping_params(&PingParams::default());
        assert_eq!(ping.reply_id(), MessageId::Ack.as_u16());
        assert!(ping.echoes().is_empty());

        let req = general_request(1223);
        assert_eq!(req.reply_id(), 1223);
    }

    #[test]
    fn test_every_builder_matches_layout() {
        for cmd in [
            set_ping_params(&PingParams::default()),
            set_speed_of_sound(1),
            general_request(5),
        ] {
            assert!(cmd.to_message(0, 1).is_ok(), "{:?}", cmd.id());
        }
    }
}
