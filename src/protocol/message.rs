//! Typed messages and the payload codec.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::FrameError;
use crate::protocol::catalog::{FieldKind, FieldSpec, MessageId, fixed_len};
use crate::protocol::frame::{self, FrameHeader};

/// A single decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Unsigned 8-bit.
    U8(u8),
    /// Unsigned 16-bit.
    U16(u16),
    /// Unsigned 32-bit.
    U32(u32),
    /// Signed 16-bit.
    I16(i16),
    /// Single precision float.
    F32(f32),
    /// Text.
    Text(String),
    /// Array of u16.
    U16Array(Vec<u16>),
}

impl FieldValue {
    /// Returns the wire kind of this value.
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::U8(_) => FieldKind::U8,
            Self::U16(_) => FieldKind::U16,
            Self::U32(_) => FieldKind::U32,
            Self::I16(_) => FieldKind::I16,
            Self::F32(_) => FieldKind::F32,
            Self::Text(_) => FieldKind::Text,
            Self::U16Array(_) => FieldKind::U16Array,
        }
    }

    /// Returns integer values widened to `i64`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::U8(v) => Some(i64::from(v)),
            Self::U16(v) => Some(i64::from(v)),
            Self::U32(v) => Some(i64::from(v)),
            Self::I16(v) => Some(i64::from(v)),
            _ => None,
        }
    }

    fn put(&self, buf: &mut BytesMut) {
        match self {
            Self::U8(v) => buf.put_u8(*v),
            Self::U16(v) => buf.put_u16_le(*v),
            Self::U32(v) => buf.put_u32_le(*v),
            Self::I16(v) => buf.put_i16_le(*v),
            Self::F32(v) => buf.put_f32_le(*v),
            Self::Text(s) => {
                buf.put_slice(s.as_bytes());
                buf.put_u8(0);
            }
            Self::U16Array(values) => {
                for v in values {
                    buf.put_u16_le(*v);
                }
            }
        }
    }

    /// Reads one value of `kind`. Callers check the fixed-size length first.
    fn get(kind: FieldKind, cursor: &mut &[u8]) -> Self {
        match kind {
            FieldKind::U8 => Self::U8(cursor.get_u8()),
            FieldKind::U16 => Self::U16(cursor.get_u16_le()),
            FieldKind::U32 => Self::U32(cursor.get_u32_le()),
            FieldKind::I16 => Self::I16(cursor.get_i16_le()),
            FieldKind::F32 => Self::F32(cursor.get_f32_le()),
            FieldKind::Text => {
                let len = cursor.iter().position(|&b| b == 0).unwrap_or(cursor.len());
                let text = String::from_utf8_lossy(&cursor[..len]).into_owned();
                *cursor = &[];
                Self::Text(text)
            }
            FieldKind::U16Array => {
                let mut values = Vec::with_capacity(cursor.len() / 2);
                while cursor.remaining() >= 2 {
                    values.push(cursor.get_u16_le());
                }
                // An odd trailing byte cannot belong to any element.
                *cursor = &[];
                Self::U16Array(values)
            }
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::U8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::U16Array(values) => write!(f, "[{} values]", values.len()),
        }
    }
}

/// Named field values in layout order.
pub type Fields = Vec<(&'static str, FieldValue)>;

/// Encodes field values into a payload following the layout of `id`.
///
/// # Errors
///
/// Returns [`FrameError::Layout`] if the names or kinds do not match the
/// catalog layout, in order.
pub fn encode_payload(
    id: MessageId,
    fields: &[(&'static str, FieldValue)],
) -> Result<Bytes, FrameError> {
    let layout = id.layout();
    if layout.len() != fields.len() {
        return Err(FrameError::Layout {
            id: id.as_u16(),
            reason: format!("expected {} fields, got {}", layout.len(), fields.len()),
        });
    }

    let mut buf = BytesMut::with_capacity(fixed_len(layout));
    for (slot, (name, value)) in layout.iter().zip(fields) {
        if slot.name != *name || slot.kind != value.kind() {
            return Err(FrameError::Layout {
                id: id.as_u16(),
                reason: format!(
                    "field {name} ({:?}) does not match {} ({:?})",
                    value.kind(),
                    slot.name,
                    slot.kind
                ),
            });
        }
        value.put(&mut buf);
    }
    Ok(buf.freeze())
}

/// Decodes a payload following the layout of `id`.
///
/// # Errors
///
/// Returns [`FrameError::PayloadLength`] if the payload is shorter than the
/// fixed part of the layout, or longer than it when the layout has no
/// variable-length tail.
pub fn decode_payload(id: MessageId, payload: &[u8]) -> Result<Fields, FrameError> {
    let layout = id.layout();
    check_length(id, layout, payload.len())?;

    let mut cursor = payload;
    Ok(layout
        .iter()
        .map(|slot| (slot.name, FieldValue::get(slot.kind, &mut cursor)))
        .collect())
}

fn check_length(id: MessageId, layout: &[FieldSpec], got: usize) -> Result<(), FrameError> {
    let fixed = fixed_len(layout);
    let variable = layout.iter().any(|f| f.kind.width().is_none());
    if got < fixed || (!variable && got != fixed) {
        return Err(FrameError::PayloadLength {
            id: id.as_u16(),
            expected: fixed,
            got,
        });
    }
    Ok(())
}

/// A decoded protocol message.
///
/// Messages with an id missing from the catalog decode successfully with an
/// empty field list; their payload stays available through [`Message::payload`].
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    id: u16,
    src: u8,
    dst: u8,
    fields: Fields,
    payload: Bytes,
}

impl Message {
    /// Builds a message from field values, validating them against the
    /// catalog layout.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Layout`] if the fields do not match the layout.
    pub fn new(id: MessageId, fields: Fields) -> Result<Self, FrameError> {
        let payload = encode_payload(id, &fields)?;
        Ok(Self {
            id: id.as_u16(),
            src: 0,
            dst: 0,
            fields,
            payload,
        })
    }

    /// Sets the source and destination device ids.
    #[must_use]
    pub fn with_route(mut self, src: u8, dst: u8) -> Self {
        self.src = src;
        self.dst = dst;
        self
    }

    /// Decodes a complete frame.
    ///
    /// # Errors
    ///
    /// Returns a `FrameError` if framing, checksum or payload layout is invalid.
    pub fn decode(frame: &[u8]) -> Result<Self, FrameError> {
        let (header, payload) = frame::split(frame)?;
        let fields = match MessageId::from_u16(header.id) {
            Some(id) => decode_payload(id, payload)?,
            None => Vec::new(),
        };
        Ok(Self {
            id: header.id,
            src: header.src,
            dst: header.dst,
            fields,
            payload: Bytes::copy_from_slice(payload),
        })
    }

    /// Encodes the message into a complete frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::TooLarge`] if the payload does not fit a frame.
    pub fn encode(&self) -> Result<Bytes, FrameError> {
        frame::encode(
            FrameHeader {
                id: self.id,
                src: self.src,
                dst: self.dst,
            },
            &self.payload,
        )
    }

    /// Returns the raw message type id.
    #[must_use]
    pub const fn id(&self) -> u16 {
        self.id
    }

    /// Returns the catalog id, if known.
    #[must_use]
    pub const fn message_id(&self) -> Option<MessageId> {
        MessageId::from_u16(self.id)
    }

    /// Returns the sender device id.
    #[must_use]
    pub const fn src(&self) -> u8 {
        self.src
    }

    /// Returns the recipient device id.
    #[must_use]
    pub const fn dst(&self) -> u8 {
        self.dst
    }

    /// Returns all decoded fields in layout order.
    #[must_use]
    pub fn fields(&self) -> &[(&'static str, FieldValue)] {
        &self.fields
    }

    /// Returns the raw payload bytes.
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find_map(|(n, v)| (*n == name).then_some(v))
    }

    /// Returns a u8 field.
    #[must_use]
    pub fn u8(&self, name: &str) -> Option<u8> {
        match self.field(name)? {
            FieldValue::U8(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a u16 field.
    #[must_use]
    pub fn u16(&self, name: &str) -> Option<u16> {
        match self.field(name)? {
            FieldValue::U16(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a u32 field.
    #[must_use]
    pub fn u32(&self, name: &str) -> Option<u32> {
        match self.field(name)? {
            FieldValue::U32(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns an i16 field.
    #[must_use]
    pub fn i16(&self, name: &str) -> Option<i16> {
        match self.field(name)? {
            FieldValue::I16(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns an f32 field.
    #[must_use]
    pub fn f32(&self, name: &str) -> Option<f32> {
        match self.field(name)? {
            FieldValue::F32(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a text field.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.field(name)? {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns a u16 array field.
    #[must_use]
    pub fn u16_array(&self, name: &str) -> Option<&[u16]> {
        match self.field(name)? {
            FieldValue::U16Array(values) => Some(values.as_slice()),
            _ => None,
        }
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.message_id() {
            Some(id) => write!(f, "{}", id.name())?,
            None => write!(f, "unknown({})", self.id)?,
        }
        for (i, (name, value)) in self.fields.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{name}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speed_of_sound(value: u32) -> Message {
        Message::new(
            MessageId::SpeedOfSound,
            vec![("sos_mm_per_sec", FieldValue::U32(value))],
        )
        .unwrap()
    }

    #[test]
    fn test_encode_decode_speed_of_sound() {
        let msg = speed_of_sound(1_550_000).with_route(1, 0);
        let decoded = Message::decode(&msg.encode().unwrap()).unwrap();

        assert_eq!(decoded, msg);
        assert_eq!(decoded.u32("sos_mm_per_sec"), Some(1_550_000));
        assert_eq!(decoded.src(), 1);
    }

    #[test]
    fn test_negative_gain_survives_the_wire() {
        let fields = vec![
            ("start_mm", FieldValue::U32(0)),
            ("length_mm", FieldValue::U32(0)),
            ("gain_index", FieldValue::I16(-1)),
            ("msec_per_ping", FieldValue::I16(-1)),
            ("pulse_len_usec", FieldValue::U16(0)),
            ("report_id", FieldValue::U16(1223)),
            ("reserved", FieldValue::U16(0)),
            ("chirp", FieldValue::U8(0)),
            ("decimation", FieldValue::U8(0)),
        ];
        let msg = Message::new(MessageId::SetPingParams, fields).unwrap();
        let payload = msg.payload();
        assert_eq!(&payload[8..10], &[0xFF, 0xFF]);

        let decoded = Message::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.i16("gain_index"), Some(-1));
        assert_eq!(decoded.i16("msec_per_ping"), Some(-1));
    }

    #[test]
    fn test_layout_mismatch_rejected() {
        let err = Message::new(
            MessageId::SpeedOfSound,
            vec![("sos_mm_per_sec", FieldValue::U16(1500))],
        )
        .unwrap_err();
        assert!(matches!(err, FrameError::Layout { id: 1203, .. }));

        let err = Message::new(MessageId::SpeedOfSound, vec![]).unwrap_err();
        assert!(matches!(err, FrameError::Layout { .. }));
    }

    #[test]
    fn test_wrong_payload_length_rejected() {
        let frame = frame::encode(
            FrameHeader {
                id: 1203,
                src: 0,
                dst: 0,
            },
            &[1, 2, 3],
        )
        .unwrap();
        assert_eq!(
            Message::decode(&frame),
            Err(FrameError::PayloadLength {
                id: 1203,
                expected: 4,
                got: 3
            })
        );
    }

    #[test]
    fn test_nack_text_tail() {
        let msg = Message::new(
            MessageId::Nack,
            vec![
                ("nacked_id", FieldValue::U16(1015)),
                ("nack_message", FieldValue::Text("bad range".into())),
            ],
        )
        .unwrap();
        let decoded = Message::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.u16("nacked_id"), Some(1015));
        assert_eq!(decoded.text("nack_message"), Some("bad range"));
    }

    #[test]
    fn test_unknown_id_keeps_payload() {
        let frame = frame::encode(
            FrameHeader {
                id: 4242,
                src: 1,
                dst: 0,
            },
            &[1, 2],
        )
        .unwrap();
        let msg = Message::decode(&frame).unwrap();
        assert_eq!(msg.id(), 4242);
        assert_eq!(msg.message_id(), None);
        assert!(msg.fields().is_empty());
        assert_eq!(msg.payload().as_ref(), &[1, 2]);
        assert_eq!(msg.to_string(), "unknown(4242)");
    }

    #[test]
    fn test_display() {
        assert_eq!(
            speed_of_sound(1_500_000).to_string(),
            "speed_of_sound sos_mm_per_sec=1500000"
        );
    }
}
