//! Frame encoding and decoding for the Ping protocol.
//!
//! The wire format is:
//! ```text
//! ┌──────┬──────┬─────────────┬────────────┬────────┬────────┬─────────┬─────────────┐
//! │ 'B'  │ 'R'  │ payload len │ message id │ src id │ dst id │ payload │  checksum   │
//! │  1   │  1   │   2 (LE)    │   2 (LE)   │   1    │   1    │   len   │   2 (LE)    │
//! └──────┴──────┴─────────────┴────────────┴────────┴────────┴─────────┴─────────────┘
//! ```
//!
//! The checksum is the wrapping 16-bit sum of every byte before it.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::FrameError;

/// Frame start marker.
pub const START: [u8; 2] = *b"BR";

/// Header length (start marker, length, id, source, destination).
pub const HEADER_LEN: usize = 8;

/// Checksum length.
pub const CHECKSUM_LEN: usize = 2;

/// Smallest possible frame (empty payload).
pub const MIN_FRAME_SIZE: usize = HEADER_LEN + CHECKSUM_LEN;

/// Largest payload accepted from the wire.
pub const MAX_PAYLOAD_SIZE: usize = 8192;

/// Header fields of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Message type id.
    pub id: u16,
    /// Sender device id.
    pub src: u8,
    /// Recipient device id.
    pub dst: u8,
}

/// Computes the frame checksum over `data`.
#[must_use]
pub fn checksum(data: &[u8]) -> u16 {
    data.iter()
        .fold(0u16, |sum, &b| sum.wrapping_add(u16::from(b)))
}

/// Encodes a payload into a complete frame.
///
/// # Errors
///
/// Returns [`FrameError::TooLarge`] if the payload exceeds [`MAX_PAYLOAD_SIZE`].
pub fn encode(header: FrameHeader, payload: &[u8]) -> Result<Bytes, FrameError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(FrameError::TooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let mut buf = BytesMut::with_capacity(MIN_FRAME_SIZE + payload.len());
    buf.put_slice(&START);
    buf.put_u16_le(payload.len() as u16);
    buf.put_u16_le(header.id);
    buf.put_u8(header.src);
    buf.put_u8(header.dst);
    buf.put_slice(payload);
    let sum = checksum(&buf);
    buf.put_u16_le(sum);
    Ok(buf.freeze())
}

/// Validates a complete frame and splits it into header and payload.
///
/// # Errors
///
/// Returns a `FrameError` if the frame is truncated, has a bad start marker,
/// an inconsistent length or a checksum mismatch.
pub fn split(frame: &[u8]) -> Result<(FrameHeader, &[u8]), FrameError> {
    if frame.len() < MIN_FRAME_SIZE {
        return Err(FrameError::TooShort {
            min: MIN_FRAME_SIZE,
            got: frame.len(),
        });
    }
    if frame[..2] != START {
        return Err(FrameError::BadStart([frame[0], frame[1]]));
    }

    let mut header = &frame[2..HEADER_LEN];
    let payload_len = header.get_u16_le() as usize;
    let id = header.get_u16_le();
    let src = header.get_u8();
    let dst = header.get_u8();

    let expected = MIN_FRAME_SIZE + payload_len;
    if frame.len() != expected {
        return Err(FrameError::Incomplete {
            expected,
            got: frame.len(),
        });
    }

    let body_end = HEADER_LEN + payload_len;
    let computed = checksum(&frame[..body_end]);
    let stated = u16::from_le_bytes([frame[body_end], frame[body_end + 1]]);
    if computed != stated {
        return Err(FrameError::Checksum {
            expected: stated,
            computed,
        });
    }

    Ok((FrameHeader { id, src, dst }, &frame[HEADER_LEN..body_end]))
}

/// Stream decoder that cuts complete frames out of arriving bytes.
///
/// The decoder only frames by length; checksums are validated later by
/// [`split`] so that a corrupt frame is counted where it is dispatched.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Creates a new frame decoder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Feeds data into the decoder.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to cut the next complete frame.
    ///
    /// Returns `Ok(Some(frame))` with the whole frame (start marker through
    /// checksum), `Ok(None)` if more data is needed, or an error when a
    /// header declares an impossible length. Bytes before a start marker are
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::TooLarge`] after skipping the offending marker;
    /// calling `decode` again continues with the following bytes.
    pub fn decode(&mut self) -> Result<Option<Bytes>, FrameError> {
        self.resync();

        if self.buffer.len() < HEADER_LEN {
            return Ok(None);
        }

        let length = u16::from_le_bytes([self.buffer[2], self.buffer[3]]) as usize;
        if length > MAX_PAYLOAD_SIZE {
            self.buffer.advance(START.len());
            return Err(FrameError::TooLarge {
                size: length,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let total = MIN_FRAME_SIZE + length;
        if self.buffer.len() < total {
            return Ok(None);
        }

        Ok(Some(self.buffer.split_to(total).freeze()))
    }

    /// Drops bytes until the buffer starts with a start marker, keeping a
    /// trailing `'B'` that may begin the next one.
    fn resync(&mut self) {
        let skip = self
            .buffer
            .windows(2)
            .position(|w| w == START)
            .unwrap_or_else(|| {
                if self.buffer.last() == Some(&START[0]) {
                    self.buffer.len() - 1
                } else {
                    self.buffer.len()
                }
            });
        if skip > 0 {
            tracing::trace!("skipping {} bytes before frame start", skip);
            self.buffer.advance(skip);
        }
    }

    /// Returns the number of bytes currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
