//! Protocol definitions for Ping device communication.
//!
//! This module contains the low-level protocol types including:
//! - Frame encoding/decoding with checksums
//! - The message catalog (ids and payload layouts)
//! - Typed messages and field values
//! - Command descriptors

pub mod catalog;
pub mod command;
pub mod frame;
pub mod message;

pub use catalog::{FieldKind, FieldSpec, MessageId};
pub use command::CommandDescriptor;
pub use frame::{FrameDecoder, FrameHeader, MAX_PAYLOAD_SIZE};
pub use message::{FieldValue, Fields, Message};
