//! Measurement and setting reports.
//!
//! Each type is a read-only view of one report message. Values keep the
//! units used on the wire.

use crate::protocol::{Message, MessageId};

fn is(msg: &Message, id: MessageId) -> Option<()> {
    (msg.message_id()? == id).then_some(())
}

/// Distance report (`distance2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Distance {
    /// Distance measured by the last ping, mm.
    pub ping_distance_mm: u32,
    /// Filtered distance, mm.
    pub averaged_distance_mm: u32,
    /// Confidence of the last ping, percent.
    pub ping_confidence: u8,
    /// Confidence of the filtered distance, percent.
    pub averaged_distance_confidence: u8,
    /// Device timestamp, ms.
    pub timestamp: u32,
}

impl Distance {
    /// Extracts a distance report.
    #[must_use]
    pub fn from_message(msg: &Message) -> Option<Self> {
        is(msg, MessageId::Distance2)?;
        Some(Self {
            ping_distance_mm: msg.u32("ping_distance_mm")?,
            averaged_distance_mm: msg.u32("averaged_distance_mm")?,
            ping_confidence: msg.u8("ping_confidence")?,
            averaged_distance_confidence: msg.u8("averaged_distance_confidence")?,
            timestamp: msg.u32("timestamp")?,
        })
    }
}

/// Current scan range (`range`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    /// Start of range, mm.
    pub start_mm: u32,
    /// Length of range, mm.
    pub length_mm: u32,
}

impl Range {
    /// Extracts a range report.
    #[must_use]
    pub fn from_message(msg: &Message) -> Option<Self> {
        is(msg, MessageId::Range)?;
        Some(Self {
            start_mm: msg.u32("start_mm")?,
            length_mm: msg.u32("length_mm")?,
        })
    }

    /// End of range, mm.
    #[must_use]
    pub const fn end_mm(&self) -> u32 {
        self.start_mm.saturating_add(self.length_mm)
    }
}

/// Bottom altitude (`altitude`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Altitude {
    /// Altitude, mm.
    pub altitude_mm: u32,
    /// Quality, percent.
    pub quality: u8,
}

impl Altitude {
    /// Extracts an altitude report.
    #[must_use]
    pub fn from_message(msg: &Message) -> Option<Self> {
        is(msg, MessageId::Altitude)?;
        Some(Self {
            altitude_mm: msg.u32("altitude_mm")?,
            quality: msg.u8("quality")?,
        })
    }
}

/// Extracts the speed of sound (mm/s) from a `speed_of_sound` message.
#[must_use]
pub fn speed_of_sound(msg: &Message) -> Option<u32> {
    is(msg, MessageId::SpeedOfSound)?;
    msg.u32("sos_mm_per_sec")
}

/// Extracts the ping interval (ms) from a `ping_rate_msec` message.
#[must_use]
pub fn ping_rate_msec(msg: &Message) -> Option<u16> {
    is(msg, MessageId::PingRateMsec)?;
    msg.u16("msec_per_ping")
}

/// Extracts the gain index from a `gain_index` message.
#[must_use]
pub fn gain_index(msg: &Message) -> Option<u32> {
    is(msg, MessageId::GainIndex)?;
    msg.u32("gain_index")
}

/// Extracts the processor temperature (°C/100) from a `processor_degc` message.
#[must_use]
pub fn processor_centi_degc(msg: &Message) -> Option<u32> {
    is(msg, MessageId::ProcessorDegc)?;
    msg.u32("centi_degC")
}

/// Echo profile report (`profile6_t`).
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    /// Sequence number of the ping.
    pub ping_number: u32,
    /// Start of range, mm.
    pub start_mm: u32,
    /// Length of range, mm.
    pub length_mm: u32,
    /// Device timestamp, ms.
    pub timestamp_msec: u32,
    /// Depth from this ping, m.
    pub this_ping_depth_m: f32,
    /// Smoothed depth, m.
    pub smooth_depth_m: f32,
    /// Confidence of the depth from this ping, percent.
    pub ping_depth_measurement_confidence: u8,
    /// Gain index used.
    pub gain_index: u8,
    /// Decimation used.
    pub decimation: u8,
    /// Power results across the range.
    pub pwr_results: Vec<u16>,
}

impl Profile {
    /// Extracts a profile report.
    ///
    /// The power array is cut to `num_results` when the payload carries more.
    #[must_use]
    pub fn from_message(msg: &Message) -> Option<Self> {
        is(msg, MessageId::Profile6T)?;
        let num_results = usize::from(msg.u16("num_results")?);
        let results = msg.u16_array("pwr_results")?;
        Some(Self {
            ping_number: msg.u32("ping_number")?,
            start_mm: msg.u32("start_mm")?,
            length_mm: msg.u32("length_mm")?,
            timestamp_msec: msg.u32("timestamp_msec")?,
            this_ping_depth_m: msg.f32("this_ping_depth_m")?,
            smooth_depth_m: msg.f32("smooth_depth_m")?,
            ping_depth_measurement_confidence: msg.u8("ping_depth_measurement_confidence")?,
            gain_index: msg.u8("gain_index")?,
            decimation: msg.u8("decimation")?,
            pwr_results: results[..num_results.min(results.len())].to_vec(),
        })
    }
}
