//! Command parameter types.

use crate::protocol::MessageId;

/// Speed of sound in fresh water, mm/s.
pub const WATER_SOS_MM_PER_SEC: u32 = 1_500_000;

/// Parameters for `set_ping_params`.
///
/// Values go on the wire exactly as given. Sentinels are part of the
/// protocol, not of this type: `length_mm = 0` selects auto range,
/// `gain_index = -1` auto gain, `msec_per_ping = -1` a single ping,
/// `pulse_len_usec = 0` auto pulse length and `report_id = 0` stops
/// periodic reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingParams {
    /// Start of ping range in mm, normally 0.
    pub start_mm: u32,
    /// Length of the returned profile in mm; 0 for auto range.
    pub length_mm: u32,
    /// -1 for auto gain, 0-13 for a manual gain step.
    pub gain_index: i16,
    /// Minimum ping interval in ms; -1 to fire a single ping.
    pub msec_per_ping: i16,
    /// Pulse length in µs; 0 for auto. The firmware currently always uses auto.
    pub pulse_len_usec: u16,
    /// Id of the report to send after each ping: distance2, `profile6_t` or 0.
    pub report_id: u16,
    /// Reserved, set to 0.
    pub reserved: u16,
    /// 1 for chirp, 0 for a monotone ping.
    pub chirp: u8,
    /// 0 for auto range resolution in chirp mode.
    pub decimation: u8,
}

impl Default for PingParams {
    /// Auto range, auto gain, single ping, distance reports.
    fn default() -> Self {
        Self {
            start_mm: 0,
            length_mm: 0,
            gain_index: -1,
            msec_per_ping: -1,
            pulse_len_usec: 0,
            report_id: MessageId::Distance2.as_u16(),
            reserved: 0,
            chirp: 0,
            decimation: 0,
        }
    }
}

impl PingParams {
    /// Sets the ping interval.
    #[must_use]
    pub const fn interval_ms(mut self, msec_per_ping: i16) -> Self {
        self.msec_per_ping = msec_per_ping;
        self
    }

    /// Sets the report sent after each ping (0 disables reporting).
    #[must_use]
    pub const fn report(mut self, report_id: u16) -> Self {
        self.report_id = report_id;
        self
    }

    /// Sets the range window in mm.
    #[must_use]
    pub const fn range(mut self, start_mm: u32, length_mm: u32) -> Self {
        self.start_mm = start_mm;
        self.length_mm = length_mm;
        self
    }

    /// Sets the gain index.
    #[must_use]
    pub const fn gain(mut self, gain_index: i16) -> Self {
        self.gain_index = gain_index;
        self
    }

    /// Selects chirp or monotone pings.
    #[must_use]
    pub const fn chirp(mut self, enabled: bool) -> Self {
        self.chirp = enabled as u8;
        self
    }
}
