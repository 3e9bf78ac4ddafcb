//! Cerulean S500 sounder.

use std::net::SocketAddr;
use std::time::Duration;

use crate::commands::CommandOutcome;
use crate::device::{DriverConfig, PingDevice, common_handlers};
use crate::dispatch::{DispatchStats, HandlerTable};
use crate::error::{Error, Result};
use crate::event::Subscription;
use crate::protocol::command::{set_ping_params, set_speed_of_sound};
use crate::protocol::{Message, MessageId};
use crate::state::{Reading, StateMirror};
use crate::transport::{SerialConfig, SerialTransport, Transport, UdpConfig, UdpTransport};
use crate::types::measurement;
use crate::types::{
    Altitude, DeviceInformation, Distance, FirmwareVersion, PingParams, Profile, ProtocolVersion,
    Range,
};

/// Reports the S500 sends, each stored as the latest of its type.
const REPORTS: [MessageId; 9] = [
    MessageId::FwVersion,
    MessageId::SpeedOfSound,
    MessageId::Range,
    MessageId::PingRateMsec,
    MessageId::GainIndex,
    MessageId::Altitude,
    MessageId::ProcessorDegc,
    MessageId::Distance2,
    MessageId::Profile6T,
];

/// What [`S500::initialize`] learned about the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitReport {
    /// Ping protocol version.
    pub protocol_version: ProtocolVersion,
    /// Common device information.
    pub device_information: DeviceInformation,
    /// S500 firmware version.
    pub firmware: FirmwareVersion,
}

/// Driver for the S500.
pub struct S500<T> {
    device: PingDevice<T>,
}

impl S500<SerialTransport> {
    /// Creates a driver for an S500 on a serial port.
    #[must_use]
    pub fn serial(port: impl Into<String>) -> Self {
        Self::with_serial_config(SerialConfig::new(port))
    }

    /// Creates a driver with custom serial configuration.
    #[must_use]
    pub fn with_serial_config(config: SerialConfig) -> Self {
        Self::new(SerialTransport::new(config), DriverConfig::default())
    }
}

impl S500<UdpTransport> {
    /// Creates a driver for a network-attached S500.
    #[must_use]
    pub fn udp(remote: SocketAddr) -> Self {
        Self::new(
            UdpTransport::new(UdpConfig::new(remote)),
            DriverConfig::default(),
        )
    }
}

impl<T: Transport + 'static> S500<T> {
    /// Handler table for S500 messages.
    #[must_use]
    pub fn handler_table() -> HandlerTable {
        common_handlers().record(&REPORTS)
    }

    /// Creates a driver over `transport`.
    #[must_use]
    pub fn new(transport: T, config: DriverConfig) -> Self {
        Self {
            device: PingDevice::new(transport, Self::handler_table(), config),
        }
    }

    /// Returns the underlying generic driver.
    #[must_use]
    pub const fn device(&self) -> &PingDevice<T> {
        &self.device
    }

    /// Connects to the device and starts processing inbound frames.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot connect.
    pub async fn connect(&mut self) -> Result<()> {
        self.device.connect().await
    }

    /// Disconnects from the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails to close.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.device.disconnect().await
    }

    /// Returns true if connected.
    pub async fn is_connected(&self) -> bool {
        self.device.is_connected().await
    }

    // ==================== Commands ====================

    /// Applies ping parameters.
    ///
    /// The device answers with an `ack`; no message reads the parameter set
    /// back, so verification has nothing to compare and passes whenever the
    /// ack arrives.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`], [`Error::Busy`], [`Error::Nack`] or a
    /// transport error.
    pub async fn set_ping_params(
        &self,
        params: &PingParams,
        verify: bool,
        timeout: Duration,
    ) -> Result<CommandOutcome> {
        self.device
            .execute(&set_ping_params(params), timeout, verify)
            .await
    }

    /// Sets the speed of sound in mm/s.
    ///
    /// The device answers with its current `speed_of_sound`; with `verify`
    /// set the outcome reports whether it took the requested value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`], [`Error::Busy`], [`Error::Nack`] or a
    /// transport error.
    pub async fn set_speed_of_sound(
        &self,
        sos_mm_per_sec: u32,
        verify: bool,
        timeout: Duration,
    ) -> Result<CommandOutcome> {
        self.device
            .execute(&set_speed_of_sound(sos_mm_per_sec), timeout, verify)
            .await
    }

    /// Asks the device to send message `id` and waits for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the device does not answer in time.
    pub async fn request(&self, id: MessageId, timeout: Duration) -> Result<Message> {
        self.device.request(id.as_u16(), timeout).await
    }

    /// Reads the device identity, then starts pinging at `ping_interval_ms`
    /// with distance reports.
    ///
    /// Each step waits up to the configured default timeout.
    ///
    /// # Errors
    ///
    /// Fails with the first step's error, or [`Error::Protocol`] if a reply
    /// is malformed or the ping parameters were not accepted.
    pub async fn initialize(&self, ping_interval_ms: i16) -> Result<InitReport> {
        let timeout = self.device.config().default_timeout;

        let protocol_version = self
            .request_as(MessageId::ProtocolVersion, timeout, ProtocolVersion::from_message)
            .await?;
        let device_information = self
            .request_as(
                MessageId::DeviceInformation,
                timeout,
                DeviceInformation::from_message,
            )
            .await?;
        let firmware = self
            .request_as(MessageId::FwVersion, timeout, FirmwareVersion::from_message)
            .await?;

        tracing::info!(
            "S500 firmware {} (protocol {})",
            firmware,
            protocol_version
        );

        let params = PingParams::default()
            .interval_ms(ping_interval_ms)
            .report(MessageId::Distance2.as_u16());
        let outcome = self.set_ping_params(&params, true, timeout).await?;
        if !outcome.is_success() {
            return Err(Error::Protocol {
                message: "ping parameters were not applied".into(),
            });
        }

        Ok(InitReport {
            protocol_version,
            device_information,
            firmware,
        })
    }

    async fn request_as<U>(
        &self,
        id: MessageId,
        timeout: Duration,
        view: impl FnOnce(&Message) -> Option<U>,
    ) -> Result<U> {
        let reply = self.request(id, timeout).await?;
        view(&reply).ok_or_else(|| Error::Protocol {
            message: format!("malformed {} reply", id.name()),
        })
    }

    // ==================== State ====================

    /// Returns the state mirror.
    #[must_use]
    pub const fn state(&self) -> &StateMirror {
        self.device.state()
    }

    /// Returns the dispatch counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.device.stats()
    }

    /// Subscribes to events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.device.subscribe()
    }

    /// Last distance report.
    pub async fn distance(&self) -> Option<Reading<Distance>> {
        self.state()
            .read(MessageId::Distance2, Distance::from_message)
            .await
    }

    /// Last reported speed of sound in mm/s.
    pub async fn speed_of_sound(&self) -> Option<Reading<u32>> {
        self.state()
            .read(MessageId::SpeedOfSound, measurement::speed_of_sound)
            .await
    }

    /// Last reported gain index.
    pub async fn gain_index(&self) -> Option<Reading<u32>> {
        self.state()
            .read(MessageId::GainIndex, measurement::gain_index)
            .await
    }

    /// Last reported scan range.
    pub async fn range(&self) -> Option<Reading<Range>> {
        self.state()
            .read(MessageId::Range, Range::from_message)
            .await
    }

    /// Last reported ping interval in ms.
    pub async fn ping_rate(&self) -> Option<Reading<u16>> {
        self.state()
            .read(MessageId::PingRateMsec, measurement::ping_rate_msec)
            .await
    }

    /// Last altitude report.
    pub async fn altitude(&self) -> Option<Reading<Altitude>> {
        self.state()
            .read(MessageId::Altitude, Altitude::from_message)
            .await
    }

    /// Last reported processor temperature in hundredths of a degree Celsius.
    pub async fn processor_temperature(&self) -> Option<Reading<u32>> {
        self.state()
            .read(MessageId::ProcessorDegc, measurement::processor_centi_degc)
            .await
    }

    /// Last echo profile.
    pub async fn profile(&self) -> Option<Reading<Profile>> {
        self.state()
            .read(MessageId::Profile6T, Profile::from_message)
            .await
    }

    /// Last reported S500 firmware version.
    pub async fn firmware_version(&self) -> Option<Reading<FirmwareVersion>> {
        self.state()
            .read(MessageId::FwVersion, FirmwareVersion::from_message)
            .await
    }

    /// Last reported device information.
    pub async fn device_information(&self) -> Option<Reading<DeviceInformation>> {
        self.device.device_information().await
    }

    /// Last reported protocol version.
    pub async fn protocol_version(&self) -> Option<Reading<ProtocolVersion>> {
        self.device.protocol_version().await
    }

    /// Waits for the next distance report.
    pub async fn next_distance(&self, timeout: Duration) -> Option<Distance> {
        let msg = self
            .device
            .wait_for(&[MessageId::Distance2], timeout)
            .await?;
        Distance::from_message(&msg)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::protocol::FieldValue;
    use crate::transport::{MockDevice, MockTransport};

    const TIMEOUT: Duration = Duration::from_secs(1);

    async fn connected() -> (S500<MockTransport>, MockDevice) {
        let (transport, device) = MockTransport::new();
        let mut sonar = S500::new(transport, DriverConfig::default());
        sonar.connect().await.unwrap();
        (sonar, device)
    }

    fn sos(value: u32) -> Message {
        Message::new(
            MessageId::SpeedOfSound,
            vec![("sos_mm_per_sec", FieldValue::U32(value))],
        )
        .unwrap()
    }

    fn ack(id: u16) -> Message {
        Message::new(MessageId::Ack, vec![("acked_id", FieldValue::U16(id))]).unwrap()
    }

    fn distance(mm: u32) -> Message {
        Message::new(
            MessageId::Distance2,
            vec![
                ("ping_distance_mm", FieldValue::U32(mm)),
                ("averaged_distance_mm", FieldValue::U32(mm)),
                ("reserved", FieldValue::U16(0)),
                ("ping_confidence", FieldValue::U8(90)),
                ("averaged_distance_confidence", FieldValue::U8(80)),
                ("timestamp", FieldValue::U32(1)),
            ],
        )
        .unwrap()
    }

    fn range(length_mm: u32) -> Message {
        Message::new(
            MessageId::Range,
            vec![
                ("start_mm", FieldValue::U32(0)),
                ("length_mm", FieldValue::U32(length_mm)),
            ],
        )
        .unwrap()
    }

    /// A device that echoes speed of sound, acks ping parameters and answers
    /// general requests for its identity.
    fn cooperative(device: &MockDevice) {
        device.respond_with(|cmd| match MessageId::from_u16(cmd.id()) {
            Some(MessageId::SetSpeedOfSound) => {
                vec![sos(cmd.u32("sos_mm_per_sec").unwrap_or_default())]
            }
            Some(MessageId::SetPingParams) => vec![ack(cmd.id())],
            Some(MessageId::GeneralRequest) => {
                match cmd.u16("requested_id").and_then(MessageId::from_u16) {
                    Some(MessageId::ProtocolVersion) => vec![
                        Message::new(
                            MessageId::ProtocolVersion,
                            vec![
                                ("version_major", FieldValue::U8(1)),
                                ("version_minor", FieldValue::U8(0)),
                                ("version_patch", FieldValue::U8(0)),
                                ("reserved", FieldValue::U8(0)),
                            ],
                        )
                        .unwrap(),
                    ],
                    Some(MessageId::DeviceInformation) => vec![
                        Message::new(
                            MessageId::DeviceInformation,
                            vec![
                                ("device_type", FieldValue::U8(3)),
                                ("device_revision", FieldValue::U8(1)),
                                ("firmware_version_major", FieldValue::U8(1)),
                                ("firmware_version_minor", FieldValue::U8(2)),
                                ("firmware_version_patch", FieldValue::U8(3)),
                                ("reserved", FieldValue::U8(0)),
                            ],
                        )
                        .unwrap(),
                    ],
                    Some(MessageId::FwVersion) => vec![
                        Message::new(
                            MessageId::FwVersion,
                            vec![
                                ("device_type", FieldValue::U8(3)),
                                ("model", FieldValue::U8(1)),
                                ("version_major", FieldValue::U16(1)),
                                ("version_minor", FieldValue::U16(7)),
                            ],
                        )
                        .unwrap(),
                    ],
                    _ => Vec::new(),
                }
            }
            _ => Vec::new(),
        });
    }

    #[tokio::test]
    async fn test_set_speed_of_sound_verified() {
        let (sonar, device) = connected().await;
        cooperative(&device);

        let outcome = sonar
            .set_speed_of_sound(1_550_000, true, TIMEOUT)
            .await
            .unwrap();
        assert!(outcome.is_success());

        let reading = sonar.speed_of_sound().await.unwrap();
        assert_eq!(reading.value, 1_550_000);
    }

    #[tokio::test]
    async fn test_device_keeping_old_value_fails_verification() {
        let (sonar, device) = connected().await;
        device.respond_with(|_| vec![sos(1_540_000)]);

        let outcome = sonar
            .set_speed_of_sound(1_550_000, true, TIMEOUT)
            .await
            .unwrap();
        assert!(!outcome.is_success());

        // The mirror shows what the device reported, not what was asked for.
        assert_eq!(sonar.speed_of_sound().await.unwrap().value, 1_540_000);
    }

    #[tokio::test]
    async fn test_set_ping_params_sends_sentinels() {
        let (sonar, device) = connected().await;
        cooperative(&device);

        let params = PingParams::default().gain(-1).interval_ms(-1);
        let outcome = sonar.set_ping_params(&params, true, TIMEOUT).await.unwrap();
        assert!(outcome.is_success());

        let sent = device.sent();
        assert_eq!(sent[0].i16("gain_index"), Some(-1));
        assert_eq!(sent[0].i16("msec_per_ping"), Some(-1));
        assert_eq!(sent[0].u16("report_id"), Some(1223));
    }

    #[tokio::test]
    async fn test_nack_rejects_command() {
        let (sonar, device) = connected().await;
        device.respond_with(|cmd| {
            vec![
                Message::new(
                    MessageId::Nack,
                    vec![
                        ("nacked_id", FieldValue::U16(cmd.id())),
                        ("nack_message", FieldValue::Text("invalid range".into())),
                    ],
                )
                .unwrap(),
            ]
        });

        let err = sonar
            .set_ping_params(&PingParams::default(), true, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Nack { id: 1015, .. }));
    }

    #[tokio::test]
    async fn test_initialize() {
        let (sonar, device) = connected().await;
        cooperative(&device);

        let report = sonar.initialize(100).await.unwrap();
        assert_eq!(report.protocol_version.major, 1);
        assert_eq!(report.device_information.firmware_version_major, 1);
        assert_eq!(report.firmware.minor, 7);

        let sent = device.sent();
        let params = sent.last().unwrap();
        assert_eq!(params.id(), MessageId::SetPingParams.as_u16());
        assert_eq!(params.i16("msec_per_ping"), Some(100));

        assert!(sonar.firmware_version().await.is_some());
        assert!(sonar.device_information().await.is_some());
        assert!(sonar.protocol_version().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_fails_on_silent_step() {
        let (sonar, device) = connected().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        device.respond_with(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        });

        let err = sonar.initialize(100).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        // Nothing after the first unanswered request is attempted.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsolicited_reports_fill_mirror() {
        let (sonar, device) = connected().await;
        let mut sub = sonar.subscribe();

        device.push(&distance(1200));
        device.push(&distance(1300));
        for _ in 0..2 {
            sub.recv().await.unwrap();
        }

        let reading = sonar.distance().await.unwrap();
        assert_eq!(reading.value.ping_distance_mm, 1300);
        assert_eq!(reading.seq, 2);
        assert!(sonar.range().await.is_none());
        assert!(sonar.stats().unknown.is_empty());
    }

    #[tokio::test]
    async fn test_next_distance() {
        let (sonar, device) = connected().await;
        let (next, ()) = tokio::join!(sonar.next_distance(TIMEOUT), async {
            device.push(&range(5000));
            device.push(&distance(4200));
        });

        let next = next.unwrap();
        assert_eq!(next.ping_distance_mm, 4200);
        assert_eq!(sonar.range().await.unwrap().value.length_mm, 5000);
    }
}
