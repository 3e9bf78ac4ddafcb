//! End-to-end driver behavior against a simulated S500.

use std::time::Duration;

use ping_sonar::{
    DriverConfig, Error, Event, FieldValue, Message, MessageId, MockDevice, MockTransport,
    PingParams, S500,
};
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

const TIMEOUT: Duration = Duration::from_secs(1);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn connected() -> (S500<MockTransport>, MockDevice) {
    init_tracing();
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

fn distance(mm: u32) -> Message {
    Message::new(
        MessageId::Distance2,
        vec![
            ("ping_distance_mm", FieldValue::U32(mm)),
            ("averaged_distance_mm", FieldValue::U32(mm)),
            ("reserved", FieldValue::U16(0)),
            ("ping_confidence", FieldValue::U8(100)),
            ("averaged_distance_confidence", FieldValue::U8(100)),
            ("timestamp", FieldValue::U32(0)),
        ],
    )
    .unwrap()
}

/// Waits until the driver has processed `count` more inbound messages.
async fn drain(sub: &mut ping_sonar::Subscription, count: usize) {
    let mut seen = 0;
    while seen < count {
        if let Some(Event::Message(_)) = sub.recv().await {
            seen += 1;
        }
    }
}

#[tokio::test]
async fn echoed_speed_of_sound_passes() {
    let (sonar, device) = connected().await;
    device.respond_with(|cmd| vec![sos(cmd.u32("sos_mm_per_sec").unwrap_or_default())]);

    let outcome = sonar
        .set_speed_of_sound(1_550_000, true, TIMEOUT)
        .await
        .unwrap();

    let verification = outcome.verification.as_ref().unwrap();
    assert!(verification.overall);
    assert!(verification.checks[0].passed);
    assert!(outcome.is_success());
}

#[tokio::test]
async fn altered_speed_of_sound_reports_mismatch() {
    let (sonar, device) = connected().await;
    device.respond_with(|_| vec![sos(1_540_000)]);

    let outcome = sonar
        .set_speed_of_sound(1_550_000, true, TIMEOUT)
        .await
        .unwrap();

    let verification = outcome.verification.unwrap();
    assert!(!verification.overall);
    let check = &verification.checks[0];
    assert_eq!(check.requested, FieldValue::U32(1_550_000));
    assert_eq!(check.observed, Some(FieldValue::U32(1_540_000)));
}

#[tokio::test(start_paused = true)]
async fn silent_device_times_out_at_deadline() {
    let (sonar, _device) = connected().await;
    let timeout = Duration::from_millis(400);
    let start = Instant::now();

    let err = sonar
        .set_speed_of_sound(1_500_000, true, timeout)
        .await
        .unwrap_err();

    let elapsed = start.elapsed();
    assert!(matches!(err, Error::Timeout { timeout_ms: 400 }));
    assert!(elapsed >= timeout);
    assert!(elapsed <= timeout + Duration::from_millis(10));
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_do_not_extend_deadline() {
    let (sonar, device) = connected().await;
    let timeout = Duration::from_millis(400);
    let start = Instant::now();

    let (result, ()) = tokio::join!(sonar.set_speed_of_sound(1_500_000, true, timeout), async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        device.push_raw(&b"\x00\xffnoise"[..]);
        let mut corrupt = sos(1_500_000).encode().unwrap().to_vec();
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xff;
        device.push_raw(corrupt);
    });

    let elapsed = start.elapsed();
    let err = result.unwrap_err();
    assert!(matches!(err, Error::Timeout { timeout_ms: 400 }));
    assert!(elapsed >= timeout);
    assert!(elapsed <= timeout + Duration::from_millis(10));

    let stats = sonar.stats();
    assert_eq!(stats.frames, 2);
    assert_eq!(stats.decode_errors, 2);
    assert!(sonar.speed_of_sound().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn second_command_is_busy_immediately() {
    let (sonar, _device) = connected().await;

    let (first, (second, waited)) = tokio::join!(
        sonar.set_speed_of_sound(1_500_000, false, TIMEOUT),
        async {
            let start = Instant::now();
            let result = sonar
                .set_ping_params(&PingParams::default(), false, TIMEOUT)
                .await;
            (result, start.elapsed())
        }
    );

    assert!(matches!(first, Err(Error::Timeout { .. })));
    assert!(matches!(second, Err(Error::Busy { pending_id: 1002 })));
    assert_eq!(waited, Duration::ZERO);
}

#[tokio::test]
async fn unrelated_messages_do_not_resolve_request() {
    let (sonar, device) = connected().await;
    device.respond_with(|cmd| {
        vec![
            distance(2500),
            ack(MessageId::SetPingParams.as_u16()),
            sos(cmd.u32("sos_mm_per_sec").unwrap_or_default()),
        ]
    });

    let outcome = sonar
        .set_speed_of_sound(1_450_000, true, TIMEOUT)
        .await
        .unwrap();

    assert_eq!(outcome.reply.id(), MessageId::SpeedOfSound.as_u16());
    assert!(outcome.is_success());
    assert_eq!(sonar.distance().await.unwrap().value.ping_distance_mm, 2500);
}

#[tokio::test(start_paused = true)]
async fn late_reply_is_unsolicited() {
    let (sonar, device) = connected().await;
    let mut sub = sonar.subscribe();

    let err = sonar
        .set_speed_of_sound(1_500_000, true, Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));

    device.push(&sos(1_400_000));
    drain(&mut sub, 1).await;
    assert_eq!(sonar.speed_of_sound().await.unwrap().value, 1_400_000);

    device.respond_with(|cmd| vec![sos(cmd.u32("sos_mm_per_sec").unwrap_or_default())]);
    let outcome = sonar
        .set_speed_of_sound(1_500_000, true, TIMEOUT)
        .await
        .unwrap();
    assert!(outcome.is_success());
}

#[tokio::test]
async fn mirror_keeps_latest_of_each_type() {
    let (sonar, device) = connected().await;
    let mut sub = sonar.subscribe();

    for value in [1_400_000, 1_450_000, 1_500_000] {
        device.push(&sos(value));
    }
    device.push(&distance(800));
    drain(&mut sub, 4).await;

    let state = sonar.state().snapshot().await;
    let latest = state.get(MessageId::SpeedOfSound.as_u16()).unwrap();
    assert_eq!(latest.value, sos(1_500_000));
    assert_eq!(latest.seq, 3);
    assert_eq!(state.updates(), 4);
    assert!(state.get(MessageId::GainIndex.as_u16()).is_none());
}

#[tokio::test]
async fn disabling_reports_keeps_last_range() {
    let (sonar, device) = connected().await;
    let mut sub = sonar.subscribe();

    device.push(&range(5000));
    device.push(&distance(1800));
    drain(&mut sub, 2).await;
    let before = sonar.range().await.unwrap();

    device.respond_with(|cmd| vec![ack(cmd.id())]);
    let params = PingParams::default().report(0);
    let outcome = sonar.set_ping_params(&params, true, TIMEOUT).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(device.sent()[0].u16("report_id"), Some(0));

    let after = sonar.range().await.unwrap();
    assert_eq!(after, before);
    assert_eq!(sonar.distance().await.unwrap().value.ping_distance_mm, 1800);
}

#[tokio::test]
async fn corrupt_frames_are_counted_and_skipped() {
    let (sonar, device) = connected().await;
    let mut sub = sonar.subscribe();

    let mut corrupt = sos(1).encode().unwrap().to_vec();
    corrupt[8] ^= 0x55;
    device.push_raw(corrupt);
    device.push_raw(&b"BR\x00\x00"[..]);
    device.push(&sos(1_480_000));
    drain(&mut sub, 1).await;

    let stats = sonar.stats();
    assert_eq!(stats.frames, 3);
    assert_eq!(stats.decode_errors, 2);
    assert_eq!(sonar.speed_of_sound().await.unwrap().value, 1_480_000);

    device.respond_with(|cmd| vec![sos(cmd.u32("sos_mm_per_sec").unwrap_or_default())]);
    assert!(
        sonar
            .set_speed_of_sound(1_490_000, true, TIMEOUT)
            .await
            .unwrap()
            .is_success()
    );
}

#[tokio::test]
async fn requests_every_report_type() {
    let (sonar, device) = connected().await;
    device.respond_with(|cmd| match cmd.u16("requested_id").and_then(MessageId::from_u16) {
        Some(MessageId::SpeedOfSound) => vec![sos(1_500_000)],
        Some(MessageId::Range) => vec![range(10_000)],
        Some(MessageId::Distance2) => vec![distance(3000)],
        _ => Vec::new(),
    });

    for id in [MessageId::SpeedOfSound, MessageId::Range, MessageId::Distance2] {
        let reply = sonar.request(id, TIMEOUT).await.unwrap();
        assert_eq!(reply.id(), id.as_u16());
    }

    assert_eq!(sonar.range().await.unwrap().value.end_mm(), 10_000);
    assert!(sonar.stats().unknown.is_empty());
}
