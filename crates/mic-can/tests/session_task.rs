//! End-to-end tests of SessionTask against the mock bus and scripted flasher

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use mic_can::flash::{FlashOptions, FlashStep, FlashTarget, ScriptedFlasher};
use mic_can::task::{UPLOAD_FAILED, UPLOAD_SUCCEEDED};
use mic_can::telemetry::MIN_PAYLOAD_LEN;
use mic_can::transport::mock::MockConnector;
use mic_can::{
    CanBus, CanFrame, FirmwareStability, FlashPrimitive, InterfaceKind, MicContext, MicError,
    Operation, SessionConfig, SessionEvent, SessionTask, TransportConfig,
};
use pretty_assertions::assert_eq;

/// Primitive that panics on every call
struct PanickingFlasher;

#[async_trait]
impl FlashPrimitive for PanickingFlasher {
    async fn ping(
        &self,
        _bus: &mut dyn CanBus,
        _target: &FlashTarget,
        _options: &FlashOptions,
    ) -> Result<bool, MicError> {
        panic!("flashing library crashed");
    }

    async fn upload<'a>(
        &'a self,
        _bus: &'a mut dyn CanBus,
        _target: &FlashTarget,
        _firmware: &Path,
        _options: &FlashOptions,
    ) -> Result<BoxStream<'a, FlashStep>, MicError> {
        panic!("flashing library crashed");
    }
}

fn context(connector: &MockConnector, flasher: Arc<dyn FlashPrimitive>) -> MicContext {
    MicContext::new(
        SessionConfig::default(),
        Arc::new(connector.clone()),
        flasher,
    )
    .with_transport(TransportConfig::new(InterfaceKind::SocketCan, "vcan0"))
}

fn run(context: MicContext, controller_id: i64, operation: Operation) -> Vec<SessionEvent> {
    let mut handle = SessionTask::spawn(context, controller_id, operation).unwrap();
    let mut events = Vec::new();
    while let Some(event) = handle.blocking_next_event() {
        events.push(event);
    }
    handle.join();
    events
}

fn finished(events: &[SessionEvent]) -> (bool, String) {
    let finals: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::Finished { .. }))
        .collect();
    assert_eq!(finals.len(), 1, "exactly one terminal event expected");

    match events.last() {
        Some(SessionEvent::Finished { success, message }) => (*success, message.clone()),
        other => panic!("Expected Finished as last event, got {:?}", other),
    }
}

fn firmware_file() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("firmware.bin");
    std::fs::write(&path, vec![0xA5u8; 256]).unwrap();
    (dir, path)
}

fn info_reply() -> Vec<CanFrame> {
    let mut payload = vec![0u8; MIN_PAYLOAD_LEN];
    payload[2] = 3;
    payload[3] = 7;
    payload[4..8].copy_from_slice(b"M100");
    payload[9..13].copy_from_slice(b"V200");
    payload[14..16].copy_from_slice(&[0xDE, 0xAD]);
    payload[29] = 0x00;

    let mut frames: Vec<CanFrame> = payload
        .chunks(8)
        .map(|chunk| CanFrame::extended(0x500, chunk).unwrap())
        .collect();
    frames.push(CanFrame::extended(0x700, &[]).unwrap());
    frames
}

#[test]
fn test_upload_reports_progress_then_success() {
    let (_dir, firmware) = firmware_file();
    let connector = MockConnector::new();
    let flasher = Arc::new(ScriptedFlasher::new(vec![
        FlashStep::Percent(0.0),
        FlashStep::Percent(33.3),
        FlashStep::Percent(100.0),
        FlashStep::Outcome(true),
    ]));

    let events = run(
        context(&connector, flasher.clone()),
        7,
        Operation::Upload {
            firmware: firmware.clone(),
        },
    );

    assert_eq!(
        events,
        vec![
            SessionEvent::ProgressBegin,
            SessionEvent::Progress(0),
            SessionEvent::Progress(33),
            SessionEvent::Progress(100),
            SessionEvent::Finished {
                success: true,
                message: UPLOAD_SUCCEEDED.to_string(),
            },
        ]
    );
    assert_eq!(flasher.pings().len(), 1);
    assert_eq!(flasher.uploads(), vec![firmware]);
    assert_eq!(connector.open_handles(), 0);
}

#[test]
fn test_upload_failure_is_terminal_outcome() {
    let (_dir, firmware) = firmware_file();
    let connector = MockConnector::new();
    let flasher = Arc::new(ScriptedFlasher::new(vec![
        FlashStep::Percent(10.0),
        FlashStep::Outcome(false),
    ]));

    let events = run(
        context(&connector, flasher),
        7,
        Operation::Upload { firmware },
    );

    assert_eq!(
        finished(&events),
        (false, UPLOAD_FAILED.to_string())
    );
    assert_eq!(events[0], SessionEvent::ProgressBegin);
    assert_eq!(connector.open_handles(), 0);
}

#[test]
fn test_upload_without_progress_has_no_begin_signal() {
    let (_dir, firmware) = firmware_file();
    let connector = MockConnector::new();
    let flasher = Arc::new(ScriptedFlasher::new(vec![FlashStep::Outcome(true)]));

    let events = run(
        context(&connector, flasher),
        7,
        Operation::Upload { firmware },
    );

    assert_eq!(events.len(), 1);
    assert!(finished(&events).0);
}

#[test]
fn test_upload_to_absent_device_reports_no_response() {
    let (_dir, firmware) = firmware_file();
    let connector = MockConnector::new();
    let flasher = Arc::new(ScriptedFlasher::absent());

    let events = run(
        context(&connector, flasher.clone()),
        9,
        Operation::Upload { firmware },
    );

    let (success, message) = finished(&events);
    assert!(!success);
    assert!(message.contains("try another ID"), "message: {}", message);
    assert_eq!(events.len(), 1);
    assert!(flasher.uploads().is_empty());
    assert_eq!(connector.open_handles(), 0);
}

#[test]
fn test_invalid_controller_id_fails_immediately() {
    let connector = MockConnector::new();
    let flasher = Arc::new(ScriptedFlasher::new(vec![]));

    let events = run(context(&connector, flasher), 300, Operation::Ping);

    assert_eq!(events.len(), 1);
    let (success, message) = finished(&events);
    assert!(!success);
    assert!(message.contains("300"));
    assert_eq!(connector.open_count(), 0);
}

#[test]
fn test_unavailable_transport_fails_immediately() {
    let connector = MockConnector::new();
    connector.set_available(false);
    let flasher = Arc::new(ScriptedFlasher::new(vec![]));

    let events = run(context(&connector, flasher), 1, Operation::Ping);

    assert_eq!(
        events,
        vec![SessionEvent::Finished {
            success: false,
            message: "CAN interface not found: socketcan vcan0".to_string(),
        }]
    );
}

#[test]
fn test_retrieve_info_emits_record_before_finished() {
    let connector = MockConnector::new();
    connector.add_reply(0x803, info_reply());
    let flasher = Arc::new(ScriptedFlasher::new(vec![]));

    let events = run(
        context(&connector, flasher),
        3,
        Operation::RetrieveInfo {
            timeout: Duration::from_secs(1),
        },
    );

    assert_eq!(events.len(), 2);
    match &events[0] {
        SessionEvent::InfoAvailable(record) => {
            assert_eq!(record.firmware_version.to_string(), "v3.07");
            assert_eq!(record.fw_status, FirmwareStability::Stable);
            assert_eq!(record.hardware_name, "M100V200");
            assert_eq!(
                record.unique_id_hex(),
                "DE AD 00 00 00 00 00 00 00 00 00 00"
            );
        }
        other => panic!("Expected InfoAvailable, got {:?}", other),
    }
    assert!(finished(&events).0);
    assert_eq!(connector.sent()[0].id(), 0x803);
    assert_eq!(connector.open_handles(), 0);
}

#[test]
fn test_retrieve_info_short_reply_is_malformed() {
    let connector = MockConnector::new();
    connector.add_reply(
        0x803,
        vec![
            CanFrame::extended(0x500, &[1, 2, 3, 4]).unwrap(),
            CanFrame::extended(0x700, &[]).unwrap(),
        ],
    );
    let flasher = Arc::new(ScriptedFlasher::new(vec![]));

    let events = run(
        context(&connector, flasher),
        3,
        Operation::RetrieveInfo {
            timeout: Duration::from_secs(1),
        },
    );

    let (success, message) = finished(&events);
    assert!(!success);
    assert!(message.starts_with("Malformed telemetry payload"), "message: {}", message);
    assert_eq!(events.len(), 1);
}

#[test]
fn test_ping_success() {
    let connector = MockConnector::new();
    let flasher = Arc::new(ScriptedFlasher::new(vec![]));

    let events = run(context(&connector, flasher), 42, Operation::Ping);

    assert_eq!(
        events,
        vec![SessionEvent::Finished {
            success: true,
            message: "Controller 42 answered".to_string(),
        }]
    );
    // One probe plus one activation
    assert_eq!(connector.open_count(), 2);
    assert_eq!(connector.open_handles(), 0);
}

#[test]
fn test_panicking_primitive_still_finishes() {
    let connector = MockConnector::new();
    let context = context(&connector, Arc::new(PanickingFlasher));

    let events = run(context, 1, Operation::Ping);

    assert_eq!(events.len(), 1);
    let (success, message) = finished(&events);
    assert!(!success);
    assert!(
        message.contains("flashing library crashed"),
        "message: {}",
        message
    );
    assert_eq!(connector.open_handles(), 0);
}
