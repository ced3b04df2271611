use devscan::device::{DeviceType, ScannedDevice, TransportKind};
use devscan::scanner::scripted::{ScriptedScanner, Step};
use devscan::session::{RecordingSink, ScanSession, SinkEvent};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Option<Duration> = Some(Duration::from_secs(5));

fn run(scanners: Vec<ScriptedScanner>) -> Arc<RecordingSink> {
    let sink = Arc::new(RecordingSink::new());
    let mut builder = ScanSession::builder().listen(sink.clone());
    for scanner in scanners {
        builder = builder.scanner(Arc::new(scanner));
    }
    let session = builder.build();
    assert!(session.start());
    assert!(session.wait_finished(WAIT));
    sink
}

fn le(address: &str, name: &str, rssi: i16) -> ScannedDevice {
    ScannedDevice::bluetooth_le(address, name, Some(rssi))
}

#[test]
fn test_repeated_discovery_reaches_sink_once() {
    let sink = run(vec![ScriptedScanner::new(
        "le",
        vec![
            Step::Discover(le("AA:BB", "Tag", -80)),
            Step::Discover(le("AA:BB", "Tag", -70)),
            Step::Discover(le("AA:BB", "Tag", -60)),
            Step::Finish,
        ],
    )]);

    let discovered = sink.discovered();
    assert_eq!(discovered.len(), 1);
    assert_eq!(discovered[0].rssi(), Some(-80));
    assert!(sink.changed().is_empty());
}

#[test]
fn test_change_for_unseen_device_is_a_discovery() {
    let sink = run(vec![ScriptedScanner::new(
        "classic",
        vec![
            Step::Change(ScannedDevice::bluetooth("AA:BB", "Glove", DeviceType::Classic)),
            Step::Discover(ScannedDevice::bluetooth("AA:BB", "Glove", DeviceType::Classic)),
            Step::Finish,
        ],
    )]);

    let events = sink.events();
    assert_eq!(events.len(), 2);
    match &events[0] {
        SinkEvent::Discovered(device) => assert_eq!(device.name(), "Glove"),
        other => panic!("Expected discovery, got {:?}", other),
    }
    assert_eq!(events[1], SinkEvent::Finished);
}

#[test]
fn test_change_after_discovery_is_forwarded() {
    let sink = run(vec![ScriptedScanner::new(
        "classic",
        vec![
            Step::Discover(ScannedDevice::bluetooth("AA:BB", "Glove", DeviceType::Classic)),
            Step::Change(ScannedDevice::bluetooth("AA:BB", "Smart Glove", DeviceType::Classic)),
            Step::Change(ScannedDevice::bluetooth("AA:BB", "Smart Glove 2", DeviceType::Classic)),
            Step::Finish,
        ],
    )]);

    assert_eq!(sink.discovered().len(), 1);
    let changed = sink.changed();
    assert_eq!(changed.len(), 2);
    assert_eq!(changed[1].name(), "Smart Glove 2");
    assert_eq!(changed[1].description(), "Smart Glove 2 (AA:BB)");
}

#[test]
fn test_changed_record_keeps_first_seen_time() {
    let first = ScannedDevice::bluetooth("AA:BB", "Glove", DeviceType::Classic);
    let first_seen = first.discovered_at();
    let sink = run(vec![ScriptedScanner::new(
        "classic",
        vec![
            Step::Discover(first),
            Step::Pause(Duration::from_millis(5)),
            Step::Change(ScannedDevice::bluetooth("AA:BB", "Renamed", DeviceType::Classic)),
            Step::Finish,
        ],
    )]);

    let changed = sink.changed();
    assert_eq!(changed[0].discovered_at(), first_seen);
    assert!(changed[0].updated_at() >= first_seen);
}

#[test]
fn test_same_identifier_from_two_scanners_is_two_devices() {
    let sink = run(vec![
        ScriptedScanner::new(
            "classic",
            vec![
                Step::Discover(ScannedDevice::bluetooth("AA:BB", "Glove", DeviceType::Dual)),
                Step::Finish,
            ],
        ),
        ScriptedScanner::new(
            "le",
            vec![Step::Discover(le("AA:BB", "Glove", -50)), Step::Finish],
        )
        .with_transport(TransportKind::LowEnergy),
    ]);

    let discovered = sink.discovered();
    assert_eq!(discovered.len(), 2);
    assert_eq!(discovered[0].transport(), TransportKind::Classic);
    assert_eq!(discovered[1].transport(), TransportKind::LowEnergy);
}

#[test]
fn test_distinct_devices_each_reported() {
    let steps = (0..10)
        .map(|i| Step::Discover(le(&format!("00:00:00:00:00:{i:02X}"), "Tag", -60)))
        .chain(std::iter::once(Step::Finish))
        .collect();
    let sink = run(vec![ScriptedScanner::new("le", steps)]);

    let ids: Vec<String> = sink
        .discovered()
        .iter()
        .map(|d| d.identifier().to_string())
        .collect();
    assert_eq!(ids.len(), 10);
    assert_eq!(ids[0], "00:00:00:00:00:00");
    assert_eq!(ids[9], "00:00:00:00:00:09");
}
