use devscan::backend::fixture::{BluetoothFixture, ClassicStep, KnownStep, LeStep};
use devscan::backend::{SimulatedAdapter, SimulatedUsbHost};
use devscan::device::{TransportKind, UsbInfo};
use devscan::scanner::{
    BluetoothAdapter, KnownDevice, LeScanFailure, LeScanFilter, LeScanSettings, ProductFilter,
    ScanError, UsbHost,
};
use devscan::session::{RecordingSink, ScanSession, SinkEvent};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Option<Duration> = Some(Duration::from_secs(5));

fn le_settings() -> LeScanSettings {
    LeScanSettings::default().with_duration(Duration::from_millis(100))
}

fn usb(path: &str, vendor_id: u16, product_id: u16) -> UsbInfo {
    UsbInfo {
        device_path: path.to_string(),
        vendor_id,
        product_id,
        product_name: Some(format!("Product {product_id:04x}")),
        manufacturer: None,
    }
}

fn radio() -> BluetoothFixture {
    BluetoothFixture {
        delay_ms: 1,
        classic: vec![
            ClassicStep::found("00:11:22:33:44:55", Some("Headset"), Some(-58)),
            ClassicStep::found("00:11:22:33:44:66", None, None),
            ClassicStep::renamed("00:11:22:33:44:55", "Headset Pro"),
        ],
        le: vec![
            LeStep::result("C0:FF:EE:00:00:01", Some("Tag"), -71),
            LeStep::result("C0:FF:EE:00:00:01", Some("Tag"), -65),
            LeStep::result("C0:FF:EE:00:00:02", Some("Band"), -80),
        ],
        ..BluetoothFixture::default()
    }
}

fn run(session: &ScanSession) {
    assert!(session.start());
    assert!(session.wait_finished(WAIT));
}

#[test]
fn test_all_transports_in_one_session() {
    let adapter: Arc<dyn BluetoothAdapter> = Arc::new(SimulatedAdapter::new(radio()));
    let host: Arc<dyn UsbHost> = Arc::new(SimulatedUsbHost::new(vec![
        usb("/dev/bus/usb/001/002", 0x04d8, 0x000a),
        usb("/dev/bus/usb/001/003", 0x1234, 0x0001),
    ]));
    let sink = Arc::new(RecordingSink::new());
    let session = ScanSession::builder()
        .bluetooth(Arc::clone(&adapter))
        .bluetooth_le(Arc::clone(&adapter), le_settings())
        .usb(host, None)
        .listen(sink.clone())
        .build();

    run(&session);

    let discovered = sink.discovered();
    let count = |transport| discovered.iter().filter(|d| d.transport() == transport).count();
    // The unnamed classic device is never reported.
    assert_eq!(count(TransportKind::Classic), 1);
    assert_eq!(count(TransportKind::LowEnergy), 2);
    assert_eq!(count(TransportKind::Usb), 2);
    assert!(sink.failures().is_empty());
    assert_eq!(sink.finished_count(), 1);
    assert_eq!(sink.events().last(), Some(&SinkEvent::Finished));

    let renamed = sink
        .changed()
        .into_iter()
        .find(|d| d.identifier() == "00:11:22:33:44:55")
        .unwrap();
    assert_eq!(renamed.name(), "Headset Pro");
}

#[test]
fn test_disabled_radio_fails_bluetooth_but_usb_reports() {
    let adapter: Arc<dyn BluetoothAdapter> = Arc::new(SimulatedAdapter::new(BluetoothFixture {
        enabled: false,
        ..radio()
    }));
    let sink = Arc::new(RecordingSink::new());
    let session = ScanSession::builder()
        .bluetooth(Arc::clone(&adapter))
        .bluetooth_le(adapter, le_settings())
        .usb(
            Arc::new(SimulatedUsbHost::new(vec![usb("/dev/bus/usb/002/001", 1, 2)])),
            None,
        )
        .listen(sink.clone())
        .build();

    run(&session);

    let failures = sink.failures();
    assert_eq!(failures.len(), 2);
    assert!(failures
        .iter()
        .all(|f| matches!(f.error, ScanError::Disabled { .. })));
    assert_eq!(sink.discovered().len(), 1);
    assert_eq!(sink.finished_count(), 1);
}

#[test]
fn test_le_scan_failure_code_is_reported() {
    let adapter: Arc<dyn BluetoothAdapter> = Arc::new(SimulatedAdapter::new(BluetoothFixture {
        le_failure: Some(3),
        ..radio()
    }));
    let sink = Arc::new(RecordingSink::new());
    let session = ScanSession::builder()
        .bluetooth_le(adapter, le_settings())
        .listen(sink.clone())
        .build();

    run(&session);

    let failures = sink.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].scanner, "bluetooth-le");
    assert_eq!(
        failures[0].error,
        ScanError::ScanFailed {
            transport: TransportKind::LowEnergy,
            code: LeScanFailure::InternalError,
        }
    );
    assert_eq!(sink.events().last(), Some(&SinkEvent::Finished));
}

#[test]
fn test_le_filters_limit_results() {
    let adapter: Arc<dyn BluetoothAdapter> = Arc::new(SimulatedAdapter::new(radio()));
    let settings = le_settings().with_filter(LeScanFilter {
        name: Some("Band".to_string()),
        ..LeScanFilter::default()
    });
    let sink = Arc::new(RecordingSink::new());
    let session = ScanSession::builder()
        .bluetooth_le(adapter, settings)
        .listen(sink.clone())
        .build();

    run(&session);

    let discovered = sink.discovered();
    assert_eq!(discovered.len(), 1);
    assert_eq!(discovered[0].name(), "Band");
}

#[test]
fn test_usb_enumeration_failure_still_finishes() {
    let sink = Arc::new(RecordingSink::new());
    let session = ScanSession::builder()
        .usb(Arc::new(SimulatedUsbHost::failing("bus reset")), None)
        .listen(sink.clone())
        .build();

    run(&session);

    assert_eq!(sink.events().len(), 2);
    let failures = sink.failures();
    assert_eq!(failures[0].transport, TransportKind::Usb);
    assert!(failures[0].to_string().contains("bus reset"));
}

#[test]
fn test_usb_product_filter() {
    let host = Arc::new(SimulatedUsbHost::new(vec![
        usb("/dev/bus/usb/001/002", 0x04d8, 0x000a),
        usb("/dev/bus/usb/001/003", 0x04d8, 0x000b),
        usb("/dev/bus/usb/001/004", 0x1234, 0x000a),
    ]));
    let sink = Arc::new(RecordingSink::new());
    let session = ScanSession::builder()
        .usb(host, Some(vec![ProductFilter::product(0x04d8, 0x000a)]))
        .listen(sink.clone())
        .build();

    run(&session);

    let discovered = sink.discovered();
    assert_eq!(discovered.len(), 1);
    assert_eq!(discovered[0].identifier(), "/dev/bus/usb/001/002");
}

#[test]
fn test_known_devices_resolved() {
    let adapter: Arc<dyn BluetoothAdapter> = Arc::new(SimulatedAdapter::new(BluetoothFixture {
        known: vec![
            KnownStep::new("00:AA:00:AA:00:AA", Some("Paired Glove")),
            KnownStep::new("00:BB:00:BB:00:BB", None),
        ],
        ..BluetoothFixture::default()
    }));
    let sink = Arc::new(RecordingSink::new());
    let session = ScanSession::builder()
        .known_devices(
            adapter,
            vec![
                KnownDevice::classic("00:aa:00:aa:00:aa"),
                KnownDevice::classic("00:BB:00:BB:00:BB"),
            ],
        )
        .listen(sink.clone())
        .build();

    run(&session);

    let discovered = sink.discovered();
    assert_eq!(discovered.len(), 1);
    assert_eq!(discovered[0].name(), "Paired Glove");
    assert!(sink.failures().is_empty());
}

#[test]
fn test_stop_ends_le_scan_early() {
    let adapter: Arc<dyn BluetoothAdapter> = Arc::new(SimulatedAdapter::new(radio()));
    let sink = Arc::new(RecordingSink::new());
    let session = ScanSession::builder()
        .bluetooth_le(
            adapter,
            LeScanSettings::default().with_duration(Duration::from_secs(60)),
        )
        .listen(sink.clone())
        .build();

    assert!(session.start());
    assert!(!session.wait_finished(Some(Duration::from_millis(50))));
    session.stop();
    assert!(session.wait_finished(WAIT));
    assert_eq!(sink.finished_count(), 1);
}
