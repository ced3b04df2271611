use devscan::backend::NoAdapter;
use devscan::device::{DeviceType, ScannedDevice, TransportKind};
use devscan::scanner::scripted::{ScriptedScanner, Step};
use devscan::scanner::{BluetoothScanner, ScanError, ScanEvent, Scanner};
use devscan::session::{EventSink, RecordingSink, ScanSession, SinkEvent};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Option<Duration> = Some(Duration::from_secs(5));

fn device(address: &str, name: &str) -> ScannedDevice {
    ScannedDevice::bluetooth(address, name, DeviceType::Classic)
}

fn identifiers(events: &[SinkEvent]) -> Vec<String> {
    events
        .iter()
        .map(|e| match e {
            SinkEvent::Discovered(d) => format!("discovered:{}", d.identifier()),
            SinkEvent::Changed(d) => format!("changed:{}", d.identifier()),
            SinkEvent::Failure(f) => format!("failure:{}", f.scanner),
            SinkEvent::Finished => "finished".to_string(),
        })
        .collect()
}

#[test]
fn test_finished_exactly_once_for_any_scanner_count() {
    for count in 0..5 {
        let sink = Arc::new(RecordingSink::new());
        let mut builder = ScanSession::builder().listen(sink.clone());
        for i in 0..count {
            builder = builder.scanner(Arc::new(
                ScriptedScanner::new(
                    format!("s{i}"),
                    vec![
                        Step::Pause(Duration::from_millis(5 * i as u64)),
                        Step::Discover(device(&format!("{i}"), "Dev")),
                        Step::Finish,
                    ],
                )
                .threaded(),
            ));
        }
        let session = builder.build();

        assert!(session.start());
        assert!(session.wait_finished(WAIT), "run with {count} scanners did not finish");
        // Give a stray second finish the chance to show up.
        thread::sleep(Duration::from_millis(20));

        let events = sink.events();
        assert_eq!(sink.finished_count(), 1);
        assert_eq!(events.last(), Some(&SinkEvent::Finished));
        assert_eq!(sink.discovered().len(), count);
        assert!(session.scanners().iter().all(|s| s.is_finished()));
    }
}

#[test]
fn test_zero_scanners_report_only_finish() {
    let sink = Arc::new(RecordingSink::new());
    let session = ScanSession::builder().listen(sink.clone()).build();

    assert!(session.start());
    assert!(session.wait_finished(WAIT));
    assert_eq!(sink.events(), vec![SinkEvent::Finished]);
    assert!(!session.is_scanning());
}

#[test]
fn test_finish_waits_for_slowest_scanner() {
    let sink = Arc::new(RecordingSink::new());
    let slow = Arc::new(
        ScriptedScanner::new(
            "slow",
            vec![Step::Pause(Duration::from_millis(100)), Step::Finish],
        )
        .threaded(),
    );
    let session = ScanSession::builder()
        .scanner(Arc::new(ScriptedScanner::empty("fast")))
        .scanner(slow.clone())
        .listen(sink.clone())
        .build();

    assert!(session.start());
    assert!(!session.wait_finished(Some(Duration::from_millis(20))));
    assert!(session.is_scanning());
    assert_eq!(sink.finished_count(), 0);

    assert!(session.wait_finished(WAIT));
    assert!(slow.is_finished());
    assert_eq!(sink.finished_count(), 1);
}

#[test]
fn test_start_while_scanning_does_not_restart_scanners() {
    let sink = Arc::new(RecordingSink::new());
    let stalled = Arc::new(ScriptedScanner::new("stalled", vec![]).finish_on_stop());
    let session = ScanSession::builder()
        .scanner(stalled.clone())
        .listen(sink.clone())
        .build();

    assert!(session.start());
    assert!(session.is_scanning());
    assert!(!session.start());
    assert_eq!(stalled.start_count(), 1);

    session.stop();
    assert!(session.wait_finished(WAIT));
    assert_eq!(sink.finished_count(), 1);
}

#[test]
fn test_stop_before_start_is_noop() {
    let sink = Arc::new(RecordingSink::new());
    let scanner = Arc::new(ScriptedScanner::empty("idle"));
    let session = ScanSession::builder()
        .scanner(scanner.clone())
        .listen(sink.clone())
        .build();

    session.stop();
    session.stop();

    assert!(!session.is_scanning());
    assert!(sink.events().is_empty());
    assert_eq!(scanner.start_count(), 0);

    assert!(session.start());
    assert!(session.wait_finished(WAIT));
    assert_eq!(sink.finished_count(), 1);
}

#[test]
fn test_failure_in_one_scanner_does_not_stop_the_other() {
    let sink = Arc::new(RecordingSink::new());
    let session = ScanSession::builder()
        .scanner(Arc::new(ScriptedScanner::new(
            "first",
            vec![Step::Discover(device("AA:BB", "Glove")), Step::Finish],
        )))
        .scanner(Arc::new(
            ScriptedScanner::new(
                "second",
                vec![
                    Step::Discover(device("XX", "Board")),
                    Step::Fail(ScanError::Disabled {
                        transport: TransportKind::Classic,
                    }),
                    Step::Finish,
                ],
            ),
        ))
        .listen(sink.clone())
        .build();

    assert!(session.start());
    assert!(session.wait_finished(WAIT));

    assert_eq!(
        identifiers(&sink.events()),
        vec![
            "discovered:AA:BB",
            "discovered:XX",
            "failure:second",
            "finished"
        ]
    );
    let failures = sink.failures();
    assert_eq!(failures[0].transport, TransportKind::Classic);
    assert!(matches!(failures[0].error, ScanError::Disabled { .. }));
}

#[test]
fn test_interleaved_scanners_keep_per_scanner_order() {
    let sink = Arc::new(RecordingSink::new());
    let script = |prefix: &str| {
        let mut steps = Vec::new();
        for i in 0..20 {
            steps.push(Step::Discover(device(&format!("{prefix}{i}"), "Dev")));
            steps.push(Step::Pause(Duration::from_millis(1)));
        }
        steps.push(Step::Finish);
        steps
    };
    let session = ScanSession::builder()
        .scanner(Arc::new(ScriptedScanner::new("a", script("a")).threaded()))
        .scanner(Arc::new(ScriptedScanner::new("b", script("b")).threaded()))
        .listen(sink.clone())
        .build();

    assert!(session.start());
    assert!(session.wait_finished(WAIT));

    let ids = identifiers(&sink.events());
    assert_eq!(ids.last().map(String::as_str), Some("finished"));
    for prefix in ["a", "b"] {
        let own: Vec<&String> = ids
            .iter()
            .filter(|id| id.starts_with(&format!("discovered:{prefix}")))
            .collect();
        let expected: Vec<String> = (0..20).map(|i| format!("discovered:{prefix}{i}")).collect();
        assert_eq!(own.len(), 20);
        for (got, want) in own.iter().zip(&expected) {
            assert_eq!(*got, want);
        }
    }
}

#[test]
fn test_unavailable_transport_fails_then_finishes() {
    let sink = Arc::new(RecordingSink::new());
    let session = ScanSession::builder()
        .scanner(Arc::new(BluetoothScanner::new(Arc::new(NoAdapter))))
        .listen(sink.clone())
        .build();

    assert!(session.start());
    assert!(session.wait_finished(WAIT));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    match &events[0] {
        SinkEvent::Failure(failure) => {
            assert_eq!(failure.scanner, "bluetooth");
            assert!(failure.error.is_unavailable());
        }
        other => panic!("Expected failure first, got {:?}", other),
    }
    assert_eq!(events[1], SinkEvent::Finished);
}

#[test]
fn test_rerun_starts_with_empty_registry() {
    let sink = Arc::new(RecordingSink::new());
    let scanner = Arc::new(ScriptedScanner::new(
        "repeat",
        vec![Step::Discover(device("AA:BB", "Glove")), Step::Finish],
    ));
    let session = ScanSession::builder()
        .scanner(scanner.clone())
        .listen(sink.clone())
        .build();

    assert!(session.start());
    assert!(session.wait_finished(WAIT));
    assert!(session.start());
    assert!(session.wait_finished(WAIT));

    assert_eq!(scanner.start_count(), 2);
    assert_eq!(sink.discovered().len(), 2);
    assert!(sink.changed().is_empty());
    assert_eq!(sink.finished_count(), 2);
}

#[test]
fn test_dropping_stalled_session_releases_sink() {
    let sink = Arc::new(RecordingSink::new());
    let stalled = Arc::new(ScriptedScanner::new(
        "stalled",
        vec![Step::Discover(device("AA:BB", "Glove"))],
    ));
    let session = ScanSession::builder()
        .scanner(stalled.clone())
        .listen(sink.clone())
        .build();

    assert!(session.start());
    session.stop();
    assert!(!session.wait_finished(Some(Duration::from_millis(50))));
    assert!(session.is_scanning());
    drop(session);

    let deadline = Instant::now() + Duration::from_secs(5);
    while Arc::strong_count(&sink) > 1 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(Arc::strong_count(&sink), 1);
    assert_eq!(sink.finished_count(), 0);
    assert!(stalled.stop_count() >= 2);
}

struct RestartingSink {
    session: std::sync::Mutex<Option<std::sync::Weak<ScanSession>>>,
    restarted: std::sync::atomic::AtomicBool,
    inner: RecordingSink,
}

impl EventSink for RestartingSink {
    fn on_device_discovered(&self, device: &ScannedDevice) {
        self.inner.on_device_discovered(device);
    }

    fn on_device_changed(&self, device: &ScannedDevice) {
        self.inner.on_device_changed(device);
    }

    fn on_failure(&self, failure: &devscan::session::ScanFailure) {
        self.inner.on_failure(failure);
    }

    fn on_session_finished(&self) {
        self.inner.on_session_finished();
        if self.restarted.swap(true, std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        let session = self.session.lock().unwrap().clone();
        if let Some(session) = session.and_then(|s| s.upgrade()) {
            assert!(session.start());
        }
    }
}

#[test]
fn test_sink_can_restart_from_finish_callback() {
    let sink = Arc::new(RestartingSink {
        session: std::sync::Mutex::new(None),
        restarted: std::sync::atomic::AtomicBool::new(false),
        inner: RecordingSink::new(),
    });
    let session = Arc::new(
        ScanSession::builder()
            .scanner(Arc::new(ScriptedScanner::new(
                "s",
                vec![Step::Discover(device("AA", "One")), Step::Finish],
            )))
            .listen(sink.clone())
            .build(),
    );
    *sink.session.lock().unwrap() = Some(Arc::downgrade(&session));

    assert!(session.start());
    assert!(sink.inner.wait_for_finished(2, Duration::from_secs(5)));
    assert_eq!(sink.inner.discovered().len(), 2);
}

#[test]
fn test_repeated_finish_reports_join_once() {
    let sink = Arc::new(RecordingSink::new());
    let chatty = Arc::new(ScriptedScanner::new(
        "chatty",
        vec![
            Step::Emit(ScanEvent::Finished),
            Step::Emit(ScanEvent::Finished),
            Step::Finish,
        ],
    ));
    let slow = Arc::new(
        ScriptedScanner::new(
            "slow",
            vec![
                Step::Pause(Duration::from_millis(80)),
                Step::Discover(device("BB", "Late")),
                Step::Finish,
            ],
        )
        .threaded(),
    );
    let session = ScanSession::builder()
        .scanner(chatty)
        .scanner(slow.clone())
        .listen(sink.clone())
        .build();

    let started = Instant::now();
    assert!(session.start());
    assert!(session.wait_finished(WAIT));
    assert!(started.elapsed() >= Duration::from_millis(60));
    assert!(slow.is_finished());
    thread::sleep(Duration::from_millis(20));

    assert_eq!(sink.finished_count(), 1);
    assert_eq!(identifiers(&sink.events()), vec!["discovered:BB", "finished"]);
}

#[test]
fn test_early_finish_report_then_real_finish() {
    let sink = Arc::new(RecordingSink::new());
    let scanner = Arc::new(
        ScriptedScanner::new(
            "early",
            vec![
                Step::Discover(device("AA", "One")),
                Step::Emit(ScanEvent::Finished),
                Step::Pause(Duration::from_millis(30)),
                Step::Discover(device("BB", "Two")),
                Step::Finish,
            ],
        )
        .threaded(),
    );
    let session = ScanSession::builder()
        .scanner(scanner.clone())
        .listen(sink.clone())
        .build();

    assert!(session.start());
    assert!(session.wait_finished(WAIT));

    let deadline = Instant::now() + Duration::from_secs(5);
    while !scanner.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(scanner.is_finished());
    thread::sleep(Duration::from_millis(20));

    // The run ended at the first finish report; later reports go nowhere.
    assert_eq!(sink.finished_count(), 1);
    assert_eq!(identifiers(&sink.events()), vec!["discovered:AA", "finished"]);

    // The next run is unaffected.
    sink.clear();
    assert!(session.start());
    assert!(session.wait_finished(WAIT));
    assert_eq!(sink.finished_count(), 1);
    assert_eq!(sink.events().last(), Some(&SinkEvent::Finished));
}

/// Sink that restarts once from its finish callback and lingers there.
struct SlowRestartSink {
    session: std::sync::Mutex<Option<std::sync::Weak<ScanSession>>>,
    restarted: std::sync::atomic::AtomicBool,
    log: std::sync::Mutex<Vec<&'static str>>,
}

impl SlowRestartSink {
    fn push(&self, entry: &'static str) {
        self.log.lock().unwrap().push(entry);
    }
}

impl EventSink for SlowRestartSink {
    fn on_device_discovered(&self, _device: &ScannedDevice) {
        self.push("discovered");
    }

    fn on_device_changed(&self, _device: &ScannedDevice) {
        self.push("changed");
    }

    fn on_failure(&self, _failure: &devscan::session::ScanFailure) {
        self.push("failure");
    }

    fn on_session_finished(&self) {
        self.push("finish-start");
        if !self.restarted.swap(true, std::sync::atomic::Ordering::SeqCst) {
            let session = self.session.lock().unwrap().clone();
            if let Some(session) = session.and_then(|s| s.upgrade()) {
                assert!(session.start());
            }
            thread::sleep(Duration::from_millis(100));
        }
        self.push("finish-end");
    }
}

#[test]
fn test_restarted_run_waits_for_finish_callback() {
    let sink = Arc::new(SlowRestartSink {
        session: std::sync::Mutex::new(None),
        restarted: std::sync::atomic::AtomicBool::new(false),
        log: std::sync::Mutex::new(Vec::new()),
    });
    let session = Arc::new(
        ScanSession::builder()
            .scanner(Arc::new(ScriptedScanner::new(
                "s",
                vec![Step::Discover(device("AA", "One")), Step::Finish],
            )))
            .listen(sink.clone())
            .build(),
    );
    *sink.session.lock().unwrap() = Some(Arc::downgrade(&session));

    assert!(session.start());
    let deadline = Instant::now() + Duration::from_secs(5);
    while sink.log.lock().unwrap().len() < 6 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(
        *sink.log.lock().unwrap(),
        vec![
            "discovered",
            "finish-start",
            "finish-end",
            "discovered",
            "finish-start",
            "finish-end",
        ]
    );
}
