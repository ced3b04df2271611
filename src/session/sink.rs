//! Caller-side event contract.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::device::{ScannedDevice, TransportKind};
use crate::scanner::ScanError;

/// A failure reported by one scanner of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFailure {
    /// Name of the scanner that failed.
    pub scanner: String,
    /// Transport of that scanner.
    pub transport: TransportKind,
    /// What went wrong.
    pub error: ScanError,
}

impl fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.scanner, self.error)
    }
}

/// Receives the unified event stream of a [`ScanSession`](super::ScanSession).
///
/// All calls for one run are made from the session's dispatcher thread, one
/// at a time, in the order the session decided on. `on_session_finished` is
/// the last call of a run. A run started from inside `on_session_finished`
/// reaches the sink only after that call returns, so calls never overlap
/// across runs either.
pub trait EventSink: Send + Sync {
    /// A device was seen for the first time in this run.
    fn on_device_discovered(&self, device: &ScannedDevice);

    /// A device already reported in this run has new metadata.
    fn on_device_changed(&self, device: &ScannedDevice);

    /// One scanner reported a failure. Other scanners keep running.
    fn on_failure(&self, failure: &ScanFailure);

    /// Every scanner has finished.
    fn on_session_finished(&self);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn on_device_discovered(&self, device: &ScannedDevice) {
        (**self).on_device_discovered(device);
    }

    fn on_device_changed(&self, device: &ScannedDevice) {
        (**self).on_device_changed(device);
    }

    fn on_failure(&self, failure: &ScanFailure) {
        (**self).on_failure(failure);
    }

    fn on_session_finished(&self) {
        (**self).on_session_finished();
    }
}

/// One call received by a [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    /// `on_device_discovered`
    Discovered(ScannedDevice),
    /// `on_device_changed`
    Changed(ScannedDevice),
    /// `on_failure`
    Failure(ScanFailure),
    /// `on_session_finished`
    Finished,
}

/// Sink that keeps every call it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
    changed: Condvar,
}

impl RecordingSink {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SinkEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, event: SinkEvent) {
        self.lock().push(event);
        self.changed.notify_all();
    }

    /// Every call so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<SinkEvent> {
        self.lock().clone()
    }

    /// Devices passed to `on_device_discovered`.
    #[must_use]
    pub fn discovered(&self) -> Vec<ScannedDevice> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Discovered(d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    /// Devices passed to `on_device_changed`.
    #[must_use]
    pub fn changed(&self) -> Vec<ScannedDevice> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Changed(d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    /// Failures passed to `on_failure`.
    #[must_use]
    pub fn failures(&self) -> Vec<ScanFailure> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Failure(f) => Some(f.clone()),
                _ => None,
            })
            .collect()
    }

    /// How many times `on_session_finished` was called.
    #[must_use]
    pub fn finished_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|e| matches!(e, SinkEvent::Finished))
            .count()
    }

    /// Forget everything recorded.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Block until `on_session_finished` has been called `count` times.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn wait_for_finished(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut events = self.lock();
        loop {
            let seen = events
                .iter()
                .filter(|e| matches!(e, SinkEvent::Finished))
                .count();
            if seen >= count {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            events = self
                .changed
                .wait_timeout(events, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl EventSink for RecordingSink {
    fn on_device_discovered(&self, device: &ScannedDevice) {
        self.push(SinkEvent::Discovered(device.clone()));
    }

    fn on_device_changed(&self, device: &ScannedDevice) {
        self.push(SinkEvent::Changed(device.clone()));
    }

    fn on_failure(&self, failure: &ScanFailure) {
        self.push(SinkEvent::Failure(failure.clone()));
    }

    fn on_session_finished(&self) {
        self.push(SinkEvent::Finished);
    }
}
