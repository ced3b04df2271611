//! Run dispatcher: the single consumer of a run's scanner events.
//!
//! Every listener of a run feeds one channel. The dispatcher drains it on its
//! own thread, so deduplication, the finish join and all sink calls are
//! serialized without any locking around the registry. Sink calls also hold
//! the session's sink gate, so a run started from `on_session_finished` waits
//! for that callback to return before its own events reach the sink.

use std::sync::mpsc::Receiver;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::device::ScannedDevice;
use crate::scanner::{ScanError, ScanEvent, Scanner, ScannerId};

use super::registry::{DeviceKey, DeviceRegistry};
use super::sink::{EventSink, ScanFailure};

/// Message on a run's channel.
#[derive(Debug)]
pub(crate) enum Envelope {
    /// An event from the scanner at this position.
    Event(ScannerId, ScanEvent),
    /// The session was dropped; exit without finishing.
    Abandon,
}

#[derive(Debug, Default)]
struct RunFlags {
    scanning: bool,
    started: u64,
    completed: u64,
}

/// Run flag and counters shared by a session and its dispatchers.
#[derive(Debug, Default)]
pub(crate) struct RunState {
    flags: Mutex<RunFlags>,
    done: Condvar,
    sink_gate: Mutex<()>,
    spare: Mutex<Option<DeviceRegistry>>,
}

impl RunState {
    fn lock(&self) -> MutexGuard<'_, RunFlags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enter a new run. `None` if one is in progress.
    pub(crate) fn begin(&self) -> Option<u64> {
        let mut flags = self.lock();
        if flags.scanning {
            return None;
        }
        flags.scanning = true;
        flags.started += 1;
        Some(flags.started)
    }

    /// Undo [`RunState::begin`] for a run that never got going.
    pub(crate) fn rollback(&self, run: u64) {
        let mut flags = self.lock();
        flags.scanning = false;
        flags.completed = flags.completed.max(run);
        self.done.notify_all();
    }

    pub(crate) fn is_scanning(&self) -> bool {
        self.lock().scanning
    }

    /// Registry for the next run, emptied.
    ///
    /// Reuses the one the last completed run handed back.
    pub(crate) fn fresh_registry(&self) -> DeviceRegistry {
        let spare = self.spare.lock().unwrap_or_else(PoisonError::into_inner).take();
        let mut registry = spare.unwrap_or_default();
        registry.clear();
        registry
    }

    fn recycle(&self, registry: DeviceRegistry) {
        *self.spare.lock().unwrap_or_else(PoisonError::into_inner) = Some(registry);
    }

    fn gate(&self) -> MutexGuard<'_, ()> {
        self.sink_gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_idle(&self) {
        self.lock().scanning = false;
    }

    fn complete(&self, run: u64) {
        let mut flags = self.lock();
        flags.completed = flags.completed.max(run);
        self.done.notify_all();
    }

    /// Block until every started run has delivered its finish.
    pub(crate) fn wait_finished(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut flags = self.lock();
        while flags.completed < flags.started {
            flags = match deadline {
                None => self.done.wait(flags).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.done
                        .wait_timeout(flags, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        true
    }
}

/// State of one run, owned by its dispatcher thread.
pub(crate) struct Dispatcher {
    run: u64,
    events: Receiver<Envelope>,
    sink: Arc<dyn EventSink>,
    scanners: Arc<[Arc<dyn Scanner>]>,
    registry: DeviceRegistry,
    finished: Vec<bool>,
    state: Arc<RunState>,
}

impl Dispatcher {
    pub(crate) fn new(
        run: u64,
        events: Receiver<Envelope>,
        sink: Arc<dyn EventSink>,
        scanners: Arc<[Arc<dyn Scanner>]>,
        state: Arc<RunState>,
    ) -> Self {
        let finished = vec![false; scanners.len()];
        let registry = state.fresh_registry();
        Self {
            run,
            events,
            sink,
            scanners,
            registry,
            finished,
            state,
        }
    }

    /// Drain the channel until every scanner finished or the run is abandoned.
    pub(crate) fn run(mut self) {
        if self.all_finished() {
            self.complete();
            return;
        }

        loop {
            match self.events.recv() {
                Ok(Envelope::Event(id, event)) => {
                    if self.handle(id, event) {
                        self.complete();
                        return;
                    }
                }
                Ok(Envelope::Abandon) => {
                    log::debug!("Scan run {} abandoned", self.run);
                    return;
                }
                Err(_) => {
                    log::warn!("Scan run {} lost all of its scanners before finishing", self.run);
                    return;
                }
            }
        }
    }

    /// Apply one event. Returns `true` once the run is complete.
    fn handle(&mut self, id: ScannerId, event: ScanEvent) -> bool {
        if id >= self.scanners.len() {
            log::warn!("Dropping event from unknown scanner #{}", id);
            return false;
        }

        match event {
            ScanEvent::Discovered(device) => self.on_discovered(id, device),
            ScanEvent::Changed(device) => self.on_changed(id, device),
            ScanEvent::Failed(error) => self.on_failed(id, error),
            ScanEvent::Finished => return self.on_finished(id),
        }
        false
    }

    fn on_discovered(&mut self, id: ScannerId, device: ScannedDevice) {
        let key = DeviceKey::for_device(id, &device);
        if self.registry.contains(&key) {
            log::debug!(
                "{} reported {} again, refreshing the stored record",
                self.scanners[id].name(),
                key.identifier
            );
            self.registry.upsert(key, device);
            return;
        }
        let stored = self.registry.upsert(key, device);
        let _gate = self.state.gate();
        self.sink.on_device_discovered(stored);
    }

    fn on_changed(&mut self, id: ScannerId, device: ScannedDevice) {
        let key = DeviceKey::for_device(id, &device);
        let known = self.registry.contains(&key);
        let stored = self.registry.upsert(key, device);
        let _gate = self.state.gate();
        if known {
            self.sink.on_device_changed(stored);
        } else {
            self.sink.on_device_discovered(stored);
        }
    }

    fn on_failed(&self, id: ScannerId, error: ScanError) {
        let scanner = &self.scanners[id];
        let failure = ScanFailure {
            scanner: scanner.name().to_string(),
            transport: scanner.transport(),
            error,
        };
        log::warn!("Scanner failed: {}", failure);
        let _gate = self.state.gate();
        self.sink.on_failure(&failure);
    }

    fn on_finished(&mut self, id: ScannerId) -> bool {
        let scanner = &self.scanners[id];
        if self.finished[id] {
            log::debug!("{} reported finished more than once", scanner.name());
        }
        self.finished[id] = true;
        if !scanner.is_finished() {
            log::debug!(
                "{} reported finished but does not consider itself finished",
                scanner.name()
            );
        }
        log::debug!("{} finished", scanner.name());
        self.all_finished()
    }

    fn all_finished(&self) -> bool {
        self.finished.iter().all(|&done| done)
    }

    fn complete(self) {
        log::info!(
            "All scanners finished, {} device(s) found in run {}",
            self.registry.len(),
            self.run
        );
        let Self {
            run,
            sink,
            registry,
            state,
            ..
        } = self;
        state.recycle(registry);

        let gate = state.gate();
        state.set_idle();
        sink.on_session_finished();
        drop(gate);
        state.complete(run);
    }
}
