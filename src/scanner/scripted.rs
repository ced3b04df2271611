//! Scanner that replays a fixed script.
//!
//! Each run walks the same list of [`Step`]s. By default the script runs
//! inline inside [`Scanner::start`]; [`ScriptedScanner::threaded`] moves it to
//! a worker thread so that events interleave with other scanners. A script
//! without a [`Step::Finish`] leaves the run open, which is how a scanner that
//! never completes is modelled.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::device::{ScannedDevice, TransportKind};

use super::lifecycle::{Lifecycle, RunToken};
use super::{ScanError, ScanEvent, ScanListener, Scanner};

/// One scripted action.
#[derive(Debug, Clone)]
pub enum Step {
    /// Report a discovery.
    Discover(ScannedDevice),
    /// Report a change.
    Change(ScannedDevice),
    /// Report a failure without ending the run.
    Fail(ScanError),
    /// Sleep before the next step.
    Pause(Duration),
    /// Pass an event through unchecked. The run state is not touched, so this
    /// can report a finish that the scanner does not consider final.
    Emit(ScanEvent),
    /// End the run. Later steps are not played.
    Finish,
}

/// A [`Scanner`] driven by a script.
pub struct ScriptedScanner {
    name: String,
    transport: TransportKind,
    steps: Arc<[Step]>,
    threaded: bool,
    finish_on_stop: bool,
    lifecycle: Arc<Lifecycle>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl ScriptedScanner {
    /// Create a scanner that plays `steps` inline on every start.
    #[must_use]
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::Classic,
            steps: Arc::from(steps),
            threaded: false,
            finish_on_stop: false,
            lifecycle: Arc::new(Lifecycle::new()),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }

    /// Shorthand for a script that finishes without reporting anything.
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, vec![Step::Finish])
    }

    /// Report `transport` from [`Scanner::transport`].
    #[must_use]
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// Play the script on a worker thread.
    #[must_use]
    pub fn threaded(mut self) -> Self {
        self.threaded = true;
        self
    }

    /// End the current run when [`Scanner::stop`] is called.
    #[must_use]
    pub fn finish_on_stop(mut self) -> Self {
        self.finish_on_stop = true;
        self
    }

    /// How many times `start` was called.
    #[must_use]
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// How many times `stop` was called.
    #[must_use]
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Scanner for ScriptedScanner {
    fn name(&self) -> &str {
        &self.name
    }

    fn transport(&self) -> TransportKind {
        self.transport
    }

    fn start(&self, listener: ScanListener) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let Some(token) = self.lifecycle.begin(listener) else {
            log::warn!("{}: start ignored, script is running", self.name);
            return;
        };

        if !self.threaded {
            play(&self.lifecycle, token, &self.steps);
            return;
        }

        let lifecycle = Arc::clone(&self.lifecycle);
        let steps = Arc::clone(&self.steps);
        let spawned = thread::Builder::new()
            .name(format!("devscan-script-{}", self.name))
            .spawn(move || play(&lifecycle, token, &steps));
        if let Err(e) = spawned {
            log::error!("{}: failed to spawn script thread: {}", self.name, e);
            self.lifecycle.finish(token, None);
        }
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.finish_on_stop && self.lifecycle.finish_current(None) {
            log::debug!("{}: finished on stop", self.name);
        }
    }

    fn is_finished(&self) -> bool {
        self.lifecycle.is_finished()
    }
}

fn play(lifecycle: &Lifecycle, token: RunToken, steps: &[Step]) {
    for step in steps {
        let live = match step {
            Step::Discover(device) => lifecycle.emit(token, |l| l.discovered(device.clone())),
            Step::Change(device) => lifecycle.emit(token, |l| l.changed(device.clone())),
            Step::Fail(error) => lifecycle.emit(token, |l| l.failed(error.clone())),
            Step::Emit(event) => lifecycle.emit(token, |l| match event.clone() {
                ScanEvent::Discovered(d) => l.discovered(d),
                ScanEvent::Changed(d) => l.changed(d),
                ScanEvent::Failed(e) => l.failed(e),
                ScanEvent::Finished => l.finished(),
            }),
            Step::Pause(duration) => {
                thread::sleep(*duration);
                true
            }
            Step::Finish => {
                lifecycle.finish(token, None);
                return;
            }
        };
        if !live {
            return;
        }
    }
}
