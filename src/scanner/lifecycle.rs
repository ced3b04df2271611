//! Run state machine shared by the bundled scanners.
//!
//! [`Lifecycle`] owns the current listener and the `Idle -> Scanning ->
//! Finished` state. All emission goes through it and happens under its lock,
//! which is what guarantees that nothing is reported after the finish and that
//! the finish is reported exactly once per run.
//!
//! Each run gets a [`RunToken`]. Worker threads and adapter callbacks carry the
//! token of the run that spawned them, so a callback that fires after its run
//! ended (or after a new run started) is discarded instead of leaking into the
//! wrong run.

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{ScanError, ScanListener};

/// Observable state of a scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    /// Never started.
    #[default]
    Idle,
    /// A run is in progress.
    Scanning,
    /// The last run delivered its finish.
    Finished,
}

/// Identifies one run of a scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunToken(u64);

#[derive(Debug, Default)]
struct Inner {
    state: ScanState,
    run: u64,
    listener: Option<ScanListener>,
}

/// Scanner run state plus the listener of the current run.
#[derive(Debug, Default)]
pub struct Lifecycle {
    inner: Mutex<Inner>,
}

impl Lifecycle {
    /// Create an idle lifecycle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enter `Scanning` with a fresh run.
    ///
    /// Returns `None` if a run is already in progress.
    pub fn begin(&self, listener: ScanListener) -> Option<RunToken> {
        let mut inner = self.lock();
        if inner.state == ScanState::Scanning {
            return None;
        }
        inner.run += 1;
        inner.state = ScanState::Scanning;
        inner.listener = Some(listener);
        Some(RunToken(inner.run))
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ScanState {
        self.lock().state
    }

    /// Whether a run is in progress.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.state() == ScanState::Scanning
    }

    /// Whether the last run has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state() == ScanState::Finished
    }

    /// Token of the run in progress, if any.
    #[must_use]
    pub fn current(&self) -> Option<RunToken> {
        let inner = self.lock();
        (inner.state == ScanState::Scanning).then_some(RunToken(inner.run))
    }

    /// Report through the listener of run `token`.
    ///
    /// Returns `false` without calling `f` if that run is no longer in
    /// progress.
    pub fn emit<F>(&self, token: RunToken, f: F) -> bool
    where
        F: FnOnce(&ScanListener),
    {
        let inner = self.lock();
        if inner.state != ScanState::Scanning || inner.run != token.0 {
            return false;
        }
        match inner.listener.as_ref() {
            Some(listener) => {
                f(listener);
                true
            }
            None => false,
        }
    }

    /// End run `token`, reporting `error` first if given.
    ///
    /// Returns `false` if that run already ended.
    pub fn finish(&self, token: RunToken, error: Option<ScanError>) -> bool {
        let mut inner = self.lock();
        if inner.state != ScanState::Scanning || inner.run != token.0 {
            return false;
        }
        Self::finish_locked(&mut inner, error);
        true
    }

    /// End whatever run is in progress.
    pub fn finish_current(&self, error: Option<ScanError>) -> bool {
        let mut inner = self.lock();
        if inner.state != ScanState::Scanning {
            return false;
        }
        Self::finish_locked(&mut inner, error);
        true
    }

    fn finish_locked(inner: &mut Inner, error: Option<ScanError>) {
        inner.state = ScanState::Finished;
        if let Some(listener) = inner.listener.take() {
            if let Some(error) = error {
                listener.failed(error);
            }
            listener.finished();
        }
    }
}
