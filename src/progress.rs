//! Scan progress spinner.
//!
//! While a session runs, a spinner shows the elapsed time and how many
//! devices and failures have been reported so far. Live output from the sink
//! is routed through [`ScanProgress::println`] so it does not tear the spinner.
//!
//! # Accessible Mode
//!
//! With accessible mode the spinner has no animation, uses ASCII only and
//! ticks slowly enough for screen readers.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Spinner for a running scan.
#[derive(Debug)]
pub struct ScanProgress {
    bar: Option<ProgressBar>,
    accessible: bool,
}

impl ScanProgress {
    /// Create and show a spinner.
    ///
    /// With `hidden` nothing is drawn and every method is a no-op.
    ///
    /// ```
    /// use devscan::progress::ScanProgress;
    ///
    /// let progress = ScanProgress::new(true, false);
    /// progress.update(2, 0);
    /// progress.finish("done");
    /// ```
    #[must_use]
    pub fn new(hidden: bool, accessible: bool) -> Self {
        if hidden {
            return Self {
                bar: None,
                accessible,
            };
        }

        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        bar.set_style(Self::style(accessible));
        bar.set_message("Scanning for devices");
        let tick = if accessible { 500 } else { 100 };
        bar.enable_steady_tick(Duration::from_millis(tick));
        Self {
            bar: Some(bar),
            accessible,
        }
    }

    fn style(accessible: bool) -> ProgressStyle {
        if accessible {
            ProgressStyle::with_template("[{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("-\\|/ ")
        } else {
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        }
    }

    /// Whether accessible mode is on.
    #[must_use]
    pub fn is_accessible(&self) -> bool {
        self.accessible
    }

    /// Whether anything is drawn.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.bar.is_none()
    }

    /// Show the running totals.
    pub fn update(&self, devices: usize, failures: usize) {
        if let Some(bar) = &self.bar {
            bar.set_message(counts_message(devices, failures));
        }
    }

    /// Replace the spinner message.
    pub fn set_message(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(message.to_string());
        }
    }

    /// Print a line above the spinner.
    pub fn println(&self, line: &str) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None => println!("{line}"),
        }
    }

    /// Remove the spinner, leaving `message` behind.
    pub fn finish(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message(message.to_string());
        }
    }
}

impl Drop for ScanProgress {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            if !bar.is_finished() {
                bar.finish_and_clear();
            }
        }
    }
}

/// "Scanning: 3 device(s), 1 failure(s)"
#[must_use]
pub fn counts_message(devices: usize, failures: usize) -> String {
    if failures == 0 {
        format!("Scanning: {devices} device(s)")
    } else {
        format!("Scanning: {devices} device(s), {failures} failure(s)")
    }
}
