//! Command dispatch for the devscan binary.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::backend::fixture::Fixture;
use crate::backend::{NoAdapter, SimulatedAdapter, SimulatedUsbHost, SysfsUsbHost};
use crate::cli::{Cli, Commands, ConfigArgs, OutputFormat, ScanArgs, TransportArg};
use crate::config::Config;
use crate::error::{AppError, ExitCode};
use crate::logging::init_logging;
use crate::output::{write_report, ConsoleSink};
use crate::progress::ScanProgress;
use crate::scanner::{BluetoothAdapter, UsbHost};
use crate::session::{ScanSession, ScanSessionBuilder};
use crate::signal::install_handler;

/// How often the scan loop checks for Ctrl+C and the timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run the command line, returning the exit code for a completed command.
///
/// An interrupted scan prints its partial report and then returns
/// [`AppError::Interrupted`].
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    init_logging(cli.verbose, cli.quiet);
    if cli.no_color {
        yansi::disable();
    }

    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Config(args) => handle_config(&config, &args),
        Commands::Scan(args) => {
            config.apply_scan_args(&args);
            handle_scan(&config, &args, cli.quiet)
        }
    }
}

fn handle_config(config: &Config, args: &ConfigArgs) -> Result<ExitCode> {
    if args.path {
        match Config::default_path() {
            Some(path) => println!("{}", path.display()),
            None => anyhow::bail!("No config directory is available on this platform"),
        }
    } else {
        print!("{}", config.to_toml()?);
    }
    Ok(ExitCode::Success)
}

/// Bluetooth adapter and USB host a scan runs against.
pub struct Backends {
    /// Radio shared by the Bluetooth scanners.
    pub adapter: Arc<dyn BluetoothAdapter>,
    /// USB bus.
    pub usb: Arc<dyn UsbHost>,
}

impl Backends {
    /// Simulated backends when a fixture is configured, the host otherwise.
    ///
    /// There is no native Bluetooth stack binding, so without a fixture the
    /// Bluetooth transports report themselves as unsupported.
    pub fn from_config(config: &Config) -> Result<Self> {
        match &config.fixture {
            Some(path) => {
                let fixture = Fixture::load(path)?;
                log::info!("Replaying devices from {}", path.display());
                Ok(Self {
                    adapter: Arc::new(SimulatedAdapter::new(fixture.bluetooth)),
                    usb: Arc::new(SimulatedUsbHost::new(fixture.usb)),
                })
            }
            None => Ok(Self {
                adapter: Arc::new(NoAdapter),
                usb: Arc::new(SysfsUsbHost::new(config.usb.sysfs_root.clone())),
            }),
        }
    }
}

/// Add one scanner per selected transport, in selection order.
#[must_use]
pub fn add_scanners(
    mut builder: ScanSessionBuilder,
    config: &Config,
    backends: &Backends,
) -> ScanSessionBuilder {
    for transport in config.selected_transports() {
        builder = match transport {
            TransportArg::Classic => builder.bluetooth(Arc::clone(&backends.adapter)),
            TransportArg::Le => builder.bluetooth_le(Arc::clone(&backends.adapter), config.le.settings()),
            TransportArg::Usb => builder.usb(Arc::clone(&backends.usb), config.usb.product_filters()),
            TransportArg::Known => {
                if config.known_devices.is_empty() {
                    log::warn!("Known-device transport selected but no known_devices are configured");
                    builder
                } else {
                    builder.known_devices(Arc::clone(&backends.adapter), config.known_devices.clone())
                }
            }
        };
    }
    builder
}

fn handle_scan(config: &Config, args: &ScanArgs, quiet: bool) -> Result<ExitCode> {
    let backends = Backends::from_config(config)?;
    let shutdown = install_handler()?;

    let live = args.output == OutputFormat::Text && !quiet;
    let sink = Arc::new(ConsoleSink::new(ScanProgress::new(!live, args.accessible), live));

    let session = add_scanners(ScanSession::builder(), config, &backends)
        .listen(sink.clone())
        .build();
    log::info!(
        "Scanning {} transport(s): {}",
        session.scanners().len(),
        session
            .scanners()
            .iter()
            .map(|s| s.name().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    session.try_start().context("Failed to start scanning")?;

    let deadline = config.timeout().map(|timeout| Instant::now() + timeout);
    let mut interrupted = false;
    loop {
        if session.wait_finished(Some(POLL_INTERVAL)) {
            break;
        }
        if shutdown.is_shutdown_requested() {
            interrupted = true;
            break;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            log::info!("Scan timeout of {}ms reached", config.timeout_ms);
            break;
        }
    }

    if !sink.is_finished() {
        sink.progress().set_message("Stopping scanners");
        session.stop();
        if !session.wait_finished(Some(config.grace())) {
            log::warn!(
                "Not every scanner finished within {}ms, abandoning the run",
                config.grace_ms
            );
        }
    }
    drop(session);

    let report = sink.finish(interrupted);
    write_report(&report, args.output, io::stdout().lock()).context("Failed to write report")?;

    if interrupted {
        return Err(AppError::Interrupted.into());
    }
    Ok(report.exit_code())
}
