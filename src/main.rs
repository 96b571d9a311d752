use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use uplink_failover::command::SystemCommandRunner;
use uplink_failover::config::{self, AppConfig, Overrides};
use uplink_failover::notifier::{LayeredNotifier, LogNotifier, Notifier};
use uplink_failover::privilege::{self, Elevation};
use uplink_failover::signal::ShutdownFlag;
use uplink_failover::sleeper::RealSleeper;
use uplink_failover::{logging, network, FailoverEngine, Monitor};

/// Uplink Failover - metric-based wired/wireless failover
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
struct Args {
    /// Path to configuration file
    #[clap(long)]
    config: Option<PathBuf>,

    /// Primary (wired) network interface (e.g., Ethernet, enp3s0)
    #[clap(short = 'p', long)]
    primary: Option<String>,

    /// Secondary (wireless) network interface (e.g., WLAN, wlp2s0)
    #[clap(short = 's', long)]
    secondary: Option<String>,

    /// Connectivity check interval in seconds
    #[clap(short = 't', long)]
    interval: Option<u64>,

    /// Reference host to probe; repeat for several
    #[clap(long = "host")]
    hosts: Vec<String>,

    /// OS backend: auto, netsh or iproute
    #[clap(long)]
    backend: Option<String>,

    /// Also append log records to this file
    #[clap(long)]
    log_file: Option<PathBuf>,

    /// Log switches instead of showing desktop notifications
    #[clap(long)]
    no_notify: bool,

    /// Do not check for or request administrator privileges
    #[clap(long)]
    no_elevate: bool,

    /// Run a single check and exit
    #[clap(long)]
    once: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            primary: self.primary.clone(),
            secondary: self.secondary.clone(),
            interval: self.interval,
            hosts: self.hosts.clone(),
            backend: self.backend.clone(),
            log_file: self.log_file.clone(),
            no_notify: self.no_notify,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let config_file = config::load(&config_path)
        .with_context(|| format!("Failed to load config file {:?}", config_path))?;
    let app = AppConfig::resolve(&args.overrides(), config_file.as_ref())
        .context("Invalid configuration")?;

    let log = logging::init();

    if !args.no_elevate {
        let forwarded: Vec<String> = std::env::args().skip(1).collect();
        match privilege::ensure_elevated(&forwarded).context("Administrator privileges are required")? {
            Elevation::Elevated => {}
            Elevation::Relaunched(code) => std::process::exit(code),
        }
    }

    // opened only once elevated; system log paths are usually root-owned
    if let Some(path) = &app.log_file {
        log.attach_file(path)
            .with_context(|| format!("Failed to open log file {:?}", path))?;
    }
    info!("Network monitor starting");
    info!("Configuration loaded from {:?}", config_path);

    let notifier: Box<dyn Notifier> = if app.notifications {
        Box::new(LayeredNotifier::for_platform())
    } else {
        Box::new(LogNotifier)
    };

    let backend = app.backend.concrete().context("No backend for this platform")?;
    info!("Using {} backend", backend);
    let port = network::connect(backend, SystemCommandRunner)?;

    let engine = match FailoverEngine::start(&app.failover, port, Box::new(RealSleeper)) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Cannot start monitoring: {}", e);
            notifier.notify("Network monitor error", &format!("Cannot start monitoring: {}", e));
            return Err(e).context("Startup check failed, exiting");
        }
    };

    let shutdown = if args.once {
        ShutdownFlag::manual()
    } else {
        ShutdownFlag::install().context("Failed to install the interrupt handler")?
    };

    let mut monitor = Monitor::new(
        engine,
        notifier,
        Box::new(shutdown),
        Box::new(RealSleeper),
        app.failover.check_interval,
    );

    if args.once {
        let report = monitor.run_once();
        info!("Check result: {:?}", report);
        return Ok(());
    }

    monitor.run();
    Ok(())
}
