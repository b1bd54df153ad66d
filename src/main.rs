use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scpi_ctl::app::App;
use scpi_ctl::config::Settings;
use scpi_ctl::console::Console;
use scpi_ctl::session::SessionManager;
use scpi_ctl::simulated::SimulatedAnalyzer;
use scpi_ctl::transport::Transport;
use scpi_ctl::usbtmc::UsbtmcTransport;

/// Interactive controller for SCPI instruments
#[derive(Parser, Debug)]
#[command(name = "scpi-ctl")]
#[command(version)]
struct Args {
    /// Configuration file, `scpi-ctl.toml` by default
    #[arg(long)]
    config: Option<PathBuf>,

    /// Talk to a built-in simulated spectrum analyzer instead of USB instruments
    #[arg(long)]
    simulate: bool,

    /// Log filter directive, overrides RUST_LOG and the configuration
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let settings = Settings::load(args.config.as_deref()).context("failed to load configuration")?;
    init_logging(&settings, args.log_level.as_deref())?;
    info!(simulate = args.simulate, "starting");

    if args.simulate {
        run(SimulatedAnalyzer::new(), &settings)
    } else {
        let transport = UsbtmcTransport::new().context("could not initialise the USB transport")?;
        run(transport, &settings)
    }
}

fn init_logging(settings: &Settings, cli_level: Option<&str>) -> Result<()> {
    let filter = match cli_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&settings.logging.level))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn run<T: Transport>(transport: T, settings: &Settings) -> Result<()> {
    let sessions = SessionManager::discover(transport, settings.session_config())
        .context("an error occurred while finding resources")?;

    let console = Console::new(io::stdin().lock(), io::stdout().lock());
    let mut app = App::new(sessions, settings.exporter(), console);
    app.run().context("operator console failed")
}
