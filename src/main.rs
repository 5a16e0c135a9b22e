//! Command-line host for the vehicle radar.
//!
//! Polls the configured routes from a fixed reference position and prints
//! the nearest vehicle in each direction on every cycle.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use vehicle_radar::{
    config::RadarConfig,
    fetch::{BasicClient, VehicleFetcher},
    geo::Position,
    output::{DisplaySink, LogDisplay, StdoutDisplay},
    position::{PositionFeed, PositionFix},
    refresh::RefreshLoop,
};

#[derive(Parser)]
#[command(name = "vehicle_radar")]
#[command(about = "Shows the nearest transit vehicle in each direction", long_about = None)]
struct Cli {
    /// JSON config file; defaults are used when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Reference latitude, overrides the config
    #[arg(long, allow_hyphen_values = true, requires = "lon")]
    lat: Option<f64>,

    /// Reference longitude, overrides the config
    #[arg(long, allow_hyphen_values = true, requires = "lat")]
    lon: Option<f64>,

    /// Number of cycles to run (0 = run until interrupted)
    #[arg(short = 'n', long, default_value_t = 0)]
    cycles: usize,

    /// Send summaries to the log instead of stdout
    #[arg(long, default_value_t = false)]
    log_display: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/vehicle_radar.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("vehicle_radar.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RadarConfig::load(path)?,
        None => RadarConfig::default(),
    }
    .apply_env()?;

    let reference = match (cli.lat, cli.lon) {
        (Some(lat), Some(lon)) => Position::new(lat, lon),
        _ => config.reference,
    };

    info!(
        lat = reference.latitude,
        lon = reference.longitude,
        routes = config.subscriptions.len(),
        base_url = %config.provider_base_url,
        "Configuration loaded"
    );

    let positions = PositionFeed::new(PositionFix {
        position: reference,
        recorded_at: Utc::now(),
    })
    .with_max_staleness(config.position_max_staleness())
    .with_timeout(config.timeout());

    let client = BasicClient::with_timeout(config.timeout())?;
    let fetcher = VehicleFetcher::new(client)
        .with_base_url(config.provider_base_url.clone())
        .with_timeout(config.timeout());

    let display: Arc<dyn DisplaySink> = if cli.log_display {
        Arc::new(LogDisplay)
    } else {
        Arc::new(StdoutDisplay)
    };

    let mut refresh = RefreshLoop::new(
        fetcher,
        positions.reader(),
        display,
        config.refresh_settings(),
    );

    let max_cycles = (cli.cycles > 0).then_some(cli.cycles);

    tokio::select! {
        _ = refresh.run(max_cycles) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    Ok(())
}
