use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::time::Duration;

use dvl_nav::estimator::{EstimatorConfig, NavEvent, Profile};
use dvl_nav::sensors::{ReplayStream, SensorStream, SimulatedStream};
use dvl_nav::session::Session;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Capture one fused sample from every subsystem and exit
    Single,
    /// Continuous dead reckoning with periodic reports
    Stream,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Source {
    /// Synthetic vehicle driving a slow circle
    Sim,
    /// JSON-lines packet log (optionally .gz) read from --port
    Replay,
}

#[derive(Parser, Debug)]
#[command(name = "dvl_nav")]
#[command(about = "DVL dead-reckoning navigator", long_about = None)]
struct Args {
    /// Run mode
    #[arg(long, value_enum, default_value = "stream")]
    mode: Mode,

    /// Preset thresholds and sensor setup
    #[arg(long, value_enum, default_value = "tracking")]
    profile: Profile,

    /// Device path, or packet log path with --source replay
    #[arg(long, default_value = "/dev/ttyUSB0")]
    port: PathBuf,

    /// Packet source
    #[arg(long, value_enum, default_value = "sim")]
    source: Source,

    /// JSON config file (replaces the profile preset)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Altitude to hold [m]
    #[arg(long)]
    target_altitude: Option<f64>,

    /// Clamp integration steps to this many seconds
    #[arg(long)]
    max_dt: Option<f64>,

    /// Seconds between reports
    #[arg(long)]
    report_interval: Option<f64>,

    /// Milliseconds between simulated or replayed packets
    #[arg(long, default_value = "50")]
    packet_interval_ms: u64,

    /// Emit reports as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = build_config(&args)?;

    println!("[{}] DVL navigator starting", ts_now());
    println!("  Mode: {:?}", args.mode);
    println!("  Source: {:?} ({})", args.source, args.port.display());
    println!(
        "  Gate: FOM {:?} | noise floor {:?} | status check {}",
        config.gate.fom_threshold, config.gate.velocity_noise_floor, config.gate.status_bit_check
    );
    println!(
        "  Report every {:.1}s | packet timeout {:.1}s",
        config.monitor.report_interval_secs, config.packet_timeout_secs
    );

    let period = Duration::from_millis(args.packet_interval_ms);
    match args.source {
        Source::Sim => run_with(SimulatedStream::new(period), config, &args).await,
        Source::Replay => run_with(ReplayStream::new(&args.port, period), config, &args).await,
    }
}

fn build_config(args: &Args) -> Result<EstimatorConfig> {
    let mut config = match &args.config {
        Some(path) => EstimatorConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EstimatorConfig::for_profile(args.profile),
    };
    if let Some(target) = args.target_altitude {
        config.monitor.target_altitude = target;
    }
    if let Some(max_dt) = args.max_dt {
        config.max_dt_secs = Some(max_dt);
    }
    if let Some(interval) = args.report_interval {
        config.monitor.report_interval_secs = interval;
    }
    Ok(config)
}

async fn run_with<S: SensorStream>(stream: S, config: EstimatorConfig, args: &Args) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = Session::new(stream, config).with_events(tx);

    let handle = session.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n[{}] Shutdown requested.", ts_now());
            handle.cancel();
        }
    });

    match args.mode {
        Mode::Single => {
            drop(rx);
            let snapshot = session
                .capture_single()
                .await
                .context("single-shot capture failed")?;
            match snapshot {
                Some(snapshot) if args.json => println!("{}", serde_json::to_string(&snapshot)?),
                Some(snapshot) => {
                    for line in snapshot.format_lines() {
                        println!("{}", line);
                    }
                }
                None => println!("[{}] Stopped before every subsystem reported", ts_now()),
            }
        }
        Mode::Stream => {
            let json = args.json;
            let printer = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    print_event(&event, json);
                }
            });

            let result = session.run().await;
            // Closes the event channel so the printer drains and exits.
            drop(session);
            printer.await?;

            let summary = result.context("navigation session failed")?;
            println!(
                "[{}] Stopped ({:?}) | X: {:.2} m | Y: {:.2} m | Total Path: {:.2} m",
                ts_now(),
                summary.reason,
                summary.nav.x,
                summary.nav.y,
                summary.nav.total_path_length
            );
            println!(
                "  Packets: {} received | {} integrated | {} rejected | {} incomplete | {} timeouts",
                summary.counters.received,
                summary.counters.integrated,
                summary.counters.rejected(),
                summary.counters.incomplete,
                summary.counters.timeouts
            );
        }
    }

    Ok(())
}

fn print_event(event: &NavEvent, json: bool) {
    match event {
        NavEvent::Report(report) if json => match report.to_json_line() {
            Ok(line) => println!("{}", line),
            Err(e) => log::warn!("[report] serialization failed: {}", e),
        },
        NavEvent::Report(report) => {
            for line in report.format_lines() {
                println!("{}", line);
            }
            println!();
        }
        NavEvent::HeadingUnknown => log::debug!("[nav] velocity before first heading, not integrated"),
        // Gate, classifier and clamp diagnostics are logged where they happen.
        _ => {}
    }
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
