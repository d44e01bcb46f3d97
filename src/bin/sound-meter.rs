//! Sound level meter console application
//!
//! Measures the default (or a named) microphone and prints a live readout
//! until Ctrl+C.
//!
//! ```text
//! sound-meter [--config PATH] [--device NAME] [--synthetic] [--json]
//!             [--list-devices] [--write-config]
//! ```

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sound_level_meter::{
    audio::{list_input_devices, AudioSource, DeviceSource, SyntheticSignal, SyntheticSource},
    config::MeterConfig,
    constants::LEVEL_MAX_DB,
    session::{MeterSnapshot, SessionController},
};

/// Parsed command line
#[derive(Debug, Default)]
struct Args {
    config_path: Option<PathBuf>,
    device: Option<String>,
    synthetic: bool,
    json: bool,
    list_devices: bool,
    write_config: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config_path = Some(iter.next().context("--config needs a path")?.into()),
            "--device" => args.device = Some(iter.next().context("--device needs a name")?),
            "--synthetic" => args.synthetic = true,
            "--json" => args.json = true,
            "--list-devices" => args.list_devices = true,
            "--write-config" => args.write_config = true,
            "-h" | "--help" => {
                println!(
                    "usage: sound-meter [--config PATH] [--device NAME] [--synthetic] [--json] [--list-devices] [--write-config]"
                );
                std::process::exit(0);
            }
            other => bail!("unknown argument: {}", other),
        }
    }

    Ok(args)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging (stderr, so JSON output on stdout stays clean)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = parse_args()?;

    let config_path = args.config_path.clone().or_else(MeterConfig::default_path);
    let mut config = match &config_path {
        Some(path) => MeterConfig::load_or_default(path)?,
        None => MeterConfig::default(),
    };

    if let Some(device) = args.device.clone() {
        config.audio.device = Some(device);
    }
    if args.json {
        config.display.json = true;
    }
    config.validate()?;

    if args.write_config {
        let path = config_path.context("no configuration directory available")?;
        config.save(&path)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    if args.list_devices {
        print_devices();
        return Ok(());
    }

    tracing::info!("Starting sound level meter");

    if args.synthetic {
        let signal = SyntheticSignal::Sine {
            amplitude: 0.1,
            frequency_hz: 440.0,
            sample_rate: 48_000,
        };
        run(SyntheticSource::new(signal), &config).await
    } else {
        let source = DeviceSource::new(config.audio.device.clone(), config.audio.frame_size);
        run(source, &config).await
    }
}

async fn run<S: AudioSource + 'static>(source: S, config: &MeterConfig) -> Result<()> {
    let clock = config.meter.clock.build();
    let mut controller = SessionController::new(source, clock, config.engine_settings(), config.meter.tick_rate_hz);
    let mut rx = controller.subscribe();

    if let Err(e) = controller.start().await {
        // The snapshot carries the same message for any other consumer
        eprintln!("{}", controller.snapshot().error.unwrap_or_else(|| e.to_string()));
        return Err(e.into());
    }

    tracing::info!("Measuring - press Ctrl+C to stop");

    let print_interval = Duration::from_millis(config.display.print_interval_ms);
    let result = print_loop(&mut rx, print_interval, config.display.json).await;

    controller.stop();
    let last = controller.snapshot();
    if !config.display.json {
        println!();
        println!(
            "Session {}: avg {:.1} dB, min {:.1} dB, max {:.1} dB",
            format_duration(last.stats.duration_seconds),
            last.stats.avg,
            last.stats.min,
            last.stats.max
        );
    }

    result
}

/// Print snapshots until Ctrl+C or the session ends on its own
async fn print_loop(rx: &mut watch::Receiver<MeterSnapshot>, interval: Duration, json: bool) -> Result<()> {
    let mut last_print: Option<Instant> = None;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted");
                return Ok(());
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }

                let snapshot = rx.borrow_and_update().clone();
                if let Some(error) = snapshot.error.as_deref().filter(|_| !snapshot.active) {
                    bail!("measurement stopped: {}", error);
                }

                if last_print.map_or(true, |t| t.elapsed() >= interval) {
                    last_print = Some(Instant::now());
                    print_snapshot(&snapshot, json)?;
                }
            }
        }
    }
}

fn print_snapshot(snapshot: &MeterSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
    } else {
        use std::io::Write;
        print!("\r{}", format_readout(snapshot));
        std::io::stdout().flush()?;
    }
    Ok(())
}

fn print_devices() {
    println!("\n=== Available Input Devices ===");
    let devices = list_input_devices();
    if devices.is_empty() {
        println!("  (none)");
    }
    for device in &devices {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}", device.name, default_marker);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();
}

/// `mm:ss`
fn format_duration(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// One console line: level, bar, window stats, duration
fn format_readout(snapshot: &MeterSnapshot) -> String {
    const BAR_WIDTH: usize = 30;

    let filled = ((snapshot.level / LEVEL_MAX_DB).clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize;
    let bar: String = "#".repeat(filled) + &".".repeat(BAR_WIDTH - filled);

    format!(
        "{:5.1} dB [{}] avg {:5.1}  min {:5.1}  max {:5.1}  {}",
        snapshot.level,
        bar,
        snapshot.recent_stats.avg,
        snapshot.recent_stats.min,
        snapshot.recent_stats.max,
        format_duration(snapshot.stats.duration_seconds)
    )
}
