use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{info, warn};

use serial_wave::animator::Animator;
use serial_wave::cli::LinkArgs;
use serial_wave::config::Settings;
use serial_wave::params::WaveParameters;
use serial_wave::serial_link::{available_ports, ConnectionState, SerialLink};
use serial_wave::snapshot::save_png;

#[derive(Parser, Debug)]
#[command(name = "serial-wave-cli", version, about = "Headless tools for the serial wave visualizer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports
    Ports,
    /// Read a device and log the mapped wave parameters
    Monitor {
        #[command(flatten)]
        link: LinkArgs,
        /// Frames per second of the headless animation loop
        #[arg(long, default_value_t = 30)]
        fps: u32,
    },
    /// Render one frame for a given reading to a PNG file
    Snapshot {
        #[arg(long)]
        value: f64,
        #[arg(long)]
        speed: f64,
        /// Phase accumulator value to draw at
        #[arg(long, default_value_t = 0.0)]
        phase: f64,
        #[arg(long, default_value_t = 1280)]
        width: u32,
        #[arg(long, default_value_t = 720)]
        height: u32,
        #[arg(long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Ports => {
            let ports = available_ports()?;
            if ports.is_empty() {
                println!("no serial ports found");
            }
            for port in ports {
                println!("{}", port);
            }
            Ok(())
        }
        Command::Monitor { link, fps } => monitor(link, fps).await,
        Command::Snapshot {
            value,
            speed,
            phase,
            width,
            height,
            out,
        } => {
            let mut params = WaveParameters::default();
            params.update(value, speed);
            save_png(&out, &params, phase, width, height, Settings::default().max_lines)?;
            info!(
                "wrote {} ({} lines, amplitude {:.1}, hue {:.1})",
                out.display(),
                params.lines,
                params.base_amplitude,
                params.hue
            );
            Ok(())
        }
    }
}

async fn monitor(args: LinkArgs, fps: u32) -> Result<()> {
    let settings = args.resolve()?;
    let port = settings
        .port
        .clone()
        .ok_or_else(|| anyhow!("--port is required (or set \"port\" in the settings file)"))?;

    let mut link = SerialLink::connect(&port, &settings)?;
    let mut animator = Animator::new(
        WaveParameters::new(settings.frequency),
        settings.fallback_window(),
        Instant::now(),
    );
    let mut interval = tokio::time::interval(Duration::from_micros(1_000_000 / fps.max(1) as u64));
    let mut last_state = link.state();
    let mut last_logged = animator.params().clone();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            _ = interval.tick() => {
                let now = Instant::now();
                animator.ingest_all(link.drain(), now);
                if animator.tick(now) {
                    info!("no input for {} ms, idle animation", settings.fallback_ms);
                }

                let params = animator.params();
                if *params != last_logged {
                    info!(
                        "lines={} amplitude={:.1} speed={:.4} hue={:.1} phase={:.3}",
                        params.lines, params.base_amplitude, params.speed, params.hue, animator.phase()
                    );
                    last_logged = params.clone();
                }

                let state = link.state();
                if state != last_state {
                    info!("{}: {}", port, state);
                    last_state = state;
                }
                if state == ConnectionState::Error && link.is_finished() {
                    break;
                }
            }
        }
    }

    link.disconnect();
    let stats = link.stats();
    info!(
        "{} records accepted, {} malformed, {} ignored, {} dropped on a full queue",
        stats.accepted, stats.warnings, stats.ignored, stats.overflowed
    );
    if link.state() == ConnectionState::Error {
        warn!("link to {} ended with an error", port);
        return Err(anyhow!("serial link to {} failed", port));
    }
    Ok(())
}
