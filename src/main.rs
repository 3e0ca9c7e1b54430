mod app;

use app::App;
use clap::Parser;
use env_logger::Env;
use iced::Application;
use log::info;

use serial_wave::cli::LinkArgs;

#[derive(Parser, Debug)]
#[command(name = "serial-wave", version, about = "Waveform visualizer driven by a serial sensor")]
struct Cli {
    #[command(flatten)]
    link: LinkArgs,
}

fn main() -> iced::Result {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = cli.link.resolve_or_default();

    info!("Serial Wave");
    info!(
        "{} baud, {} framing, idle animation after {} ms without input",
        settings.baud_rate, settings.framing, settings.fallback_ms
    );
    info!("CLI: cargo run --bin serial-wave-cli -- --help");

    App::run(iced::Settings::with_flags(settings))
}
