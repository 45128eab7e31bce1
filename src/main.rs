use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::info;

use noisefall::devices::{is_headphone_label, CpalEnumerator, DeviceEnumerator};
use noisefall::{AppConfig, StateStore};

#[derive(Parser)]
#[command(name = "noisefall")]
#[command(about = "Plays brown noise automatically while headphones are connected")]
struct Args {
    /// Print audio output devices with their classification and exit
    #[arg(short, long)]
    list_devices: bool,

    /// Override the state store location
    #[arg(long)]
    store: Option<PathBuf>,

    /// Device poll interval in seconds
    #[arg(long, default_value_t = 3)]
    poll_interval: u64,

    /// Audio host liveness probe interval in seconds
    #[arg(long, default_value_t = 10)]
    probe_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let args = Args::parse();

    if args.list_devices {
        return list_devices();
    }

    let config = AppConfig {
        store_path: args.store.unwrap_or_else(StateStore::default_path),
        poll_interval: Duration::from_secs(args.poll_interval.max(1)),
        probe_interval: Duration::from_secs(args.probe_interval.max(1)),
    };

    info!("Starting noisefall, store at {:?}", config.store_path);
    noisefall::run(config).await
}

fn list_devices() -> Result<()> {
    let mut enumerator = CpalEnumerator;
    let outputs = enumerator.outputs()?;

    let mut has_headphones = false;
    println!("Found {} audio outputs:", outputs.len());
    for (i, device) in outputs.iter().enumerate() {
        let headphone = is_headphone_label(&device.label);
        has_headphones |= headphone;
        let label = if device.label.is_empty() {
            "(no label)"
        } else {
            device.label.as_str()
        };
        println!(
            "  {}. \"{}\"{}",
            i + 1,
            label,
            if headphone { "  [headphone]" } else { "" }
        );
    }
    println!(
        "Headphones {}",
        if has_headphones { "CONNECTED" } else { "DISCONNECTED" }
    );
    Ok(())
}
