use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use sweep_stream::{run_pipeline, DummyDevice, SweepConfig};

/// Streams scans from a simulated sensor to TCP subscribers.
#[derive(Parser)]
#[command(name = "sweepd", disable_version_flag = true)]
struct Args {
    /// TOML configuration file. Defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Device port name, overriding the configuration file.
    #[arg(long)]
    port: Option<String>,
}

fn main() -> sweep_stream::Result<()> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => SweepConfig::from_file(path)?,
        None => SweepConfig::default(),
    };
    if args.port.is_some() {
        config.device.port = args.port;
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    let device = DummyDevice::open(config.device.port.as_deref())?
        .with_revolution(config.device.revolution());
    let pipeline = run_pipeline(device, &config)?;

    log::info!("Streaming on {}", pipeline.stream_addr());
    if let Some(address) = pipeline.control_addr() {
        log::info!("Control on {}", address);
    }
    log::info!("Type \"quit\" or close stdin to stop.");

    for line in std::io::stdin().lock().lines() {
        if line?.trim() == "quit" {
            break;
        }
    }

    drop(pipeline);
    Ok(())
}
