use anyhow::{bail, Context, Result};
use lightpress::constants::{APP_NAME, APP_VERSION};
use lightpress::{
    BitRateLevel, CompressionEvent, CompressionRequest, Compressor, CompressorConfig, Outcome,
    PresetLevel,
};
use std::path::PathBuf;

struct CliArgs {
    source: PathBuf,
    destination: PathBuf,
    preset: Option<PresetLevel>,
    level: Option<BitRateLevel>,
    bitrate_mbps: Option<f32>,
    max_duration_secs: Option<u32>,
}

fn print_usage() {
    eprintln!(
        "{APP_NAME} {APP_VERSION}\n\
         Usage: {APP_NAME} SOURCE DEST [options]\n\
         \n\
         Options:\n\
           --preset low|medium|high   resolution tier (default: medium)\n\
           --level 1..5               bitrate level, 3 is neutral (default: 3)\n\
           --bitrate MBPS             explicit bitrate, overrides the table\n\
           --max-duration SECS        output duration cap, 0 disables the cap\n\
           -h, --help                 show this help"
    );
}

fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut positional = Vec::new();
    let mut preset = None;
    let mut level = None;
    let mut bitrate_mbps = None;
    let mut max_duration_secs = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            "--preset" => {
                let value = iter.next().context("--preset needs a value")?;
                preset = Some(value.parse::<PresetLevel>()?);
            }
            "--level" => {
                let value = iter.next().context("--level needs a value")?;
                let ordinal: i32 = value.parse().context("--level must be a number")?;
                level = Some(BitRateLevel::from_ordinal(ordinal)?);
            }
            "--bitrate" => {
                let value = iter.next().context("--bitrate needs a value")?;
                bitrate_mbps = Some(value.parse().context("--bitrate must be a number")?);
            }
            "--max-duration" => {
                let value = iter.next().context("--max-duration needs a value")?;
                max_duration_secs = Some(value.parse().context("--max-duration must be a number")?);
            }
            other if other.starts_with('-') => bail!("unknown option: {other}"),
            other => positional.push(PathBuf::from(other)),
        }
    }

    if positional.len() != 2 {
        print_usage();
        bail!("expected SOURCE and DEST");
    }
    let destination = positional.pop().unwrap_or_default();
    let source = positional.pop().unwrap_or_default();

    Ok(CliArgs {
        source,
        destination,
        preset,
        level,
        bitrate_mbps,
        max_duration_secs,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&args)?;

    let config = CompressorConfig::load();
    let mut request = CompressionRequest::new(args.source, args.destination);
    request.preset_level = args.preset.unwrap_or(config.default_preset_level);
    request.bit_rate_level = args.level.unwrap_or(config.default_bit_rate_level);
    request.bit_rate_mbps = args.bitrate_mbps;
    request.max_duration_secs = args.max_duration_secs;

    let compressor = Compressor::new(config);
    let (handle, mut events) = compressor.start(request).await?;

    tokio::spawn({
        let handle = handle.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, cancelling");
                handle.cancel();
            }
        }
    });

    while let Some(event) = events.recv().await {
        match event {
            CompressionEvent::Started { job_id } => {
                tracing::info!(%job_id, "compression started");
            }
            CompressionEvent::Progress { progress, .. } => {
                eprintln!(
                    "progress: {:5.1}%  frame {}  speed {:.2}x",
                    progress.fraction * 100.0,
                    progress.frame,
                    progress.speed
                );
            }
            CompressionEvent::Finished { outcome, .. } => match outcome {
                Outcome::Succeeded { destination } => {
                    println!("{}", destination.display());
                    return Ok(());
                }
                Outcome::Failed { error } => bail!(error),
                Outcome::Cancelled => bail!("compression cancelled"),
            },
        }
    }

    bail!("event stream ended without a result")
}
