mod alerts;
mod config;
mod flags;
mod monitor;
mod voice;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use alerts::AlertSink;
use config::SecbotConfig;
use dosa_wire::Comms;
use flags::FeatureFlags;
use monitor::SecBot;
use voice::VoiceSink;

#[derive(Parser, Debug)]
#[command(name = "dosa-secbot", about = "DOSA security & monitoring bot")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "/etc/dosa/secbot.json")]
    config: PathBuf,

    /// Device name announced on the wire
    #[arg(long, default_value = "DOSA SecBot")]
    name: String,

    /// Command invoked with announcement text (TTS player); omit to disable voice
    #[arg(long)]
    voice_cmd: Option<String>,

    /// Feature-flag file
    #[arg(long)]
    flags_file: Option<PathBuf>,

    /// Skip the startup announcement
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dosa_secbot=info".into()),
        )
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let cfg = SecbotConfig::load(&args.config).await;

    let comms = Comms::open(&args.name).context("binding DOSA transport")?;
    let alerts = AlertSink::new(cfg.alerts.clone());
    let voice = match &args.voice_cmd {
        Some(cmd) => VoiceSink::with_player(cmd),
        None => VoiceSink::disabled(),
    };
    let flags = match &args.flags_file {
        Some(path) => FeatureFlags::from_file(path).await,
        None => FeatureFlags::none(),
    };

    let mut bot = SecBot::new(comms, cfg, alerts, voice, flags)
        .await
        .context("starting monitor")?;

    tokio::select! {
        result = bot.run(!args.quiet) => result.context("monitor loop"),
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt, shutting down");
            Ok(())
        }
    }
}
