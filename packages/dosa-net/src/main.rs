mod cfg;
mod commands;
mod snoop;

use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;

use clap::{ArgGroup, Parser};
use tracing::error;

use dosa_wire::transport::MULTICAST_PORT;
use dosa_wire::Comms;
use snoop::{Snoop, SnoopOptions};

const DEVICE_NAME: &str = "DOSA Network Tools";

#[derive(Parser, Debug)]
#[command(name = "dosa-net", about = "DOSA network tools")]
#[command(group = ArgGroup::new("mode").args(["cfg", "ping", "trigger", "ota", "flush", "alt", "play"]).multiple(false))]
struct Args {
    /// Scan for devices and configure them; optionally give an IP address
    #[arg(short = 'c', long = "cfg", num_args = 0..=1, default_missing_value = "")]
    cfg: Option<String>,

    /// Send a ping to a given target, wait for the reply
    #[arg(short, long)]
    ping: Option<IpAddr>,

    /// Fire a trigger signal; target optional, else will broadcast
    #[arg(short, long, num_args = 0..=1, default_missing_value = "")]
    trigger: Option<String>,

    /// Order an OTA update; target optional, else will broadcast
    #[arg(short, long, num_args = 0..=1, default_missing_value = "")]
    ota: Option<String>,

    /// Flush peer registries network-wide; target optional
    #[arg(short, long, num_args = 0..=1, default_missing_value = "")]
    flush: Option<String>,

    /// Fire an alt-trigger with the given code
    #[arg(long)]
    alt: Option<u16>,

    /// Run a named play on the security bot
    #[arg(long)]
    play: Option<String>,

    /// Display an IR grid map or distance readouts with triggers
    #[arg(short, long)]
    map: bool,

    /// Ignore retry messages
    #[arg(short, long)]
    ignore: bool,

    /// Send a return ack for triggers
    #[arg(short, long)]
    ack: bool,

    /// Ignore ping messages
    #[arg(short = 'x', long)]
    noping: bool,
}

/// "" → None (broadcast); "10.0.0.8" → that device on the DOSA port.
fn parse_target(raw: &str) -> anyhow::Result<Option<SocketAddr>> {
    if raw.is_empty() {
        return Ok(None);
    }
    let ip: IpAddr = raw.parse()?;
    Ok(Some(SocketAddr::new(ip, MULTICAST_PORT)))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dosa_net=warn".into()),
        )
        .init();

    let args = Args::parse();
    println!("-- DOSA Network Monitor --");

    let work = async {
        match run(args).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{e:#}");
                ExitCode::from(2)
            }
        }
    };

    tokio::select! {
        code = work => code,
        _ = tokio::signal::ctrl_c() => {
            println!();
            ExitCode::SUCCESS
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut comms = Comms::open(DEVICE_NAME)?;

    if let Some(raw) = &args.cfg {
        let target = parse_target(raw)?.map(|a| a.ip());
        cfg::run(&mut comms, target).await?;
    } else if let Some(ip) = args.ping {
        commands::send_ping(&mut comms, SocketAddr::new(ip, MULTICAST_PORT)).await?;
    } else if let Some(raw) = &args.trigger {
        commands::fire_trigger(&mut comms, parse_target(raw)?).await?;
    } else if let Some(raw) = &args.ota {
        commands::fire_ota(&mut comms, parse_target(raw)?).await?;
    } else if let Some(raw) = &args.flush {
        commands::fire_flush(&mut comms, parse_target(raw)?).await?;
    } else if let Some(code) = args.alt {
        commands::fire_alt(&mut comms, code, None).await?;
    } else if let Some(name) = &args.play {
        commands::send_play(&mut comms, name).await?;
    } else {
        let opts = SnoopOptions {
            ignore_retries: args.ignore,
            auto_ack: args.ack,
            print_map: args.map,
            ignore_pings: args.noping,
        };
        println!("Listening..");
        Snoop::new(comms, opts).run().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_target_means_broadcast() {
        assert!(parse_target("").unwrap().is_none());
    }

    #[test]
    fn ip_targets_land_on_the_dosa_port() {
        let target = parse_target("10.0.0.8").unwrap().unwrap();
        assert_eq!(target.port(), MULTICAST_PORT);
        assert_eq!(target.ip().to_string(), "10.0.0.8");
    }

    #[test]
    fn garbage_targets_error() {
        assert!(parse_target("not-an-ip").is_err());
    }
}
