//! One-shot wire commands: trigger, OTA, flush, alt-trigger, ping, play.

use std::net::SocketAddr;
use std::time::Duration;

use dosa_wire::transport::ACK_DEADLINE;
use dosa_wire::{Comms, Opcode, WireError};

const PING_ATTEMPTS: usize = 3;
const PING_WAIT: Duration = Duration::from_secs(1);

/// Fire a manual trigger: sub-type BUTTON plus an empty 64-byte map.
pub async fn fire_trigger(comms: &mut Comms, target: Option<SocketAddr>) -> Result<(), WireError> {
    let mut aux = vec![0x02u8];
    aux.extend_from_slice(&[0u8; 64]);
    let trg = comms.build(Opcode::Trigger, &aux)?;
    comms.send(&trg, target).await?;
    println!("Trigger dispatched");
    Ok(())
}

/// Order devices to begin an OTA update pull.
pub async fn fire_ota(comms: &mut Comms, target: Option<SocketAddr>) -> Result<(), WireError> {
    let ota = comms.build(Opcode::Ota, &[])?;
    match target {
        Some(addr) => {
            if comms.send_with_ack(&ota, addr, ACK_DEADLINE).await? {
                println!("OTA request acknowledged");
            } else {
                println!(" -- no acknowledgement -- ");
            }
        }
        None => {
            comms.send(&ota, None).await?;
            println!("OTA request broadcast");
        }
    }
    Ok(())
}

/// Network-wide registry flush and re-enumeration.
pub async fn fire_flush(comms: &mut Comms, target: Option<SocketAddr>) -> Result<(), WireError> {
    let fls = comms.build(Opcode::Flush, &[])?;
    comms.send(&fls, target).await?;
    println!("Flush dispatched");
    Ok(())
}

/// Alt-trigger with a 16-bit code.
pub async fn fire_alt(
    comms: &mut Comms,
    code: u16,
    target: Option<SocketAddr>,
) -> Result<(), WireError> {
    let alt = comms.build(Opcode::Alt, &code.to_le_bytes())?;
    comms.send(&alt, target).await?;
    println!("Alt-trigger dispatched, code {code}");
    Ok(())
}

/// Directed ping, waiting for the PONG.
pub async fn send_ping(comms: &mut Comms, target: SocketAddr) -> Result<(), WireError> {
    for attempt in 1..=PING_ATTEMPTS {
        let ping = comms.build(Opcode::Ping, &[])?;
        comms.send(&ping, Some(target)).await?;

        let started = tokio::time::Instant::now();
        loop {
            let remaining = PING_WAIT.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }
            let Some(msg) = comms.receive(Some(remaining)).await else {
                break;
            };
            if msg.opcode == Opcode::Pong && msg.addr.ip() == target.ip() {
                println!(
                    "Reply from {} ({}) in {} ms",
                    msg.device_name,
                    msg.addr,
                    started.elapsed().as_millis()
                );
                return Ok(());
            }
        }
        println!("No reply (attempt {attempt}/{PING_ATTEMPTS})");
    }
    Ok(())
}

/// Ask the monitor to run a named play.
pub async fn send_play(comms: &mut Comms, name: &str) -> Result<(), WireError> {
    let ply = comms.build(Opcode::Play, name.as_bytes())?;
    let group = comms.group();
    if comms.send_with_ack(&ply, group, ACK_DEADLINE).await? {
        println!("Play '{name}' acknowledged");
    } else {
        println!(" -- no acknowledgement -- ");
    }
    Ok(())
}
