//! Dual-socket multicast UDP transport.
//!
//! Two sockets share the group port: one bound to the multicast group address
//! with `IP_ADD_MEMBERSHIP` for broadcast traffic, one bound to all
//! interfaces for sending and for directed replies. Either socket may
//! produce the next inbound frame; ordering between them is unspecified.
//!
//! Receive timeouts are normal and yield `None`; non-DOSA datagrams are
//! discarded and the poll loop continues.

use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use crate::error::WireError;
use crate::frame::{self, Frame};
use crate::level::LogLevel;
use crate::opcode::Opcode;

pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 1, 1, 69);
pub const MULTICAST_PORT: u16 = 6901;
pub const MULTICAST_MAX_HOPS: u32 = 32;

/// Default wait for a solicited acknowledgement.
pub const ACK_DEADLINE: Duration = Duration::from_millis(1500);

/// Per-socket poll quantum inside `receive`.
const POLL_QUANTUM: Duration = Duration::from_millis(10);

const MAX_DATAGRAM: usize = 10_240;

pub struct Comms {
    /// Bound to all interfaces on the group port; sends with TTL 32 and
    /// receives directed replies.
    sock: UdpSocket,
    /// Bound to the group address with membership joined; receives broadcast
    /// frames.
    mc_sock: UdpSocket,
    group: SocketAddr,
    device_name: String,
    /// Frames that arrived while waiting on an ACK, handed back by `receive`.
    pending: VecDeque<Frame>,
}

fn bind_udp(addr: SocketAddrV4) -> io::Result<UdpSocket> {
    let sock = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    sock.set_reuse_address(true)?;
    sock.set_nonblocking(true)?;
    sock.bind(&SocketAddr::V4(addr).into())?;
    UdpSocket::from_std(sock.into())
}

impl Comms {
    /// Open the transport on the standard DOSA group and port.
    pub fn open(device_name: &str) -> Result<Self, WireError> {
        Self::open_on(device_name, MULTICAST_GROUP, MULTICAST_PORT)
    }

    /// Open on an explicit group and port. Tests use high loopback ports.
    pub fn open_on(device_name: &str, group: Ipv4Addr, port: u16) -> Result<Self, WireError> {
        if device_name.len() > frame::DEVICE_NAME_LEN {
            return Err(WireError::InvalidName);
        }

        let mc_sock = bind_udp(SocketAddrV4::new(group, port))?;
        // Join on the unspecified interface; failures are non-fatal so agents
        // still work over directed traffic on hosts without a multicast route.
        if let Err(e) = mc_sock.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED) {
            warn!("could not join multicast group {group}: {e}");
        }
        let _ = mc_sock.set_multicast_loop_v4(true);

        let sock = bind_udp(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))?;
        let _ = sock.set_multicast_ttl_v4(MULTICAST_MAX_HOPS);

        Ok(Self {
            sock,
            mc_sock,
            group: SocketAddr::V4(SocketAddrV4::new(group, port)),
            device_name: device_name.to_string(),
            pending: VecDeque::new(),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn group(&self) -> SocketAddr {
        self.group
    }

    /// Build a payload with a random message ID and this agent's name.
    pub fn build(&self, opcode: Opcode, aux: &[u8]) -> Result<Vec<u8>, WireError> {
        frame::encode(&self.device_name, opcode, aux)
    }

    /// Send raw bytes. Without a target the multicast group is used, which
    /// broadcasts to all DOSA devices.
    pub async fn send(&self, payload: &[u8], target: Option<SocketAddr>) -> Result<(), WireError> {
        let tgt = target.unwrap_or(self.group);
        self.sock.send_to(payload, tgt).await?;
        Ok(())
    }

    /// Send an ACK for a given message ID back to a target.
    pub async fn send_ack(&self, msg_id: [u8; 2], target: SocketAddr) -> Result<(), WireError> {
        let payload = self.build(Opcode::Ack, &msg_id)?;
        self.send(&payload, Some(target)).await
    }

    /// Broadcast a `log` frame at the given level.
    pub async fn net_log(&self, level: LogLevel, message: &str) -> Result<(), WireError> {
        let mut aux = vec![level.as_wire()];
        aux.extend_from_slice(message.as_bytes());
        let payload = self.build(Opcode::Log, &aux)?;
        self.send(&payload, None).await
    }

    /// Send, then wait up to `deadline` for an `ack` whose payload echoes the
    /// sent message ID. Returns false on timeout. Frames other than the
    /// awaited ACK are queued for the next `receive` call, not dropped.
    pub async fn send_with_ack(
        &mut self,
        payload: &[u8],
        target: SocketAddr,
        deadline: Duration,
    ) -> Result<bool, WireError> {
        let msg_id = [payload[0], payload[1]];
        self.sock.send_to(payload, target).await?;

        let limit = Instant::now() + deadline;
        while Instant::now() < limit {
            let Some(msg) = self.poll_sockets(Duration::from_millis(100)).await else {
                continue;
            };
            if msg.opcode == Opcode::Ack && msg.payload().get(..2) == Some(&msg_id[..]) {
                return Ok(true);
            }
            self.pending.push_back(msg);
        }
        Ok(false)
    }

    /// Wait for the next DOSA frame. `None` deadline blocks indefinitely.
    pub async fn receive(&mut self, wait: Option<Duration>) -> Option<Frame> {
        if let Some(msg) = self.pending.pop_front() {
            return Some(msg);
        }

        match wait {
            Some(wait) => {
                let deadline = Instant::now() + wait;
                loop {
                    if let Some(msg) = self.poll_sockets(POLL_QUANTUM).await {
                        return Some(msg);
                    }
                    if Instant::now() >= deadline {
                        return None;
                    }
                }
            }
            None => loop {
                if let Some(msg) = self.poll_sockets(POLL_QUANTUM).await {
                    return Some(msg);
                }
            },
        }
    }

    /// One poll pass over both sockets, bounded by `quantum` per socket.
    async fn poll_sockets(&self, quantum: Duration) -> Option<Frame> {
        let mut buf = [0u8; MAX_DATAGRAM];
        for sock in [&self.sock, &self.mc_sock] {
            match timeout(quantum, sock.recv_from(&mut buf)).await {
                Ok(Ok((len, addr))) => match Frame::decode(&buf[..len], addr) {
                    Ok(msg) => return Some(msg),
                    Err(_) => debug!("discarding non-DOSA datagram from {addr}"),
                },
                // Receive errors are treated like timeouts; the loop goes on.
                Ok(Err(e)) => warn!("UDP recv error: {e}"),
                Err(_) => {}
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_with_id;

    // Each test binds its own port so they can run in parallel.

    #[tokio::test]
    async fn receive_yields_directed_frames() {
        let mut comms = Comms::open_on("probe", Ipv4Addr::new(239, 1, 1, 70), 16901).unwrap();
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let payload = encode_with_id(7, "gate", Opcode::Online, &[]).unwrap();
        peer.send_to(&payload, "127.0.0.1:16901").await.unwrap();

        let msg = comms.receive(Some(Duration::from_millis(500))).await.unwrap();
        assert_eq!(msg.opcode, Opcode::Online);
        assert_eq!(msg.device_name, "gate");
    }

    #[tokio::test]
    async fn non_dosa_datagrams_are_skipped() {
        let mut comms = Comms::open_on("probe", Ipv4Addr::new(239, 1, 1, 70), 16903).unwrap();
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        peer.send_to(b"junk", "127.0.0.1:16903").await.unwrap();
        let payload = encode_with_id(8, "gate", Opcode::Ping, &[]).unwrap();
        peer.send_to(&payload, "127.0.0.1:16903").await.unwrap();

        let msg = comms.receive(Some(Duration::from_millis(500))).await.unwrap();
        assert_eq!(msg.opcode, Opcode::Ping);
    }

    #[tokio::test]
    async fn receive_times_out_with_none() {
        let mut comms = Comms::open_on("probe", Ipv4Addr::new(239, 1, 1, 70), 16905).unwrap();
        let got = comms.receive(Some(Duration::from_millis(50))).await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn ack_with_matching_id_is_correlated() {
        let mut comms = Comms::open_on("probe", Ipv4Addr::new(239, 1, 1, 70), 16907).unwrap();
        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let device_addr = device.local_addr().unwrap();

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let (len, from) = device.recv_from(&mut buf).await.unwrap();
            let inbound = Frame::decode(&buf[..len], from).unwrap();
            let ack =
                encode_with_id(1, "gate", Opcode::Ack, &inbound.msg_id_bytes()).unwrap();
            device.send_to(&ack, from).await.unwrap();
        });

        let payload = encode_with_id(0x1234, "probe", Opcode::Ota, &[]).unwrap();
        let acked = comms
            .send_with_ack(&payload, device_addr, Duration::from_millis(500))
            .await
            .unwrap();
        assert!(acked);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn mismatched_ack_times_out_and_is_buffered() {
        let mut comms = Comms::open_on("probe", Ipv4Addr::new(239, 1, 1, 70), 16909).unwrap();
        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let device_addr = device.local_addr().unwrap();

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let (_, from) = device.recv_from(&mut buf).await.unwrap();
            // Wrong ID: 0x1334 instead of 0x1234.
            let ack = encode_with_id(1, "gate", Opcode::Ack, &[0x34, 0x13]).unwrap();
            device.send_to(&ack, from).await.unwrap();
        });

        let payload = encode_with_id(0x1234, "probe", Opcode::Ota, &[]).unwrap();
        let acked = comms
            .send_with_ack(&payload, device_addr, Duration::from_millis(300))
            .await
            .unwrap();
        assert!(!acked);
        responder.await.unwrap();

        // The stray ACK must still be observable, not silently dropped.
        let stray = comms.receive(Some(Duration::from_millis(100))).await.unwrap();
        assert_eq!(stray.opcode, Opcode::Ack);
        assert_eq!(stray.payload(), &[0x34, 0x13]);
    }

    #[test]
    fn overlong_device_name_is_rejected_at_open() {
        // No runtime needed: the name check precedes any socket work.
        let err = Comms::open_on("this name is much too long to fit", MULTICAST_GROUP, 16911);
        assert!(matches!(err, Err(WireError::InvalidName)));
    }
}
