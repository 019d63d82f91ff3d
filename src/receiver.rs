//! The receiver thread (§4.2): binds the primary UDP socket, reads RTP
//! datagrams, validates and decodes them, and hands packets to the intake
//! list. Holds the intake lock only for the final append; the backpressure
//! gate takes the playout lock directly, the same lock the audio callback
//! uses, so a sustained overrun stalls the network reader, never the
//! callback.
//!
//! The spec calls for a scatter read of exactly two regions (header,
//! payload) straight off the socket to avoid a second copy. `std`/`socket2`
//! don't expose a safe vectored `recv_from`, so this reads into one scratch
//! buffer and copies the payload into the packet once; functionally
//! identical, one extra `memcpy` per datagram (see DESIGN.md).

use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::{PlayerError, Result};
use crate::intake::IntakeList;
use crate::packet::{PacketFlags, MAX_PAYLOAD_BYTES};
use crate::playout::PlayoutCore;
use crate::pool::PacketPool;
use crate::rtp::{RtpHeader, PAYLOAD_TYPE_L16_STEREO};
use crate::timestamp::lt;

/// Generous headroom over the expected payload so a slightly oversized
/// datagram doesn't get silently truncated by the OS before we even look
/// at it (§6: standard RTP over UDP, no jumbo frames expected).
const RECV_SCRATCH: usize = 2048;

/// Bind the primary RTP socket (§6 "Sockets"): bind-to-any on the given
/// port, `SO_REUSEADDR` and a multicast group join if the address is
/// multicast, and an optional `SO_RCVBUF` bump.
pub fn bind_socket(addr: SocketAddr, rcvbuf: Option<usize>) -> Result<UdpSocket> {
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(PlayerError::Io)?;

    let is_multicast = match addr.ip() {
        IpAddr::V4(v4) => v4.is_multicast(),
        IpAddr::V6(v6) => v6.is_multicast(),
    };
    if is_multicast {
        socket.set_reuse_address(true).map_err(PlayerError::Io)?;
    }

    let bind_addr: SocketAddr = match addr {
        SocketAddr::V4(v4) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), v4.port()),
        SocketAddr::V6(v6) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), v6.port()),
    };
    socket.bind(&bind_addr.into()).map_err(PlayerError::Io)?;

    if let Some(size) = rcvbuf {
        let _ = socket.set_recv_buffer_size(size);
    }

    let socket: UdpSocket = socket.into();

    if is_multicast {
        match addr.ip() {
            IpAddr::V4(v4) => socket
                .join_multicast_v4(&v4, &Ipv4Addr::UNSPECIFIED)
                .map_err(PlayerError::Io)?,
            IpAddr::V6(v6) => socket.join_multicast_v6(&v6, 0).map_err(PlayerError::Io)?,
        }
    }

    Ok(socket)
}

pub struct Receiver {
    socket: UdpSocket,
    pool: PacketPool,
    intake: IntakeList,
    playout: Arc<PlayoutCore>,
    running: Arc<AtomicBool>,
}

impl Receiver {
    pub fn new(
        socket: UdpSocket,
        pool: PacketPool,
        intake: IntakeList,
        playout: Arc<PlayoutCore>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Receiver {
            socket,
            pool,
            intake,
            playout,
            running,
        }
    }

    /// Runs until `running` is cleared or a fatal error occurs (§7:
    /// `IO_ERROR` on a non-`EINTR` read failure, `UNSUPPORTED_PAYLOAD` on
    /// any payload type other than 10).
    pub fn run(mut self) -> Result<()> {
        let mut scratch = vec![0u8; RECV_SCRATCH];
        let mut packet = self.pool.reserve();

        while self.running.load(Ordering::Relaxed) {
            let len = match self.socket.recv(&mut scratch) {
                Ok(len) => len,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    continue
                }
                Err(e) => return Err(PlayerError::Io(e)),
            };

            let header = match RtpHeader::parse(&scratch[..len]) {
                Some(h) => h,
                None => {
                    log::debug!("short-packet: {len} bytes, dropping");
                    continue;
                }
            };

            if header.extension {
                log::debug!("bad-extension: seq {} dropped", header.sequence);
                continue;
            }

            // Deliberately unlocked (§4.2 step 4, §9): may be stale, worst
            // case is a mis-keep corrected later by the playout core.
            if self.playout.is_active() && lt(header.timestamp, self.playout.next_timestamp()) {
                log::info!(
                    "late-packet: seq {} ts {} before cursor",
                    header.sequence,
                    header.timestamp
                );
                continue;
            }

            if header.payload_type != PAYLOAD_TYPE_L16_STEREO {
                return Err(PlayerError::UnsupportedPayload(header.payload_type));
            }

            let header_size = header.header_size();
            if header_size > len {
                log::debug!("short-packet: CSRC list truncated, dropping");
                continue;
            }
            let payload_len = len - header_size;
            if payload_len > MAX_PAYLOAD_BYTES {
                log::debug!("short-packet: payload {payload_len} exceeds max, dropping");
                continue;
            }
            let nsamples = payload_len / 2;
            if nsamples == 0 {
                log::debug!("short-packet: zero-sample payload, dropping");
                continue;
            }

            packet.timestamp = header.timestamp;
            packet.nsamples = nsamples;
            packet.samples_raw[..payload_len].copy_from_slice(&scratch[header_size..len]);
            packet.flags.set(PacketFlags::IDLE, header.marker);
            packet.scan_silent();

            // Backpressure gate (§4.2 step 9): stall the reader, not the
            // audio callback, when the heap is already at the high mark.
            self.playout.wait_below_maxbuffer();

            self.intake.push(packet);
            packet = self.pool.reserve();
        }
        Ok(())
    }
}
