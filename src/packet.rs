//! The packet record that flows pool -> receiver -> intake list -> heap.
//!
//! Payload bytes stay in network byte order from intake through to the
//! audio callback (§3); only the callback performs the big-endian-to-host
//! byte swap, at the point the samples are actually copied out.

/// Largest payload a single L16 stereo RTP packet is expected to carry.
/// Sized for a standard Ethernet MTU (1500) minus IPv4/UDP/RTP headers,
/// rounded down to a whole number of stereo sample words.
pub const MAX_PAYLOAD_BYTES: usize = 1472;

/// Bits of [`Packet::flags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketFlags(u8);

impl PacketFlags {
    pub const IDLE: u8 = 0b01;
    pub const SILENT: u8 = 0b10;

    pub const fn empty() -> Self {
        PacketFlags(0)
    }

    pub fn set(&mut self, bit: u8, value: bool) {
        if value {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    pub fn has(&self, bit: u8) -> bool {
        self.0 & bit != 0
    }
}

/// One RTP packet's worth of decoded-header, still-network-order payload.
///
/// Lifecycle: born in [`crate::pool::PacketPool`], held by the receiver
/// while it's being filled, handed to the intake list on enqueue, and
/// finally owned by the ordered heap until the audio callback drains it.
pub struct Packet {
    /// RTP timestamp of the first sample in this packet.
    pub timestamp: u32,
    /// Number of samples carried (one stereo frame = two samples).
    pub nsamples: usize,
    /// Raw payload bytes, network (big-endian) byte order, undecoded.
    pub samples_raw: Vec<u8>,
    pub flags: PacketFlags,
}

impl Packet {
    /// A freshly-reserved packet: no samples, no flags.
    pub(crate) fn fresh() -> Self {
        Packet {
            timestamp: 0,
            nsamples: 0,
            samples_raw: vec![0u8; MAX_PAYLOAD_BYTES],
            flags: PacketFlags::empty(),
        }
    }

    /// Reset to the just-reserved state so the packet can be reused without
    /// reallocating `samples_raw`.
    pub(crate) fn reset(&mut self) {
        self.timestamp = 0;
        self.nsamples = 0;
        self.flags = PacketFlags::empty();
    }

    /// Scan the filled portion of the payload for any non-zero sample word.
    pub fn scan_silent(&mut self) {
        let filled = self.nsamples * 2;
        let all_zero = self.samples_raw[..filled].iter().all(|&b| b == 0);
        self.flags.set(PacketFlags::SILENT, all_zero);
    }

    /// Exclusive end of this packet's timestamp range (`timestamp + nsamples`).
    pub fn end_timestamp(&self) -> u32 {
        self.timestamp.wrapping_add(self.nsamples as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_detection() {
        let mut p = Packet::fresh();
        p.nsamples = 4;
        p.scan_silent();
        assert!(p.flags.has(PacketFlags::SILENT));

        p.samples_raw[3] = 1;
        p.scan_silent();
        assert!(!p.flags.has(PacketFlags::SILENT));
    }

    #[test]
    fn reset_preserves_buffer_capacity() {
        let mut p = Packet::fresh();
        p.timestamp = 42;
        p.nsamples = 10;
        p.flags.set(PacketFlags::IDLE, true);
        let cap_before = p.samples_raw.len();
        p.reset();
        assert_eq!(p.timestamp, 0);
        assert_eq!(p.nsamples, 0);
        assert!(!p.flags.has(PacketFlags::IDLE));
        assert_eq!(p.samples_raw.len(), cap_before);
    }
}
