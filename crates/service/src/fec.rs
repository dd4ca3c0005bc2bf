//! XOR forward error correction.
//!
//! A group of `G` consecutive media packets produces one parity packet
//! whose payload is the byte-wise XOR of the member payloads, implicitly
//! zero-padded to the longest member. Any single missing member can be
//! rebuilt from the parity and the remaining `G - 1` payloads; two or
//! more losses in a group fall through to retransmission.

use bytes::{BufMut, Bytes, BytesMut};
use codec::{PT_AUDIO, PT_FEC, RtpPacket};

/// Buffers outgoing media packets and emits one parity packet per full
/// group.
///
/// The parity payload is a metadata block listing the member sequence
/// numbers (big-endian, group order) followed by the XOR parity bytes.
/// The parity packet takes the sequence number after the last member, the
/// timestamp of the last member, and the group's ssrc.
///
/// # Test
///
/// ```
/// use bytes::Bytes;
/// use codec::{PT_AUDIO, PT_FEC, RtpPacket};
/// use rtp_stream_service::fec::FecEncoder;
///
/// let mut encoder = FecEncoder::new(2);
///
/// let a = RtpPacket::new_media(PT_AUDIO, 10, 1600, 7, Bytes::from_static(&[0x0f, 0xf0]));
/// let b = RtpPacket::new_media(PT_AUDIO, 11, 1760, 7, Bytes::from_static(&[0xff]));
///
/// assert!(encoder.push(&a).is_none());
/// let parity = encoder.push(&b).unwrap();
///
/// assert_eq!(parity.payload_type, PT_FEC);
/// assert_eq!(parity.seq_num, 12);
/// assert_eq!(parity.timestamp, 1760);
/// assert_eq!(parity.payload.as_ref(), &[0, 10, 0, 11, 0xf0, 0xf0]);
/// ```
pub struct FecEncoder {
    group_size: usize,
    buffer: Vec<RtpPacket>,
}

impl FecEncoder {
    pub fn new(group_size: usize) -> Self {
        Self {
            group_size,
            buffer: Vec::with_capacity(group_size),
        }
    }

    pub fn group_size(&self) -> usize {
        self.group_size
    }

    /// Adds an outgoing media packet to the in-progress group, returning
    /// the parity packet once the group is complete.
    ///
    /// A group is never split across the sequence wrap: when the sequence
    /// number wraps mid-group, the partial group is abandoned and a fresh
    /// one starts at zero. Those packets stay covered by retransmission.
    pub fn push(&mut self, packet: &RtpPacket) -> Option<RtpPacket> {
        if let Some(last) = self.buffer.last() {
            if packet.seq_num < last.seq_num {
                self.buffer.clear();
            }
        }

        self.buffer.push(packet.clone());
        if self.buffer.len() < self.group_size {
            return None;
        }

        let parity = self.emit();
        self.buffer.clear();
        parity
    }

    fn emit(&self) -> Option<RtpPacket> {
        let last = self.buffer.last()?;

        let parity_len = self
            .buffer
            .iter()
            .map(|item| item.payload.len())
            .max()
            .unwrap_or(0);

        let mut parity = vec![0u8; parity_len];
        for item in &self.buffer {
            xor_into(&mut parity, &item.payload);
        }

        let mut payload = BytesMut::with_capacity(self.buffer.len() * 2 + parity_len);
        for item in &self.buffer {
            payload.put_u16(item.seq_num);
        }

        payload.extend_from_slice(&parity);

        let seq_num = self
            .buffer
            .iter()
            .map(|item| item.seq_num)
            .max()?
            .wrapping_add(1);

        Some(RtpPacket::new_media(
            PT_FEC,
            seq_num,
            last.timestamp,
            last.ssrc,
            payload.freeze(),
        ))
    }
}

/// Parses the member sequence numbers out of a parity packet's metadata
/// block. `None` if the packet is not FEC or the metadata is short.
pub fn group_members(group_size: usize, fec: &RtpPacket) -> Option<Vec<u16>> {
    if fec.payload_type != PT_FEC || fec.payload.len() < group_size * 2 {
        return None;
    }

    Some(
        fec.payload[..group_size * 2]
            .chunks_exact(2)
            .map(|item| u16::from_be_bytes([item[0], item[1]]))
            .collect(),
    )
}

/// Rebuilds the single missing member of a group.
///
/// Returns `None` when zero or more than one member is absent from
/// `available`; recovery of multiple losses is not possible with a single
/// parity. The recovered packet carries the missing sequence number, the
/// group's ssrc, and the parity packet's timestamp. Its payload has the
/// parity length, so a member shorter than the longest in its group comes
/// back zero-padded.
///
/// # Test
///
/// ```
/// use bytes::Bytes;
/// use codec::{PT_AUDIO, RtpPacket};
/// use rtp_stream_service::fec::{FecEncoder, recover};
///
/// let packets = (0u16..4)
///     .map(|i| {
///         RtpPacket::new_media(PT_AUDIO, i, i as u32 * 160, 7, Bytes::from(vec![i as u8; 4]))
///     })
///     .collect::<Vec<_>>();
///
/// let mut encoder = FecEncoder::new(4);
/// let parity = packets.iter().filter_map(|p| encoder.push(p)).next().unwrap();
///
/// let available = [&packets[0], &packets[1], &packets[3]];
/// let recovered = recover(4, &parity, &available).unwrap();
///
/// assert_eq!(recovered.seq_num, 2);
/// assert_eq!(recovered.payload, packets[2].payload);
///
/// // With the whole group present there is nothing to do.
/// let full = [&packets[0], &packets[1], &packets[2], &packets[3]];
/// assert!(recover(4, &parity, &full).is_none());
/// ```
pub fn recover(group_size: usize, fec: &RtpPacket, available: &[&RtpPacket]) -> Option<RtpPacket> {
    let members = group_members(group_size, fec)?;

    let mut missing = members
        .iter()
        .copied()
        .filter(|seq| !available.iter().any(|item| item.seq_num == *seq));
    let missing_seq = missing.next()?;
    if missing.next().is_some() {
        return None;
    }

    let mut payload = fec.payload[group_size * 2..].to_vec();
    for item in available {
        if members.contains(&item.seq_num) {
            xor_into(&mut payload, &item.payload);
        }
    }

    Some(RtpPacket::new_media(
        PT_AUDIO,
        missing_seq,
        fec.timestamp,
        fec.ssrc,
        Bytes::from(payload),
    ))
}

fn xor_into(parity: &mut [u8], payload: &[u8]) {
    for (target, byte) in parity.iter_mut().zip(payload) {
        *target ^= byte;
    }
}
