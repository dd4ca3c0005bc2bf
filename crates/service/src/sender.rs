//! Sender session state.

use bytes::Bytes;
use codec::{PT_AUDIO, RtpPacket};

use crate::{fec::FecEncoder, retransmission::RetransmissionCache};

/// Construction parameters for a [`SenderSession`].
///
/// The ssrc and initial sequence number are injected by the caller; the
/// binary draws them from its own randomness source at startup.
#[derive(Debug, Clone)]
pub struct SenderOptions {
    pub ssrc: u32,
    pub initial_seq: u16,
    pub initial_timestamp: u32,
    /// Media timestamp advance per packet. 160 is one 20ms frame at 8kHz.
    pub timestamp_increment: u32,
    pub fec_group_size: usize,
    pub history_size: usize,
}

/// Per-session sender state: sequence and timestamp allocation, the FEC
/// group in progress, and the retransmission history.
///
/// # Test
///
/// ```
/// use bytes::Bytes;
/// use codec::PT_FEC;
/// use rtp_stream_service::sender::{SenderOptions, SenderSession};
///
/// let mut session = SenderSession::new(SenderOptions {
///     ssrc: 1,
///     initial_seq: 65535,
///     initial_timestamp: 0,
///     timestamp_increment: 160,
///     fec_group_size: 2,
///     history_size: 16,
/// });
///
/// let (first, parity) = session.next_media(Bytes::from_static(b"a"));
/// assert_eq!(first.seq_num, 65535);
/// assert!(parity.is_none());
///
/// // The sequence number wraps and a fresh group starts at 0, so the
/// // parity for [0, 1] arrives two packets later.
/// let (second, parity) = session.next_media(Bytes::from_static(b"b"));
/// assert_eq!(second.seq_num, 0);
/// assert!(parity.is_none());
///
/// let (_, parity) = session.next_media(Bytes::from_static(b"c"));
/// assert_eq!(parity.unwrap().payload_type, PT_FEC);
/// ```
pub struct SenderSession {
    seq_num: u16,
    timestamp: u32,
    ssrc: u32,
    timestamp_increment: u32,
    fec: FecEncoder,
    cache: RetransmissionCache,
}

impl SenderSession {
    pub fn new(options: SenderOptions) -> Self {
        Self {
            seq_num: options.initial_seq,
            timestamp: options.initial_timestamp,
            ssrc: options.ssrc,
            timestamp_increment: options.timestamp_increment,
            fec: FecEncoder::new(options.fec_group_size),
            cache: RetransmissionCache::new(options.history_size),
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn history_len(&self) -> usize {
        self.cache.len()
    }

    /// Wraps a payload chunk into the next media packet, advancing the
    /// sequence number and timestamp.
    ///
    /// The packet enters the retransmission history and the FEC group;
    /// when the group completes, the parity packet comes back alongside
    /// and must be sent right after the media packet. Parity packets are
    /// never cached.
    pub fn next_media(&mut self, payload: Bytes) -> (RtpPacket, Option<RtpPacket>) {
        let packet = RtpPacket::new_media(PT_AUDIO, self.seq_num, self.timestamp, self.ssrc, payload);

        self.seq_num = self.seq_num.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(self.timestamp_increment);

        self.cache.push(&packet);
        let parity = self.fec.push(&packet);

        (packet, parity)
    }

    /// Produces retransmission packets for a received NACK, in the order
    /// the NACK lists them. Anything but a NACK yields nothing.
    pub fn handle_nack(&self, nack: &RtpPacket) -> Vec<RtpPacket> {
        let Ok(missing) = nack.nack_sequence_numbers() else {
            return Vec::new();
        };

        self.cache.handle_nack(&missing)
    }
}
