//! Sender-side retransmission history.

use std::collections::VecDeque;

use ahash::AHashMap;
use codec::RtpPacket;

/// Bounded FIFO history of recently sent media packets, keyed by sequence
/// number.
///
/// Insertion order is tracked so that a full cache evicts its oldest
/// entry; the retained sequence numbers always form a suffix of the
/// emitted stream. RTX packets are never admitted, which keeps a
/// retransmission from re-entering the cache under its own key.
///
/// # Test
///
/// ```
/// use bytes::Bytes;
/// use codec::{PT_AUDIO, RtpPacket};
/// use rtp_stream_service::retransmission::RetransmissionCache;
///
/// let mut cache = RetransmissionCache::new(2);
/// for seq in 0u16..3 {
///     cache.push(&RtpPacket::new_media(PT_AUDIO, seq, 0, 1, Bytes::new()));
/// }
///
/// assert_eq!(cache.len(), 2);
/// assert!(!cache.contains(0));
///
/// let rtx = cache.handle_nack(&[0, 2]);
/// assert_eq!(rtx.len(), 1);
/// assert_eq!(rtx[0].original_seq(), Some(2));
/// ```
pub struct RetransmissionCache {
    capacity: usize,
    packets: AHashMap<u16, RtpPacket>,
    window: VecDeque<u16>,
}

impl RetransmissionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            packets: AHashMap::with_capacity(capacity),
            window: VecDeque::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn contains(&self, seq_num: u16) -> bool {
        self.packets.contains_key(&seq_num)
    }

    /// Records an outgoing media packet, evicting the oldest entry once
    /// the cache is full.
    pub fn push(&mut self, packet: &RtpPacket) {
        if packet.is_rtx() {
            return;
        }

        if self.packets.insert(packet.seq_num, packet.clone()).is_none() {
            self.window.push_back(packet.seq_num);
        }

        while self.packets.len() > self.capacity {
            let Some(oldest) = self.window.pop_front() else {
                break;
            };

            self.packets.remove(&oldest);
        }
    }

    /// Answers a NACK sequence list with retransmission packets, scanned
    /// in list order. Sequences that already fell out of the history are
    /// silently skipped; the receiver eventually gives up on them.
    pub fn handle_nack(&self, missing_seq_nums: &[u16]) -> Vec<RtpPacket> {
        missing_seq_nums
            .iter()
            .filter_map(|seq| self.packets.get(seq))
            .map(RtpPacket::new_rtx)
            .collect()
    }
}
