//! Receiver session state.
//!
//! One session tracks one inbound media stream: the in-order delivery
//! cursor, the reorder buffer, the missing-sequence accounting feeding
//! NACKs, and the stored parity packets feeding recovery. All sequence
//! comparisons follow the signed-distance rule, so the state machine is
//! indifferent to the 16-bit wrap.

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use ahash::{AHashMap, AHashSet};
use bytes::Bytes;
use codec::{PT_AUDIO, PT_FEC, PT_NACK, PT_RTX, RtpPacket};

use crate::{fec, seq_before};

/// Construction parameters for a [`ReceiverSession`].
#[derive(Debug, Clone)]
pub struct ReceiverOptions {
    /// Reorder buffer bound. The buffer retains delivered packets until
    /// they age out, so this is also how far back parity recovery can
    /// reach.
    pub buffer_size: usize,
    pub fec_group_size: usize,
    /// Minimum interval between two NACKs for the same sequence number.
    pub nack_timeout: Duration,
}

impl Default for ReceiverOptions {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            fec_group_size: 4,
            nack_timeout: Duration::from_millis(100),
        }
    }
}

/// Per-stream delivery statistics, printed when the session ends.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReceiverStats {
    pub received: u64,
    pub lost: u64,
    pub out_of_order: u64,
    pub nacks_sent: u64,
    pub rtx_received: u64,
}

impl ReceiverStats {
    /// Fraction of the stream that was observed missing at some point,
    /// recovered or not.
    pub fn loss_rate(&self) -> f64 {
        let total = self.received + self.lost;
        if total == 0 {
            return 0.0;
        }

        self.lost as f64 / total as f64
    }
}

/// What one inbound datagram produced: zero or more payloads delivered in
/// strict sequence order, and at most one NACK to send back.
#[derive(Debug, Default)]
pub struct Processed {
    pub delivered: Vec<Bytes>,
    pub nack: Option<RtpPacket>,
}

pub struct ReceiverSession {
    options: ReceiverOptions,
    /// Stream ssrc, learned from the first packet and echoed on NACKs.
    ssrc: Option<u32>,
    /// Highest sequence number delivered so far. The cursor only moves
    /// over delivered packets, which is what keeps delivery in order.
    last_seq: Option<u16>,
    /// Every accepted media packet, delivered or pending, keyed by
    /// sequence number. Bounded by `buffer_size`, smallest key first out.
    buffer: BTreeMap<u16, RtpPacket>,
    missing: AHashSet<u16>,
    last_nack: AHashMap<u16, Instant>,
    /// Parity packets keyed by their first listed member.
    fec_groups: AHashMap<u16, RtpPacket>,
    stats: ReceiverStats,
}

impl ReceiverSession {
    pub fn new(options: ReceiverOptions) -> Self {
        Self {
            options,
            ssrc: None,
            last_seq: None,
            buffer: BTreeMap::new(),
            missing: AHashSet::new(),
            last_nack: AHashMap::new(),
            fec_groups: AHashMap::new(),
            stats: ReceiverStats::default(),
        }
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn missing_len(&self) -> usize {
        self.missing.len()
    }

    pub fn is_missing(&self, seq_num: u16) -> bool {
        self.missing.contains(&seq_num)
    }

    /// Runs one decoded packet through the state machine.
    ///
    /// `now` gates NACK suppression; the caller passes the receive time.
    pub fn process(&mut self, packet: RtpPacket, now: Instant) -> Processed {
        let mut out = Processed::default();

        if self.ssrc.is_none() {
            self.ssrc = Some(packet.ssrc);
        }

        match packet.payload_type {
            // Receivers do not interpret inbound NACKs.
            PT_NACK => return out,
            PT_FEC => {
                self.stats.received += 1;
                self.handle_fec(packet, &mut out);
            }
            PT_RTX => {
                self.stats.received += 1;
                self.handle_rtx(packet, &mut out);
            }
            PT_AUDIO => {
                self.stats.received += 1;
                self.handle_media(packet, &mut out);
            }
            // Unknown payload types decode as opaque and are dropped here.
            _ => return out,
        }

        out.nack = self.schedule_nack(now);
        self.enforce_bound();
        out
    }

    fn handle_media(&mut self, packet: RtpPacket, out: &mut Processed) {
        let Some(last_seq) = self.last_seq else {
            // The first packet seeds the delivery cursor.
            self.last_seq = Some(packet.seq_num);
            out.delivered.push(packet.payload.clone());
            self.buffer.insert(packet.seq_num, packet);
            return;
        };

        let expected = last_seq.wrapping_add(1);

        if packet.seq_num == expected {
            self.deliver_and_drain(packet, out);
        } else if seq_before(expected, packet.seq_num) {
            // Forward gap: everything from the expected sequence up to
            // this packet is now missing, except what is already buffered.
            let mut newly_missing = 0;
            let mut seq = expected;
            while seq != packet.seq_num {
                if !self.buffer.contains_key(&seq) && self.missing.insert(seq) {
                    newly_missing += 1;
                }

                seq = seq.wrapping_add(1);
            }

            self.stats.lost += newly_missing;
            self.buffer.insert(packet.seq_num, packet);
        } else {
            // Late arrival from the trailing half-circle: either a packet
            // previously counted lost or a duplicate.
            if self.missing.remove(&packet.seq_num) {
                self.last_nack.remove(&packet.seq_num);
                self.stats.rtx_received += 1;
            } else {
                self.stats.out_of_order += 1;
            }

            self.buffer.insert(packet.seq_num, packet);
        }
    }

    fn handle_rtx(&mut self, packet: RtpPacket, out: &mut Processed) {
        let Some(original_seq) = packet.original_seq() else {
            return;
        };

        // Anything not currently missing is a duplicate of a packet we
        // already have; retransmissions deliver each sequence at most once.
        if !self.missing.contains(&original_seq) {
            return;
        }

        let Some(payload) = packet.rtx_payload() else {
            return;
        };

        self.missing.remove(&original_seq);
        self.last_nack.remove(&original_seq);
        self.stats.rtx_received += 1;

        let rebuilt =
            RtpPacket::new_media(PT_AUDIO, original_seq, packet.timestamp, packet.ssrc, payload);
        self.admit_recovered(rebuilt, out);
    }

    fn handle_fec(&mut self, packet: RtpPacket, out: &mut Processed) {
        let Some(members) = fec::group_members(self.options.fec_group_size, &packet) else {
            return;
        };

        // Groups are keyed by the explicit member list rather than derived
        // arithmetic, which stays unambiguous across the sequence wrap.
        let key = members[0];
        self.fec_groups.insert(key, packet);

        let Some(parity) = self.fec_groups.get(&key) else {
            return;
        };

        let available = members
            .iter()
            .filter_map(|seq| self.buffer.get(seq))
            .collect::<Vec<&RtpPacket>>();

        let Some(recovered) = fec::recover(self.options.fec_group_size, parity, &available) else {
            return;
        };

        if self.missing.contains(&recovered.seq_num) {
            self.fec_groups.remove(&key);
            self.missing.remove(&recovered.seq_num);
            self.last_nack.remove(&recovered.seq_num);
            self.admit_recovered(recovered, out);
        }
    }

    /// Admits a packet rebuilt from an RTX or a parity group. The sequence
    /// was missing, so it sits at or ahead of the delivery cursor.
    fn admit_recovered(&mut self, packet: RtpPacket, out: &mut Processed) {
        let expected = self.last_seq.map(|seq| seq.wrapping_add(1));
        if expected == Some(packet.seq_num) {
            self.deliver_and_drain(packet, out);
        } else {
            self.buffer.insert(packet.seq_num, packet);
        }
    }

    fn deliver_and_drain(&mut self, packet: RtpPacket, out: &mut Processed) {
        self.missing.remove(&packet.seq_num);
        self.last_nack.remove(&packet.seq_num);

        out.delivered.push(packet.payload.clone());
        self.last_seq = Some(packet.seq_num);
        self.buffer.insert(packet.seq_num, packet);

        // Delivered packets stay buffered for parity recovery; the cursor
        // is what marks them as consumed.
        while let Some(last_seq) = self.last_seq {
            let next = last_seq.wrapping_add(1);
            let Some(next_packet) = self.buffer.get(&next) else {
                break;
            };

            out.delivered.push(next_packet.payload.clone());
            self.last_seq = Some(next);
        }
    }

    /// Builds one NACK covering every missing sequence whose previous
    /// NACK, if any, is older than the suppression window.
    fn schedule_nack(&mut self, now: Instant) -> Option<RtpPacket> {
        if self.missing.is_empty() {
            return None;
        }

        let mut eligible = self
            .missing
            .iter()
            .copied()
            .filter(|seq| match self.last_nack.get(seq) {
                Some(sent_at) => now.saturating_duration_since(*sent_at) > self.options.nack_timeout,
                None => true,
            })
            .collect::<Vec<u16>>();

        if eligible.is_empty() {
            return None;
        }

        eligible.sort_unstable();
        for seq in &eligible {
            self.last_nack.insert(*seq, now);
        }

        self.stats.nacks_sent += 1;
        Some(RtpPacket::new_nack(&eligible, self.ssrc.unwrap_or(0)))
    }

    fn enforce_bound(&mut self) {
        while self.buffer.len() > self.options.buffer_size {
            let Some((seq, _)) = self.buffer.pop_first() else {
                break;
            };

            if self.missing.remove(&seq) {
                self.last_nack.remove(&seq);
            }
        }
    }
}
