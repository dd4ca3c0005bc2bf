use std::time::{Duration, Instant};

use bytes::Bytes;
use codec::{PT_AUDIO, RtpPacket};
use rtp_stream_service::{
    receiver::{ReceiverOptions, ReceiverSession},
    retransmission::RetransmissionCache,
    sender::{SenderOptions, SenderSession},
};

const SSRC: u32 = 0x1234;

fn sender(initial_seq: u16, fec_group_size: usize) -> SenderSession {
    SenderSession::new(SenderOptions {
        ssrc: SSRC,
        initial_seq,
        initial_timestamp: 0,
        timestamp_increment: 160,
        fec_group_size,
        history_size: 1000,
    })
}

fn receiver(buffer_size: usize, fec_group_size: usize) -> ReceiverSession {
    ReceiverSession::new(ReceiverOptions {
        buffer_size,
        fec_group_size,
        nack_timeout: Duration::from_millis(100),
    })
}

fn payload(index: usize) -> Bytes {
    Bytes::from(format!("P{index}"))
}

/// Runs a sender long enough to produce `count` media packets, keeping
/// the parity packet emitted after each full group alongside its last
/// member.
fn stream(session: &mut SenderSession, count: usize) -> Vec<(RtpPacket, Option<RtpPacket>)> {
    (0..count).map(|i| session.next_media(payload(i))).collect()
}

#[test]
fn test_in_order_delivery() {
    let mut tx = sender(0, 1024);
    let mut rx = receiver(1000, 1024);
    let now = Instant::now();

    let mut delivered = Vec::new();
    for (media, parity) in stream(&mut tx, 10) {
        assert!(parity.is_none());

        let out = rx.process(media, now);
        assert!(out.nack.is_none());
        delivered.extend(out.delivered);
    }

    let expected = (0..10).map(payload).collect::<Vec<_>>();
    assert_eq!(delivered, expected);

    let stats = rx.stats();
    assert_eq!(stats.received, 10);
    assert_eq!(stats.lost, 0);
    assert_eq!(stats.out_of_order, 0);
    assert_eq!(stats.nacks_sent, 0);
}

#[test]
fn test_fec_recovers_single_loss() {
    let mut tx = sender(0, 4);
    let mut rx = receiver(1000, 4);
    let now = Instant::now();

    let packets = stream(&mut tx, 4);
    let parity = packets[3].1.clone().expect("group of four emits parity");

    let mut delivered = Vec::new();
    for (index, (media, _)) in packets.into_iter().enumerate() {
        if index == 2 {
            continue;
        }

        delivered.extend(rx.process(media, now).delivered);
    }

    // The gap behind packet 3 is on the books until the parity lands.
    assert_eq!(rx.stats().lost, 1);
    assert!(rx.is_missing(2));

    delivered.extend(rx.process(parity, now).delivered);

    let expected = (0..4).map(payload).collect::<Vec<_>>();
    assert_eq!(delivered, expected);
    assert!(!rx.is_missing(2));
    assert_eq!(rx.missing_len(), 0);
    // Parity recovery is not a retransmission.
    assert_eq!(rx.stats().rtx_received, 0);
}

#[test]
fn test_nack_then_rtx() {
    let mut tx = sender(0, 1024);
    let mut rx = receiver(1000, 1024);
    let now = Instant::now();

    let mut delivered = Vec::new();
    let mut nacks = Vec::new();
    for (index, (media, _)) in stream(&mut tx, 10).into_iter().enumerate() {
        if index == 5 {
            continue;
        }

        let out = rx.process(media, now);
        delivered.extend(out.delivered);
        nacks.extend(out.nack);
    }

    // One NACK for the gap, emitted when the first later packet arrived;
    // the rest of the run is inside the suppression window.
    assert_eq!(nacks.len(), 1);
    assert_eq!(nacks[0].nack_sequence_numbers().unwrap(), vec![5]);
    assert_eq!(nacks[0].ssrc, SSRC);

    let retransmissions = tx.handle_nack(&nacks[0]);
    assert_eq!(retransmissions.len(), 1);
    assert_eq!(retransmissions[0].original_seq(), Some(5));

    let rtx = retransmissions[0].clone();
    delivered.extend(rx.process(rtx.clone(), now).delivered);

    let expected = (0..10).map(payload).collect::<Vec<_>>();
    assert_eq!(delivered, expected);
    assert_eq!(rx.stats().rtx_received, 1);

    // A duplicate retransmission no longer matches anything missing.
    let out = rx.process(rtx, now);
    assert!(out.delivered.is_empty());
    assert_eq!(rx.stats().rtx_received, 1);
}

#[test]
fn test_nack_suppression_window() {
    let mut tx = sender(0, 1024);
    let mut rx = receiver(1000, 1024);
    let t0 = Instant::now();

    let packets = stream(&mut tx, 10);

    for index in 0..5 {
        rx.process(packets[index].0.clone(), t0);
    }

    // Drop 5; 6, 7 and 8 arrive within 50ms of each other.
    let mut nacks = 0;
    for (offset, index) in [(0u64, 6usize), (25, 7), (50, 8)] {
        let out = rx.process(packets[index].0.clone(), t0 + Duration::from_millis(offset));
        nacks += out.nack.iter().count();
    }

    assert_eq!(nacks, 1);
    assert_eq!(rx.stats().nacks_sent, 1);

    // Once the window has elapsed the next arrival re-arms the NACK.
    let out = rx.process(packets[9].0.clone(), t0 + Duration::from_millis(200));
    assert!(out.nack.is_some());
    assert_eq!(rx.stats().nacks_sent, 2);
}

#[test]
fn test_sequence_wrap_around() {
    let mut tx = sender(65534, 1024);
    let mut rx = receiver(1000, 1024);
    let now = Instant::now();

    let mut delivered = Vec::new();
    let packets = stream(&mut tx, 5);
    let seqs = packets.iter().map(|(p, _)| p.seq_num).collect::<Vec<_>>();
    assert_eq!(seqs, vec![65534, 65535, 0, 1, 2]);

    for (media, _) in packets {
        let out = rx.process(media, now);
        assert!(out.nack.is_none());
        delivered.extend(out.delivered);
    }

    assert_eq!(delivered, (0..5).map(payload).collect::<Vec<_>>());

    let stats = rx.stats();
    assert_eq!(stats.lost, 0);
    assert_eq!(stats.out_of_order, 0);
}

#[test]
fn test_wrap_around_gap() {
    let mut tx = sender(65534, 1024);
    let mut rx = receiver(1000, 1024);
    let now = Instant::now();

    let packets = stream(&mut tx, 5);

    // Drop 65535 and 0; the gap range crosses the wrap.
    rx.process(packets[0].0.clone(), now);
    let out = rx.process(packets[3].0.clone(), now);

    assert_eq!(rx.stats().lost, 2);
    assert!(rx.is_missing(65535));
    assert!(rx.is_missing(0));
    assert_eq!(out.nack.unwrap().nack_sequence_numbers().unwrap(), vec![0, 65535]);
}

#[test]
fn test_reorder_buffer_bound() {
    let mut rx = receiver(4, 1024);
    let now = Instant::now();

    let media = |seq: u16| RtpPacket::new_media(PT_AUDIO, seq, 0, SSRC, payload(seq as usize));

    let out = rx.process(media(10), now);
    assert_eq!(out.delivered.len(), 1);

    for seq in 100..=120u16 {
        rx.process(media(seq), now);
        assert!(rx.buffered_len() <= 4);
    }

    // The full gap is counted lost exactly once and survives eviction.
    assert_eq!(rx.stats().lost, 89);
    assert_eq!(rx.missing_len(), 89);
}

#[test]
fn test_duplicates_deliver_at_most_once() {
    let mut tx = sender(0, 1024);
    let mut rx = receiver(1000, 1024);
    let now = Instant::now();

    let packets = stream(&mut tx, 3);

    let mut delivered = Vec::new();
    for (media, _) in &packets {
        delivered.extend(rx.process(media.clone(), now).delivered);
    }

    // A late duplicate of a delivered packet is buffered but never
    // delivered again.
    let out = rx.process(packets[1].0.clone(), now);
    assert!(out.delivered.is_empty());
    assert_eq!(rx.stats().out_of_order, 1);
    assert_eq!(delivered.len(), 3);
}

#[test]
fn test_fec_and_rtx_do_not_double_deliver() {
    let mut tx = sender(0, 4);
    let mut rx = receiver(1000, 4);
    let now = Instant::now();

    let packets = stream(&mut tx, 4);
    let parity = packets[3].1.clone().unwrap();

    let mut nack = None;
    let mut delivered = Vec::new();
    for (index, (media, _)) in packets.into_iter().enumerate() {
        if index == 2 {
            continue;
        }

        let out = rx.process(media, now);
        delivered.extend(out.delivered);
        nack = out.nack.or(nack);
    }

    // Parity wins the race; the retransmission then arrives for a
    // sequence that is no longer missing and is dropped.
    delivered.extend(rx.process(parity, now).delivered);
    assert_eq!(delivered.len(), 4);

    let retransmissions = tx.handle_nack(&nack.unwrap());
    for rtx in retransmissions {
        assert!(rx.process(rtx, now).delivered.is_empty());
    }

    assert_eq!(rx.stats().rtx_received, 0);
}

#[test]
fn test_retransmission_cache_bound() {
    let mut cache = RetransmissionCache::new(5);

    for seq in 0..10u16 {
        cache.push(&RtpPacket::new_media(PT_AUDIO, seq, 0, SSRC, payload(seq as usize)));
        assert!(cache.len() <= 5);
    }

    // The retained sequence numbers are a suffix of the emitted stream.
    for seq in 0..5u16 {
        assert!(!cache.contains(seq));
    }

    for seq in 5..10u16 {
        assert!(cache.contains(seq));
    }

    assert!(cache.handle_nack(&[0, 1, 2]).is_empty());

    // Retransmissions themselves never enter the history.
    let rtx = RtpPacket::new_rtx(&RtpPacket::new_media(PT_AUDIO, 99, 0, SSRC, Bytes::new()));
    cache.push(&rtx);
    assert!(!cache.contains(99));
}

#[test]
fn test_fec_parity_pads_short_payloads() {
    let mut tx = sender(0, 3);
    let mut rx = receiver(1000, 3);
    let now = Instant::now();

    let (first, _) = tx.next_media(Bytes::from_static(b"wxyz"));
    let (_short, _) = tx.next_media(Bytes::from_static(b"ab"));
    let (third, parity) = tx.next_media(Bytes::from_static(b"cd"));
    let parity = parity.unwrap();

    // Lose the short member; it comes back padded to the parity length.
    rx.process(first, now);
    rx.process(third, now);
    let out = rx.process(parity, now);

    assert_eq!(out.delivered.len(), 2);
    assert_eq!(out.delivered[0].as_ref(), b"ab\0\0");
    assert_eq!(out.delivered[1].as_ref(), b"cd");
}
