use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::Result;
use bytes::Bytes;
use codec::{PT_NACK, RtpPacket};
use parking_lot::Mutex;
use service::sender::{SenderOptions, SenderSession};

use crate::{
    audio::WavSource,
    config::Config,
    server::transport::Transport,
    statistics::{Statistics, Stats},
};

/// Where the cadence takes its payload chunks from.
enum PayloadSource {
    Wav(WavSource),
    Synthetic(u64),
}

impl PayloadSource {
    fn next(&mut self) -> Option<Bytes> {
        match self {
            Self::Wav(source) => source.next_frame(),
            Self::Synthetic(count) => {
                let payload = Bytes::from(format!("Packet {count} data"));
                *count += 1;
                Some(payload)
            }
        }
    }
}

/// Starts the sender half: the cadence thread emitting media and parity
/// packets, and the NACK listener answering with retransmissions on the
/// same socket.
pub fn start(
    config: &Arc<Config>,
    statistics: &Statistics,
    running: &Arc<AtomicBool>,
) -> Result<Vec<JoinHandle<()>>> {
    let dest = if config.simulator.enabled {
        config.simulator.listen
    } else {
        config.net.receiver
    };

    let mut source = match &config.audio.input {
        Some(path) => PayloadSource::Wav(WavSource::open(path)?),
        None => PayloadSource::Synthetic(0),
    };

    // The listener shares the cadence socket, so retransmissions come
    // from the same address the receiver already knows.
    let transport = Arc::new(Transport::bind(config.net.sender, Duration::from_millis(100))?);
    let local_addr = transport.local_addr()?;

    let session = Arc::new(Mutex::new(SenderSession::new(SenderOptions {
        ssrc: rand::random::<u32>(),
        initial_seq: 0,
        initial_timestamp: 0,
        timestamp_increment: config.stream.timestamp_increment,
        fec_group_size: config.stream.fec_group_size,
        history_size: config.stream.history_size,
    })));

    log::info!(
        "sender started: listen={local_addr}, dest={dest}, ssrc={:#010x}",
        session.lock().ssrc()
    );

    let mut handles = Vec::with_capacity(2);

    {
        let transport = transport.clone();
        let session = session.clone();
        let statistics = statistics.clone();
        let running = running.clone();
        let interval = Duration::from_secs_f64(config.stream.interval);
        let duration = Duration::from_secs_f64(config.stream.duration);

        handles.push(thread::spawn(move || {
            let started = Instant::now();
            let mut count = 0u64;

            while running.load(Ordering::Relaxed) {
                let Some(payload) = source.next() else {
                    break;
                };

                let (media, parity) = session.lock().next_media(payload);

                let bytes = media.to_bytes();
                if transport.send(dest, &bytes) {
                    statistics.add(&[Stats::SendBytes(bytes.len()), Stats::SendPkts(1)]);
                }

                // Parity rides immediately behind the last member of its
                // group and is never cached for retransmission.
                if let Some(parity) = parity {
                    let bytes = parity.to_bytes();
                    if transport.send(dest, &bytes) {
                        statistics.add(&[Stats::SendBytes(bytes.len()), Stats::SendPkts(1)]);
                    }
                }

                count += 1;
                if started.elapsed() >= duration {
                    break;
                }

                thread::sleep(interval);
            }

            // The cadence finishing ends the whole session.
            running.store(false, Ordering::Relaxed);
            log::info!("sender stopped: packets={count}");
        }));
    }

    {
        let transport = transport.clone();
        let session = session.clone();
        let statistics = statistics.clone();
        let running = running.clone();

        handles.push(thread::spawn(move || {
            let mut buf = vec![0u8; 2048];

            while running.load(Ordering::Relaxed) {
                let (size, addr) = match transport.recv(&mut buf) {
                    Ok(Some(received)) => received,
                    Ok(None) => continue,
                    Err(e) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }

                        log::error!("nack listener recv failed: {e}");
                        continue;
                    }
                };

                statistics.add(&[Stats::ReceivedBytes(size), Stats::ReceivedPkts(1)]);

                match RtpPacket::decode(&buf[..size]) {
                    Ok(packet) if packet.payload_type == PT_NACK => {
                        let retransmissions = session.lock().handle_nack(&packet);
                        log::debug!(
                            "nack received: from={addr}, retransmitting={}",
                            retransmissions.len()
                        );

                        for rtx in retransmissions {
                            let bytes = rtx.to_bytes();
                            if transport.send(addr, &bytes) {
                                statistics.add(&[Stats::SendBytes(bytes.len()), Stats::SendPkts(1)]);
                            }
                        }
                    }
                    // Anything that is not a NACK has no business on the
                    // sender's socket.
                    Ok(_) => {}
                    Err(e) => {
                        statistics.add(&[Stats::ErrorPkts(1)]);
                        log::warn!("undecodable datagram: from={addr}, error={e}");
                    }
                }
            }
        }));
    }

    Ok(handles)
}
