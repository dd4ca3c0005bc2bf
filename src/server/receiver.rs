use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::Result;
use parking_lot::Mutex;
use service::receiver::ReceiverSession;

use codec::RtpPacket;

use crate::{
    audio::WavSink,
    config::Config,
    server::transport::Transport,
    statistics::{Statistics, Stats},
};

/// Starts the receiver loop: decode inbound datagrams, run them through
/// the session state machine, write delivered payloads to the WAV sink
/// and answer with NACKs over the same socket.
pub fn start(
    config: &Arc<Config>,
    statistics: &Statistics,
    running: &Arc<AtomicBool>,
    session: &Arc<Mutex<ReceiverSession>>,
) -> Result<JoinHandle<()>> {
    let listen = if config.simulator.enabled {
        config.net.receiver_listen
    } else {
        config.net.receiver
    };

    let transport = Transport::bind(listen, Duration::from_secs(1))?;
    let mut sink = WavSink::create(&config.audio.output)?;

    log::info!(
        "receiver started: listen={listen}, output={}",
        config.audio.output.display()
    );

    let session = session.clone();
    let statistics = statistics.clone();
    let running = running.clone();

    Ok(thread::spawn(move || {
        let mut buf = vec![0u8; 2048];
        // The first datagram's source becomes the NACK destination.
        let mut sender_addr: Option<SocketAddr> = None;

        while running.load(Ordering::Relaxed) {
            let (size, addr) = match transport.recv(&mut buf) {
                Ok(Some(received)) => received,
                Ok(None) => continue,
                Err(e) => {
                    if !running.load(Ordering::Relaxed) {
                        break;
                    }

                    log::error!("receiver recv failed: {e}");
                    continue;
                }
            };

            statistics.add(&[Stats::ReceivedBytes(size), Stats::ReceivedPkts(1)]);

            let packet = match RtpPacket::decode(&buf[..size]) {
                Ok(packet) => packet,
                Err(e) => {
                    statistics.add(&[Stats::ErrorPkts(1)]);
                    log::warn!("undecodable datagram: from={addr}, error={e}");
                    continue;
                }
            };

            if sender_addr.is_none() {
                sender_addr = Some(addr);
                log::info!("stream source: addr={addr}, ssrc={:#010x}", packet.ssrc);
            }

            let out = session.lock().process(packet, Instant::now());

            for payload in &out.delivered {
                if let Err(e) = sink.write(payload) {
                    log::error!("wav write failed: {e}");
                }
            }

            if let Some(nack) = out.nack {
                if let Some(addr) = sender_addr {
                    let bytes = nack.to_bytes();
                    if transport.send(addr, &bytes) {
                        statistics.add(&[Stats::SendBytes(bytes.len()), Stats::SendPkts(1)]);
                    }
                }
            }
        }

        if let Err(e) = sink.finalize() {
            log::error!("wav finalize failed: {e}");
        }

        log::info!("receiver stopped");
    }))
}
