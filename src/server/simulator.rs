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
use bytes::Bytes;
use rand::Rng;

use crate::{config::Config, server::transport::Transport};

/// Toy impairment middlebox for demos.
///
/// Sits between sender and receiver on the media path and drops, delays,
/// duplicates and reorders datagrams at the configured rates. Datagrams
/// coming back from the downstream side are relayed to the remembered
/// upstream source unimpaired, so NACKs still find the sender.
pub fn start(config: &Arc<Config>, running: &Arc<AtomicBool>) -> Result<JoinHandle<()>> {
    let options = config.simulator.clone();
    let forward = config.net.receiver_listen;

    // The 5ms receive timeout doubles as the flush cadence for the
    // delay queue.
    let transport = Transport::bind(options.listen, Duration::from_millis(5))?;

    log::info!(
        "middlebox started: listen={}, forward={forward}, drop={}, delay={}, reorder={}, duplicate={}",
        options.listen,
        options.drop_rate,
        options.max_delay,
        options.reorder_rate,
        options.duplicate_rate
    );

    let running = running.clone();

    Ok(thread::spawn(move || {
        let mut rng = rand::rng();
        let mut queue: Vec<(Instant, Bytes)> = Vec::new();
        let mut upstream: Option<SocketAddr> = None;
        let mut buf = vec![0u8; 4096];

        while running.load(Ordering::Relaxed) {
            match transport.recv(&mut buf) {
                Ok(Some((size, addr))) => {
                    let from_upstream = match upstream {
                        Some(up) => addr == up,
                        None => {
                            upstream = Some(addr);
                            true
                        }
                    };

                    if !from_upstream {
                        // Control traffic from the receiver side goes
                        // straight back.
                        if let Some(up) = upstream {
                            transport.send(up, &buf[..size]);
                        }
                    } else if rng.random::<f64>() < options.drop_rate {
                        log::debug!("middlebox dropped a datagram: bytes={size}");
                    } else {
                        let delay = if options.max_delay > 0.0 {
                            Duration::from_secs_f64(rng.random_range(0.0..options.max_delay))
                        } else {
                            Duration::ZERO
                        };

                        let copies = if rng.random::<f64>() < options.duplicate_rate {
                            2
                        } else {
                            1
                        };

                        for _ in 0..copies {
                            queue.push((Instant::now() + delay, Bytes::copy_from_slice(&buf[..size])));

                            if options.reorder_rate > rng.random::<f64>() && queue.len() >= 2 {
                                let target = rng.random_range(0..queue.len());
                                let last = queue.len() - 1;
                                queue.swap(target, last);
                            }
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    if !running.load(Ordering::Relaxed) {
                        break;
                    }

                    log::error!("middlebox recv failed: {e}");
                }
            }

            let now = Instant::now();
            let mut index = 0;
            while index < queue.len() {
                if queue[index].0 <= now {
                    let (_, bytes) = queue.remove(index);
                    transport.send(forward, &bytes);
                } else {
                    index += 1;
                }
            }
        }

        log::info!("middlebox stopped");
    }))
}
