mod receiver;
mod sender;
mod simulator;
pub mod transport;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::Result;
use parking_lot::Mutex;
use service::receiver::{ReceiverOptions, ReceiverSession};

use crate::{
    config::Config,
    statistics::{Number, Statistics},
};

/// Runs one streaming session to completion.
///
/// Spawns the configured halves as OS threads around blocking sockets,
/// then parks on the async side until the cadence finishes, the duration
/// elapses, or the user interrupts. Shutdown clears the running flag and
/// joins; every loop wakes at its receive timeout and observes the flag.
pub async fn start(config: &Arc<Config>, statistics: &Statistics) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let mut handles = Vec::new();

    if config.simulator.enabled {
        handles.push(simulator::start(config, &running)?);
    }

    let session = Arc::new(Mutex::new(ReceiverSession::new(ReceiverOptions {
        buffer_size: config.stream.buffer_size,
        fec_group_size: config.stream.fec_group_size,
        nack_timeout: Duration::from_secs_f64(config.stream.nack_timeout),
    })));

    if config.mode.is_receiver() {
        handles.push(receiver::start(config, statistics, &running, &session)?);
    }

    if config.mode.is_sender() {
        handles.extend(sender::start(config, statistics, &running)?);
    }

    if config.mode.is_sender() {
        // The cadence thread clears the flag when it is done.
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupted");
            }
            _ = wait_done(&running) => {}
        }
    } else {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupted");
            }
            _ = tokio::time::sleep(Duration::from_secs_f64(config.stream.duration)) => {}
        }
    }

    running.store(false, Ordering::Relaxed);
    for handle in handles {
        let _ = handle.join();
    }

    report(config, statistics, &session);
    Ok(())
}

async fn wait_done(running: &Arc<AtomicBool>) {
    while running.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn report(config: &Arc<Config>, statistics: &Statistics, session: &Arc<Mutex<ReceiverSession>>) {
    let counts = statistics.counts();
    println!(
        "transport: sent {} packets / {} bytes, received {} packets / {} bytes, {} undecodable",
        counts.send_pkts.get(),
        counts.send_bytes.get(),
        counts.received_pkts.get(),
        counts.received_bytes.get(),
        counts.error_pkts.get(),
    );

    if config.mode.is_receiver() {
        let stats = session.lock().stats();
        println!("stream statistics:");
        println!("  received:        {}", stats.received);
        println!("  lost:            {}", stats.lost);
        println!("  out of order:    {}", stats.out_of_order);
        println!("  nacks sent:      {}", stats.nacks_sent);
        println!("  rtx received:    {}", stats.rtx_received);
        println!("  loss rate:       {:.2}%", stats.loss_rate() * 100.0);
    }
}
