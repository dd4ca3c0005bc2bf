use std::time::{Duration, Instant};

use anyhow::Result;
use rtp_stream::server::transport::Transport;

#[test]
fn test_udp_socket_pair() -> Result<()> {
    let listen = "127.0.0.1:0".parse()?;
    let a = Transport::bind(listen, Duration::from_millis(100))?;
    let b = Transport::bind(listen, Duration::from_millis(100))?;

    assert!(b.send(a.local_addr()?, b"hello"));

    let mut buf = [0u8; 64];
    let (size, src) = a.recv(&mut buf)?.expect("datagram arrives on loopback");
    assert_eq!(&buf[..size], b"hello");
    assert_eq!(src, b.local_addr()?);

    // An idle socket comes back empty once the timeout elapses.
    let started = Instant::now();
    assert!(a.recv(&mut buf)?.is_none());
    assert!(started.elapsed() >= Duration::from_millis(50));

    Ok(())
}
