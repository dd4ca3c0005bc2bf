use std::{
    io::ErrorKind,
    net::{SocketAddr, UdpSocket},
    time::Duration,
};

use anyhow::Result;

/// Thin wrapper over one UDP socket.
///
/// Receives carry a bounded timeout so the owning loop can observe the
/// running flag between datagrams; sends never fail the session, they
/// log and report back.
pub struct Transport {
    socket: UdpSocket,
}

impl Transport {
    pub fn bind(listen: SocketAddr, timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(listen)?;
        socket.set_read_timeout(Some(timeout))?;

        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Sends one datagram. Failures are logged and swallowed; the
    /// return value only feeds the statistics counters.
    pub fn send(&self, to: SocketAddr, bytes: &[u8]) -> bool {
        match self.socket.send_to(bytes, to) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("udp send failed: to={to}, error={e}");
                false
            }
        }
    }

    /// Receives one datagram, `Ok(None)` when the timeout elapses.
    ///
    /// Note: An error will also be reported when the remote host is
    /// shut down; connection reset is folded into the timeout case so
    /// the loop keeps going.
    pub fn recv(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buf) {
            Ok((size, addr)) => Ok(Some((size, addr))),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::ConnectionReset
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
