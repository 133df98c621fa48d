//! Datagram socket abstraction.
//!
//! The transport core never blocks on IO, so the seam it needs from a socket
//! is narrow: a non-blocking receive attempt and a fire-and-forget send.
//! Implementations exist for `std` (nonblocking mode) and tokio UDP sockets,
//! plus an in-memory network in [`crate::memory`].

use std::io;
use std::net::SocketAddr;

/// A non-blocking datagram socket.
pub trait DatagramSocket {
    /// Send one datagram to `addr`.
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize>;

    /// Try to receive one datagram. Must return `ErrorKind::WouldBlock`
    /// when nothing is pending rather than blocking.
    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// The local address the socket is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// `std` sockets must be put into nonblocking mode by the caller
/// (`UdpSocket::set_nonblocking(true)`) before being handed to an endpoint.
impl DatagramSocket for std::net::UdpSocket {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        std::net::UdpSocket::send_to(self, buf, addr)
    }

    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.recv_from(buf)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        std::net::UdpSocket::local_addr(self)
    }
}

impl DatagramSocket for tokio::net::UdpSocket {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.try_send_to(buf, addr)
    }

    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        tokio::net::UdpSocket::try_recv_from(self, buf)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        tokio::net::UdpSocket::local_addr(self)
    }
}
