//! Reliable-delivery transport sessions over unreliable datagrams.
//!
//! Each [`Endpoint`] owns one datagram socket and a registry of per-remote
//! [`Session`]s. A session provides sequencing, acknowledgement, reordering,
//! retransmission-on-request, keepalive, and a CLOSE/CLOSED teardown
//! handshake on top of raw datagrams.
//!
//! The layer is single-threaded, non-blocking, and poll-driven: the caller
//! feeds it socket readiness via [`Endpoint::on_datagram`] and drains ready
//! sessions via [`Endpoint::poll`]. Reads never block — they return data,
//! [`TransportError::WouldBlock`], or 0 at end of stream.

pub mod endpoint;
pub mod error;
pub mod memory;
pub mod session;
pub mod socket;
pub mod wire;

pub use endpoint::{Endpoint, SessionId};
pub use error::TransportError;
pub use memory::{MemoryNet, MemorySocket};
pub use session::SessionState;
pub use socket::DatagramSocket;
