//! Secure session / identity layer.
//!
//! One authenticated, encrypted command channel per transport session. A
//! peer's identity is the Blake2b-256 fingerprint of its long-term public
//! key, proven during the handshake; it stays zeroed until then. Named
//! commands are framed over the decrypted byte stream and dispatched to
//! registered handlers.

pub mod channel;
pub mod command;
pub mod error;
pub mod handshake;
pub mod registry;

pub use channel::{ChannelProgress, HandshakeState, SecureChannel};
pub use command::{encode_command, CommandFrame, CommandReader};
pub use error::{CommandError, HandshakeError};
pub use handshake::Hello;
pub use registry::{CommandContext, CommandHandler, Effect, PeerInfo, PeerNetwork};
