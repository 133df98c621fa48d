use thiserror::Error;

/// Fatal handshake failures. Each is fatal to its peer only.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("hello message is malformed")]
    Malformed,

    #[error("hello signature does not match the presented identity key")]
    BadSignature,

    #[error("hello validity window does not cover the current time")]
    OutsideValidity,

    #[error("peer presented our own identity (self-connection)")]
    SelfConnection,

    #[error("peer identity key is not a valid public key")]
    InvalidIdentityKey,

    #[error("record failed authenticated decryption")]
    RecordTampered,

    #[error("record length field exceeds the record ceiling")]
    OversizedRecord,
}

/// Command-frame violations on an established channel.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("command name longer than 255 bytes")]
    NameTooLong,

    #[error("command payload length {0} exceeds the limit")]
    OversizedPayload(u32),
}
