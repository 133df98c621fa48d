use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("identity error: {0}")]
    Identity(#[from] lattice_crypto::IdentityError),

    #[error("transport error: {0}")]
    Transport(#[from] lattice_transport::TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
