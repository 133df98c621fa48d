//! Long-term node identity: load-or-generate key persistence.
//!
//! The node's identity is an Ed25519 key pair stored PEM-encoded at a
//! configurable path. The public identity is the Blake2b-256 fingerprint of
//! the public key — the same value other nodes learn for us when our secure
//! handshake completes.

use std::fs;
use std::path::Path;

use lattice_types::{KeyPair, PeerId};
use thiserror::Error;
use zeroize::Zeroize;

use crate::hash::fingerprint;
use crate::keys::{generate_keypair, keypair_from_seed};
use crate::pem::{pem_decode, pem_encode};

/// PEM label for the stored private key.
const PEM_LABEL: &str = "LATTICE PRIVATE KEY";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("key file IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("key file is not a valid PEM-encoded private key")]
    MalformedKeyFile,
}

/// The local node's long-term key pair and derived fingerprint.
pub struct LocalIdentity {
    pub keypair: KeyPair,
    pub id: PeerId,
}

impl std::fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalIdentity")
            .field("id", &self.id)
            .field("public", &self.keypair.public)
            .finish_non_exhaustive()
    }
}

impl LocalIdentity {
    /// Load the identity key from `path`, or generate and persist a fresh
    /// one if the file does not exist.
    pub fn load_or_generate(path: &Path) -> Result<Self, IdentityError> {
        let keypair = if path.exists() {
            let text = fs::read_to_string(path)?;
            let mut seed_bytes =
                pem_decode(PEM_LABEL, &text).ok_or(IdentityError::MalformedKeyFile)?;
            let seed: [u8; 32] = seed_bytes
                .as_slice()
                .try_into()
                .map_err(|_| IdentityError::MalformedKeyFile)?;
            seed_bytes.zeroize();
            tracing::debug!(path = %path.display(), "loaded identity key");
            keypair_from_seed(&seed)
        } else {
            let keypair = generate_keypair();
            write_key_file(path, &keypair.private.0)?;
            tracing::info!(path = %path.display(), "generated new identity key");
            keypair
        };

        let id = fingerprint(&keypair.public);
        Ok(Self { keypair, id })
    }
}

/// Write the private key PEM with owner-only permissions.
fn write_key_file(path: &Path, seed: &[u8; 32]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut text = pem_encode(PEM_LABEL, seed);
    fs::write(path, &text)?;
    text.zeroize();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_and_reloads_same_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.pem");

        let first = LocalIdentity::load_or_generate(&path).unwrap();
        assert!(path.exists());
        assert!(!first.id.is_unknown());

        let second = LocalIdentity::load_or_generate(&path).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.keypair.public, second.keypair.public);
    }

    #[test]
    fn distinct_paths_get_distinct_identities() {
        let dir = tempfile::tempdir().unwrap();
        let a = LocalIdentity::load_or_generate(&dir.path().join("a.pem")).unwrap();
        let b = LocalIdentity::load_or_generate(&dir.path().join("b.pem")).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn garbage_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.pem");
        fs::write(&path, "not a pem file").unwrap();

        let err = LocalIdentity::load_or_generate(&path).unwrap_err();
        assert!(matches!(err, IdentityError::MalformedKeyFile));
    }

    #[test]
    fn truncated_seed_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.pem");
        fs::write(&path, pem_encode(PEM_LABEL, &[1u8; 16])).unwrap();

        let err = LocalIdentity::load_or_generate(&path).unwrap_err();
        assert!(matches!(err, IdentityError::MalformedKeyFile));
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.pem");
        LocalIdentity::load_or_generate(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
