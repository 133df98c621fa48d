//! Handshake hello: an ephemeral key signed by the long-term identity.
//!
//! Each side of a new channel sends one fixed-size hello — the moral
//! equivalent of an ephemeral self-signed certificate. It binds a fresh
//! X25519 key to the sender's long-term Ed25519 identity with a signature
//! and a validity window generous enough to absorb clock drift between
//! peers (the window is regenerated per channel, ±1 hour).
//!
//! Wire layout, 144 bytes:
//! `{eph_x25519_pub: 32}{ed25519_pub: 32}{issued_at: u64 LE}{expires_at:
//! u64 LE}{signature: 64}`.

use lattice_crypto::{fingerprint, sign_message, verify_signature, LocalIdentity};
use lattice_types::{PeerId, PublicKey, Signature};

use crate::error::HandshakeError;

/// Total size of the hello blob on the wire.
pub const HELLO_LEN: usize = 32 + 32 + 8 + 8 + 64;

/// Clock-drift allowance on either side of "now".
const VALIDITY_SKEW_SECS: u64 = 3600;

/// Domain separator for hello signatures.
const SIGN_CONTEXT: &[u8] = b"lattice-hello-v1";

/// A parsed (not yet verified) handshake hello.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hello {
    pub eph_pub: [u8; 32],
    pub identity_key: PublicKey,
    pub issued_at: u64,
    pub expires_at: u64,
    pub signature: Signature,
}

impl Hello {
    /// Build and sign a hello for the given ephemeral public key.
    pub fn build(identity: &LocalIdentity, eph_pub: &[u8; 32], now: u64) -> Self {
        let issued_at = now.saturating_sub(VALIDITY_SKEW_SECS);
        let expires_at = now + VALIDITY_SKEW_SECS;
        let signature = sign_message(
            &signed_message(eph_pub, issued_at, expires_at),
            &identity.keypair.private,
        );
        Self {
            eph_pub: *eph_pub,
            identity_key: identity.keypair.public.clone(),
            issued_at,
            expires_at,
            signature,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HELLO_LEN);
        out.extend_from_slice(&self.eph_pub);
        out.extend_from_slice(self.identity_key.as_bytes());
        out.extend_from_slice(&self.issued_at.to_le_bytes());
        out.extend_from_slice(&self.expires_at.to_le_bytes());
        out.extend_from_slice(self.signature.as_bytes());
        out
    }

    /// Parse a hello blob. Only checks structure, not authenticity.
    pub fn decode(bytes: &[u8]) -> Result<Self, HandshakeError> {
        if bytes.len() != HELLO_LEN {
            return Err(HandshakeError::Malformed);
        }
        let mut eph_pub = [0u8; 32];
        eph_pub.copy_from_slice(&bytes[0..32]);
        let mut ident = [0u8; 32];
        ident.copy_from_slice(&bytes[32..64]);
        let issued_at = u64::from_le_bytes(bytes[64..72].try_into().expect("sized slice"));
        let expires_at = u64::from_le_bytes(bytes[72..80].try_into().expect("sized slice"));
        let signature = Signature::from_slice(&bytes[80..144]).ok_or(HandshakeError::Malformed)?;
        Ok(Self {
            eph_pub,
            identity_key: PublicKey(ident),
            issued_at,
            expires_at,
            signature,
        })
    }

    /// Verify authenticity and derive the sender's identity fingerprint.
    ///
    /// Rejects invalid signatures, validity windows that do not cover the
    /// local clock, and — the self-connection check — an identity equal to
    /// our own.
    pub fn verify(&self, local_id: &PeerId, now: u64) -> Result<PeerId, HandshakeError> {
        if now < self.issued_at || now > self.expires_at {
            return Err(HandshakeError::OutsideValidity);
        }
        if !verify_signature(
            &signed_message(&self.eph_pub, self.issued_at, self.expires_at),
            &self.signature,
            &self.identity_key,
        ) {
            return Err(HandshakeError::BadSignature);
        }
        let id = fingerprint(&self.identity_key);
        if id == *local_id {
            return Err(HandshakeError::SelfConnection);
        }
        Ok(id)
    }
}

fn signed_message(eph_pub: &[u8; 32], issued_at: u64, expires_at: u64) -> Vec<u8> {
    let mut msg = Vec::with_capacity(SIGN_CONTEXT.len() + 32 + 16);
    msg.extend_from_slice(SIGN_CONTEXT);
    msg.extend_from_slice(eph_pub);
    msg.extend_from_slice(&issued_at.to_le_bytes());
    msg.extend_from_slice(&expires_at.to_le_bytes());
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_crypto::LocalIdentity;

    fn identity(name: &str) -> LocalIdentity {
        let dir = tempfile::tempdir().unwrap();
        LocalIdentity::load_or_generate(&dir.path().join(format!("{name}.pem"))).unwrap()
    }

    #[test]
    fn encode_decode_roundtrip() {
        let ident = identity("a");
        let hello = Hello::build(&ident, &[7u8; 32], 10_000);
        let decoded = Hello::decode(&hello.encode()).unwrap();
        assert_eq!(decoded.eph_pub, hello.eph_pub);
        assert_eq!(decoded.identity_key, hello.identity_key);
        assert_eq!(decoded.issued_at, hello.issued_at);
        assert_eq!(decoded.expires_at, hello.expires_at);
    }

    #[test]
    fn verify_accepts_valid_hello_and_fingerprints_sender() {
        let a = identity("a");
        let b = identity("b");
        let hello = Hello::build(&a, &[7u8; 32], 10_000);
        let id = hello.verify(&b.id, 10_000).unwrap();
        assert_eq!(id, a.id);
    }

    #[test]
    fn verify_tolerates_clock_drift_within_skew() {
        let a = identity("a");
        let b = identity("b");
        let hello = Hello::build(&a, &[7u8; 32], 10_000);
        // Receiver clock half an hour behind or ahead.
        assert!(hello.verify(&b.id, 10_000 - 1800).is_ok());
        assert!(hello.verify(&b.id, 10_000 + 1800).is_ok());
    }

    #[test]
    fn verify_rejects_expired_hello() {
        let a = identity("a");
        let b = identity("b");
        let hello = Hello::build(&a, &[7u8; 32], 10_000);
        assert_eq!(
            hello.verify(&b.id, 10_000 + 3601),
            Err(HandshakeError::OutsideValidity)
        );
    }

    #[test]
    fn verify_rejects_tampered_ephemeral_key() {
        let a = identity("a");
        let b = identity("b");
        let mut hello = Hello::build(&a, &[7u8; 32], 10_000);
        hello.eph_pub[0] ^= 1;
        assert_eq!(
            hello.verify(&b.id, 10_000),
            Err(HandshakeError::BadSignature)
        );
    }

    #[test]
    fn verify_rejects_self_connection() {
        let a = identity("a");
        let hello = Hello::build(&a, &[7u8; 32], 10_000);
        assert_eq!(
            hello.verify(&a.id, 10_000),
            Err(HandshakeError::SelfConnection)
        );
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert_eq!(
            Hello::decode(&[0u8; HELLO_LEN - 1]),
            Err(HandshakeError::Malformed)
        );
    }
}
