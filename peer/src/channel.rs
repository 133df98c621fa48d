//! The encrypted channel: handshake state machine + record layer.
//!
//! A channel is created in the `Handshaking` state and advanced by feeding
//! it bytes as they arrive from the transport — it never blocks and never
//! drives IO itself. Both sides send their hello immediately; the handshake
//! completes when the remote hello verifies. After that the channel speaks
//! length-prefixed ChaCha20-Poly1305 records with per-direction keys and
//! counter nonces.
//!
//! Record layout: `{u32 LE ciphertext_len}{ciphertext}`. A record whose
//! plaintext is empty is a close notice (the graceful-shutdown analogue of
//! TLS close_notify).

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use lattice_crypto::{blake2b_256_multi, LocalIdentity};
use lattice_types::{PeerId, PublicKey};

use crate::error::HandshakeError;
use crate::handshake::{Hello, HELLO_LEN};

/// Largest plaintext carried by a single record. One command frame up to
/// this size is delivered to the transport as one coalesced write.
pub const MAX_RECORD_PLAINTEXT: usize = 16 * 1024;

/// Poly1305 tag length.
const TAG_LEN: usize = 16;

/// Context string for channel key derivation.
const KDF_CONTEXT: &[u8] = b"lattice-channel-v1";

/// Explicit handshake state, decoupled from any library's non-blocking
/// conventions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeState {
    Handshaking,
    Established,
    Failed,
}

/// What a call to [`SecureChannel::advance`] accomplished.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ChannelProgress {
    /// The handshake completed during this call.
    pub established: bool,
    /// The peer sent a graceful close notice.
    pub close_notify: bool,
}

/// One end of an authenticated encrypted channel.
pub struct SecureChannel {
    state: HandshakeState,
    eph_secret: Option<StaticSecret>,
    eph_pub: [u8; 32],
    hello: Vec<u8>,
    /// Raw bytes fed from the transport, not yet consumed.
    rx: Vec<u8>,
    /// Decrypted stream awaiting the command framer.
    plaintext: Vec<u8>,
    send_cipher: Option<ChaCha20Poly1305>,
    recv_cipher: Option<ChaCha20Poly1305>,
    send_counter: u64,
    recv_counter: u64,
    remote_id: PeerId,
    remote_identity_key: Option<PublicKey>,
}

impl SecureChannel {
    /// Create a channel and its hello. The caller must send
    /// [`SecureChannel::hello_bytes`] over the transport exactly once.
    pub fn new(identity: &LocalIdentity, now: u64) -> Self {
        let eph_secret = StaticSecret::random_from_rng(OsRng);
        let eph_pub = *X25519Public::from(&eph_secret).as_bytes();
        let hello = Hello::build(identity, &eph_pub, now).encode();
        Self {
            state: HandshakeState::Handshaking,
            eph_secret: Some(eph_secret),
            eph_pub,
            hello,
            rx: Vec::new(),
            plaintext: Vec::new(),
            send_cipher: None,
            recv_cipher: None,
            send_counter: 0,
            recv_counter: 0,
            remote_id: PeerId::UNKNOWN,
            remote_identity_key: None,
        }
    }

    /// Our hello blob, to be written to the transport at channel creation.
    pub fn hello_bytes(&self) -> &[u8] {
        &self.hello
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_established(&self) -> bool {
        self.state == HandshakeState::Established
    }

    /// The peer's proven identity; zeroed until the handshake completes.
    pub fn remote_id(&self) -> PeerId {
        self.remote_id
    }

    /// The peer's long-term public key (its "certificate"), once proven.
    pub fn remote_identity_key(&self) -> Option<&PublicKey> {
        self.remote_identity_key.as_ref()
    }

    /// Append bytes received from the transport.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.rx.extend_from_slice(bytes);
    }

    /// Advance the state machine as far as the buffered bytes allow.
    ///
    /// Errors are fatal to this channel: the caller should disconnect the
    /// peer. Progress may include both handshake completion and decrypted
    /// records in a single call when bytes arrived back-to-back.
    pub fn advance(
        &mut self,
        identity: &LocalIdentity,
        now: u64,
    ) -> Result<ChannelProgress, HandshakeError> {
        let mut progress = ChannelProgress::default();

        if self.state == HandshakeState::Failed {
            return Err(HandshakeError::Malformed);
        }

        if self.state == HandshakeState::Handshaking {
            if self.rx.len() < HELLO_LEN {
                return Ok(progress);
            }
            let hello_bytes: Vec<u8> = self.rx.drain(..HELLO_LEN).collect();
            let result = Hello::decode(&hello_bytes)
                .and_then(|hello| hello.verify(&identity.id, now).map(|id| (hello, id)));
            let (hello, id) = match result {
                Ok(ok) => ok,
                Err(e) => {
                    self.state = HandshakeState::Failed;
                    return Err(e);
                }
            };
            self.complete_handshake(&hello, id)?;
            progress.established = true;
        }

        // Established (possibly just now): drain complete records.
        while let Some(record) = self.next_record()? {
            if record.is_empty() {
                progress.close_notify = true;
            } else {
                self.plaintext.extend_from_slice(&record);
            }
        }
        Ok(progress)
    }

    /// Encrypt one plaintext chunk into a wire record.
    ///
    /// Panics in debug builds if called before the handshake completes or
    /// with an oversized chunk; callers chunk at [`MAX_RECORD_PLAINTEXT`].
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        debug_assert!(plaintext.len() <= MAX_RECORD_PLAINTEXT);
        let cipher = self
            .send_cipher
            .as_ref()
            .ok_or(HandshakeError::Malformed)?;
        let nonce = counter_nonce(self.send_counter);
        self.send_counter += 1;
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| HandshakeError::RecordTampered)?;
        let mut out = Vec::with_capacity(4 + ciphertext.len());
        out.extend_from_slice(&(ciphertext.len() as u32).to_le_bytes());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// The graceful-shutdown record (empty plaintext).
    pub fn seal_close_notify(&mut self) -> Result<Vec<u8>, HandshakeError> {
        self.seal(&[])
    }

    /// Take everything decrypted so far.
    pub fn take_plaintext(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.plaintext)
    }

    fn complete_handshake(&mut self, hello: &Hello, id: PeerId) -> Result<(), HandshakeError> {
        let Some(eph_secret) = self.eph_secret.take() else {
            return Err(HandshakeError::Malformed);
        };
        let shared = eph_secret.diffie_hellman(&X25519Public::from(hello.eph_pub));
        let send_key = blake2b_256_multi(&[shared.as_bytes(), KDF_CONTEXT, &self.eph_pub]);
        let recv_key = blake2b_256_multi(&[shared.as_bytes(), KDF_CONTEXT, &hello.eph_pub]);
        self.send_cipher =
            Some(ChaCha20Poly1305::new_from_slice(&send_key).expect("valid key length"));
        self.recv_cipher =
            Some(ChaCha20Poly1305::new_from_slice(&recv_key).expect("valid key length"));
        self.remote_id = id;
        self.remote_identity_key = Some(hello.identity_key.clone());
        self.state = HandshakeState::Established;
        tracing::debug!(peer = %id, "secure channel established");
        Ok(())
    }

    /// Decrypt the next complete record from the receive buffer, if any.
    fn next_record(&mut self) -> Result<Option<Vec<u8>>, HandshakeError> {
        if self.rx.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_le_bytes(self.rx[0..4].try_into().expect("sized slice")) as usize;
        if len < TAG_LEN || len > MAX_RECORD_PLAINTEXT + TAG_LEN {
            self.state = HandshakeState::Failed;
            return Err(HandshakeError::OversizedRecord);
        }
        if self.rx.len() < 4 + len {
            return Ok(None);
        }
        let cipher = self
            .recv_cipher
            .as_ref()
            .ok_or(HandshakeError::Malformed)?;
        let nonce = counter_nonce(self.recv_counter);
        let plaintext = cipher
            .decrypt(&nonce, &self.rx[4..4 + len])
            .map_err(|_| HandshakeError::RecordTampered);
        let plaintext = match plaintext {
            Ok(p) => p,
            Err(e) => {
                self.state = HandshakeState::Failed;
                return Err(e);
            }
        };
        self.recv_counter += 1;
        self.rx.drain(..4 + len);
        Ok(Some(plaintext))
    }
}

/// 96-bit nonce holding a little-endian record counter.
fn counter_nonce(counter: u64) -> Nonce {
    let mut bytes = [0u8; 12];
    bytes[..8].copy_from_slice(&counter.to_le_bytes());
    Nonce::from(bytes)
}
