//! # Message Encryption
//!
//! Every datagram and every push-pull frame passes through a [`Cipher`] before it leaves
//! the node and after it arrives. [`Plaintext`] is used when no cluster key is configured,
//! [`ChaChaCipher`] otherwise.
use std::fmt;

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, CHACHA20_POLY1305, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use snafu::location;

use crate::error::{Error, Result};

/// Symmetric encryption applied to outbound and inbound payloads.
pub trait Cipher: Send + Sync + fmt::Debug {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Leaves payloads untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct Plaintext;

impl Cipher for Plaintext {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }
}

/// ChaCha20-Poly1305 with a shared cluster key.
///
/// Output layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
pub struct ChaChaCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl ChaChaCipher {
    pub fn new(secret_key: &[u8; 32]) -> Result<Self> {
        let unbound = UnboundKey::new(&CHACHA20_POLY1305, secret_key).map_err(|_| Error::Crypto {
            message: "invalid key".to_string(),
            location: location!(),
        })?;

        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }
}

impl Cipher for ChaChaCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng.fill(&mut nonce_bytes).map_err(|_| Error::Crypto {
            message: "nonce generation failed".to_string(),
            location: location!(),
        })?;

        let mut output = Vec::with_capacity(NONCE_LEN + plaintext.len() + 16);
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(plaintext);

        let tag = self
            .key
            .seal_in_place_separate_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut output[NONCE_LEN..],
            )
            .map_err(|_| Error::Crypto {
                message: "seal failed".to_string(),
                location: location!(),
            })?;
        output.extend_from_slice(tag.as_ref());

        Ok(output)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_LEN + CHACHA20_POLY1305.tag_len() {
            return Err(Error::Crypto {
                message: "ciphertext too short".to_string(),
                location: location!(),
            });
        }

        let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| Error::Crypto {
            message: "invalid nonce".to_string(),
            location: location!(),
        })?;

        let mut buffer = sealed.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut buffer)
            .map_err(|_| Error::Crypto {
                message: "authentication failed".to_string(),
                location: location!(),
            })?;

        Ok(plaintext.to_vec())
    }
}

impl fmt::Debug for ChaChaCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChaChaCipher").finish_non_exhaustive()
    }
}
