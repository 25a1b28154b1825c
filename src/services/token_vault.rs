//! Seals the ledger bearer token before it goes into the session store.
//!
//! AES-256-GCM under a key stretched from the configured passphrase with
//! PBKDF2-HMAC-SHA256. Sealed form: hex of `[nonce (12 bytes)][ciphertext + tag]`.

use std::num::NonZeroU32;

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use secrecy::{ExposeSecret, Secret};

const PBKDF2_ITERATIONS: u32 = 100_000;
const KEY_LEN: usize = 32;

#[derive(thiserror::Error, Debug)]
pub enum VaultError {
    #[error("Sealing failed")]
    SealFailed,

    #[error("Sealed token is malformed")]
    Malformed,

    #[error("Sealed token could not be opened")]
    OpenFailed,
}

pub struct TokenVault {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl std::fmt::Debug for TokenVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenVault { .. }")
    }
}

impl TokenVault {
    pub fn new(passphrase: &Secret<String>, salt: &str) -> Self {
        let mut key_bytes = [0u8; KEY_LEN];
        let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).unwrap_or(NonZeroU32::MIN);
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            salt.as_bytes(),
            passphrase.expose_secret().as_bytes(),
            &mut key_bytes,
        );

        // A 32-byte key is always valid for AES-256-GCM
        let unbound = match UnboundKey::new(&AES_256_GCM, &key_bytes) {
            Ok(key) => key,
            Err(_) => unreachable!("AES-256-GCM key length is fixed"),
        };

        Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        }
    }

    pub fn seal(&self, token: &Secret<String>) -> Result<String, VaultError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| VaultError::SealFailed)?;

        let mut in_out = token.expose_secret().as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| VaultError::SealFailed)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&in_out);

        Ok(hex::encode(sealed))
    }

    pub fn open(&self, sealed: &str) -> Result<Secret<String>, VaultError> {
        let bytes = hex::decode(sealed).map_err(|_| VaultError::Malformed)?;
        if bytes.len() <= NONCE_LEN {
            return Err(VaultError::Malformed);
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| VaultError::Malformed)?;

        let mut in_out = ciphertext.to_vec();
        let plain = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| VaultError::OpenFailed)?;

        String::from_utf8(plain.to_vec())
            .map(Secret::new)
            .map_err(|_| VaultError::OpenFailed)
    }
}
