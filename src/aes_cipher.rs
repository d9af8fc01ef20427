use std::sync::RwLock;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};

use crate::cipher::Cipher;
use crate::error::CipherError;

const KEY_BITS: usize = 256;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// AES-256-GCM token cipher.
///
/// Every encryption draws a fresh nonce, so the same tag never yields the
/// same token twice. Ciphertext layout is `nonce || sealed data`.
#[derive(Default)]
pub struct AesCipher {
    cipher: RwLock<Option<Aes256Gcm>>,
}

impl AesCipher {
    /// Creates a cipher without key material.
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for AesCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ready = self
            .cipher
            .read()
            .map(|guard| guard.is_some())
            .unwrap_or(false);
        f.debug_struct("AesCipher")
            .field("ready", &ready)
            .finish_non_exhaustive()
    }
}

impl Cipher for AesCipher {
    fn generate_key_pair(&self, bits: usize) -> std::result::Result<(), CipherError> {
        if bits != KEY_BITS {
            return Err(format!("unsupported key size {bits}, expected {KEY_BITS}").into());
        }
        let key = Aes256Gcm::generate_key(OsRng);
        let mut guard = self.cipher.write().expect("poisoned lock");
        *guard = Some(Aes256Gcm::new(&key));
        Ok(())
    }

    fn encrypt(&self, plaintext: &[u8]) -> std::result::Result<Vec<u8>, CipherError> {
        let guard = self.cipher.read().expect("poisoned lock");
        let cipher = guard.as_ref().ok_or("key not generated")?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|err| format!("encryption failed: {err}"))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> std::result::Result<Vec<u8>, CipherError> {
        if ciphertext.len() < NONCE_LEN + TAG_LEN {
            return Err("ciphertext too short".into());
        }
        let guard = self.cipher.read().expect("poisoned lock");
        let cipher = guard.as_ref().ok_or("key not generated")?;
        let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);
        cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| "authentication failed".into())
    }
}
