use crate::error::{CipherError, Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Crypto collaborator used to mint and open tokens.
pub trait Cipher: Send + Sync {
    /// Generates the key material. Called once when the registry is built.
    fn generate_key_pair(&self, bits: usize) -> std::result::Result<(), CipherError>;

    /// Encrypts `plaintext`.
    fn encrypt(&self, plaintext: &[u8]) -> std::result::Result<Vec<u8>, CipherError>;

    /// Decrypts `ciphertext`.
    fn decrypt(&self, ciphertext: &[u8]) -> std::result::Result<Vec<u8>, CipherError>;
}

/// Mints a token for `tag`.
pub(crate) fn issue_token(cipher: &dyn Cipher, tag: &str) -> Result<String> {
    let sealed = cipher.encrypt(tag.as_bytes()).map_err(Error::Cipher)?;
    Ok(STANDARD.encode(sealed))
}

/// Recovers the tag a token was minted for.
pub(crate) fn open_token(cipher: &dyn Cipher, token: &str) -> Result<String> {
    let sealed = STANDARD
        .decode(token)
        .map_err(|err| Error::InvalidToken(format!("not base64: {err}")))?;
    let tag = cipher
        .decrypt(&sealed)
        .map_err(|err| Error::InvalidToken(err.to_string()))?;
    String::from_utf8(tag).map_err(|_| Error::InvalidToken("tag is not utf-8".to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

    /// Reversible test cipher: a salt byte, then the plaintext xor'ed with it.
    #[derive(Debug, Default)]
    pub(crate) struct XorCipher {
        ready: AtomicBool,
        salt: AtomicU8,
    }

    impl Cipher for XorCipher {
        fn generate_key_pair(&self, _bits: usize) -> std::result::Result<(), CipherError> {
            self.ready.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn encrypt(&self, plaintext: &[u8]) -> std::result::Result<Vec<u8>, CipherError> {
            if !self.ready.load(Ordering::SeqCst) {
                return Err("keys not generated".into());
            }
            let salt = self.salt.fetch_add(1, Ordering::SeqCst) | 0x80;
            let mut out = vec![salt];
            out.extend(plaintext.iter().map(|b| b ^ salt));
            Ok(out)
        }

        fn decrypt(&self, ciphertext: &[u8]) -> std::result::Result<Vec<u8>, CipherError> {
            match ciphertext.split_first() {
                Some((&salt, body)) if salt & 0x80 != 0 => {
                    Ok(body.iter().map(|b| b ^ salt).collect())
                }
                _ => Err("malformed ciphertext".into()),
            }
        }
    }

    #[test]
    fn token_should_open_to_issued_tag() {
        let cipher = XorCipher::default();
        cipher.generate_key_pair(256).unwrap();

        let token = issue_token(&cipher, "admin__x_x__once").unwrap();
        assert_eq!(open_token(&cipher, &token).unwrap(), "admin__x_x__once");
    }

    #[test]
    fn open_token_should_reject_garbage() {
        let cipher = XorCipher::default();

        assert!(matches!(
            open_token(&cipher, "%%%"),
            Err(Error::InvalidToken(_))
        ));
        assert!(matches!(
            open_token(&cipher, &STANDARD.encode([0x01u8, 0x02])),
            Err(Error::InvalidToken(_))
        ));
    }

    #[test]
    fn issue_token_should_surface_cipher_failure() {
        let cipher = XorCipher::default();

        assert!(matches!(
            issue_token(&cipher, "admin"),
            Err(Error::Cipher(_))
        ));
    }
}
