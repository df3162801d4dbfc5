//! Hybrid payload encryption for request and response bodies.
//!
//! A fresh AES-256-GCM key encrypts each body; the key itself travels in a
//! header, RSA-encrypted (PKCS#1 v1.5) with the server's public key.
//! Responses are the mirror image, unwrapped with the client's private key.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use crate::error::Error;

/// AES-256 key length in bytes.
pub const AES_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Generates a random AES-256 key.
#[must_use]
pub fn generate_aes_key() -> [u8; AES_KEY_LEN] {
    rand::rng().random()
}

/// Encrypts `plaintext`, returning `base64(nonce || ciphertext)`.
///
/// # Errors
///
/// Returns [`Error::Crypto`] if the key has the wrong length.
pub fn encrypt_with_aes(plaintext: &[u8], key: &[u8]) -> Result<String, Error> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| Error::Crypto(format!("invalid AES key length: {}", key.len())))?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| Error::Crypto(format!("encryption failed: {e}")))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(out))
}

/// Reverses [`encrypt_with_aes`].
///
/// # Errors
///
/// Returns [`Error::Crypto`] on bad base64, truncated input, a wrong key or a
/// failed authentication tag.
pub fn decrypt_with_aes(encoded: &str, key: &[u8]) -> Result<Vec<u8>, Error> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::Crypto(format!("invalid base64 body: {e}")))?;
    if bytes.len() <= NONCE_LEN {
        return Err(Error::Crypto("ciphertext too short".into()));
    }
    let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| Error::Crypto(format!("invalid AES key length: {}", key.len())))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| Error::Crypto(format!("decryption failed: {e}")))
}

/// RSA key material for wrapping per-request AES keys.
///
/// The public half encrypts request keys for the server; the private half
/// decrypts response keys the server wrapped for this client. Either may be
/// absent, in which case the corresponding direction fails.
#[derive(Clone)]
pub struct PayloadCipher {
    public_key: Option<RsaPublicKey>,
    private_key: Option<RsaPrivateKey>,
}

impl std::fmt::Debug for PayloadCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCipher")
            .field("public_key", &self.public_key.is_some())
            .field("private_key", &self.private_key.is_some())
            .finish()
    }
}

/// An encrypted request body plus the wrapped key for the header.
#[derive(Debug, Clone)]
pub struct SealedPayload {
    pub encrypted_key: String,
    pub body: String,
}

impl PayloadCipher {
    #[must_use]
    pub fn new(public_key: Option<RsaPublicKey>, private_key: Option<RsaPrivateKey>) -> Self {
        Self {
            public_key,
            private_key,
        }
    }

    /// Parse PEM-encoded keys (SPKI public key, PKCS#8 private key).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if either PEM fails to parse.
    pub fn from_pem(public_pem: Option<&str>, private_pem: Option<&str>) -> Result<Self, Error> {
        let public_key = public_pem
            .map(|pem| {
                RsaPublicKey::from_public_key_pem(pem)
                    .map_err(|e| Error::Config(format!("RSA public key: {e}")))
            })
            .transpose()?;
        let private_key = private_pem
            .map(|pem| {
                RsaPrivateKey::from_pkcs8_pem(pem)
                    .map_err(|e| Error::Config(format!("RSA private key: {e}")))
            })
            .transpose()?;
        Ok(Self::new(public_key, private_key))
    }

    /// Encrypt `plaintext` under a fresh AES key and wrap the key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Crypto`] if no public key is configured or encryption
    /// fails.
    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedPayload, Error> {
        let public_key = self
            .public_key
            .as_ref()
            .ok_or_else(|| Error::Crypto("no RSA public key configured".into()))?;
        let aes_key = generate_aes_key();
        let body = encrypt_with_aes(plaintext, &aes_key)?;
        let encoded_key = STANDARD.encode(aes_key);
        let wrapped = public_key
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, encoded_key.as_bytes())
            .map_err(|e| Error::Crypto(format!("key wrap failed: {e}")))?;
        Ok(SealedPayload {
            encrypted_key: STANDARD.encode(wrapped),
            body,
        })
    }

    /// Unwrap the key carried in `encrypted_key` and decrypt `body`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Crypto`] if no private key is configured or any step
    /// fails.
    pub fn open(&self, encrypted_key: &str, body: &str) -> Result<Vec<u8>, Error> {
        let private_key = self
            .private_key
            .as_ref()
            .ok_or_else(|| Error::Crypto("no RSA private key configured".into()))?;
        let wrapped = STANDARD
            .decode(encrypted_key.trim())
            .map_err(|e| Error::Crypto(format!("invalid base64 key header: {e}")))?;
        let encoded_key = private_key
            .decrypt(Pkcs1v15Encrypt, &wrapped)
            .map_err(|e| Error::Crypto(format!("key unwrap failed: {e}")))?;
        let aes_key = STANDARD
            .decode(&encoded_key)
            .map_err(|e| Error::Crypto(format!("invalid base64 AES key: {e}")))?;
        decrypt_with_aes(body, &aes_key)
    }

    /// Wrap `aes_key` for a peer holding `public_key`.
    ///
    /// Mirrors what the server does when it encrypts a response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Crypto`] if encryption fails.
    pub fn wrap_key_for(public_key: &RsaPublicKey, aes_key: &[u8]) -> Result<String, Error> {
        let encoded_key = STANDARD.encode(aes_key);
        let wrapped = public_key
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, encoded_key.as_bytes())
            .map_err(|e| Error::Crypto(format!("key wrap failed: {e}")))?;
        Ok(STANDARD.encode(wrapped))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_keypair() -> (RsaPublicKey, RsaPrivateKey) {
        let private_key = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        (public_key, private_key)
    }

    #[test]
    fn aes_roundtrip_and_nonce_uniqueness() {
        let key = generate_aes_key();
        let a = encrypt_with_aes(b"{\"x\":1}", &key).unwrap();
        let b = encrypt_with_aes(b"{\"x\":1}", &key).unwrap();
        assert_ne!(a, b, "fresh nonce per message");
        assert_eq!(decrypt_with_aes(&a, &key).unwrap(), b"{\"x\":1}");
    }

    #[test]
    fn aes_wrong_key_fails() {
        let sealed = encrypt_with_aes(b"secret", &generate_aes_key()).unwrap();
        assert!(matches!(
            decrypt_with_aes(&sealed, &generate_aes_key()),
            Err(Error::Crypto(_))
        ));
        assert!(decrypt_with_aes("AAAA", &generate_aes_key()).is_err());
        assert!(encrypt_with_aes(b"x", &[0u8; 7]).is_err());
    }

    #[test]
    fn seal_then_open_with_matching_keys() {
        let (public_key, private_key) = test_keypair();
        let cipher = PayloadCipher::new(Some(public_key), Some(private_key));
        let sealed = cipher.seal(b"{\"username\":\"bob\"}").unwrap();
        assert_ne!(sealed.body, "{\"username\":\"bob\"}");
        let opened = cipher.open(&sealed.encrypted_key, &sealed.body).unwrap();
        assert_eq!(opened, b"{\"username\":\"bob\"}");
    }

    #[test]
    fn missing_keys_are_reported() {
        let cipher = PayloadCipher::new(None, None);
        assert!(matches!(cipher.seal(b"x"), Err(Error::Crypto(_))));
        assert!(matches!(cipher.open("a", "b"), Err(Error::Crypto(_))));
    }

    #[test]
    fn invalid_pem_is_config_error() {
        assert!(matches!(
            PayloadCipher::from_pem(Some("not a pem"), None),
            Err(Error::Config(_))
        ));
        assert!(PayloadCipher::from_pem(None, None).is_ok());
    }
}
