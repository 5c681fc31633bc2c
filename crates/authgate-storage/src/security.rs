//! Encryption primitives for stored items
//!
//! AES-256-GCM and ChaCha20-Poly1305 with a versioned ciphertext header, and
//! SHA-256 derivation of per-item keys bound to the enrolled biometric set.

use crate::{Error, Result};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use chacha20poly1305::ChaCha20Poly1305;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Current ciphertext format version
const FORMAT_VERSION: u8 = 1;

/// Header length: version, algorithm, 12-byte nonce
const HEADER_LEN: usize = 14;

/// Domain separation tag for item key derivation
const ITEM_KEY_CONTEXT: &[u8] = b"authgate-item-key-v1";

/// Encryption algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionAlgorithm {
    /// AES-256-GCM
    AesGcm,
    /// ChaCha20-Poly1305
    ChaCha20Poly1305,
}

impl EncryptionAlgorithm {
    fn id(self) -> u8 {
        match self {
            Self::AesGcm => 0,
            Self::ChaCha20Poly1305 => 1,
        }
    }
}

/// 256-bit symmetric key
#[derive(Clone)]
pub struct MasterKey {
    key: Zeroizing<[u8; 32]>,
    algorithm: EncryptionAlgorithm,
}

impl MasterKey {
    /// Generate new random key
    pub fn generate(algorithm: EncryptionAlgorithm) -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);

        Self {
            key: Zeroizing::new(key),
            algorithm,
        }
    }

    /// Create from bytes
    pub fn from_bytes(bytes: &[u8], algorithm: EncryptionAlgorithm) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(Error::Encryption("Invalid key length".to_string()));
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(bytes);

        Ok(Self {
            key: Zeroizing::new(key),
            algorithm,
        })
    }

    /// Get key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    /// Algorithm used by [`encrypt`](Self::encrypt)
    pub fn algorithm(&self) -> EncryptionAlgorithm {
        self.algorithm
    }

    /// Derive the key for one item.
    ///
    /// `binding` is the enrolled-set fingerprint for biometric-gated items and
    /// `None` otherwise. A different binding yields an unrelated key.
    pub fn derive_item_key(&self, salt: &[u8], binding: Option<&[u8]>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(ITEM_KEY_CONTEXT);
        hasher.update(self.key.as_ref());
        hasher.update((salt.len() as u32).to_le_bytes());
        hasher.update(salt);
        match binding {
            Some(state) => {
                hasher.update([1u8]);
                hasher.update((state.len() as u32).to_le_bytes());
                hasher.update(state);
            }
            None => hasher.update([0u8]),
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&hasher.finalize());
        Self {
            key: Zeroizing::new(key),
            algorithm: self.algorithm,
        }
    }

    /// Encrypt data
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = match self.algorithm {
            EncryptionAlgorithm::AesGcm => Aes256Gcm::new(self.key.as_ref().into())
                .encrypt(Nonce::from_slice(&nonce_bytes), plaintext),
            EncryptionAlgorithm::ChaCha20Poly1305 => ChaCha20Poly1305::new(self.key.as_ref().into())
                .encrypt(chacha20poly1305::Nonce::from_slice(&nonce_bytes), plaintext),
        }
        .map_err(|e| Error::Encryption(e.to_string()))?;

        // Format: [version(1)][algorithm(1)][nonce(12)][ciphertext(variable)]
        let mut result = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        result.push(FORMAT_VERSION);
        result.push(self.algorithm.id());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    /// Decrypt data. Fails on a wrong key or any modification.
    pub fn decrypt(&self, data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if data.len() < HEADER_LEN {
            return Err(Error::Encryption("Invalid ciphertext length".to_string()));
        }

        let version = data[0];
        let algorithm = data[1];
        if version != FORMAT_VERSION {
            return Err(Error::Encryption(format!(
                "Unsupported encryption version: {}",
                version
            )));
        }
        if algorithm != self.algorithm.id() {
            return Err(Error::Encryption(format!(
                "Algorithm mismatch: expected {}, got {}",
                self.algorithm.id(),
                algorithm
            )));
        }

        let nonce = &data[2..HEADER_LEN];
        let ciphertext = &data[HEADER_LEN..];
        match self.algorithm {
            EncryptionAlgorithm::AesGcm => Aes256Gcm::new(self.key.as_ref().into())
                .decrypt(Nonce::from_slice(nonce), ciphertext),
            EncryptionAlgorithm::ChaCha20Poly1305 => ChaCha20Poly1305::new(self.key.as_ref().into())
                .decrypt(chacha20poly1305::Nonce::from_slice(nonce), ciphertext),
        }
        .map(Zeroizing::new)
        .map_err(|e| Error::Encryption(e.to_string()))
    }
}

/// Generate secure random salt
pub fn generate_salt() -> [u8; 32] {
    let mut salt = [0u8; 32];
    OsRng.fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encryption_decryption_aes_gcm() {
        let key = MasterKey::generate(EncryptionAlgorithm::AesGcm);
        let ciphertext = key.encrypt(b"abc123").unwrap();

        assert_eq!(ciphertext[0], 1);
        assert_eq!(ciphertext[1], 0);
        assert_eq!(key.decrypt(&ciphertext).unwrap().as_slice(), b"abc123");
    }

    #[test]
    fn test_encryption_decryption_chacha20() {
        let key = MasterKey::generate(EncryptionAlgorithm::ChaCha20Poly1305);
        let ciphertext = key.encrypt(b"abc123").unwrap();

        assert_eq!(ciphertext[1], 1);
        assert_eq!(key.decrypt(&ciphertext).unwrap().as_slice(), b"abc123");
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let key = MasterKey::generate(EncryptionAlgorithm::ChaCha20Poly1305);
        let mut ciphertext = key.encrypt(b"secret").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0x01;

        assert!(key.decrypt(&ciphertext).is_err());
        assert!(key.decrypt(&[1, 1, 0]).is_err());
    }

    #[test]
    fn test_item_key_depends_on_binding() {
        let master = MasterKey::generate(EncryptionAlgorithm::ChaCha20Poly1305);
        let salt = generate_salt();

        let bound = master.derive_item_key(&salt, Some(b"enrolled-set-1"));
        let same = master.derive_item_key(&salt, Some(b"enrolled-set-1"));
        let changed = master.derive_item_key(&salt, Some(b"enrolled-set-2"));
        let unbound = master.derive_item_key(&salt, None);

        assert_eq!(bound.as_bytes(), same.as_bytes());
        assert_ne!(bound.as_bytes(), changed.as_bytes());
        assert_ne!(bound.as_bytes(), unbound.as_bytes());

        let ciphertext = bound.encrypt(b"payload").unwrap();
        assert!(changed.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(MasterKey::from_bytes(&[0u8; 16], EncryptionAlgorithm::AesGcm).is_err());
        let key = MasterKey::from_bytes(&[7u8; 32], EncryptionAlgorithm::AesGcm).unwrap();
        assert_eq!(key.as_bytes(), &[7u8; 32]);
    }

    proptest::proptest! {
        #[test]
        fn prop_rebound_key_never_opens_item(
            first in proptest::collection::vec(proptest::prelude::any::<u8>(), 1..64),
            second in proptest::collection::vec(proptest::prelude::any::<u8>(), 1..64),
            payload in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..128),
        ) {
            proptest::prop_assume!(first != second);
            let master = MasterKey::from_bytes(&[3u8; 32], EncryptionAlgorithm::ChaCha20Poly1305).unwrap();
            let salt = [9u8; 32];

            let original = master.derive_item_key(&salt, Some(&first));
            let rebound = master.derive_item_key(&salt, Some(&second));
            let ciphertext = original.encrypt(&payload).unwrap();

            proptest::prop_assert!(rebound.decrypt(&ciphertext).is_err());
            let opened = original.decrypt(&ciphertext).unwrap();
            proptest::prop_assert_eq!(opened.as_slice(), payload.as_slice());
        }
    }
}
