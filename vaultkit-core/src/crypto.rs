//! Local authenticated encryption for vault file bodies and wrapped keys.
//!
//! Every file is sealed under a fresh ephemeral key with XChaCha20-Poly1305;
//! the key is handed to a key-management provider for wrapping and dropped
//! (zeroized) immediately afterwards. Content hashes are SHA-256.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{VaultError, VaultResult};

/// XChaCha20-Poly1305 nonce size in bytes.
pub const NONCE_SIZE: usize = 24;
/// Poly1305 authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;
const SALT_SIZE: usize = 16;
const KEY_SIZE: usize = 32;

/// A single-use 256-bit symmetric key.
///
/// Generated fresh per encryption and zeroized on drop. Never logged,
/// serialized or repeated across encryptions.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EphemeralKey([u8; KEY_SIZE]);

impl EphemeralKey {
    /// Generates a new random key from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Reconstructs a key from raw bytes (e.g. recovered from a custodian).
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Crypto`] if `bytes` is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> VaultResult<Self> {
        let raw: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| VaultError::Crypto("key material must be 32 bytes".to_string()))?;
        Ok(Self(raw))
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for EphemeralKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// One authenticated ciphertext with a detached tag.
///
/// `iv` and the key sealing it are one-time use. `salt` is carried for
/// format compatibility with passphrase-derived deployments and is not
/// consumed by the codec itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AeadCiphertext {
    /// Encrypted body without the authentication tag.
    pub ciphertext: Vec<u8>,
    /// Fresh 24-byte nonce used for this encryption only.
    pub iv: Vec<u8>,
    /// Detached 16-byte Poly1305 tag.
    pub auth_tag: Vec<u8>,
    /// Random salt generated alongside the ciphertext.
    pub salt: Vec<u8>,
}

/// Seals `plaintext` under `key` with a fresh random nonce.
///
/// # Errors
///
/// Returns [`VaultError::Crypto`] if the AEAD backend rejects the input.
pub fn seal(key: &EphemeralKey, plaintext: &[u8]) -> VaultResult<AeadCiphertext> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let mut iv = vec![0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut iv);
    let mut salt = vec![0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);

    let mut sealed = cipher
        .encrypt(XNonce::from_slice(&iv), plaintext)
        .map_err(|_| VaultError::Crypto("XChaCha20-Poly1305 encryption failed".to_string()))?;

    let auth_tag = sealed.split_off(sealed.len() - TAG_SIZE);

    Ok(AeadCiphertext {
        ciphertext: sealed,
        iv,
        auth_tag,
        salt,
    })
}

/// Opens a sealed body, verifying the detached tag.
///
/// # Errors
///
/// Returns [`VaultError::Integrity`] if the tag does not verify (tampered
/// ciphertext, nonce or tag, or wrong key) and [`VaultError::Crypto`] for
/// malformed inputs.
pub fn open(key: &EphemeralKey, sealed: &AeadCiphertext) -> VaultResult<Vec<u8>> {
    if sealed.iv.len() != NONCE_SIZE || sealed.auth_tag.len() != TAG_SIZE {
        return Err(VaultError::Crypto(
            "malformed ciphertext envelope".to_string(),
        ));
    }

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let mut combined = Vec::with_capacity(sealed.ciphertext.len() + TAG_SIZE);
    combined.extend_from_slice(&sealed.ciphertext);
    combined.extend_from_slice(&sealed.auth_tag);

    cipher
        .decrypt(XNonce::from_slice(&sealed.iv), combined.as_slice())
        .map_err(|_| VaultError::Integrity("authentication tag mismatch".to_string()))
}

/// Seals `plaintext` into a single `nonce || ciphertext || tag` blob.
///
/// Used by the sandbox executor for wrapped-key ciphertexts, which travel
/// as one opaque base64 string rather than a structured envelope.
pub(crate) fn seal_combined(key: &EphemeralKey, plaintext: &[u8]) -> VaultResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    let sealed = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| VaultError::Crypto("XChaCha20-Poly1305 encryption failed".to_string()))?;
    let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Opens a `nonce || ciphertext || tag` blob produced by [`seal_combined`].
pub(crate) fn open_combined(key: &EphemeralKey, blob: &[u8]) -> VaultResult<Vec<u8>> {
    if blob.len() < NONCE_SIZE + TAG_SIZE {
        return Err(VaultError::Crypto("ciphertext too short".to_string()));
    }
    let (nonce, payload) = blob.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(XNonce::from_slice(nonce), payload)
        .map_err(|_| VaultError::Integrity("authentication tag mismatch".to_string()))
}

/// Computes the lowercase-hex SHA-256 content hash of `data`.
///
/// Content hashes address wrapped keys independent of caller identity.
#[must_use]
pub fn content_hash_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
