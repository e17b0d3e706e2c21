//! Elliptic Curve Integrated Encryption Scheme over P-256.
//!
//! The construction matches the `eciesEncryptionCofactorX963SHA256AESGCM`
//! algorithm of Apple's Security framework, so ciphertexts produced by a
//! Secure Enclave key on the device and by this module are interchangeable.
//!
//! # Wire Format
//!
//! ```text
//! [ephemeral public key (65 bytes, SEC1 uncompressed)][AES-GCM ciphertext][tag (16 bytes)]
//! ```
//!
//! # Key Schedule
//!
//! ```text
//! Z   = ECDH(ephemeral, recipient)                    // 32 bytes
//! K   = X9.63-KDF-SHA256(Z, SharedInfo = ephemeral_public)[..16]
//! out = AES-128-GCM(K, IV = 0^16, plaintext)
//! ```
//!
//! The all-zero IV is safe because every key is derived from a fresh
//! ephemeral share and therefore used exactly once.

use std::fmt;

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes128;
use aes_gcm::{AesGcm, Key, Nonce};
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretBox};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{SealKitError, SealResult};

/// Size of a SEC1 uncompressed P-256 public key in bytes.
pub const PUBLIC_KEY_LEN: usize = 65;

/// Size of the AES-GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Size of a P-256 ECDH shared secret in bytes.
pub const SHARED_SECRET_LEN: usize = 32;

/// Smallest valid ciphertext (empty plaintext).
pub const MIN_CIPHERTEXT_LEN: usize = PUBLIC_KEY_LEN + TAG_LEN;

/// AES-128 is used for curves up to 256 bits.
const AES_KEY_LEN: usize = 16;

const ZERO_IV: [u8; 16] = [0u8; 16];

type Aes128Gcm16 = AesGcm<Aes128, U16>;

/// Raw ECDH output, wiped on drop.
pub struct SharedSecret(SecretBox<[u8; SHARED_SECRET_LEN]>);

impl SharedSecret {
    /// Copies a shared secret produced by a key agreement.
    ///
    /// # Errors
    ///
    /// Returns [`SealKitError::KeyStore`] if `bytes` is not exactly
    /// [`SHARED_SECRET_LEN`] bytes long.
    pub fn from_slice(bytes: &[u8]) -> SealResult<Self> {
        if bytes.len() != SHARED_SECRET_LEN {
            return Err(SealKitError::KeyStore(format!(
                "shared secret has invalid length: {} (expected {SHARED_SECRET_LEN})",
                bytes.len()
            )));
        }
        Ok(Self(SecretBox::init_with_mut(|secret: &mut [u8; SHARED_SECRET_LEN]| {
            secret.copy_from_slice(bytes);
        })))
    }

    /// Returns the secret bytes. Treat this as sensitive material.
    #[must_use]
    pub fn expose(&self) -> &[u8; SHARED_SECRET_LEN] {
        self.0.expose_secret()
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedSecret").field(&"[REDACTED]").finish()
    }
}

/// Performs static-key ECDH in place. Used by software-backed stores.
pub(crate) fn agree(secret: &SecretKey, peer: &PublicKey) -> SealResult<SharedSecret> {
    let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
    SharedSecret::from_slice(shared.raw_secret_bytes())
}

/// Encrypts `plaintext` to `recipient`.
///
/// # Errors
///
/// Returns [`SealKitError::EncryptionFailed`] if the AEAD rejects the payload
/// (e.g. it exceeds the AES-GCM size limit).
pub fn seal(recipient: &PublicKey, plaintext: &[u8]) -> SealResult<Vec<u8>> {
    let ephemeral = EphemeralSecret::random(&mut OsRng);
    let ephemeral_public = ephemeral.public_key().to_encoded_point(false);
    let shared = ephemeral.diffie_hellman(recipient);
    let secret = SharedSecret::from_slice(shared.raw_secret_bytes())
        .map_err(SealKitError::into_encryption)?;

    let sealed = derive_cipher(&secret, ephemeral_public.as_bytes())
        .map_err(|err| SealKitError::EncryptionFailed(format!("key derivation failed: {err:?}")))?
        .encrypt(Nonce::<U16>::from_slice(&ZERO_IV), plaintext)
        .map_err(|_| {
            SealKitError::EncryptionFailed(format!(
                "AES-GCM rejected a {} byte payload",
                plaintext.len()
            ))
        })?;

    let mut out = Vec::with_capacity(PUBLIC_KEY_LEN + sealed.len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypts `ciphertext`, delegating the key agreement to `agree`.
///
/// `agree` receives the sender's ephemeral public key and must return the
/// ECDH shared secret computed with the recipient's private key. It is only
/// invoked once the envelope has been structurally validated.
///
/// # Errors
///
/// Returns [`SealKitError::DecryptionFailed`] if the ciphertext is too short,
/// carries an invalid ephemeral key or fails authentication. Errors returned
/// by `agree` are passed through.
pub fn open<F>(ciphertext: &[u8], agree: F) -> SealResult<Vec<u8>>
where
    F: FnOnce(&PublicKey) -> SealResult<SharedSecret>,
{
    if ciphertext.len() < MIN_CIPHERTEXT_LEN {
        return Err(SealKitError::DecryptionFailed(format!(
            "ciphertext too short: {} bytes (minimum {MIN_CIPHERTEXT_LEN})",
            ciphertext.len()
        )));
    }
    let (ephemeral_bytes, sealed) = ciphertext.split_at(PUBLIC_KEY_LEN);
    let ephemeral = PublicKey::from_sec1_bytes(ephemeral_bytes).map_err(|_| {
        SealKitError::DecryptionFailed("invalid ephemeral public key".to_string())
    })?;

    let secret = agree(&ephemeral)?;

    derive_cipher(&secret, ephemeral_bytes)
        .map_err(|err| SealKitError::DecryptionFailed(format!("key derivation failed: {err:?}")))?
        .decrypt(Nonce::<U16>::from_slice(&ZERO_IV), sealed)
        .map_err(|_| {
            SealKitError::DecryptionFailed(
                "authentication failed (wrong key or tampered data)".to_string(),
            )
        })
}

/// Encodes a public key the way it appears on the wire.
#[must_use]
pub fn encode_public_key(key: &PublicKey) -> Vec<u8> {
    key.to_encoded_point(false).as_bytes().to_vec()
}

/// Derives the AES key with ANSI X9.63 (SHA-256) over the shared secret,
/// using the ephemeral public key as shared info.
fn derive_cipher(
    secret: &SharedSecret,
    shared_info: &[u8],
) -> Result<Aes128Gcm16, ansi_x963_kdf::Error> {
    let mut key = Zeroizing::new([0u8; AES_KEY_LEN]);
    ansi_x963_kdf::derive_key_into::<Sha256>(secret.expose(), shared_info, key.as_mut_slice())?;
    Ok(Aes128Gcm16::new(Key::<Aes128Gcm16>::from_slice(key.as_slice())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::Digest;

    fn recipient() -> SecretKey {
        SecretKey::random(&mut OsRng)
    }

    #[test]
    fn test_seal_open_round_trip() {
        let secret = recipient();
        let ciphertext = seal(&secret.public_key(), b"hello enclave").expect("seal");

        assert_eq!(ciphertext.len(), PUBLIC_KEY_LEN + 13 + TAG_LEN);
        assert_eq!(ciphertext[0], 0x04);

        let plaintext = open(&ciphertext, |peer| agree(&secret, peer)).expect("open");
        assert_eq!(plaintext, b"hello enclave");
    }

    #[test]
    fn test_empty_payload() {
        let secret = recipient();
        let ciphertext = seal(&secret.public_key(), &[]).expect("seal");
        assert_eq!(ciphertext.len(), MIN_CIPHERTEXT_LEN);
        let plaintext = open(&ciphertext, |peer| agree(&secret, peer)).expect("open");
        assert!(plaintext.is_empty());
    }

    #[test]
    fn test_ephemeral_share_is_fresh() {
        let secret = recipient();
        let first = seal(&secret.public_key(), b"same").expect("seal");
        let second = seal(&secret.public_key(), b"same").expect("seal");
        assert_ne!(first[..PUBLIC_KEY_LEN], second[..PUBLIC_KEY_LEN]);
        assert_ne!(first, second);
    }

    #[test]
    fn test_wrong_key_fails() {
        let ciphertext = seal(&recipient().public_key(), b"secret").expect("seal");
        let other = recipient();
        match open(&ciphertext, |peer| agree(&other, peer)) {
            Err(SealKitError::DecryptionFailed(_)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_short_ciphertext_skips_agreement() {
        let result = open(&[0x04; MIN_CIPHERTEXT_LEN - 1], |_| {
            panic!("agreement must not run")
        });
        assert!(matches!(result, Err(SealKitError::DecryptionFailed(_))));
    }

    #[test]
    fn test_invalid_ephemeral_key_skips_agreement() {
        let mut ciphertext = seal(&recipient().public_key(), b"x").expect("seal");
        ciphertext[0] = 0x05;
        let result = open(&ciphertext, |_| panic!("agreement must not run"));
        assert_eq!(
            result.expect_err("invalid point"),
            SealKitError::DecryptionFailed("invalid ephemeral public key".to_string())
        );
    }

    #[test]
    fn test_agreement_errors_pass_through() {
        let ciphertext = seal(&recipient().public_key(), b"x").expect("seal");
        let result = open(&ciphertext, |_| {
            Err(SealKitError::DecryptionFailed("cancelled: prompt".to_string()))
        });
        assert_eq!(
            result.expect_err("cancelled"),
            SealKitError::DecryptionFailed("cancelled: prompt".to_string())
        );
    }

    #[test]
    fn test_x963_kdf_blocks() {
        let z = [7u8; 32];
        let info = b"shared-info";
        let mut out = [0u8; 48];
        ansi_x963_kdf::derive_key_into::<Sha256>(&z, info, &mut out).expect("derive");

        let mut first = Sha256::new();
        first.update(z);
        first.update(1u32.to_be_bytes());
        first.update(info);
        assert_eq!(out[..32], first.finalize()[..]);

        let mut second = Sha256::new();
        second.update(z);
        second.update(2u32.to_be_bytes());
        second.update(info);
        assert_eq!(out[32..], second.finalize()[..16]);
    }

    #[test]
    fn test_shared_secret_length_checked() {
        assert!(SharedSecret::from_slice(&[0u8; 31]).is_err());
        let secret = SharedSecret::from_slice(&[9u8; 32]).expect("valid");
        assert_eq!(secret.expose(), &[9u8; 32]);
        assert_eq!(format!("{secret:?}"), "SharedSecret(\"[REDACTED]\")");
    }
}
