//! Password-based authenticated encryption for vault payloads.
//!
//! PBKDF2-HMAC-SHA256 (100,000 iterations) derives a 256-bit key from a
//! passphrase and a random 128-bit salt; AES-256-GCM seals the payload under
//! a random 96-bit nonce. Every `encrypt_*` call draws a fresh salt *and* a
//! fresh nonce, so key material is never reused across packages. The
//! "encrypt new files" flow is the one exception: [`SessionKey`] derives once
//! and reuses the key for the session, persisting only its salt.
//!
//! Packages are JSON-serializable end to end (all binary fields are base64)
//! and self-contained: passphrase + package is enough to decrypt. For blob
//! packages the MIME type and filename ride alongside in cleartext; that
//! metadata leak is accepted.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose, Engine as _};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const PACKAGE_VERSION: u32 = 1;
pub const PBKDF2_ITERATIONS: u32 = 100_000;
pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Json,
    Text,
    Blob,
}

/// Portable encrypted package. Field names match the original browser app's
/// wire format (`v`/`type`/`iv`/`salt`/`ct`), so packages and `.slvault`
/// backups remain interchangeable with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedPackage {
    pub v: u32,
    #[serde(rename = "type")]
    pub kind: PackageKind,
    pub iv: String,
    pub salt: String,
    pub ct: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

pub struct DecryptedBlob {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub name: Option<String>,
}

pub fn derive_key(passphrase: &str, salt: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ITERATIONS, &mut *key);
    key
}

pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

fn seal(
    kind: PackageKind,
    key: &[u8; KEY_LEN],
    salt: &[u8; SALT_LEN],
    plaintext: &[u8],
) -> Result<EncryptedPackage, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::Encrypt)?;
    let nonce = generate_nonce();
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Encrypt)?;
    Ok(EncryptedPackage {
        v: PACKAGE_VERSION,
        kind,
        iv: general_purpose::STANDARD.encode(nonce),
        salt: general_purpose::STANDARD.encode(salt),
        ct: general_purpose::STANDARD.encode(ciphertext),
        mime: None,
        name: None,
    })
}

fn open(pkg: &EncryptedPackage, passphrase: &str) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let nonce = general_purpose::STANDARD
        .decode(&pkg.iv)
        .map_err(|_| CryptoError::Decrypt)?;
    let salt = general_purpose::STANDARD
        .decode(&pkg.salt)
        .map_err(|_| CryptoError::Decrypt)?;
    let ciphertext = general_purpose::STANDARD
        .decode(&pkg.ct)
        .map_err(|_| CryptoError::Decrypt)?;
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::Decrypt);
    }
    let key = derive_key(passphrase, &salt);
    let cipher = Aes256Gcm::new_from_slice(&*key).map_err(|_| CryptoError::Decrypt)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|_| CryptoError::Decrypt)?;
    Ok(Zeroizing::new(plaintext))
}

// ── JSON ────────────────────────────────────────────────────────────────────

pub fn encrypt_json<T: Serialize>(
    value: &T,
    passphrase: &str,
) -> Result<EncryptedPackage, CryptoError> {
    let plaintext =
        serde_json::to_vec(value).map_err(|e| CryptoError::Serialize(e.to_string()))?;
    let salt = generate_salt();
    let key = derive_key(passphrase, &salt);
    seal(PackageKind::Json, &key, &salt, &plaintext)
}

pub fn decrypt_json<T: DeserializeOwned>(
    pkg: &EncryptedPackage,
    passphrase: &str,
) -> Result<T, CryptoError> {
    let plaintext = open(pkg, passphrase)?;
    // A parse failure is reported exactly like an authentication failure.
    serde_json::from_slice(&plaintext).map_err(|_| CryptoError::Decrypt)
}

// ── Plain text ──────────────────────────────────────────────────────────────

pub fn encrypt_text(text: &str, passphrase: &str) -> Result<EncryptedPackage, CryptoError> {
    let salt = generate_salt();
    let key = derive_key(passphrase, &salt);
    seal(PackageKind::Text, &key, &salt, text.as_bytes())
}

pub fn decrypt_text(pkg: &EncryptedPackage, passphrase: &str) -> Result<String, CryptoError> {
    let plaintext = open(pkg, passphrase)?;
    String::from_utf8(plaintext.to_vec()).map_err(|_| CryptoError::Decrypt)
}

// ── Binary blobs (images, files) ────────────────────────────────────────────

pub fn encrypt_blob(
    data: &[u8],
    mime: &str,
    name: Option<&str>,
    passphrase: &str,
) -> Result<EncryptedPackage, CryptoError> {
    let salt = generate_salt();
    let key = derive_key(passphrase, &salt);
    let mut pkg = seal(PackageKind::Blob, &key, &salt, data)?;
    pkg.mime = Some(mime.to_string());
    pkg.name = name.map(str::to_string);
    Ok(pkg)
}

pub fn decrypt_blob(
    pkg: &EncryptedPackage,
    passphrase: &str,
) -> Result<DecryptedBlob, CryptoError> {
    let plaintext = open(pkg, passphrase)?;
    Ok(DecryptedBlob {
        bytes: plaintext.to_vec(),
        mime: pkg
            .mime
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string()),
        name: pkg.name.clone(),
    })
}

// ── Session key ─────────────────────────────────────────────────────────────

/// A key derived once and reused for repeated blob encryptions within a
/// session. Only the salt is ever persisted (base64, in settings); packages
/// produced here embed that same salt so they stay self-contained.
pub struct SessionKey {
    key: Zeroizing<[u8; KEY_LEN]>,
    salt: [u8; SALT_LEN],
}

impl SessionKey {
    /// Derive a session key from a passphrase and a fresh random salt.
    pub fn derive(passphrase: &str) -> Self {
        let salt = generate_salt();
        Self {
            key: derive_key(passphrase, &salt),
            salt,
        }
    }

    /// Re-derive a session key from a previously persisted salt.
    pub fn from_salt_b64(passphrase: &str, salt_b64: &str) -> Result<Self, CryptoError> {
        let salt_vec = general_purpose::STANDARD
            .decode(salt_b64)
            .map_err(|_| CryptoError::Decrypt)?;
        let salt: [u8; SALT_LEN] = salt_vec.try_into().map_err(|_| CryptoError::Decrypt)?;
        Ok(Self {
            key: derive_key(passphrase, &salt),
            salt,
        })
    }

    pub fn salt_b64(&self) -> String {
        general_purpose::STANDARD.encode(self.salt)
    }

    pub fn encrypt_blob(
        &self,
        data: &[u8],
        mime: &str,
        name: Option<&str>,
    ) -> Result<EncryptedPackage, CryptoError> {
        let mut pkg = seal(PackageKind::Blob, &self.key, &self.salt, data)?;
        pkg.mime = Some(mime.to_string());
        pkg.name = name.map(str::to_string);
        Ok(pkg)
    }
}

// ── Hashing ─────────────────────────────────────────────────────────────────

/// Hex SHA-256 digest, recorded by capture flows as `metadata.sha256`.
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
