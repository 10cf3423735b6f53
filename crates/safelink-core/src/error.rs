use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("AEAD encryption failed")]
    Encrypt,

    /// Wrong passphrase and corrupt ciphertext are deliberately collapsed
    /// into one message so a caller cannot tell which it was.
    #[error("bad passphrase or corrupt data")]
    Decrypt,

    #[error("payload serialization failed: {0}")]
    Serialize(String),
}
