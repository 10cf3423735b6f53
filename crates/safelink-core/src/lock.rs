//! Whole-vault encrypt-at-rest.
//!
//! Locking replaces the live evidence collection with one encrypted JSON
//! package in the `vault_ct` slot; unlocking reverses it. Lock state is
//! observable purely by the slot's presence — there is no separate flag to
//! drift out of sync.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::info;

use crate::crypto::{self, EncryptedPackage};
use crate::evidence::{EvidenceItem, EvidenceStore};
use crate::storage::{Storage, VAULT_CT_DOC};
use crate::CryptoError;

pub struct VaultLockController {
    storage: Arc<Storage>,
}

impl VaultLockController {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub async fn is_locked(&self) -> bool {
        self.storage.has_doc(VAULT_CT_DOC).await
    }

    /// Encrypt the current collection into the slot, then empty the store.
    /// Returns the number of items locked away.
    pub async fn lock(&self, evidence: &EvidenceStore, passphrase: &str) -> Result<usize> {
        if self.is_locked().await {
            return Err(anyhow!("vault is already locked"));
        }
        let items = evidence.list().await;
        let count = items.len();
        let pkg = crypto::encrypt_json(&items, passphrase)?;
        self.storage
            .write_doc(VAULT_CT_DOC, &serde_json::to_vec(&pkg)?)
            .await?;
        evidence.clear().await?;
        info!(count, "vault locked");
        Ok(count)
    }

    /// Decrypt the slot and restore the collection. On a bad passphrase the
    /// slot is retained and the store untouched, so the user can retry.
    pub async fn unlock(&self, evidence: &EvidenceStore, passphrase: &str) -> Result<usize> {
        let bytes = self
            .storage
            .read_doc(VAULT_CT_DOC)
            .await?
            .ok_or_else(|| anyhow!("vault is not locked"))?;
        let pkg: EncryptedPackage =
            serde_json::from_slice(&bytes).map_err(|_| CryptoError::Decrypt)?;
        let items: Vec<EvidenceItem> = crypto::decrypt_json(&pkg, passphrase)?;
        let count = items.len();
        evidence.replace_all(items).await?;
        self.storage.delete_doc(VAULT_CT_DOC).await?;
        info!(count, "vault unlocked");
        Ok(count)
    }
}
