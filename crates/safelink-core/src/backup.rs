//! Portable encrypted backups (`.slvault`).
//!
//! One package holds the evidence collection, the Recently Deleted items
//! (content only — countdowns restart on import), and the retention
//! settings. Import validates the decrypted payload completely before
//! touching any store, so a wrong passphrase or a truncated file leaves the
//! existing state exactly as it was.

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::archive::ArchiveStore;
use crate::crypto::{self, EncryptedPackage};
use crate::evidence::{now_ms, EvidenceItem, EvidenceStore};
use crate::retention::RetentionSettings;
use crate::settings::{load_settings, save_settings};
use crate::storage::Storage;
use crate::CryptoError;

pub const BACKUP_VERSION: u32 = 1;
pub const BACKUP_APP_TAG: &str = "safelink";
pub const BACKUP_EXTENSION: &str = "slvault";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPackage {
    pub v: u32,
    pub created_at: i64,
    pub app: String,
    pub evidence: Vec<EvidenceItem>,
    #[serde(default)]
    pub archives: Vec<EvidenceItem>,
    #[serde(default)]
    pub settings: RetentionSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOutcome {
    pub evidence: usize,
    pub archives: usize,
}

/// Snapshot everything and encrypt it under the given passphrase. The result
/// is the serialized package, ready to write to a download/file.
pub async fn export(
    evidence: &EvidenceStore,
    archive: &ArchiveStore,
    settings: RetentionSettings,
    passphrase: &str,
) -> Result<Vec<u8>> {
    let pkg = BackupPackage {
        v: BACKUP_VERSION,
        created_at: now_ms(),
        app: BACKUP_APP_TAG.to_string(),
        evidence: evidence.list().await,
        archives: archive.list().await.into_iter().map(|e| e.item).collect(),
        settings,
    };
    let enc = crypto::encrypt_json(&pkg, passphrase)?;
    Ok(serde_json::to_vec(&enc)?)
}

/// `safelink_backup_<timestamp>.slvault`, matching the original app's export
/// naming.
pub fn suggested_filename() -> String {
    format!(
        "safelink_backup_{}.{}",
        Utc::now().format("%Y-%m-%d-%H-%M-%S"),
        BACKUP_EXTENSION
    )
}

/// Decrypt and validate, then atomically: replace the evidence collection,
/// reset Recently Deleted and re-archive the imported items with a fresh TTL
/// window, and overwrite the retention settings.
pub async fn import(
    bytes: &[u8],
    passphrase: &str,
    evidence: &EvidenceStore,
    archive: &ArchiveStore,
    storage: &Storage,
) -> Result<ImportOutcome> {
    let enc: EncryptedPackage = serde_json::from_slice(bytes).map_err(|_| CryptoError::Decrypt)?;
    let raw: Value = crypto::decrypt_json(&enc, passphrase)?;
    if !raw.get("evidence").is_some_and(Value::is_array) {
        return Err(anyhow!("invalid backup package: missing evidence list"));
    }
    let pkg: BackupPackage =
        serde_json::from_value(raw).map_err(|e| anyhow!("invalid backup package: {e}"))?;

    // Validation is done — only now do we start mutating.
    let outcome = ImportOutcome {
        evidence: pkg.evidence.len(),
        archives: pkg.archives.len(),
    };
    evidence.replace_all(pkg.evidence).await?;
    archive.purge(None).await;
    if !pkg.archives.is_empty() {
        archive.archive(pkg.archives, None).await;
    }
    let mut settings = load_settings(storage).await;
    settings.retention = pkg.settings;
    save_settings(storage, &settings).await?;

    info!(
        items = outcome.evidence,
        archived = outcome.archives,
        "backup imported"
    );
    Ok(outcome)
}
