//! Durable local storage for the vault.
//!
//! Two namespaces under one root directory:
//!   `meta/`  — one JSON document per collection (evidence, archives,
//!              settings, the vault-lock ciphertext slot)
//!   `blobs/` — id-keyed binary attachments
//!
//! Documents are written atomically (staging file + rename) so a crash never
//! leaves a half-written collection behind. A one-shot migration moves the
//! legacy flat `evidence_v1.json` file into the evidence document.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

pub const EVIDENCE_DOC: &str = "evidence";
pub const ARCHIVE_DOC: &str = "archives";
pub const SETTINGS_DOC: &str = "settings";
pub const VAULT_CT_DOC: &str = "vault_ct";

const LEGACY_EVIDENCE_FILE: &str = "evidence_v1.json";

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
    meta_dir: PathBuf,
    blobs_dir: PathBuf,
    staging_dir: PathBuf,
}

impl Storage {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let meta_dir = root.join("meta");
        let blobs_dir = root.join("blobs");
        let staging_dir = root.join("staging");
        fs::create_dir_all(&meta_dir).await?;
        fs::create_dir_all(&blobs_dir).await?;
        fs::create_dir_all(&staging_dir).await?;
        restrict_dir_permissions(&root);
        cleanup_staging_dir(&staging_dir).await;
        Ok(Self {
            root,
            meta_dir,
            blobs_dir,
            staging_dir,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ── Documents ───────────────────────────────────────────────────────────

    pub async fn read_doc(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.doc_path(key);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read doc {key}")),
        }
    }

    pub async fn write_doc(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.doc_path(key);
        self.write_atomic(&path, bytes)
            .await
            .with_context(|| format!("write doc {key}"))
    }

    pub async fn delete_doc(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.doc_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("delete doc {key}")),
        }
    }

    pub async fn has_doc(&self, key: &str) -> bool {
        fs::try_exists(self.doc_path(key)).await.unwrap_or(false)
    }

    // ── Blobs ───────────────────────────────────────────────────────────────

    pub async fn put_blob(&self, id: &str, bytes: &[u8]) -> Result<()> {
        let path = self.blob_path(id);
        self.write_atomic(&path, bytes)
            .await
            .with_context(|| format!("write blob {id}"))
    }

    pub async fn get_blob(&self, id: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.blob_path(id)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read blob {id}")),
        }
    }

    pub async fn delete_blob(&self, id: &str) -> Result<()> {
        match fs::remove_file(self.blob_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("delete blob {id}")),
        }
    }

    pub async fn clear_blobs(&self) -> Result<()> {
        fs::remove_dir_all(&self.blobs_dir).await.ok();
        fs::create_dir_all(&self.blobs_dir).await?;
        Ok(())
    }

    // ── Migration ───────────────────────────────────────────────────────────

    /// Move the legacy flat evidence file into the document store. Runs once;
    /// a missing legacy file is a no-op, a corrupt one is left alone.
    pub async fn migrate_legacy(&self) -> Result<bool> {
        let legacy = self.root.join(LEGACY_EVIDENCE_FILE);
        let raw = match fs::read(&legacy).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e).context("read legacy evidence file"),
        };
        match serde_json::from_slice::<Vec<serde_json::Value>>(&raw) {
            Ok(_) => {
                self.write_doc(EVIDENCE_DOC, &raw).await?;
                fs::remove_file(&legacy).await?;
                info!("migrated legacy evidence file into document store");
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "legacy evidence file is not a JSON array, skipping migration");
                Ok(false)
            }
        }
    }

    // ── Wipe ────────────────────────────────────────────────────────────────

    /// Destroy the entire storage root: every document, every blob, the salt
    /// and hint in settings. There is no undo.
    pub async fn wipe_everything(&self) -> Result<()> {
        fs::remove_dir_all(&self.root)
            .await
            .context("wipe storage root")?;
        warn!(root = %self.root.display(), "storage wiped");
        Ok(())
    }

    // ── Private helpers ─────────────────────────────────────────────────────

    fn doc_path(&self, key: &str) -> PathBuf {
        self.meta_dir.join(format!("{key}.json"))
    }

    fn blob_path(&self, id: &str) -> PathBuf {
        self.blobs_dir.join(format!("{id}.bin"))
    }

    async fn write_atomic(&self, dest: &Path, bytes: &[u8]) -> Result<()> {
        let staging = self.staging_dir.join(format!("{}.staging", Uuid::new_v4()));
        {
            let mut file = fs::File::create(&staging).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
        }
        fs::rename(&staging, dest).await?;
        Ok(())
    }
}

fn restrict_dir_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)) {
            warn!("cannot restrict permissions on {}: {}", path.display(), e);
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

/// Remove any leftover `.staging` files from a previous crash.
async fn cleanup_staging_dir(staging_dir: &Path) {
    if let Ok(mut entries) = fs::read_dir(staging_dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy().ends_with(".staging") {
                warn!(path = %entry.path().display(), "removing orphaned staging file");
                let _ = fs::remove_file(entry.path()).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn doc_roundtrip_and_delete() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).await.unwrap();
        assert!(storage.read_doc("x").await.unwrap().is_none());
        storage.write_doc("x", b"[1,2]").await.unwrap();
        assert_eq!(storage.read_doc("x").await.unwrap().unwrap(), b"[1,2]");
        assert!(storage.has_doc("x").await);
        storage.delete_doc("x").await.unwrap();
        assert!(!storage.has_doc("x").await);
        // Deleting again is fine.
        storage.delete_doc("x").await.unwrap();
    }

    #[tokio::test]
    async fn blob_roundtrip_and_clear_all() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).await.unwrap();
        storage.put_blob("a", &[1, 2, 3]).await.unwrap();
        storage.put_blob("b", &[4]).await.unwrap();
        assert_eq!(storage.get_blob("a").await.unwrap().unwrap(), vec![1, 2, 3]);
        storage.delete_blob("a").await.unwrap();
        assert!(storage.get_blob("a").await.unwrap().is_none());
        storage.clear_blobs().await.unwrap();
        assert!(storage.get_blob("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn wipe_removes_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("vault");
        let storage = Storage::open(&root).await.unwrap();
        storage.write_doc("settings", b"{}").await.unwrap();
        storage.wipe_everything().await.unwrap();
        assert!(!root.exists());
    }
}
