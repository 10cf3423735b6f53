//! "Recently Deleted" — a time-boxed soft-delete buffer.
//!
//! Soft-deleted items sit here for a TTL (10 minutes by default) before the
//! expiry sweep purges them for good. `restore` deliberately ignores the TTL:
//! expiry is enforced only by `purge_expired`, so a user who clicks Restore
//! while the countdown shows 00:00 still gets their item back if the sweep
//! has not fired yet.
//!
//! Persistence is best-effort, mirroring the original app's guarded
//! localStorage writes: a failed save is logged and the in-memory state
//! stays authoritative for the session.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::evidence::{now_ms, EvidenceItem};
use crate::storage::{Storage, ARCHIVE_DOC};
use uuid::Uuid;

pub const DEFAULT_TTL_MS: i64 = 10 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntry {
    /// Same id as the archived item — identity survives the soft-delete.
    pub id: String,
    pub item: EvidenceItem,
    pub archived_at: i64,
    #[serde(default = "default_ttl")]
    pub ttl_ms: i64,
}

fn default_ttl() -> i64 {
    DEFAULT_TTL_MS
}

pub struct ArchiveStore {
    storage: Arc<Storage>,
    entries: Mutex<Vec<ArchiveEntry>>,
}

impl ArchiveStore {
    pub async fn open(storage: Arc<Storage>) -> Self {
        let entries = match storage.read_doc(ARCHIVE_DOC).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<Vec<Value>>(&bytes) {
                Ok(values) => sanitize_entries(values),
                Err(e) => {
                    warn!(error = %e, "archive document corrupt, resetting to empty");
                    let _ = storage.write_doc(ARCHIVE_DOC, b"[]").await;
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "cannot read archive document, starting empty");
                Vec::new()
            }
        };
        Self {
            storage,
            entries: Mutex::new(entries),
        }
    }

    /// Wrap items as entries and merge them in, keyed by id — on a duplicate
    /// id the entry with the newer `archivedAt` wins. Returns the full list,
    /// newest first.
    pub async fn archive(&self, items: Vec<EvidenceItem>, ttl_ms: Option<i64>) -> Vec<ArchiveEntry> {
        let ttl = ttl_ms.filter(|t| *t > 0).unwrap_or(DEFAULT_TTL_MS);
        let now = now_ms();
        let mut entries = self.entries.lock().await;
        for mut item in items {
            if item.id.is_empty() {
                item.id = Uuid::new_v4().to_string();
            }
            let entry = ArchiveEntry {
                id: item.id.clone(),
                item,
                archived_at: now,
                ttl_ms: ttl,
            };
            if let Some(pos) = entries.iter().position(|e| e.id == entry.id) {
                if entries[pos].archived_at <= entry.archived_at {
                    entries[pos] = entry;
                }
            } else {
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| b.archived_at.cmp(&a.archived_at));
        self.persist(&entries).await;
        entries.clone()
    }

    /// All entries, newest first. No expiry filtering — display is the
    /// caller's call; only the sweep purges.
    pub async fn list(&self) -> Vec<ArchiveEntry> {
        let mut entries = self.entries.lock().await.clone();
        entries.sort_by(|a, b| b.archived_at.cmp(&a.archived_at));
        entries
    }

    /// Remove and return the entry's item. TTL is not checked here.
    pub async fn restore(&self, id: &str) -> Option<EvidenceItem> {
        let mut entries = self.entries.lock().await;
        let idx = entries.iter().position(|e| e.id == id)?;
        let entry = entries.remove(idx);
        self.persist(&entries).await;
        Some(entry.item)
    }

    /// With `None`, wipe everything; otherwise remove just the given ids.
    /// Returns what remains.
    pub async fn purge(&self, ids: Option<&[String]>) -> Vec<ArchiveEntry> {
        let mut entries = self.entries.lock().await;
        match ids {
            None => entries.clear(),
            Some(ids) => {
                let set: HashSet<&str> = ids.iter().map(String::as_str).collect();
                entries.retain(|e| !set.contains(e.id.as_str()));
            }
        }
        self.persist(&entries).await;
        entries.clone()
    }

    /// Drop every entry whose age has reached its TTL. Idempotent; safe on a
    /// fixed interval.
    pub async fn purge_expired(&self) -> Vec<ArchiveEntry> {
        let now = now_ms();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| now - e.archived_at < e.ttl_ms);
        if entries.len() != before {
            self.persist(&entries).await;
        }
        entries.clone()
    }

    pub async fn count(&self) -> usize {
        self.entries.lock().await.len()
    }

    async fn persist(&self, entries: &[ArchiveEntry]) {
        let bytes = match serde_json::to_vec(entries) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "archive serialization failed");
                return;
            }
        };
        if let Err(e) = self.storage.write_doc(ARCHIVE_DOC, &bytes).await {
            warn!(error = %e, "archive persist failed");
        }
    }
}

fn sanitize_entries(values: Vec<Value>) -> Vec<ArchiveEntry> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        let well_formed = value.get("id").and_then(Value::as_str).is_some_and(|s| !s.is_empty())
            && value.get("item").is_some_and(Value::is_object)
            && value.get("archivedAt").is_some_and(Value::is_number);
        if !well_formed {
            warn!("dropping malformed archive entry");
            continue;
        }
        match serde_json::from_value::<ArchiveEntry>(value) {
            Ok(mut entry) => {
                if entry.ttl_ms <= 0 {
                    entry.ttl_ms = DEFAULT_TTL_MS;
                }
                out.push(entry);
            }
            Err(e) => warn!(error = %e, "dropping undecodable archive entry"),
        }
    }
    out
}

// ── Countdown helpers (pure) ────────────────────────────────────────────────

/// Milliseconds until an entry expires, clamped at zero.
pub fn ms_remaining(archived_at: i64, ttl_ms: i64) -> i64 {
    let ttl = if ttl_ms > 0 { ttl_ms } else { DEFAULT_TTL_MS };
    (archived_at + ttl - now_ms()).max(0)
}

/// `MM:SS`, floor-rounded to the second, clamped at zero.
pub fn format_countdown(ms: i64) -> String {
    let total_secs = ms.max(0) / 1000;
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_formatting() {
        assert_eq!(format_countdown(0), "00:00");
        assert_eq!(format_countdown(-5_000), "00:00");
        assert_eq!(format_countdown(999), "00:00");
        assert_eq!(format_countdown(61_000), "01:01");
        assert_eq!(format_countdown(DEFAULT_TTL_MS), "10:00");
    }

    #[test]
    fn remaining_time_is_clamped() {
        let now = now_ms();
        assert_eq!(ms_remaining(now - DEFAULT_TTL_MS - 1_000, DEFAULT_TTL_MS), 0);
        let fresh = ms_remaining(now, DEFAULT_TTL_MS);
        assert!(fresh > DEFAULT_TTL_MS - 1_000 && fresh <= DEFAULT_TTL_MS);
    }

    #[test]
    fn sanitize_drops_entries_missing_required_fields() {
        let values = vec![
            serde_json::json!({
                "id": "a",
                "item": {"id": "a", "type": "note", "createdAt": 1},
                "archivedAt": 5,
                "ttlMs": 1000
            }),
            serde_json::json!({"id": "b", "archivedAt": 5}),
            serde_json::json!({"item": {"id": "c"}, "archivedAt": 5}),
            serde_json::json!({
                "id": "d",
                "item": {"id": "d", "type": "note", "createdAt": 1},
                "archivedAt": 5,
                "ttlMs": -3
            }),
        ];
        let entries = sanitize_entries(values);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "a");
        // Non-positive TTLs fall back to the default.
        assert_eq!(entries[1].ttl_ms, DEFAULT_TTL_MS);
    }
}
