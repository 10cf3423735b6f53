//! The authoritative evidence collection.
//!
//! Items live newest-first in one persisted document; every mutation rewrites
//! the whole collection through a single mutex, so two callers can never race
//! on the last-write-wins persistence path. Read paths self-heal: records
//! without an id (or that fail to decode) are dropped with a warning, and a
//! corrupt top-level payload resets the document to an empty collection
//! rather than surfacing an error.

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::storage::{Storage, EVIDENCE_DOC};

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    #[default]
    Note,
    Image,
    Scan,
    Link,
    Pdf,
    File,
}

/// One captured artifact. Field names stay camelCase on the wire so items
/// survive round-trips through packages exported by the browser app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceItem {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: EvidenceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// Payload for [`EvidenceStore::add`]; id and creation time are assigned by
/// the store.
#[derive(Debug, Clone, Default)]
pub struct NewEvidence {
    pub kind: EvidenceKind,
    pub title: Option<String>,
    pub content: Option<String>,
    pub metadata: Map<String, Value>,
}

pub struct EvidenceStore {
    storage: Arc<Storage>,
    items: Mutex<Vec<EvidenceItem>>,
}

impl EvidenceStore {
    pub async fn open(storage: Arc<Storage>) -> Result<Self> {
        if let Err(e) = storage.migrate_legacy().await {
            warn!(error = %e, "legacy evidence migration failed");
        }
        let items = match storage.read_doc(EVIDENCE_DOC).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<Vec<Value>>(&bytes) {
                Ok(values) => sanitize_items(values),
                Err(e) => {
                    warn!(error = %e, "evidence document corrupt, resetting to empty");
                    let _ = storage.write_doc(EVIDENCE_DOC, b"[]").await;
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "cannot read evidence document, starting empty");
                Vec::new()
            }
        };
        Ok(Self {
            storage,
            items: Mutex::new(items),
        })
    }

    /// Assign a fresh id and timestamp, prepend, persist. Returns the new id.
    pub async fn add(&self, payload: NewEvidence) -> Result<String> {
        let item = EvidenceItem {
            id: Uuid::new_v4().to_string(),
            kind: payload.kind,
            title: payload.title,
            content: payload.content,
            created_at: now_ms(),
            updated_at: None,
            metadata: payload.metadata,
        };
        let id = item.id.clone();
        let mut items = self.items.lock().await;
        items.insert(0, item);
        self.persist(&items).await?;
        Ok(id)
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        let mut items = self.items.lock().await;
        items.retain(|e| e.id != id);
        self.persist(&items).await
    }

    pub async fn clear(&self) -> Result<()> {
        let mut items = self.items.lock().await;
        items.clear();
        self.persist(&items).await
    }

    /// Atomically swap the whole collection (backup restore, vault unlock).
    pub async fn replace_all(&self, new_items: Vec<EvidenceItem>) -> Result<()> {
        let mut items = self.items.lock().await;
        *items = new_items.into_iter().filter(|e| !e.id.is_empty()).collect();
        self.persist(&items).await
    }

    /// Replace one item's content in place (redaction save), stamping
    /// `updatedAt`.
    pub async fn replace_content(&self, id: &str, content: String) -> Result<bool> {
        let mut items = self.items.lock().await;
        let Some(item) = items.iter_mut().find(|e| e.id == id) else {
            return Ok(false);
        };
        item.content = Some(content);
        item.updated_at = Some(now_ms());
        self.persist(&items).await?;
        Ok(true)
    }

    pub async fn list(&self) -> Vec<EvidenceItem> {
        self.items.lock().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<EvidenceItem> {
        self.items.lock().await.iter().find(|e| e.id == id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.items.lock().await.len()
    }

    async fn persist(&self, items: &[EvidenceItem]) -> Result<()> {
        let bytes = serde_json::to_vec(items)?;
        self.storage.write_doc(EVIDENCE_DOC, &bytes).await
    }
}

/// Keep only well-formed records carrying a non-empty string id; drop the
/// rest silently (logged, never thrown).
fn sanitize_items(values: Vec<Value>) -> Vec<EvidenceItem> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        let has_id = value
            .get("id")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty());
        if !has_id {
            warn!("dropping stored evidence record without id");
            continue;
        }
        match serde_json::from_value::<EvidenceItem>(value) {
            Ok(item) => out.push(item),
            Err(e) => warn!(error = %e, "dropping malformed evidence record"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_drops_idless_and_malformed_records() {
        let values = vec![
            serde_json::json!({"id": "a", "type": "note", "content": "ok", "createdAt": 1}),
            serde_json::json!({"type": "note", "content": "no id"}),
            serde_json::json!({"id": "", "content": "empty id"}),
            serde_json::json!("not even an object"),
            serde_json::json!({"id": "b", "type": "image", "metadata": {"mime": "image/png"}}),
        ];
        let items = sanitize_items(values);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "a");
        assert_eq!(items[1].kind, EvidenceKind::Image);
    }

    #[test]
    fn wire_format_is_camel_case_with_type_tag() {
        let item = EvidenceItem {
            id: "x".into(),
            kind: EvidenceKind::Scan,
            title: Some("t".into()),
            content: None,
            created_at: 42,
            updated_at: Some(43),
            metadata: Map::new(),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "scan");
        assert_eq!(json["createdAt"], 42);
        assert_eq!(json["updatedAt"], 43);
        assert!(json.get("metadata").is_none());
        assert!(json.get("content").is_none());
    }
}
