//! Age-based retention sweep.
//!
//! Runs once at application start and again whenever the user changes the
//! retention settings; continuous re-checking is not required. Soft mode
//! moves expired items into Recently Deleted (identity preserved); hard mode
//! deletes them outright with no undo.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::archive::ArchiveStore;
use crate::evidence::{now_ms, EvidenceStore};

pub const DAY_MS: i64 = 86_400_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetentionSettings {
    /// Age threshold in days; 0 disables the sweep.
    pub days: u32,
    /// When set, expired items are permanently deleted instead of archived.
    pub hard: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetentionOutcome {
    pub archived: usize,
    pub deleted: usize,
}

pub struct RetentionPolicy {
    settings: RetentionSettings,
}

impl RetentionPolicy {
    pub fn new(settings: RetentionSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> RetentionSettings {
        self.settings
    }

    pub async fn run(
        &self,
        evidence: &EvidenceStore,
        archive: &ArchiveStore,
    ) -> Result<RetentionOutcome> {
        if self.settings.days == 0 {
            return Ok(RetentionOutcome::default());
        }
        let cutoff = now_ms() - i64::from(self.settings.days) * DAY_MS;
        let expired: Vec<_> = evidence
            .list()
            .await
            .into_iter()
            .filter(|e| e.created_at < cutoff)
            .collect();
        if expired.is_empty() {
            return Ok(RetentionOutcome::default());
        }

        let count = expired.len();
        if self.settings.hard {
            for item in &expired {
                evidence.remove(&item.id).await?;
            }
            info!(count, days = self.settings.days, "retention: deleted expired items");
            Ok(RetentionOutcome {
                archived: 0,
                deleted: count,
            })
        } else {
            archive.archive(expired.clone(), None).await;
            for item in &expired {
                evidence.remove(&item.id).await?;
            }
            info!(count, days = self.settings.days, "retention: moved expired items to recently deleted");
            Ok(RetentionOutcome {
                archived: count,
                deleted: 0,
            })
        }
    }
}
