use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::retention::RetentionSettings;
use crate::storage::{Storage, SETTINGS_DOC};

/// Persisted, process-wide settings. `encSaltB64` is the only crypto material
/// ever stored: the session-key salt from the "encrypt new files" flow (the
/// key itself lives in memory for the session and dies with it).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VaultSettings {
    pub retention: RetentionSettings,
    pub enc_salt_b64: Option<String>,
    pub enc_hint: Option<String>,
}

pub async fn load_settings(storage: &Storage) -> VaultSettings {
    match storage.read_doc(SETTINGS_DOC).await {
        Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!(error = %e, "settings document corrupt, using defaults");
            VaultSettings::default()
        }),
        Ok(None) => VaultSettings::default(),
        Err(e) => {
            warn!(error = %e, "cannot read settings, using defaults");
            VaultSettings::default()
        }
    }
}

pub async fn save_settings(storage: &Storage, settings: &VaultSettings) -> Result<()> {
    let bytes = serde_json::to_vec(settings)?;
    storage.write_doc(SETTINGS_DOC, &bytes).await
}
