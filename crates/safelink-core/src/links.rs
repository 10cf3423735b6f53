//! Thin client for the companion redirect/log service.
//!
//! The service issues tracked redirect links for lawful evidence-gathering:
//! `POST /api/links` creates one, `GET /api/links/:id` returns it with its
//! click events, and the public `GET /r/:id` captures IP/UA/geo before
//! redirecting. The vault's only contract with it is the `note` item created
//! here, whose `metadata.kind` is `"evidence-link"`.

use anyhow::{anyhow, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::evidence::{EvidenceKind, NewEvidence};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedLink {
    pub id: String,
    /// Server-relative redirect path, e.g. `/r/<id>`.
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoInfo {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkEvent {
    pub at: i64,
    pub ip: String,
    pub ua: String,
    #[serde(default)]
    pub geo: Option<GeoInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedLink {
    pub id: String,
    pub created_at: i64,
    pub label: String,
    pub target: String,
    #[serde(default)]
    pub events: Vec<LinkEvent>,
}

#[derive(Clone)]
pub struct LinkClient {
    client: reqwest::Client,
    base_url: String,
}

impl LinkClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("safelink-core/0.1")
            .build()
            .expect("reqwest client");
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn create_link(&self, label: &str, target: &str) -> Result<CreatedLink> {
        let url = format!("{}/api/links", self.base_url);
        let res = self
            .client
            .post(url)
            .json(&json!({"label": label, "target": target}))
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(anyhow!("link creation failed with status {}", res.status()));
        }
        Ok(res.json().await?)
    }

    pub async fn fetch_link(&self, id: &str) -> Result<TrackedLink> {
        let url = format!("{}/api/links/{}", self.base_url, id);
        let res = self.client.get(url).send().await?;
        if res.status() == StatusCode::NOT_FOUND {
            return Err(anyhow!("link not found: {id}"));
        }
        if !res.status().is_success() {
            return Err(anyhow!("link fetch failed with status {}", res.status()));
        }
        Ok(res.json().await?)
    }
}

/// Build the `note` evidence item that records a created link in the vault.
pub fn evidence_link_item(link: &CreatedLink, target: &str) -> NewEvidence {
    let mut metadata = Map::new();
    metadata.insert("kind".into(), Value::from("evidence-link"));
    metadata.insert("id".into(), Value::from(link.id.clone()));
    metadata.insert("target".into(), Value::from(target));
    NewEvidence {
        kind: EvidenceKind::Note,
        title: Some("Evidence link created".to_string()),
        content: Some(format!(
            "ID: {}\nPath: {}\nTarget: {}",
            link.id, link.url, target
        )),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evidence_link_item_carries_the_contract_metadata() {
        let link = CreatedLink {
            id: "abc123".into(),
            url: "/r/abc123".into(),
        };
        let payload = evidence_link_item(&link, "https://example.org/");
        assert_eq!(payload.kind, EvidenceKind::Note);
        assert_eq!(payload.metadata["kind"], "evidence-link");
        assert_eq!(payload.metadata["id"], "abc123");
        assert!(payload.content.as_deref().unwrap().contains("/r/abc123"));
    }

    #[test]
    fn tracked_link_decodes_server_payload() {
        let body = serde_json::json!({
            "id": "x1",
            "createdAt": 1700000000000i64,
            "label": "resources",
            "target": "https://example.org/",
            "events": [
                {"at": 1700000001000i64, "ip": "203.0.113.9", "ua": "Mozilla/5.0",
                 "geo": {"city": "Boca", "countryCode": "US", "lat": 26.4, "lon": -80.1}}
            ]
        });
        let link: TrackedLink = serde_json::from_value(body).unwrap();
        assert_eq!(link.events.len(), 1);
        assert_eq!(link.events[0].geo.as_ref().unwrap().city.as_deref(), Some("Boca"));
    }
}
