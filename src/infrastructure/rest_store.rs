use crate::infrastructure::error::InfraError;
use crate::infrastructure::record_store::{EntityKind, RecordStore, StoredRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

pub const STORE_URL_ENV: &str = "TIMETABLE_STORE_URL";
pub const STORE_KEY_ENV: &str = "TIMETABLE_STORE_KEY";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestStoreConfig {
    pub base_url: Url,
    pub api_key: String,
}

impl RestStoreConfig {
    pub fn from_env(fallback_url: Option<&str>) -> Result<Option<Self>, InfraError> {
        Self::from_lookup(fallback_url, |key| std::env::var(key).ok())
    }

    /// Returns `None` when no store URL is configured anywhere; the caller then
    /// runs against the local SQLite store.
    pub fn from_lookup<F>(fallback_url: Option<&str>, lookup: F) -> Result<Option<Self>, InfraError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(STORE_URL_ENV)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .or_else(|| {
                fallback_url
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(ToOwned::to_owned)
            });
        let Some(url) = url else {
            return Ok(None);
        };

        let api_key = lookup(STORE_KEY_ENV)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                InfraError::InvalidConfig(format!("{STORE_KEY_ENV} is required when a store URL is set"))
            })?;

        // A trailing slash keeps `Url::join` from dropping the last path segment.
        let normalized = if url.ends_with('/') { url } else { format!("{url}/") };
        let base_url = Url::parse(&normalized)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid store url '{normalized}': {error}")))?;

        Ok(Some(Self { base_url, api_key }))
    }
}

/// PostgREST-style store: one table per entity kind, filtered by owner.
#[derive(Debug, Clone)]
pub struct RestRecordStore {
    client: Client,
    config: RestStoreConfig,
}

#[derive(Debug, Deserialize)]
struct RestRow {
    id: String,
    owner_key: String,
    #[serde(default)]
    fields: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct InsertRow<'a> {
    owner_key: &'a str,
    fields: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
struct PatchRow<'a> {
    fields: &'a serde_json::Value,
    updated_at: DateTime<Utc>,
}

impl RestRecordStore {
    pub fn new(config: RestStoreConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn table_name(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Profile => "profiles",
            EntityKind::Course => "courses",
            EntityKind::Room => "rooms",
            EntityKind::Timetable => "timetables",
        }
    }

    fn table_endpoint(&self, kind: EntityKind) -> Result<Url, InfraError> {
        self.config
            .base_url
            .join(Self::table_name(kind))
            .map_err(|error| InfraError::Store(format!("invalid store endpoint: {error}")))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    fn http_error(kind: EntityKind, status: StatusCode, body: &str) -> InfraError {
        if status == StatusCode::NOT_FOUND {
            return InfraError::NotFound(format!("{} endpoint", kind.as_str()));
        }
        let message = if body.trim().is_empty() {
            format!("{} store request failed: http {}", kind.as_str(), status.as_u16())
        } else {
            format!(
                "{} store request failed: http {}; body={body}",
                kind.as_str(),
                status.as_u16()
            )
        };
        InfraError::Store(message)
    }

    async fn send(&self, kind: EntityKind, request: RequestBuilder) -> Result<String, InfraError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|error| InfraError::Store(format!("network error for {}: {error}", kind.as_str())))?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Store(format!("failed reading {} response: {error}", kind.as_str()))
        })?;

        if !status.is_success() {
            return Err(Self::http_error(kind, status, &body));
        }
        Ok(body)
    }

    fn parse_rows(kind: EntityKind, body: &str) -> Result<Vec<StoredRecord>, InfraError> {
        let rows: Vec<RestRow> = serde_json::from_str(body).map_err(|error| {
            InfraError::Store(format!("invalid {} payload: {error}; body={body}", kind.as_str()))
        })?;
        Ok(rows
            .into_iter()
            .map(|row| StoredRecord {
                id: row.id,
                kind,
                owner_key: row.owner_key,
                fields: row.fields,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
            .collect())
    }

    fn single_row(kind: EntityKind, body: &str, id: Option<&str>) -> Result<StoredRecord, InfraError> {
        Self::parse_rows(kind, body)?.into_iter().next().ok_or_else(|| match id {
            Some(id) => InfraError::NotFound(format!("{} {id}", kind.as_str())),
            None => InfraError::Store(format!("{} create returned no row", kind.as_str())),
        })
    }
}

fn eq_filter(value: &str) -> String {
    format!("eq.{value}")
}

fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
    if value.trim().is_empty() {
        return Err(InfraError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

#[async_trait]
impl RecordStore for RestRecordStore {
    async fn list(&self, kind: EntityKind, owner_key: &str) -> Result<Vec<StoredRecord>, InfraError> {
        ensure_non_empty(owner_key, "owner key")?;
        let request = self.client.get(self.table_endpoint(kind)?).query(&[
            ("owner_key", eq_filter(owner_key.trim())),
            ("order", "created_at.asc".to_string()),
        ]);
        let body = self.send(kind, request).await?;
        Self::parse_rows(kind, &body)
    }

    async fn create(
        &self,
        kind: EntityKind,
        owner_key: &str,
        fields: serde_json::Value,
    ) -> Result<StoredRecord, InfraError> {
        ensure_non_empty(owner_key, "owner key")?;
        let request = self
            .client
            .post(self.table_endpoint(kind)?)
            .header("Prefer", "return=representation")
            .json(&InsertRow {
                owner_key: owner_key.trim(),
                fields: &fields,
            });
        let body = self.send(kind, request).await?;
        Self::single_row(kind, &body, None)
    }

    async fn update(
        &self,
        kind: EntityKind,
        owner_key: &str,
        id: &str,
        fields: serde_json::Value,
    ) -> Result<StoredRecord, InfraError> {
        ensure_non_empty(owner_key, "owner key")?;
        ensure_non_empty(id, "record id")?;
        let request = self
            .client
            .patch(self.table_endpoint(kind)?)
            .query(&[("owner_key", eq_filter(owner_key.trim())), ("id", eq_filter(id))])
            .header("Prefer", "return=representation")
            .json(&PatchRow {
                fields: &fields,
                updated_at: Utc::now(),
            });
        let body = self.send(kind, request).await?;
        Self::single_row(kind, &body, Some(id))
    }

    async fn delete(&self, kind: EntityKind, owner_key: &str, id: &str) -> Result<(), InfraError> {
        ensure_non_empty(owner_key, "owner key")?;
        ensure_non_empty(id, "record id")?;
        let request = self
            .client
            .delete(self.table_endpoint(kind)?)
            .query(&[("owner_key", eq_filter(owner_key.trim())), ("id", eq_filter(id))]);
        self.send(kind, request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(values: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = values
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn store() -> RestRecordStore {
        let config = RestStoreConfig::from_lookup(
            Some("https://db.example.test/rest/v1"),
            lookup_from(&[(STORE_KEY_ENV, "anon-key")]),
        )
        .expect("config")
        .expect("configured");
        RestRecordStore::new(config)
    }

    #[test]
    fn config_is_absent_without_url() {
        let config = RestStoreConfig::from_lookup(None, lookup_from(&[(STORE_KEY_ENV, "k")]))
            .expect("lookup succeeds");
        assert!(config.is_none());
    }

    #[test]
    fn config_prefers_env_url_over_fallback() {
        let config = RestStoreConfig::from_lookup(
            Some("https://fallback.example.test"),
            lookup_from(&[
                (STORE_URL_ENV, " https://env.example.test/rest/v1 "),
                (STORE_KEY_ENV, "secret"),
            ]),
        )
        .expect("lookup succeeds")
        .expect("configured");

        assert_eq!(config.base_url.as_str(), "https://env.example.test/rest/v1/");
        assert_eq!(config.api_key, "secret");
    }

    #[test]
    fn config_requires_key_when_url_is_set() {
        let result = RestStoreConfig::from_lookup(
            None,
            lookup_from(&[(STORE_URL_ENV, "https://env.example.test")]),
        );
        assert!(matches!(result, Err(InfraError::InvalidConfig(_))));

        let result = RestStoreConfig::from_lookup(
            Some("not a url"),
            lookup_from(&[(STORE_KEY_ENV, "secret")]),
        );
        assert!(matches!(result, Err(InfraError::InvalidConfig(_))));
    }

    #[test]
    fn table_endpoint_keeps_base_path() {
        let endpoint = store().table_endpoint(EntityKind::Timetable).expect("endpoint");
        assert_eq!(endpoint.as_str(), "https://db.example.test/rest/v1/timetables");
    }

    #[test]
    fn http_error_maps_not_found_and_store_failures() {
        assert!(RestRecordStore::http_error(EntityKind::Course, StatusCode::NOT_FOUND, "").is_not_found());

        let error = RestRecordStore::http_error(EntityKind::Room, StatusCode::SERVICE_UNAVAILABLE, "down");
        assert!(error.is_store_failure());
        assert!(error.to_string().contains("http 503; body=down"));
    }

    #[test]
    fn parse_rows_attaches_kind_and_rejects_bad_payloads() {
        let body = r#"[{"id":"r1","owner_key":"uid-1","fields":{"code":"CSE-3101"},
            "created_at":"2026-10-16T08:00:00Z","updated_at":"2026-10-16T08:05:00Z"}]"#;
        let rows = RestRecordStore::parse_rows(EntityKind::Course, body).expect("parse rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, EntityKind::Course);
        assert_eq!(rows[0].fields["code"], "CSE-3101");

        assert!(matches!(
            RestRecordStore::parse_rows(EntityKind::Course, "{\"message\":\"oops\"}"),
            Err(InfraError::Store(_))
        ));
        assert!(matches!(
            RestRecordStore::single_row(EntityKind::Course, "[]", Some("r9")),
            Err(InfraError::NotFound(_))
        ));
    }
}
