//! Elasticsearch-compatible REST backend.
//!
//! Thin client over the JSON/bulk API: `_bulk` NDJSON writes with
//! `refresh=wait_for` (so every write is acknowledged and visible before
//! the call returns), `_mget` bulk reads, term-query shard listing, and the
//! alias/reindex administration the lifecycle manager needs.
//!
//! Transient failures (HTTP 429, 5xx, network errors) are retried with
//! exponential backoff; other client errors fail immediately.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use std::collections::HashMap;
use std::time::Duration;

use crate::config::BackendConfig;
use crate::models::{EntityKind, SearchDocument};

use super::SearchBackend;

pub struct ElasticBackend {
    client: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    max_retries: u32,
}

impl ElasticBackend {
    /// Build a backend from config. Returns `None` when no URL is
    /// configured: search is a non-critical enhancement, so an unconfigured
    /// backend turns the subsystem into a no-op rather than an error.
    pub fn from_config(config: &BackendConfig) -> Result<Option<Self>> {
        let url = match &config.url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => return Ok(None),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Some(Self {
            client,
            base_url: url,
            username: config.username.clone(),
            password: config.password.clone(),
            max_retries: config.max_retries,
        }))
    }

    fn req(&self, method: Method, path: &str) -> RequestBuilder {
        let mut rb = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(user) = &self.username {
            rb = rb.basic_auth(user, self.password.as_deref());
        }
        rb
    }

    /// Send a request, retrying 429/5xx and network errors with
    /// exponential backoff (1s, 2s, 4s, ...). The builder closure is
    /// re-invoked per attempt because a request body is consumed on send.
    async fn send_with_retry<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!("backend error {}: {}", status, body));
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!("backend request failed: {}", e));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("backend request failed")))
    }

    /// Bulk NDJSON request. Fails if any item in the response failed,
    /// except `not_found` results on deletes.
    async fn bulk(&self, body: String) -> Result<()> {
        let response = self
            .send_with_retry(|| {
                self.req(Method::POST, "/_bulk?refresh=wait_for")
                    .header("Content-Type", "application/x-ndjson")
                    .body(body.clone())
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("bulk request failed with {}: {}", status, text);
        }

        let json: serde_json::Value = response.json().await?;
        if json["errors"].as_bool() != Some(true) {
            return Ok(());
        }

        let mut failures = Vec::new();
        for item in json["items"].as_array().map(Vec::as_slice).unwrap_or(&[]) {
            for (_op, detail) in item.as_object().into_iter().flatten() {
                let result = detail["result"].as_str().unwrap_or("");
                if detail.get("error").is_some() && result != "not_found" {
                    failures.push(format!(
                        "{}: {}",
                        detail["_id"].as_str().unwrap_or("?"),
                        detail["error"]["reason"].as_str().unwrap_or("unknown")
                    ));
                }
            }
        }
        if failures.is_empty() {
            return Ok(());
        }
        bail!("bulk request had {} item failures: {}", failures.len(), failures.join("; "));
    }
}

#[async_trait]
impl SearchBackend for ElasticBackend {
    async fn get_docs(
        &self,
        kind: EntityKind,
        ids: &[String],
    ) -> Result<HashMap<String, SearchDocument>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let body = serde_json::json!({ "ids": ids });
        let response = self
            .send_with_retry(|| {
                self.req(Method::POST, &format!("/{}/_mget", kind.alias()))
                    .json(&body)
            })
            .await?;

        // A kind that has never been configured has no index yet; treat it
        // as an empty result rather than an error.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(HashMap::new());
        }
        if !response.status().is_success() {
            bail!("mget failed with {}", response.status());
        }

        let json: serde_json::Value = response.json().await?;
        let mut found = HashMap::new();
        for doc in json["docs"].as_array().map(Vec::as_slice).unwrap_or(&[]) {
            if doc["found"].as_bool() == Some(true) {
                let parsed: SearchDocument = serde_json::from_value(doc["_source"].clone())
                    .with_context(|| {
                        format!("indexed document {} failed to parse", doc["_id"])
                    })?;
                found.insert(parsed.id.clone(), parsed);
            }
        }
        Ok(found)
    }

    async fn upsert(&self, kind: EntityKind, docs: &[SearchDocument]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }

        let mut body = String::new();
        for doc in docs {
            body.push_str(&serde_json::to_string(&serde_json::json!({
                "index": { "_index": kind.alias(), "_id": doc.id }
            }))?);
            body.push('\n');
            body.push_str(&serde_json::to_string(doc)?);
            body.push('\n');
        }
        self.bulk(body).await
    }

    async fn delete(&self, kind: EntityKind, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut body = String::new();
        for id in ids {
            body.push_str(&serde_json::to_string(&serde_json::json!({
                "delete": { "_index": kind.alias(), "_id": id }
            }))?);
            body.push('\n');
        }
        self.bulk(body).await
    }

    async fn exists(&self, kind: EntityKind, id: &str) -> Result<bool> {
        let response = self
            .send_with_retry(|| {
                self.req(Method::HEAD, &format!("/{}/_doc/{}", kind.alias(), id))
            })
            .await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => bail!("existence probe for {} failed with {}", id, s),
        }
    }

    /// Single term-query request, capped at the backend's default 10,000-hit
    /// result window. That window is the effective upper bound on shards per
    /// entity; entities beyond it would need `search_after` pagination here.
    async fn find_shard_ids(&self, kind: EntityKind, entity_id: &str) -> Result<Vec<String>> {
        let body = serde_json::json!({
            "query": { "term": { "entityId": entity_id } },
            "_source": false,
            "size": 10000
        });
        let response = self
            .send_with_retry(|| {
                self.req(Method::POST, &format!("/{}/_search", kind.alias()))
                    .json(&body)
            })
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            bail!("shard listing failed with {}", response.status());
        }

        let json: serde_json::Value = response.json().await?;
        let ids = json["hits"]["hits"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .filter_map(|hit| hit["_id"].as_str().map(String::from))
            .collect();
        Ok(ids)
    }

    async fn doc_count(&self, kind: EntityKind) -> Result<i64> {
        let response = self
            .send_with_retry(|| self.req(Method::GET, &format!("/{}/_count", kind.alias())))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        if !response.status().is_success() {
            bail!("count failed with {}", response.status());
        }
        let json: serde_json::Value = response.json().await?;
        Ok(json["count"].as_i64().unwrap_or(0))
    }

    async fn ping(&self) -> Result<bool> {
        let response = self.send_with_retry(|| self.req(Method::GET, "/")).await?;
        Ok(response.status().is_success())
    }

    async fn resolve_alias(&self, alias: &str) -> Result<Option<String>> {
        let response = self
            .send_with_retry(|| self.req(Method::GET, &format!("/_alias/{}", alias)))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            bail!("alias lookup for '{}' failed with {}", alias, response.status());
        }

        let json: serde_json::Value = response.json().await?;
        let physical = json
            .as_object()
            .and_then(|map| map.keys().next())
            .map(String::from);
        Ok(physical)
    }

    async fn create_index(&self, name: &str, mappings: &serde_json::Value) -> Result<()> {
        let response = self
            .send_with_retry(|| self.req(Method::PUT, &format!("/{}", name)).json(mappings))
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("creating index '{}' failed with {}: {}", name, status, text);
        }
        Ok(())
    }

    async fn swap_alias(&self, alias: &str, old: Option<&str>, new: &str) -> Result<()> {
        let mut actions = Vec::new();
        if let Some(old) = old {
            actions.push(serde_json::json!({
                "remove": { "index": old, "alias": alias }
            }));
        }
        actions.push(serde_json::json!({
            "add": { "index": new, "alias": alias }
        }));

        let body = serde_json::json!({ "actions": actions });
        let response = self
            .send_with_retry(|| self.req(Method::POST, "/_aliases").json(&body))
            .await?;
        if !response.status().is_success() {
            bail!("alias swap for '{}' failed with {}", alias, response.status());
        }
        Ok(())
    }

    async fn reindex(&self, from: &str, to: &str) -> Result<()> {
        let body = serde_json::json!({
            "source": { "index": from },
            "dest": { "index": to }
        });
        let response = self
            .send_with_retry(|| {
                self.req(
                    Method::POST,
                    "/_reindex?wait_for_completion=true&refresh=true",
                )
                .json(&body)
            })
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("reindex {} -> {} failed with {}: {}", from, to, status, text);
        }
        Ok(())
    }

    async fn set_read_only(&self, name: &str, read_only: bool) -> Result<()> {
        let body = serde_json::json!({
            "index": { "blocks": { "write": read_only } }
        });
        let response = self
            .send_with_retry(|| {
                self.req(Method::PUT, &format!("/{}/_settings", name)).json(&body)
            })
            .await?;
        if !response.status().is_success() {
            bail!(
                "setting write block on '{}' failed with {}",
                name,
                response.status()
            );
        }
        Ok(())
    }

    async fn delete_physical_index(&self, name: &str) -> Result<()> {
        let response = self
            .send_with_retry(|| self.req(Method::DELETE, &format!("/{}", name)))
            .await?;
        if !response.status().is_success() {
            bail!("deleting index '{}' failed with {}", name, response.status());
        }
        Ok(())
    }
}
