//! Search service client.
//!
//! Talks to an Azure AI Search–compatible REST endpoint:
//! `POST {endpoint}/indexes/{index}/docs/search?api-version=…` with an
//! `api-key` header. The service ranks and filters; this client only builds
//! the request payload and maps the response onto [`SearchHit`]s.
//!
//! # Configuration
//!
//! ```toml
//! [search]
//! endpoint = "https://acme.search.windows.net"
//! index = "documents"
//! api_version = "2023-11-01"
//! top = 50
//! ```
//!
//! The key is read from the `SEARCH_API_KEY` environment variable.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::SearchConfig;
use crate::filter::Filter;
use crate::models::SearchHit;

/// Fields searched by full-text queries.
pub const SEARCH_FIELDS: &str = "content,metadata_storage_name";

/// Fields returned for each hit.
pub const SELECT_FIELDS: &str = "content,metadata_storage_name,metadata_storage_path,\
file_type,file_size,last_modified,uploaded_by,Category";

/// Maximum number of distinct values requested per facet.
pub const FACET_COUNT: u32 = 1000;

/// Fields the front-end offers as filter dropdowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacetField {
    FileType,
    UploadedBy,
    Category,
}

impl FacetField {
    /// Index field name.
    pub fn field(self) -> &'static str {
        match self {
            FacetField::FileType => "file_type",
            FacetField::UploadedBy => "uploaded_by",
            FacetField::Category => "Category",
        }
    }
}

/// The search backend consumed by the HTTP layer.
#[async_trait]
pub trait SearchService: Send + Sync {
    /// Runs a full-text search. An empty `query` matches everything.
    async fn search(&self, query: &str, filter: &Filter) -> Result<Vec<SearchHit>>;

    /// Distinct values of a facet field across the whole index.
    async fn facet(&self, field: FacetField) -> Result<Vec<String>>;
}

/// Request body for a filtered full-text search.
pub fn search_payload(query: &str, filter: &Filter, top: u32) -> Value {
    let query = query.trim();
    let search = if query.is_empty() { "*" } else { query };
    json!({
        "search": search,
        "searchFields": SEARCH_FIELDS,
        "select": SELECT_FIELDS,
        "filter": filter.to_string(),
        "top": top,
        "queryType": "full",
        "searchMode": "all",
    })
}

/// Request body for a facet-only query.
pub fn facet_payload(field: FacetField) -> Value {
    json!({
        "search": "*",
        "facets": [format!("{},count:{}", field.field(), FACET_COUNT)],
        "top": 0,
    })
}

/// Extracts hits from a search response's `value` array.
pub fn parse_hits(body: &Value) -> Result<Vec<SearchHit>> {
    let Some(value) = body.get("value") else {
        return Ok(Vec::new());
    };
    serde_json::from_value(value.clone()).context("Invalid search response: malformed hits")
}

/// Extracts facet values from `@search.facets.<field>[].value`.
pub fn parse_facet(body: &Value, field: FacetField) -> Vec<String> {
    body.get("@search.facets")
        .and_then(|f| f.get(field.field()))
        .and_then(|f| f.as_array())
        .map(|buckets| {
            buckets
                .iter()
                .filter_map(|b| b.get("value"))
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// HTTP client for the search service.
pub struct AzureSearchClient {
    url: String,
    api_key: String,
    top: u32,
    client: reqwest::Client,
}

impl AzureSearchClient {
    pub fn new(config: &SearchConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            url: format!(
                "{}/indexes/{}/docs/search?api-version={}",
                config.endpoint.trim_end_matches('/'),
                config.index,
                config.api_version
            ),
            api_key,
            top: config.top,
            client,
        })
    }

    /// Build a client, reading the key from `SEARCH_API_KEY`.
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let api_key = std::env::var("SEARCH_API_KEY")
            .map_err(|_| anyhow::anyhow!("SEARCH_API_KEY not set"))?;
        Self::new(config, api_key)
    }

    async fn post(&self, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .context("Search request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!(
                "Search service error {}: {}",
                status,
                body_text.chars().take(500).collect::<String>()
            );
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl SearchService for AzureSearchClient {
    async fn search(&self, query: &str, filter: &Filter) -> Result<Vec<SearchHit>> {
        let payload = search_payload(query, filter, self.top);
        tracing::debug!(payload = %payload, "search request");
        let body = self.post(&payload).await?;
        let hits = parse_hits(&body)?;
        tracing::debug!(results = hits.len(), "search response");
        Ok(hits)
    }

    async fn facet(&self, field: FacetField) -> Result<Vec<String>> {
        let body = self.post(&facet_payload(field)).await?;
        Ok(parse_facet(&body, field))
    }
}
