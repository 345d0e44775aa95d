//! Subject-search catalog API client
//!
//! Fetches one page of works for a subject:
//! `GET {base}/subjects/{genre}.json?limit={page_size}&offset={offset}`.
//!
//! Transient network faults (connect/DNS failure, timeout, dropped
//! connection) are retried with exponential backoff. HTTP error statuses and
//! malformed bodies fail immediately.

use crate::utils::{retry_transient, BackoffPolicy};
use async_trait::async_trait;
use openbook_common::SyncSettings;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("openbook-sync/", env!("CARGO_PKG_VERSION"));

/// Catalog client errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API error {0}: {1}")]
    Status(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl CatalogError {
    /// Faults worth retrying at the client layer
    pub fn is_transient(&self) -> bool {
        matches!(self, CatalogError::Network(_) | CatalogError::Timeout(_))
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CatalogError::Timeout(err.to_string())
        } else if err.is_decode() {
            CatalogError::Parse(err.to_string())
        } else {
            // connect, request and body errors: no usable response arrived
            CatalogError::Network(err.to_string())
        }
    }
}

/// One work as returned by the subject API. Every field is optional;
/// validation happens in the normalizer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawWork {
    pub key: Option<String>,
    pub title: Option<String>,
    pub authors: Option<Vec<RawAuthor>>,
    pub first_publish_year: Option<i32>,
    pub cover_id: Option<i64>,
}

/// Author entry of a work
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawAuthor {
    pub name: Option<String>,
    pub key: Option<String>,
}

impl RawWork {
    /// Extract a work from one element of the `works` array.
    ///
    /// A field of the wrong type reads as absent, and a non-object element
    /// yields an empty work, so a malformed record is rejected by the
    /// normalizer instead of failing the whole page.
    pub fn from_json(value: &Value) -> Self {
        Self {
            key: string_field(value, "key"),
            title: string_field(value, "title"),
            authors: value
                .get("authors")
                .and_then(Value::as_array)
                .map(|authors| authors.iter().map(RawAuthor::from_json).collect()),
            first_publish_year: value
                .get("first_publish_year")
                .and_then(Value::as_i64)
                .and_then(|year| i32::try_from(year).ok()),
            cover_id: value.get("cover_id").and_then(Value::as_i64),
        }
    }
}

impl RawAuthor {
    fn from_json(value: &Value) -> Self {
        Self {
            name: string_field(value, "name"),
            key: string_field(value, "key"),
        }
    }
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

/// Subject endpoint response body. A missing or null `works` is an empty page.
#[derive(Debug, Deserialize)]
struct SubjectResponse {
    #[serde(default)]
    works: Option<Vec<Value>>,
}

impl SubjectResponse {
    fn into_works(self) -> Vec<RawWork> {
        self.works
            .unwrap_or_default()
            .iter()
            .map(RawWork::from_json)
            .collect()
    }
}

/// Source of raw catalog pages
///
/// An empty page is not an error: it means there is nothing at that offset.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_page(
        &self,
        genre: &str,
        page_size: usize,
        offset: usize,
    ) -> Result<Vec<RawWork>, CatalogError>;
}

/// HTTP client for the subject-search API
pub struct CatalogClient {
    http_client: reqwest::Client,
    base_url: Url,
    retry_policy: BackoffPolicy,
}

impl CatalogClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        retry_policy: BackoffPolicy,
    ) -> Result<Self, CatalogError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| CatalogError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(CatalogError::InvalidUrl(base_url.to_string()));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            retry_policy,
        })
    }

    /// Build a client from sync settings
    pub fn from_settings(settings: &SyncSettings) -> Result<Self, CatalogError> {
        Self::new(
            &settings.api_base_url,
            settings.request_timeout(),
            BackoffPolicy::new(
                settings.max_retries,
                Duration::from_millis(settings.retry_base_delay_ms),
            ),
        )
    }

    /// URL of one subject page; the genre is percent-encoded as a path segment
    pub fn page_url(&self, genre: &str, page_size: usize, offset: usize) -> Result<Url, CatalogError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CatalogError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("subjects")
            .push(&format!("{}.json", genre));
        url.query_pairs_mut()
            .append_pair("limit", &page_size.to_string())
            .append_pair("offset", &offset.to_string());
        Ok(url)
    }

    async fn fetch_once(&self, url: &Url) -> Result<Vec<RawWork>, CatalogError> {
        let response = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(CatalogError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Status(status.as_u16(), body));
        }

        let bytes = response.bytes().await.map_err(CatalogError::from_reqwest)?;
        let parsed: SubjectResponse =
            serde_json::from_slice(&bytes).map_err(|e| CatalogError::Parse(e.to_string()))?;

        Ok(parsed.into_works())
    }
}

#[async_trait]
impl CatalogSource for CatalogClient {
    async fn fetch_page(
        &self,
        genre: &str,
        page_size: usize,
        offset: usize,
    ) -> Result<Vec<RawWork>, CatalogError> {
        let url = self.page_url(genre, page_size, offset)?;

        tracing::debug!(genre, offset, page_size, url = %url, "Querying catalog API");

        let works = retry_transient(
            "catalog fetch",
            &self.retry_policy,
            CatalogError::is_transient,
            || self.fetch_once(&url),
        )
        .await?;

        tracing::debug!(genre, offset, received = works.len(), "Catalog page received");

        Ok(works)
    }
}
