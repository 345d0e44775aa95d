//! Test Helper Utilities
//!
//! Shared utilities for openbook-sync integration tests: a temporary
//! database and a local stub of the subject-search API.

#![allow(dead_code)]

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use openbook_common::SyncSettings;
use openbook_sync::services::{BatchProcessor, CatalogClient, CatalogSource};
use openbook_sync::utils::BackoffPolicy;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Temporary on-disk database; keep the `TempDir` alive for the test
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let dir = TempDir::new().unwrap();
    let pool = openbook_common::db::init_database(&dir.path().join("catalog.db"), 4)
        .await
        .unwrap();
    (dir, pool)
}

/// How the stub answers for one genre
#[derive(Debug, Clone)]
pub enum GenreScript {
    /// Serve these works, sliced by `offset`/`limit`
    Catalog(Vec<Value>),
    /// Always answer with this HTTP status
    Status(u16),
    /// Answer `{"works": null}`
    NullWorks,
}

#[derive(Default)]
struct StubInner {
    scripts: HashMap<String, GenreScript>,
    requests: Vec<(String, usize, usize)>,
}

/// Local stub of the subject API bound to 127.0.0.1:0
#[derive(Clone)]
pub struct StubCatalog {
    inner: Arc<Mutex<StubInner>>,
    pub addr: SocketAddr,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    limit: usize,
    offset: usize,
}

impl StubCatalog {
    pub async fn start() -> Self {
        let inner = Arc::new(Mutex::new(StubInner::default()));

        let app = Router::new()
            .route("/subjects/:file", get(subject_page))
            .with_state(Arc::clone(&inner));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { inner, addr }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn script(&self, genre: &str, script: GenreScript) {
        self.inner
            .lock()
            .unwrap()
            .scripts
            .insert(genre.to_string(), script);
    }

    /// Offsets requested for `genre`, in request order
    pub fn offsets(&self, genre: &str) -> Vec<usize> {
        self.inner
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|(g, _, _)| g == genre)
            .map(|(_, _, offset)| *offset)
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.inner.lock().unwrap().requests.len()
    }

    /// Real HTTP client pointed at this stub, without client-level retries
    pub fn client(&self) -> CatalogClient {
        CatalogClient::new(&self.base_url(), Duration::from_secs(5), BackoffPolicy::none()).unwrap()
    }
}

async fn subject_page(
    State(inner): State<Arc<Mutex<StubInner>>>,
    Path(file): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let genre = file.trim_end_matches(".json").to_string();

    let script = {
        let mut inner = inner.lock().unwrap();
        inner.requests.push((genre.clone(), query.limit, query.offset));
        inner.scripts.get(&genre).cloned()
    };

    match script {
        Some(GenreScript::Catalog(works)) => {
            let page: Vec<Value> = works
                .into_iter()
                .skip(query.offset)
                .take(query.limit)
                .collect();
            Json(json!({ "name": genre, "works": page })).into_response()
        }
        Some(GenreScript::Status(code)) => StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        Some(GenreScript::NullWorks) => Json(json!({ "name": genre, "works": null })).into_response(),
        None => Json(json!({ "name": genre, "works": [] })).into_response(),
    }
}

/// A valid raw work as the subject API returns it
pub fn work(key: &str, title: &str) -> Value {
    json!({
        "key": key,
        "title": title,
        "authors": [{ "name": "Test Author", "key": "/authors/OL1A" }],
        "first_publish_year": 2001,
        "cover_id": 42,
    })
}

/// A raw work missing its authors array
pub fn work_without_authors(key: &str) -> Value {
    json!({ "key": key, "title": "Orphan" })
}

/// `count` valid works with keys `/works/{prefix}{n}`
pub fn catalog(prefix: &str, count: usize) -> Vec<Value> {
    (0..count)
        .map(|n| work(&format!("/works/{}{}", prefix, n), &format!("{} book {}", prefix, n)))
        .collect()
}

/// Zero-delay settings for the given genres
pub fn test_settings(genres: &[&str], quota: usize, page_size: usize) -> SyncSettings {
    SyncSettings {
        genres: genres.iter().map(|g| g.to_string()).collect(),
        quota_per_genre: quota,
        page_size,
        ..SyncSettings::default()
    }
    .without_delays()
}

pub fn processor(pool: &SqlitePool, source: Arc<dyn CatalogSource>, settings: &SyncSettings) -> Arc<BatchProcessor> {
    Arc::new(BatchProcessor::new(pool.clone(), source, settings))
}
