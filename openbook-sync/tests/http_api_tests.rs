//! HTTP surface tests: health and sync control endpoints

mod helpers;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use helpers::{catalog, create_test_db, test_settings, GenreScript, StubCatalog};
use http_body_util::BodyExt;
use openbook_sync::services::{CatalogError, CatalogSource, GenreOutcome, RawWork};
use openbook_sync::{build_router, db, AppState};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tower::ServiceExt;

/// Source that answers only once the test releases permits, then with an
/// empty page
struct GatedSource {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl CatalogSource for GatedSource {
    async fn fetch_page(
        &self,
        _genre: &str,
        _page_size: usize,
        _offset: usize,
    ) -> Result<Vec<RawWork>, CatalogError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;
        Ok(Vec::new())
    }
}

async fn send(state: &AppState, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = build_router(state.clone())
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn wait_until_idle(state: &AppState) {
    for _ in 0..500 {
        if !state.sync.is_running() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("synchronization did not finish");
}

#[tokio::test]
async fn test_health_reports_module_and_book_count() {
    let (_dir, pool) = create_test_db().await;
    let gate = Arc::new(Semaphore::new(0));
    let state = AppState::new(pool, Arc::new(GatedSource { gate }), &test_settings(&["fiction"], 10, 5));

    let (status, body) = send(&state, "GET", "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "openbook-sync");
    assert_eq!(body["book_count"], 0);
    assert!(body["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn test_second_start_while_running_conflicts() {
    let (_dir, pool) = create_test_db().await;
    let gate = Arc::new(Semaphore::new(0));
    let source = GatedSource {
        gate: Arc::clone(&gate),
    };
    let state = AppState::new(pool, Arc::new(source), &test_settings(&["fiction", "poetry"], 10, 5));

    let (status, body) = send(&state, "POST", "/sync/start").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["run_id"].is_string());
    assert_eq!(body["genres"], serde_json::json!(["fiction", "poetry"]));

    let (status, body) = send(&state, "POST", "/sync/start").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (_, body) = send(&state, "GET", "/sync/status").await;
    assert_eq!(body["running"], true);
    assert!(body["last_report"].is_null());

    gate.add_permits(100);
    wait_until_idle(&state).await;

    let (_, body) = send(&state, "GET", "/sync/status").await;
    assert_eq!(body["running"], false);
    assert_eq!(body["last_report"]["total_processed"], 0);
    assert_eq!(body["last_report"]["genres"][0]["outcome"], "exhausted");
}

#[tokio::test]
async fn test_startup_sync_runs_only_on_empty_catalog() {
    let (_dir, pool) = create_test_db().await;
    let stub = StubCatalog::start().await;
    stub.script("fiction", GenreScript::Catalog(catalog("F", 10)));

    let state = AppState::new(pool.clone(), Arc::new(stub.client()), &test_settings(&["fiction"], 10, 5));

    let run = state.sync_if_empty().await.unwrap().expect("empty catalog starts a run");
    run.handle.await.unwrap();

    let report = state.sync.last_report().await.unwrap();
    assert_eq!(report.run_id, run.run_id);
    assert_eq!(report.started_at, run.started_at);
    assert_eq!(report.total_processed, 10);
    assert_eq!(report.genres[0].outcome, GenreOutcome::Completed);
    assert_eq!(db::books::count_books(&pool).await.unwrap(), 10);

    assert!(state.sync_if_empty().await.unwrap().is_none());

    let (_, body) = send(&state, "GET", "/health").await;
    assert_eq!(body["book_count"], 10);
}
