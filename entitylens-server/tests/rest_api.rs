//! Integration tests for the REST API endpoints, with mock browser and
//! LLM backends and a live worker behind the job queue.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use entitylens_core::browser::MockBrowserClient;
use entitylens_core::cache::InMemoryCache;
use entitylens_core::config::{EngineConfig, SearchConfig};
use entitylens_core::llm::MockLlmClient;
use entitylens_core::retry::RetryConfig;
use entitylens_core::store::MemoryStore;
use entitylens_core::tool::ToolRunner;
use entitylens_research::browse::PageExtractTool;
use entitylens_research::dispatch::{SearchService, ValidationTasks};
use entitylens_research::llm_call::CompletionTool;
use entitylens_research::metrics::MetricsGenerationTool;
use entitylens_research::references::ReferenceGatheringTool;
use entitylens_research::researcher::Researcher;
use entitylens_research::validation::EntityValidationTool;
use entitylens_server::routes::{router, AppState};
use entitylens_server::worker::{job_queue, spawn_worker};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

const SELECTOR: &str = "div.g div.yuRUbf > a";

fn make_state() -> AppState {
    let browser = Arc::new(MockBrowserClient::new());
    let llm = Arc::new(MockLlmClient::new());
    let store = Arc::new(MemoryStore::new());
    let runner = Arc::new(ToolRunner::new(Arc::new(InMemoryCache::new())));

    // One engine keeps the fixture surface small.
    let search = SearchConfig {
        engines: vec![EngineConfig {
            name: "google".into(),
            url_template: "https://g.example/search?q={query}".into(),
            result_selector: SELECTOR.into(),
        }],
        domain_blacklist: vec![],
        max_results_per_query: 10,
    };
    for query in [
        "Acme Corp company overview",
        "Acme Corp official website",
        "Acme Corp about us",
        "Acme Corp company profile",
    ] {
        browser.add_link_fixture(
            format!("https://g.example/search?q={}", urlencoding::encode(query)),
            SELECTOR,
            vec![("Site", "https://acme.example")],
        );
    }
    llm.push_response(Ok(json!({
        "metrics": [{
            "name": "company size",
            "value": "500 employees",
            "confidence_score": 0.9,
            "references": ["https://acme.example"],
            "supporting_data": [],
        }]
    })));

    let retry = RetryConfig {
        max_retries: 0,
        initial_backoff_ms: 1,
        max_backoff_ms: 1,
        backoff_multiplier: 1.0,
        jitter: false,
    };
    let page_extract = Arc::new(PageExtractTool::new(browser, retry));
    let references = Arc::new(ReferenceGatheringTool::new(
        runner.clone(),
        page_extract,
        store.clone(),
        search,
    ));
    let completion = Arc::new(CompletionTool::new(llm));
    let metrics = Arc::new(MetricsGenerationTool::new(
        runner.clone(),
        completion,
        store.clone(),
    ));
    let researcher = Arc::new(Researcher::new(
        store.clone(),
        runner.clone(),
        references,
        metrics,
    ));

    let (dispatcher, rx) = job_queue(8);
    spawn_worker(researcher.clone(), rx);

    let validation = Arc::new(EntityValidationTool::default());
    let service = Arc::new(SearchService::new(
        store,
        runner.clone(),
        validation.clone(),
        researcher,
        Arc::new(dispatcher),
    ));
    let tasks = Arc::new(ValidationTasks::new(runner, validation));
    AppState { service, tasks }
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
    let app = router(state.clone());
    let resp = ServiceExt::<Request<Body>>::oneshot(app, request)
        .await
        .unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    (status, json)
}

/// Poll the status endpoint until the job leaves its active states.
async fn wait_for_terminal(state: &AppState, job_id: &str) -> Value {
    for _ in 0..200 {
        let (status, body) = send(state, get_request(&format!("/api/research/status/{job_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        match body["status"].as_str() {
            Some("completed") | Some("failed") => return body,
            _ => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    }
    panic!("job {job_id} never reached a terminal state");
}

#[tokio::test]
async fn test_health() {
    let state = make_state();
    let (status, body) = send(&state, get_request("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_search_starts_research_and_worker_completes_it() {
    let state = make_state();

    let (status, body) = send(
        &state,
        post_request("/api/search", json!({"query": "Acme Corp"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["found"], false);
    assert_eq!(body["research_started"], true);
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let terminal = wait_for_terminal(&state, &job_id).await;
    assert_eq!(terminal["status"], "completed");
    assert_eq!(terminal["result_data"]["references_found"], 1);
    assert_eq!(terminal["result_data"]["metrics_generated"], 3);

    // The entity is now served directly.
    let (_, body) = send(
        &state,
        post_request("/api/search", json!({"query": "Acme Corp"})),
    )
    .await;
    assert_eq!(body["found"], true);
    assert_eq!(body["entity"]["name"], "Acme Corp");
}

#[tokio::test]
async fn test_search_rejects_invalid_query() {
    let state = make_state();
    let (status, body) = send(
        &state,
        post_request("/api/search", json!({"query": "<script>@#$%"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "Invalid query");
    assert_eq!(body["details"]["pattern_valid"], false);
}

#[tokio::test]
async fn test_job_status_error_mapping() {
    let state = make_state();

    let (status, _) = send(&state, get_request("/api/research/status/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown = Uuid::new_v4();
    let (status, _) = send(
        &state,
        get_request(&format!("/api/research/status/{unknown}")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_validate_query_lifecycle() {
    let state = make_state();

    let (status, body) = send(
        &state,
        post_request("/api/validate_query", json!({"query": "Acme Corp"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "processing");
    let task_id = body["task_id"].as_str().unwrap().to_string();

    let outcome = loop {
        let (status, body) =
            send(&state, get_request(&format!("/api/validate_query/{task_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == "completed" {
            break body;
        }
        tokio::task::yield_now().await;
    };
    assert_eq!(outcome["result"]["valid"], true);
    assert_eq!(outcome["result"]["sanitized_name"], "Acme Corp");
}

#[tokio::test]
async fn test_validate_query_poll_errors() {
    let state = make_state();

    let (status, _) = send(&state, get_request("/api/validate_query/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown = Uuid::new_v4();
    let (status, _) = send(&state, get_request(&format!("/api/validate_query/{unknown}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
