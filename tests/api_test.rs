use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use library_circulation::adapters::memory::MemoryBlobStore;
use library_circulation::api::{AppState, ErrorResponse, LoanResponse, UploadResponse, create_router};
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;

// ============================================================================
// テスト用のヘルパー関数
// ============================================================================

/// インメモリストアでルーターを組み立てる
fn setup_app() -> axum::Router {
    let (_store, service_deps) = common::memory_deps();
    let app_state = Arc::new(AppState {
        service_deps,
        blobs: Arc::new(MemoryBlobStore::new()),
    });
    create_router(app_state)
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

fn item_json(title: &str, copies: u32) -> Value {
    json!({
        "title": title,
        "author": "Frank Herbert",
        "isbn": "978-0-441-17271-9",
        "category": "Science Fiction",
        "publication_year": 1965,
        "publisher": "Chilton Books",
        "cover_url": "https://covers.example.org/dune.jpg",
        "total_copies": copies,
    })
}

fn student_json(name: &str) -> Value {
    json!({
        "name": name,
        "email": "paul@arrakis.example.edu",
        "role": "student",
        "roll_number": "R-1001",
        "degree": "BA",
        "stream": "Ecology",
    })
}

async fn create(app: &axum::Router, uri: &str, body: Value) -> Value {
    let (status, bytes) = send(app, "POST", uri, Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", String::from_utf8_lossy(&bytes));
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// 正常系フロー
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = setup_app();
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn test_full_circulation_flow() {
    let app = setup_app();
    let item = create(&app, "/items", item_json("Dune", 1)).await;
    let borrower = create(&app, "/borrowers", student_json("Paul Atreides")).await;

    assert_eq!(item["available_copies"], 1);
    assert!(item["catalogue_code"].as_str().unwrap().starts_with("BK-"));
    assert_eq!(borrower["role"], "student");

    // Step 1: 貸出（期限は省略時14日後）
    let loan: LoanResponse = serde_json::from_value(
        create(
            &app,
            "/loans",
            json!({ "item_id": item["item_id"], "borrower_id": borrower["borrower_id"] }),
        )
        .await,
    )
    .unwrap();
    assert_eq!(loan.status, "active");
    assert_eq!((loan.due_date - loan.issued_at).num_days(), 14);

    // Step 2: 在庫切れ
    let other = create(&app, "/borrowers", student_json("Chani Kynes")).await;
    let (status, bytes) = send(
        &app,
        "POST",
        "/loans",
        Some(json!({ "item_id": item["item_id"], "borrower_id": other["borrower_id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let error: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error.error, "ITEM_UNAVAILABLE");

    // Step 3: 返却
    let uri = format!("/loans/{}/return", loan.loan_id);
    let (status, bytes) = send(&app, "POST", &uri, Some(json!({ "remarks": "Sand in pages" }))).await;
    assert_eq!(status, StatusCode::OK);
    let returned: LoanResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(returned.status, "returned");
    assert_eq!(returned.remarks.as_deref(), Some("Sand in pages"));

    // Step 4: 二重返却
    let (status, bytes) = send(&app, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let error: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error.error, "ALREADY_RETURNED");

    // Step 5: 在庫が戻っている
    let uri = format!("/items/{}", item["item_id"].as_str().unwrap());
    let (status, bytes) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let item: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(item["available_copies"], 1);
}

#[tokio::test]
async fn test_return_date_is_always_server_time() {
    let app = setup_app();
    let item = create(&app, "/items", item_json("Dune", 1)).await;
    let borrower = create(&app, "/borrowers", student_json("Paul Atreides")).await;
    let loan: LoanResponse = serde_json::from_value(
        create(
            &app,
            "/loans",
            json!({ "item_id": item["item_id"], "borrower_id": borrower["borrower_id"] }),
        )
        .await,
    )
    .unwrap();

    let uri = format!("/loans/{}/return", loan.loan_id);
    let (status, bytes) = send(
        &app,
        "POST",
        &uri,
        Some(json!({ "returned_at": "2000-01-01T00:00:00Z", "remarks": "Early" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let returned: LoanResponse = serde_json::from_slice(&bytes).unwrap();
    assert!(returned.returned_at.unwrap() >= loan.issued_at);
    assert_eq!(returned.remarks.as_deref(), Some("Early"));
}

#[tokio::test]
async fn test_list_loans_filters_by_status() {
    let app = setup_app();
    let item = create(&app, "/items", item_json("Dune", 2)).await;
    let borrower = create(&app, "/borrowers", student_json("Paul Atreides")).await;
    create(
        &app,
        "/loans",
        json!({ "item_id": item["item_id"], "borrower_id": borrower["borrower_id"] }),
    )
    .await;

    let uri = format!("/loans?borrower_id={}&status=active", borrower["borrower_id"].as_str().unwrap());
    let (status, bytes) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let loans: Vec<LoanResponse> = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(loans.len(), 1);

    let (status, bytes) = send(&app, "GET", "/loans?status=lost", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error.error, "BAD_REQUEST");
}

#[tokio::test]
async fn test_search_stats_and_activity() {
    let app = setup_app();
    create(&app, "/items", item_json("Dune", 2)).await;
    create(&app, "/items", item_json("Children of Dune", 1)).await;
    create(&app, "/borrowers", student_json("Paul Atreides")).await;

    let (status, bytes) = send(&app, "GET", "/search?q=children", None).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["hits"].as_array().unwrap().len(), 1);
    assert_eq!(body["hits"][0]["kind"], "item");
    assert_eq!(body["hits"][0]["subtitle"], "by Frank Herbert");

    let (_, bytes) = send(&app, "GET", "/search?q=d", None).await;
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["hits"].as_array().unwrap().is_empty());

    let (status, bytes) = send(&app, "GET", "/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    let stats: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(stats["total_titles"], 2);
    assert_eq!(stats["total_copies"], 3);
    assert_eq!(stats["students"], 1);
    assert_eq!(stats["categories"]["Science Fiction"], 2);

    let (status, bytes) = send(&app, "GET", "/activity?limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    let events: Vec<Value> = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn test_overdue_sweep_endpoint() {
    let app = setup_app();
    let item = create(&app, "/items", item_json("Dune", 1)).await;
    let borrower = create(&app, "/borrowers", student_json("Paul Atreides")).await;
    let loan: LoanResponse = serde_json::from_value(
        create(
            &app,
            "/loans",
            json!({
                "item_id": item["item_id"],
                "borrower_id": borrower["borrower_id"],
                "issued_at": "2020-01-01T00:00:00Z",
                "due_date": "2020-01-15T00:00:00Z",
            }),
        )
        .await,
    )
    .unwrap();

    let (status, bytes) = send(&app, "POST", "/overdue/sweep", None).await;
    assert_eq!(status, StatusCode::OK);
    let report: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(report["marked_overdue"], 1);

    let (_, bytes) = send(&app, "GET", &format!("/loans/{}", loan.loan_id), None).await;
    let loan: LoanResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(loan.status, "overdue");
}

#[tokio::test]
async fn test_upload_image() {
    let app = setup_app();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/uploads")
                .header("content-type", "image/png")
                .body(Body::from(vec![0x89, b'P', b'N', b'G']))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let upload: UploadResponse = serde_json::from_slice(&bytes).unwrap();
    assert!(upload.url.starts_with("memory://blobs/"));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/uploads")
                .header("content-type", "text/plain")
                .body(Body::from("not an image"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

// ============================================================================
// エラーケース
// ============================================================================

#[tokio::test]
async fn test_invalid_item_lists_every_violation() {
    let app = setup_app();
    let mut body = item_json("  ", 1);
    body["author"] = json!("");
    body["cover_url"] = json!("not a url");

    let (status, bytes) = send(&app, "POST", "/items", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error.error, "VALIDATION_FAILED");
    let fields: Vec<_> = error.violations.iter().map(|v| v.field.as_str()).collect();
    assert!(fields.contains(&"title"));
    assert!(fields.contains(&"author"));
    assert!(fields.contains(&"cover_url"));
}

#[tokio::test]
async fn test_oversized_copy_count_is_a_validation_error() {
    let app = setup_app();
    let (status, bytes) = send(&app, "POST", "/items", Some(item_json("Dune", u32::MAX))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error.error, "VALIDATION_FAILED");
    assert_eq!(error.violations[0].field, "total_copies");
}

#[tokio::test]
async fn test_due_date_before_issue_date_is_rejected() {
    let app = setup_app();
    let item = create(&app, "/items", item_json("Dune", 1)).await;
    let borrower = create(&app, "/borrowers", student_json("Paul Atreides")).await;

    let (status, bytes) = send(
        &app,
        "POST",
        "/loans",
        Some(json!({
            "item_id": item["item_id"],
            "borrower_id": borrower["borrower_id"],
            "issued_at": "2024-03-10T00:00:00Z",
            "due_date": "2024-03-01T00:00:00Z",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error.violations[0].message, "Return date must be after issue date");
}

#[tokio::test]
async fn test_unknown_resources_return_404() {
    let app = setup_app();
    let missing = uuid::Uuid::new_v4();

    for uri in [
        format!("/items/{missing}"),
        format!("/borrowers/{missing}"),
        format!("/loans/{missing}"),
    ] {
        let (status, bytes) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        let error: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(error.error, "NOT_FOUND");
    }
}

#[tokio::test]
async fn test_delete_item_with_outstanding_loan_conflicts() {
    let app = setup_app();
    let item = create(&app, "/items", item_json("Dune", 1)).await;
    let borrower = create(&app, "/borrowers", student_json("Paul Atreides")).await;
    create(
        &app,
        "/loans",
        json!({ "item_id": item["item_id"], "borrower_id": borrower["borrower_id"] }),
    )
    .await;

    let uri = format!("/items/{}", item["item_id"].as_str().unwrap());
    let (status, bytes) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let error: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error.error, "OUTSTANDING_LOANS");

    let uri = format!("/borrowers/{}", borrower["borrower_id"].as_str().unwrap());
    let (status, _) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}
