use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{
    AppState, add_item, get_borrower, get_item, get_loan, issue_item, library_stats,
    list_borrowers, list_items, list_loans, recent_activity, register_borrower, remove_borrower,
    remove_item, return_item, search, sweep_overdue, update_item, upload_image,
};

/// Creates the API router with all circulation endpoints
///
/// Inventory:
/// - POST/GET /items, GET/PUT/DELETE /items/:id
///
/// Directory:
/// - POST/GET /borrowers, GET/DELETE /borrowers/:id
///
/// Circulation:
/// - POST/GET /loans, GET /loans/:id, POST /loans/:id/return
/// - POST /overdue/sweep
///
/// Read-only views:
/// - GET /search?q=, GET /stats, GET /activity?limit=
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        .route("/items", post(add_item).get(list_items))
        .route(
            "/items/:id",
            get(get_item).put(update_item).delete(remove_item),
        )
        .route("/borrowers", post(register_borrower).get(list_borrowers))
        .route("/borrowers/:id", get(get_borrower).delete(remove_borrower))
        .route("/loans", post(issue_item).get(list_loans))
        .route("/loans/:id", get(get_loan))
        .route("/loans/:id/return", post(return_item))
        .route("/overdue/sweep", post(sweep_overdue))
        .route("/search", get(search))
        .route("/stats", get(library_stats))
        .route("/activity", get(recent_activity))
        .route("/uploads", post(upload_image))
        // Add tracing middleware
        .layer(TraceLayer::new_for_http())
        // Add application state
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
