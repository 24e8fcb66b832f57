use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
};
use chrono::Utc;
use uuid::Uuid;

use crate::application::{
    ServiceDependencies, circulation, directory, inventory,
    overdue::{self, SweepReport},
    search,
    stats::{self, LibraryStats},
    uploads,
};
use crate::domain::{
    Borrower, BorrowerId, DomainEvent, Item, ItemDetails, ItemId, LoanId, NewBorrower, NewItem,
};
use crate::ports::BlobStore;

use super::{
    error::ApiError,
    types::{
        ActivityQuery, IssueItemRequest, ListBorrowersQuery, ListItemsQuery, ListLoansQuery,
        LoanResponse, ReturnItemRequest, SearchQuery, SearchResponse, UploadResponse,
    },
};

/// 操作履歴の既定件数と上限
const DEFAULT_ACTIVITY_LIMIT: usize = 20;
const MAX_ACTIVITY_LIMIT: usize = 100;

// ============================================================================
// State
// ============================================================================

/// ハンドラー間で共有されるアプリケーション状態
#[derive(Clone)]
pub struct AppState {
    pub service_deps: ServiceDependencies,
    pub blobs: Arc<dyn BlobStore>,
}

// ============================================================================
// Items
// ============================================================================

/// POST /items - 蔵書を目録に追加
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    Json(new_item): Json<NewItem>,
) -> Result<(StatusCode, Json<Item>), ApiError> {
    let item = inventory::add_item(&state.service_deps, new_item).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// GET /items - 蔵書一覧（category, available_only で絞り込み）
pub async fn list_items(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListItemsQuery>,
) -> Result<Json<Vec<Item>>, ApiError> {
    let filter = query.into();
    let items = inventory::list_items(&state.service_deps, &filter).await?;
    Ok(Json(items))
}

pub async fn get_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<Item>, ApiError> {
    let item = inventory::get_item(&state.service_deps, ItemId::from_uuid(item_id)).await?;
    Ok(Json(item))
}

/// PUT /items/:id - 書誌情報を更新（冊数は変わらない）
pub async fn update_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
    Json(details): Json<ItemDetails>,
) -> Result<Json<Item>, ApiError> {
    let item =
        inventory::update_item(&state.service_deps, ItemId::from_uuid(item_id), details).await?;
    Ok(Json(item))
}

/// DELETE /items/:id - 未返却の貸出があれば409
pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    inventory::remove_item(&state.service_deps, ItemId::from_uuid(item_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Borrowers
// ============================================================================

/// POST /borrowers - 利用者を登録
pub async fn register_borrower(
    State(state): State<Arc<AppState>>,
    Json(new_borrower): Json<NewBorrower>,
) -> Result<(StatusCode, Json<Borrower>), ApiError> {
    let borrower = directory::register_borrower(&state.service_deps, new_borrower).await?;
    Ok((StatusCode::CREATED, Json(borrower)))
}

/// GET /borrowers - 利用者一覧（role で絞り込み）
pub async fn list_borrowers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListBorrowersQuery>,
) -> Result<Json<Vec<Borrower>>, ApiError> {
    let filter = query.to_filter().map_err(ApiError::BadRequest)?;
    let borrowers = directory::list_borrowers(&state.service_deps, &filter).await?;
    Ok(Json(borrowers))
}

pub async fn get_borrower(
    State(state): State<Arc<AppState>>,
    Path(borrower_id): Path<Uuid>,
) -> Result<Json<Borrower>, ApiError> {
    let borrower =
        directory::get_borrower(&state.service_deps, BorrowerId::from_uuid(borrower_id)).await?;
    Ok(Json(borrower))
}

pub async fn remove_borrower(
    State(state): State<Arc<AppState>>,
    Path(borrower_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    directory::remove_borrower(&state.service_deps, BorrowerId::from_uuid(borrower_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Loans
// ============================================================================

/// POST /loans - 蔵書を貸し出す
///
/// 強制されるビジネスルール:
/// - 利用者と蔵書が存在すること
/// - 返却期限が貸出日より後であること
/// - 貸出可能な冊数が残っていること
pub async fn issue_item(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IssueItemRequest>,
) -> Result<(StatusCode, Json<LoanResponse>), ApiError> {
    let cmd = req.to_command(Utc::now());
    let loan = circulation::issue_item(&state.service_deps, cmd).await?;
    Ok((StatusCode::CREATED, Json(LoanResponse::from(loan))))
}

/// POST /loans/:id/return - 蔵書を返却
///
/// 延滞中の貸出も返却できる。返却済みなら409。
pub async fn return_item(
    State(state): State<Arc<AppState>>,
    Path(loan_id): Path<Uuid>,
    req: Option<Json<ReturnItemRequest>>,
) -> Result<Json<LoanResponse>, ApiError> {
    let req = req.map(|Json(req)| req).unwrap_or_default();
    let cmd = req.to_command(LoanId::from_uuid(loan_id), Utc::now());
    let loan = circulation::return_item(&state.service_deps, cmd).await?;
    Ok(Json(LoanResponse::from(loan)))
}

pub async fn get_loan(
    State(state): State<Arc<AppState>>,
    Path(loan_id): Path<Uuid>,
) -> Result<Json<LoanResponse>, ApiError> {
    let loan = circulation::get_loan(&state.service_deps, LoanId::from_uuid(loan_id)).await?;
    Ok(Json(LoanResponse::from(loan)))
}

/// GET /loans - 貸出一覧（item_id, borrower_id, status で絞り込み）
pub async fn list_loans(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListLoansQuery>,
) -> Result<Json<Vec<LoanResponse>>, ApiError> {
    let filter = query.to_filter().map_err(ApiError::BadRequest)?;
    let loans = circulation::list_loans(&state.service_deps, &filter).await?;
    Ok(Json(loans.into_iter().map(LoanResponse::from).collect()))
}

/// POST /overdue/sweep - 延滞検出を手動で実行
pub async fn sweep_overdue(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SweepReport>, ApiError> {
    let report = overdue::sweep_overdue(&state.service_deps, Utc::now()).await?;
    Ok(Json(report))
}

// ============================================================================
// Search, stats, activity
// ============================================================================

/// GET /search?q= - 横断検索
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, ApiError> {
    let results = search::search(&state.service_deps, &query.q).await?;
    Ok(Json(SearchResponse {
        hits: results.iter().collect(),
        query: query.q,
    }))
}

pub async fn library_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LibraryStats>, ApiError> {
    Ok(Json(stats::library_stats(&state.service_deps).await?))
}

/// GET /activity?limit= - 最近の操作履歴
pub async fn recent_activity(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<DomainEvent>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .min(MAX_ACTIVITY_LIMIT);
    Ok(Json(stats::recent_activity(&state.service_deps, limit).await?))
}

// ============================================================================
// Uploads
// ============================================================================

/// POST /uploads - 画像を保存してURLを返す
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let url = uploads::upload_image(state.blobs.as_ref(), body.to_vec(), content_type).await?;
    Ok((StatusCode::CREATED, Json(UploadResponse { url })))
}
