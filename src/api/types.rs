use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::commands::{IssueItem, ReturnItem};
use crate::domain::search::SearchHit;
use crate::domain::{
    BorrowerId, FieldViolation, ItemId, Loan, LoanId, LoanStatus, RoleKind, default_due_date,
};
use crate::ports::{BorrowerFilter, ItemFilter, LoanFilter};

// ============================================================================
// Requests
// ============================================================================

/// POST /loans のリクエスト
///
/// 貸出日を省略すると現在時刻、返却期限を省略すると貸出日の14日後。
#[derive(Debug, Deserialize)]
pub struct IssueItemRequest {
    pub item_id: Uuid,
    pub borrower_id: Uuid,
    pub issued_at: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
}

impl IssueItemRequest {
    pub fn to_command(&self, now: DateTime<Utc>) -> IssueItem {
        let issued_at = self.issued_at.unwrap_or(now);
        IssueItem {
            item_id: ItemId::from_uuid(self.item_id),
            borrower_id: BorrowerId::from_uuid(self.borrower_id),
            issued_at,
            due_date: self.due_date.unwrap_or_else(|| default_due_date(issued_at)),
        }
    }
}

/// POST /loans/:id/return のリクエスト（本文は省略可）
///
/// 返却日はサーバーの現在時刻。クライアントは指定できない。
#[derive(Debug, Default, Deserialize)]
pub struct ReturnItemRequest {
    pub remarks: Option<String>,
}

impl ReturnItemRequest {
    pub fn to_command(self, loan_id: LoanId, now: DateTime<Utc>) -> ReturnItem {
        ReturnItem {
            loan_id,
            returned_at: now,
            remarks: self.remarks,
        }
    }
}

// ============================================================================
// Query parameters
// ============================================================================

/// GET /items のクエリパラメータ
#[derive(Debug, Default, Deserialize)]
pub struct ListItemsQuery {
    pub category: Option<String>,
    #[serde(default)]
    pub available_only: bool,
}

impl From<ListItemsQuery> for ItemFilter {
    fn from(query: ListItemsQuery) -> Self {
        ItemFilter {
            category: query.category,
            available_only: query.available_only,
        }
    }
}

/// GET /borrowers のクエリパラメータ
#[derive(Debug, Default, Deserialize)]
pub struct ListBorrowersQuery {
    /// student, teacher, librarian
    pub role: Option<String>,
}

impl ListBorrowersQuery {
    pub fn to_filter(&self) -> Result<BorrowerFilter, String> {
        let role = self
            .role
            .as_deref()
            .map(str::parse::<RoleKind>)
            .transpose()?;
        Ok(BorrowerFilter { role })
    }
}

/// GET /loans のクエリパラメータ
#[derive(Debug, Default, Deserialize)]
pub struct ListLoansQuery {
    pub item_id: Option<Uuid>,
    pub borrower_id: Option<Uuid>,
    /// active, overdue, returned
    pub status: Option<String>,
}

impl ListLoansQuery {
    pub fn to_filter(&self) -> Result<LoanFilter, String> {
        Ok(LoanFilter {
            item_id: self.item_id.map(ItemId::from_uuid),
            borrower_id: self.borrower_id.map(BorrowerId::from_uuid),
            status: self.status.as_deref().map(parse_status_filter).transpose()?,
        })
    }
}

/// GET /search のクエリパラメータ
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// GET /activity のクエリパラメータ
#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

/// ステータスクエリパラメータのパースとバリデーション
pub fn parse_status_filter(status: &str) -> Result<LoanStatus, String> {
    status.parse::<LoanStatus>()
}

// ============================================================================
// Responses
// ============================================================================

/// 貸出レスポンス（GET /loans/:id と GET /loans）
#[derive(Debug, Serialize, Deserialize)]
pub struct LoanResponse {
    pub loan_id: Uuid,
    pub item_id: Uuid,
    pub catalogue_code: String,
    pub borrower_id: Uuid,
    pub status: String,
    pub issued_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Loan> for LoanResponse {
    fn from(loan: Loan) -> Self {
        let status = loan.status().as_str().to_string();
        let returned_at = loan.returned_at();
        let core = loan.core();
        Self {
            loan_id: core.loan_id.value(),
            item_id: core.item_id.value(),
            catalogue_code: core.catalogue_code.to_string(),
            borrower_id: core.borrower_id.value(),
            status,
            issued_at: core.issued_at,
            due_date: core.due_date,
            returned_at,
            remarks: core.remarks.clone(),
            created_at: core.created_at,
            updated_at: core.updated_at,
        }
    }
}

/// 検索レスポンス
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub hits: Vec<SearchHit>,
}

/// アップロードレスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
}

/// エラーレスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<ViolationResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ViolationResponse {
    pub field: String,
    pub message: String,
}

impl From<&FieldViolation> for ViolationResponse {
    fn from(violation: &FieldViolation) -> Self {
        Self {
            field: violation.field.to_string(),
            message: violation.message.clone(),
        }
    }
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            violations: Vec::new(),
        }
    }

    pub fn with_violations(mut self, violations: &[FieldViolation]) -> Self {
        self.violations = violations.iter().map(ViolationResponse::from).collect();
        self
    }
}
