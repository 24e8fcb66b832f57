use std::time::Duration;

use thiserror::Error;

use crate::domain::{AvailabilityError, MarkOverdueError, ReturnLoanError, ValidationError};
use crate::ports::{StoreError, UploadError};

/// 見つからなかったエンティティの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Item,
    Borrower,
    Loan,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EntityKind::Item => "Item",
            EntityKind::Borrower => "Borrower",
            EntityKind::Loan => "Loan",
        })
    }
}

/// 不変条件違反の理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// 貸出可能な冊数がない
    ItemUnavailable,
    /// 既に返却済み
    AlreadyReturned,
    /// 未返却の貸出が残っている蔵書は削除できない
    OutstandingLoans { count: u32 },
    /// 貸出可能数が所蔵数を超える
    StockExceeded,
    /// 目録コードが既に使われている
    DuplicateCatalogueCode,
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictReason::ItemUnavailable => f.write_str("ItemUnavailable"),
            ConflictReason::AlreadyReturned => f.write_str("AlreadyReturned"),
            ConflictReason::OutstandingLoans { count } => {
                write!(f, "OutstandingLoans({})", count)
            }
            ConflictReason::StockExceeded => f.write_str("StockExceeded"),
            ConflictReason::DuplicateCatalogueCode => f.write_str("DuplicateCatalogueCode"),
        }
    }
}

/// 呼び出し側に見せるエラー分類
///
/// すべての`LibraryError`はちょうど1つの分類に対応する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Transient,
    Upload,
}

/// アプリケーション層のエラー
#[derive(Debug, Error)]
pub enum LibraryError {
    /// 入力不正（呼び出し側の責任。再試行しない）
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// 参照先が存在しない
    #[error("{0} not found")]
    NotFound(EntityKind),

    /// 不変条件違反（再試行しない）
    #[error("conflict: {0}")]
    Conflict(ConflictReason),

    /// 再試行対象外のストア障害
    #[error("store error")]
    Store(#[source] StoreError),

    /// 再試行上限に達した
    #[error("store unavailable after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    /// 呼び出し側が指定した時間内に完了しなかった
    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),

    /// 画像アップロードの失敗
    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),
}

impl LibraryError {
    /// 呼び出し側向けの分類
    ///
    /// 分類は5種類のみ。致命的なストア障害も呼び出し側の入力とは無関係な
    /// バックエンド障害なので`Transient`に含める。再試行の可否は`is_retryable`で判定する。
    pub fn kind(&self) -> ErrorKind {
        match self {
            LibraryError::Validation(_) => ErrorKind::Validation,
            LibraryError::NotFound(_) => ErrorKind::NotFound,
            LibraryError::Conflict(_) => ErrorKind::Conflict,
            // Fatalも含むバックエンド障害
            LibraryError::Store(_)
            | LibraryError::RetriesExhausted { .. }
            | LibraryError::TimedOut(_) => ErrorKind::Transient,
            LibraryError::Upload(_) => ErrorKind::Upload,
        }
    }

    /// 一時的なストア障害のみ再試行する
    pub fn is_retryable(&self) -> bool {
        matches!(self, LibraryError::Store(err) if err.is_transient())
    }
}

impl From<StoreError> for LibraryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(_) => {
                LibraryError::Conflict(ConflictReason::DuplicateCatalogueCode)
            }
            other => LibraryError::Store(other),
        }
    }
}

impl From<AvailabilityError> for LibraryError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::NoCopiesAvailable => {
                LibraryError::Conflict(ConflictReason::ItemUnavailable)
            }
            AvailabilityError::ExceedsTotalCopies => {
                LibraryError::Conflict(ConflictReason::StockExceeded)
            }
        }
    }
}

impl From<ReturnLoanError> for LibraryError {
    fn from(err: ReturnLoanError) -> Self {
        match err {
            ReturnLoanError::AlreadyReturned => {
                LibraryError::Conflict(ConflictReason::AlreadyReturned)
            }
            ReturnLoanError::ReturnedBeforeIssue => LibraryError::Validation(
                ValidationError::single("returned_at", "Return date cannot be before issue date"),
            ),
        }
    }
}

impl From<MarkOverdueError> for LibraryError {
    fn from(err: MarkOverdueError) -> Self {
        LibraryError::Validation(ValidationError::single(
            "status",
            match err {
                MarkOverdueError::NotActive => "Only active loans can become overdue",
                MarkOverdueError::NotYetDue => "Loan is not past its due date",
            },
        ))
    }
}

/// アプリケーション層の Result型
pub type Result<T> = std::result::Result<T, LibraryError>;
