use crate::domain::{
    Borrower, BorrowerId, CatalogueCode, DomainEvent, Item, ItemId, Loan, LoanId, LoanStatus,
    RoleKind,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 永続化層のエラー
///
/// アプリケーション層は`Transient`のみ再試行する。
#[derive(Debug, Error)]
pub enum StoreError {
    /// 一時的な障害（接続断、タイムアウト、直列化失敗など）
    #[error("transient store failure")]
    Transient(#[source] BoxError),

    /// 一意制約違反
    #[error("duplicate value: {0}")]
    Duplicate(String),

    /// 再試行しても解消しない障害（データ破損、スキーマ不整合など）
    #[error("store failure")]
    Fatal(#[source] BoxError),
}

impl StoreError {
    pub fn transient(err: impl Into<BoxError>) -> Self {
        StoreError::Transient(err.into())
    }

    pub fn fatal(err: impl Into<BoxError>) -> Self {
        StoreError::Fatal(err.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// 蔵書一覧の絞り込み条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    pub category: Option<String>,
    /// 貸出可能な冊数が1冊以上のもののみ
    pub available_only: bool,
}

impl ItemFilter {
    pub fn matches(&self, item: &Item) -> bool {
        self.category
            .as_deref()
            .is_none_or(|category| item.details.category == category)
            && (!self.available_only || item.available_copies > 0)
    }
}

/// 利用者一覧の絞り込み条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BorrowerFilter {
    pub role: Option<RoleKind>,
}

impl BorrowerFilter {
    pub fn matches(&self, borrower: &Borrower) -> bool {
        self.role.is_none_or(|role| borrower.role.kind() == role)
    }
}

/// 貸出一覧の絞り込み条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoanFilter {
    pub item_id: Option<ItemId>,
    pub borrower_id: Option<BorrowerId>,
    pub status: Option<LoanStatus>,
}

impl LoanFilter {
    pub fn matches(&self, loan: &Loan) -> bool {
        self.item_id.is_none_or(|id| loan.item_id() == id)
            && self.borrower_id.is_none_or(|id| loan.borrower_id() == id)
            && self.status.is_none_or(|status| loan.status() == status)
    }
}

/// ある時点での全エンティティの一貫したスナップショット
///
/// 検索と統計で使う。各一覧は作成日時（貸出は貸出日時）の昇順。
#[derive(Debug, Clone, Default)]
pub struct LibrarySnapshot {
    pub items: Vec<Item>,
    pub borrowers: Vec<Borrower>,
    pub loans: Vec<Loan>,
}

/// 作業単位（トランザクション）
///
/// `*_for_update`で読んだ行はコミットまたは破棄までロックされる。
/// `commit`せずにdropした場合はすべての変更が破棄される。
#[async_trait]
pub trait Transaction: Send {
    /// 蔵書を行ロック付きで読む
    async fn item_for_update(&mut self, item_id: ItemId) -> Result<Option<Item>>;

    async fn insert_item(&mut self, item: &Item) -> Result<()>;

    async fn update_item(&mut self, item: &Item) -> Result<()>;

    async fn delete_item(&mut self, item_id: ItemId) -> Result<()>;

    /// 目録コードが既に使われているか
    async fn catalogue_code_taken(&mut self, code: &CatalogueCode) -> Result<bool>;

    /// 蔵書に対する未返却（Active, Overdue）の貸出件数
    async fn count_outstanding_loans(&mut self, item_id: ItemId) -> Result<u32>;

    async fn borrower(&mut self, borrower_id: BorrowerId) -> Result<Option<Borrower>>;

    async fn insert_borrower(&mut self, borrower: &Borrower) -> Result<()>;

    async fn delete_borrower(&mut self, borrower_id: BorrowerId) -> Result<()>;

    /// 貸出を行ロック付きで読む
    async fn loan_for_update(&mut self, loan_id: LoanId) -> Result<Option<Loan>>;

    async fn insert_loan(&mut self, loan: &Loan) -> Result<()>;

    async fn update_loan(&mut self, loan: &Loan) -> Result<()>;

    /// 状態変更と同じ作業単位でイベントを記録する
    async fn append_event(&mut self, event: &DomainEvent) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

/// 図書館データの永続化ポート
///
/// 書き込みはすべて`begin`で得たトランザクション経由で行う。
/// それ以外のメソッドは読み取り専用で、行ロックを取らない。
#[async_trait]
pub trait LibraryStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>>;

    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<Item>>;

    async fn get_borrower(&self, borrower_id: BorrowerId) -> Result<Option<Borrower>>;

    async fn list_borrowers(&self, filter: &BorrowerFilter) -> Result<Vec<Borrower>>;

    async fn get_loan(&self, loan_id: LoanId) -> Result<Option<Loan>>;

    /// 貸出一覧（貸出日時の新しい順）
    async fn list_loans(&self, filter: &LoanFilter) -> Result<Vec<Loan>>;

    /// 延滞候補を検索する
    ///
    /// status が active かつ due_date < now の貸出ID。
    /// 読み取り時点の情報なので、書き込み前に必ず再確認すること。
    async fn overdue_candidates(&self, now: DateTime<Utc>) -> Result<Vec<LoanId>>;

    /// 一貫したスナップショットを取得する
    async fn snapshot(&self) -> Result<LibrarySnapshot>;

    /// 最近のイベント（新しい順）
    async fn recent_events(&self, limit: usize) -> Result<Vec<DomainEvent>>;
}
