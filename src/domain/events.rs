use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BorrowerId, CatalogueCode, ItemId, LoanId, RoleKind};

/// イベント：蔵書が目録に追加された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAdded {
    pub item_id: ItemId,
    pub catalogue_code: CatalogueCode,
    pub title: String,
    pub total_copies: u32,
    pub added_at: DateTime<Utc>,
}

/// イベント：書誌情報が更新された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdated {
    pub item_id: ItemId,
    pub updated_at: DateTime<Utc>,
}

/// イベント：蔵書が目録から削除された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRemoved {
    pub item_id: ItemId,
    pub catalogue_code: CatalogueCode,
    pub removed_at: DateTime<Utc>,
}

/// イベント：利用者が登録された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowerRegistered {
    pub borrower_id: BorrowerId,
    pub role: RoleKind,
    pub registered_at: DateTime<Utc>,
}

/// イベント：利用者が削除された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowerRemoved {
    pub borrower_id: BorrowerId,
    pub removed_at: DateTime<Utc>,
}

/// イベント：蔵書が貸し出された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemIssued {
    pub loan_id: LoanId,
    pub item_id: ItemId,
    pub borrower_id: BorrowerId,
    pub issued_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

/// イベント：蔵書が返却された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReturned {
    pub loan_id: LoanId,
    pub item_id: ItemId,
    pub borrower_id: BorrowerId,
    pub returned_at: DateTime<Utc>,
    pub was_overdue: bool,
}

/// イベント：貸出が延滞した
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanBecameOverdue {
    pub loan_id: LoanId,
    pub item_id: ItemId,
    pub borrower_id: BorrowerId,
    pub due_date: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
}

/// ドメインイベント統合型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEvent {
    ItemAdded(ItemAdded),
    ItemUpdated(ItemUpdated),
    ItemRemoved(ItemRemoved),
    BorrowerRegistered(BorrowerRegistered),
    BorrowerRemoved(BorrowerRemoved),
    ItemIssued(ItemIssued),
    ItemReturned(ItemReturned),
    LoanBecameOverdue(LoanBecameOverdue),
}

impl DomainEvent {
    /// イベント種別の識別子（永続化時の判別に使う）
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::ItemAdded(_) => "ItemAdded",
            DomainEvent::ItemUpdated(_) => "ItemUpdated",
            DomainEvent::ItemRemoved(_) => "ItemRemoved",
            DomainEvent::BorrowerRegistered(_) => "BorrowerRegistered",
            DomainEvent::BorrowerRemoved(_) => "BorrowerRemoved",
            DomainEvent::ItemIssued(_) => "ItemIssued",
            DomainEvent::ItemReturned(_) => "ItemReturned",
            DomainEvent::LoanBecameOverdue(_) => "LoanBecameOverdue",
        }
    }

    /// イベント発生時刻
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::ItemAdded(e) => e.added_at,
            DomainEvent::ItemUpdated(e) => e.updated_at,
            DomainEvent::ItemRemoved(e) => e.removed_at,
            DomainEvent::BorrowerRegistered(e) => e.registered_at,
            DomainEvent::BorrowerRemoved(e) => e.removed_at,
            DomainEvent::ItemIssued(e) => e.issued_at,
            DomainEvent::ItemReturned(e) => e.returned_at,
            DomainEvent::LoanBecameOverdue(e) => e.detected_at,
        }
    }
}

impl From<ItemAdded> for DomainEvent {
    fn from(e: ItemAdded) -> Self {
        DomainEvent::ItemAdded(e)
    }
}

impl From<ItemUpdated> for DomainEvent {
    fn from(e: ItemUpdated) -> Self {
        DomainEvent::ItemUpdated(e)
    }
}

impl From<ItemRemoved> for DomainEvent {
    fn from(e: ItemRemoved) -> Self {
        DomainEvent::ItemRemoved(e)
    }
}

impl From<BorrowerRegistered> for DomainEvent {
    fn from(e: BorrowerRegistered) -> Self {
        DomainEvent::BorrowerRegistered(e)
    }
}

impl From<BorrowerRemoved> for DomainEvent {
    fn from(e: BorrowerRemoved) -> Self {
        DomainEvent::BorrowerRemoved(e)
    }
}

impl From<ItemIssued> for DomainEvent {
    fn from(e: ItemIssued) -> Self {
        DomainEvent::ItemIssued(e)
    }
}

impl From<ItemReturned> for DomainEvent {
    fn from(e: ItemReturned) -> Self {
        DomainEvent::ItemReturned(e)
    }
}

impl From<LoanBecameOverdue> for DomainEvent {
    fn from(e: LoanBecameOverdue) -> Self {
        DomainEvent::LoanBecameOverdue(e)
    }
}
