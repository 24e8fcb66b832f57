use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BorrowerId, ItemId, LoanId};

/// コマンド：蔵書を貸し出す
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueItem {
    pub item_id: ItemId,
    pub borrower_id: BorrowerId,
    pub issued_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

/// コマンド：蔵書を返却する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnItem {
    pub loan_id: LoanId,
    pub returned_at: DateTime<Utc>,
    pub remarks: Option<String>,
}
