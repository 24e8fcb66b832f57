use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{
    BorrowerId, CatalogueCode, Item, ItemId, ItemIssued, ItemReturned, LoanBecameOverdue, LoanId,
    LoanPeriod, MarkOverdueError, ReturnLoanError,
};

/// 標準の貸出期間（日数）
///
/// 返却期限の指定がない場合の既定値。
pub const DEFAULT_LOAN_PERIOD_DAYS: i64 = 14;

/// 既定の返却期限を計算する
pub fn default_due_date(issued_at: DateTime<Utc>) -> DateTime<Utc> {
    issued_at + Duration::days(DEFAULT_LOAN_PERIOD_DAYS)
}

// ============================================================================
// 型安全な状態パターン
// ============================================================================

/// Loan集約の共通フィールド
///
/// すべての貸出状態（Active, Overdue, Returned）で共有されるコアデータ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanCore {
    // 識別子
    pub loan_id: LoanId,

    // 他の集約への参照（IDのみ）。目録コードは検索用に複製して持つ
    pub item_id: ItemId,
    pub catalogue_code: CatalogueCode,
    pub borrower_id: BorrowerId,

    // 貸出管理の責務
    pub issued_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub remarks: Option<String>,

    // 監査情報
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 貸出中状態
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveLoan {
    #[serde(flatten)]
    pub core: LoanCore,
}

impl std::ops::Deref for ActiveLoan {
    type Target = LoanCore;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}

/// 延滞中状態
///
/// 返却期限を過ぎたがまだ返却されていない。冊数は貸出中のまま。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverdueLoan {
    #[serde(flatten)]
    pub core: LoanCore,
}

impl std::ops::Deref for OverdueLoan {
    type Target = LoanCore;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}

/// 返却済み状態
///
/// ビジネスルール：
/// - returned_atが必須（型で保証）
/// - 終端状態。以降の遷移はない
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnedLoan {
    #[serde(flatten)]
    pub core: LoanCore,
    pub returned_at: DateTime<Utc>,
}

impl std::ops::Deref for ReturnedLoan {
    type Target = LoanCore;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}

/// Loan集約の統合型
///
/// 遷移: `Active -> {Returned, Overdue}`, `Overdue -> Returned`。Returnedは終端。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Loan {
    Active(ActiveLoan),
    Overdue(OverdueLoan),
    Returned(ReturnedLoan),
}

impl Loan {
    pub fn core(&self) -> &LoanCore {
        match self {
            Loan::Active(active) => &active.core,
            Loan::Overdue(overdue) => &overdue.core,
            Loan::Returned(returned) => &returned.core,
        }
    }

    pub fn loan_id(&self) -> LoanId {
        self.core().loan_id
    }

    pub fn item_id(&self) -> ItemId {
        self.core().item_id
    }

    pub fn borrower_id(&self) -> BorrowerId {
        self.core().borrower_id
    }

    pub fn status(&self) -> LoanStatus {
        match self {
            Loan::Active(_) => LoanStatus::Active,
            Loan::Overdue(_) => LoanStatus::Overdue,
            Loan::Returned(_) => LoanStatus::Returned,
        }
    }

    pub fn returned_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Loan::Returned(returned) => Some(returned.returned_at),
            _ => None,
        }
    }

    /// 未返却（在庫を占有している）か
    pub fn is_outstanding(&self) -> bool {
        !matches!(self, Loan::Returned(_))
    }
}

/// 貸出ステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// 貸出中
    Active,
    /// 延滞中
    Overdue,
    /// 返却済み
    Returned,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Overdue => "overdue",
            LoanStatus::Returned => "returned",
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LoanStatus::Active),
            "overdue" => Ok(LoanStatus::Overdue),
            "returned" => Ok(LoanStatus::Returned),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }
}

/// 純粋関数：蔵書を貸し出す
///
/// 期限の前後関係は`LoanPeriod`で検証済み。在庫の確保は呼び出し側が
/// 同じ作業単位の中で行うこと。
///
/// 副作用なし。新しいActiveLoanとイベントを返す。
pub fn issue_loan(
    item: &Item,
    borrower_id: BorrowerId,
    period: LoanPeriod,
    recorded_at: DateTime<Utc>,
) -> (ActiveLoan, ItemIssued) {
    let loan = ActiveLoan {
        core: LoanCore {
            loan_id: LoanId::new(),
            item_id: item.item_id,
            catalogue_code: item.catalogue_code.clone(),
            borrower_id,
            issued_at: period.issued_at(),
            due_date: period.due_date(),
            remarks: None,
            created_at: recorded_at,
            updated_at: recorded_at,
        },
    };

    let event = ItemIssued {
        loan_id: loan.loan_id,
        item_id: loan.item_id,
        borrower_id,
        issued_at: loan.issued_at,
        due_date: loan.due_date,
    };

    (loan, event)
}

/// 純粋関数：蔵書を返却する
///
/// ビジネスルール：
/// - ActiveまたはOverdueを受け付ける
/// - 延滞していても返却は受け付ける
/// - 返却日は貸出日より前にできない
/// - 備考が指定された場合は上書きする
///
/// 副作用なし。ReturnedLoanとイベントを返す。
pub fn return_loan(
    loan: Loan,
    returned_at: DateTime<Utc>,
    remarks: Option<String>,
) -> Result<(ReturnedLoan, ItemReturned), ReturnLoanError> {
    let (core, was_overdue) = match loan {
        Loan::Active(active) => {
            let was_overdue = returned_at > active.due_date;
            (active.core, was_overdue)
        }
        Loan::Overdue(overdue) => (overdue.core, true),
        Loan::Returned(_) => return Err(ReturnLoanError::AlreadyReturned),
    };
    if returned_at < core.issued_at {
        return Err(ReturnLoanError::ReturnedBeforeIssue);
    }

    let remarks = remarks
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .or(core.remarks);

    let returned = ReturnedLoan {
        core: LoanCore {
            remarks,
            updated_at: returned_at,
            ..core
        },
        returned_at,
    };

    let event = ItemReturned {
        loan_id: returned.loan_id,
        item_id: returned.item_id,
        borrower_id: returned.borrower_id,
        returned_at,
        was_overdue,
    };

    Ok((returned, event))
}

/// 純粋関数：延滞判定
///
/// 返却期限を過ぎたActiveの貸出のみ対象。Overdue・Returnedは対象外。
pub fn is_overdue(loan: &Loan, now: DateTime<Utc>) -> bool {
    match loan {
        Loan::Active(active) => active.due_date < now,
        Loan::Overdue(_) | Loan::Returned(_) => false,
    }
}

/// 純粋関数：貸出を延滞状態に遷移させる
///
/// 在庫数には触れない（本はまだ貸出中）。
pub fn mark_overdue(
    loan: Loan,
    detected_at: DateTime<Utc>,
) -> Result<(OverdueLoan, LoanBecameOverdue), MarkOverdueError> {
    let active = match loan {
        Loan::Active(active) => active,
        Loan::Overdue(_) | Loan::Returned(_) => return Err(MarkOverdueError::NotActive),
    };

    if active.due_date >= detected_at {
        return Err(MarkOverdueError::NotYetDue);
    }

    let event = LoanBecameOverdue {
        loan_id: active.loan_id,
        item_id: active.item_id,
        borrower_id: active.borrower_id,
        due_date: active.due_date,
        detected_at,
    };

    let overdue = OverdueLoan {
        core: LoanCore {
            updated_at: detected_at,
            ..active.core
        },
    };

    Ok((overdue, event))
}
