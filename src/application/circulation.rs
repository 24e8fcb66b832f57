//! 貸出管理（CirculationManager）
//!
//! 貸出・返却はそれぞれ1つの作業単位で、冊数の増減と貸出記録の変更を
//! まとめてコミットする。途中で失敗した場合はトランザクションごと破棄される。

use crate::domain::{
    self, DomainEvent, Loan, LoanId, LoanPeriod,
    commands::{IssueItem, ReturnItem},
};
use crate::ports::{LibraryStore, LoanFilter};

use super::ServiceDependencies;
use super::errors::{EntityKind, LibraryError, Result};
use super::inventory::adjust_availability;

/// 蔵書を貸し出す
///
/// ビジネスルール：
/// 1. 返却期限が貸出日より後であること（ストアに触れる前に検証）
/// 2. 利用者と蔵書が存在すること
/// 3. 貸出可能数を1減らせること（できなければ`ItemUnavailable`、貸出は作られない）
/// 4. Active状態の貸出を作成する
///
/// 2〜4は1つのトランザクション。蔵書の行ロックにより、同じ蔵書への
/// 同時貸出が在庫を超えることはない。別の蔵書同士は互いに待たない。
pub async fn issue_item(deps: &ServiceDependencies, cmd: IssueItem) -> Result<Loan> {
    let period = LoanPeriod::new(cmd.issued_at, cmd.due_date)?;

    let store = deps.store.as_ref();
    let cmd = &cmd;
    let loan = deps
        .retry
        .run("issue_item", move || try_issue_item(store, cmd, period))
        .await?;

    tracing::info!(
        loan_id = %loan.loan_id().value(),
        item_id = %loan.item_id().value(),
        borrower_id = %loan.borrower_id().value(),
        due_date = %period.due_date(),
        "item issued"
    );
    Ok(loan)
}

async fn try_issue_item(
    store: &dyn LibraryStore,
    cmd: &IssueItem,
    period: LoanPeriod,
) -> Result<Loan> {
    let mut tx = store.begin().await?;

    let borrower = tx
        .borrower(cmd.borrower_id)
        .await?
        .ok_or(LibraryError::NotFound(EntityKind::Borrower))?;

    let item = adjust_availability(tx.as_mut(), cmd.item_id, -1, cmd.issued_at).await?;

    let (active, event) =
        domain::issue_loan(&item, borrower.borrower_id, period, cmd.issued_at);
    let loan = Loan::Active(active);

    tx.insert_loan(&loan).await?;
    tx.append_event(&DomainEvent::ItemIssued(event)).await?;
    tx.commit().await?;

    Ok(loan)
}

/// 蔵書を返却する
///
/// ビジネスルール：
/// 1. 貸出が存在すること
/// 2. 返却済みでないこと（返却済みなら`AlreadyReturned`）
/// 3. Returned状態に遷移し、返却日時と備考を記録する
/// 4. 貸出可能数を1増やす
///
/// 貸出の行ロック → 蔵書の行ロックの順に取得する。
/// 延滞検出と同時に走っても、どちらか一方の結果だけが残る。
pub async fn return_item(deps: &ServiceDependencies, cmd: ReturnItem) -> Result<Loan> {
    let store = deps.store.as_ref();
    let cmd = &cmd;
    let loan = deps
        .retry
        .run("return_item", move || try_return_item(store, cmd))
        .await?;

    tracing::info!(
        loan_id = %loan.loan_id().value(),
        item_id = %loan.item_id().value(),
        "item returned"
    );
    Ok(loan)
}

async fn try_return_item(store: &dyn LibraryStore, cmd: &ReturnItem) -> Result<Loan> {
    let mut tx = store.begin().await?;

    let loan = tx
        .loan_for_update(cmd.loan_id)
        .await?
        .ok_or(LibraryError::NotFound(EntityKind::Loan))?;

    let (returned, event) = domain::return_loan(loan, cmd.returned_at, cmd.remarks.clone())?;

    adjust_availability(tx.as_mut(), returned.item_id, 1, cmd.returned_at).await?;

    let loan = Loan::Returned(returned);
    tx.update_loan(&loan).await?;
    tx.append_event(&DomainEvent::ItemReturned(event)).await?;
    tx.commit().await?;

    Ok(loan)
}

/// IDで貸出を取得する
pub async fn get_loan(deps: &ServiceDependencies, loan_id: LoanId) -> Result<Loan> {
    let store = deps.store.as_ref();
    deps.retry
        .run("get_loan", move || async move {
            Ok(store.get_loan(loan_id).await?)
        })
        .await?
        .ok_or(LibraryError::NotFound(EntityKind::Loan))
}

/// 貸出一覧を取得する（貸出日時の新しい順）
///
/// 利用者ごとの貸出履歴や、蔵書ごとの貸出状況の表示に使う。
pub async fn list_loans(deps: &ServiceDependencies, filter: &LoanFilter) -> Result<Vec<Loan>> {
    let store = deps.store.as_ref();
    deps.retry
        .run("list_loans", move || async move {
            Ok(store.list_loans(filter).await?)
        })
        .await
}
