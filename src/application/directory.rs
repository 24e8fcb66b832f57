//! 利用者名簿（IdentityDirectory）

use chrono::Utc;

use crate::domain::{self, Borrower, BorrowerId, BorrowerRemoved, NewBorrower};
use crate::ports::{BorrowerFilter, LibraryStore};

use super::ServiceDependencies;
use super::errors::{EntityKind, LibraryError, Result};

/// 利用者を登録する
///
/// 共通項目と区分ごとの必須項目を検証してから保存する。
/// 区分は登録後に変更できない（変更用の操作を提供しない）。
pub async fn register_borrower(
    deps: &ServiceDependencies,
    new_borrower: NewBorrower,
) -> Result<Borrower> {
    let (borrower, event) = domain::register_borrower(new_borrower, Utc::now())?;

    let store = deps.store.as_ref();
    let borrower_ref = &borrower;
    let event = domain::DomainEvent::from(event);
    let event_ref = &event;
    deps.retry
        .run("register_borrower", move || async move {
            let mut tx = store.begin().await?;
            tx.insert_borrower(borrower_ref).await?;
            tx.append_event(event_ref).await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

    tracing::info!(
        borrower_id = %borrower.borrower_id.value(),
        role = borrower.role.kind().as_str(),
        "borrower registered"
    );
    Ok(borrower)
}

/// 利用者を削除する
///
/// 貸出履歴による制約はかけない。貸出記録は削除後も利用者IDを保持する。
pub async fn remove_borrower(deps: &ServiceDependencies, borrower_id: BorrowerId) -> Result<()> {
    let store = deps.store.as_ref();
    deps.retry
        .run("remove_borrower", move || try_remove_borrower(store, borrower_id))
        .await?;

    tracing::info!(borrower_id = %borrower_id.value(), "borrower removed");
    Ok(())
}

async fn try_remove_borrower(store: &dyn LibraryStore, borrower_id: BorrowerId) -> Result<()> {
    let mut tx = store.begin().await?;

    if tx.borrower(borrower_id).await?.is_none() {
        return Err(LibraryError::NotFound(EntityKind::Borrower));
    }

    tx.delete_borrower(borrower_id).await?;
    tx.append_event(
        &BorrowerRemoved {
            borrower_id,
            removed_at: Utc::now(),
        }
        .into(),
    )
    .await?;
    tx.commit().await?;

    Ok(())
}

/// IDで利用者を取得する
pub async fn get_borrower(deps: &ServiceDependencies, borrower_id: BorrowerId) -> Result<Borrower> {
    let store = deps.store.as_ref();
    deps.retry
        .run("get_borrower", move || async move {
            Ok(store.get_borrower(borrower_id).await?)
        })
        .await?
        .ok_or(LibraryError::NotFound(EntityKind::Borrower))
}

/// 利用者一覧を取得する
pub async fn list_borrowers(
    deps: &ServiceDependencies,
    filter: &BorrowerFilter,
) -> Result<Vec<Borrower>> {
    let store = deps.store.as_ref();
    deps.retry
        .run("list_borrowers", move || async move {
            Ok(store.list_borrowers(filter).await?)
        })
        .await
}
