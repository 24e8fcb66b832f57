//! 蔵書台帳（InventoryLedger）
//!
//! 目録と冊数を管理する。貸出可能数を変更できるのは`adjust_availability`だけで、
//! それは貸出・返却の作業単位の中からのみ呼ばれる。

use chrono::{DateTime, Utc};

use crate::domain::{self, CatalogueCode, Item, ItemDetails, ItemId, ItemRemoved, NewItem};
use crate::ports::{ItemFilter, LibraryStore, Transaction};

use super::ServiceDependencies;
use super::errors::{ConflictReason, EntityKind, LibraryError, Result};

/// 自動採番で重複した場合に引き直す回数
const MAX_CODE_ATTEMPTS: usize = 8;

/// 蔵書を目録に追加する
///
/// ビジネスルール：
/// - 必須項目がそろっていること（ストアに触れる前に検証する）
/// - 目録コードの指定がなければ自動採番する
/// - 指定された目録コードが使用済みなら`DuplicateCatalogueCode`
/// - 追加時は所蔵数 = 貸出可能数
pub async fn add_item(deps: &ServiceDependencies, new_item: NewItem) -> Result<Item> {
    new_item.validate()?;
    let requested = new_item
        .catalogue_code
        .as_deref()
        .map(CatalogueCode::parse)
        .transpose()?;

    let store = deps.store.as_ref();
    let new_item = &new_item;
    let requested = requested.as_ref();
    let item = deps
        .retry
        .run("add_item", move || {
            try_add_item(store, new_item.clone(), requested.cloned())
        })
        .await?;

    tracing::info!(
        item_id = %item.item_id.value(),
        catalogue_code = %item.catalogue_code,
        total_copies = item.total_copies,
        "item added to catalogue"
    );
    Ok(item)
}

async fn try_add_item(
    store: &dyn LibraryStore,
    new_item: NewItem,
    requested: Option<CatalogueCode>,
) -> Result<Item> {
    let mut tx = store.begin().await?;

    let code = match requested {
        Some(code) => {
            if tx.catalogue_code_taken(&code).await? {
                return Err(LibraryError::Conflict(
                    ConflictReason::DuplicateCatalogueCode,
                ));
            }
            code
        }
        None => unused_catalogue_code(tx.as_mut()).await?,
    };

    let (item, event) = domain::item::add_item(new_item, code, Utc::now())?;

    tx.insert_item(&item).await?;
    tx.append_event(&event.into()).await?;
    tx.commit().await?;

    Ok(item)
}

async fn unused_catalogue_code(tx: &mut dyn Transaction) -> Result<CatalogueCode> {
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = CatalogueCode::generate();
        if !tx.catalogue_code_taken(&code).await? {
            return Ok(code);
        }
        tracing::debug!(catalogue_code = %code, "generated catalogue code collided");
    }
    Err(LibraryError::Conflict(
        ConflictReason::DuplicateCatalogueCode,
    ))
}

/// 書誌情報を更新する
///
/// 冊数は変更しない。
pub async fn update_item(
    deps: &ServiceDependencies,
    item_id: ItemId,
    details: ItemDetails,
) -> Result<Item> {
    details.validate()?;

    let store = deps.store.as_ref();
    let details = &details;
    let item = deps
        .retry
        .run("update_item", move || {
            try_update_item(store, item_id, details.clone())
        })
        .await?;

    tracing::info!(item_id = %item_id.value(), "item details updated");
    Ok(item)
}

async fn try_update_item(
    store: &dyn LibraryStore,
    item_id: ItemId,
    details: ItemDetails,
) -> Result<Item> {
    let mut tx = store.begin().await?;

    let item = tx
        .item_for_update(item_id)
        .await?
        .ok_or(LibraryError::NotFound(EntityKind::Item))?;
    let (updated, event) = domain::item::update_details(&item, details, Utc::now())?;

    tx.update_item(&updated).await?;
    tx.append_event(&event.into()).await?;
    tx.commit().await?;

    Ok(updated)
}

/// 蔵書を目録から削除する
///
/// 未返却（Active, Overdue）の貸出が1件でもあれば`OutstandingLoans`。
/// 蔵書の行ロックを取ってから数えるので、同時の貸出と競合しない。
pub async fn remove_item(deps: &ServiceDependencies, item_id: ItemId) -> Result<()> {
    let store = deps.store.as_ref();
    deps.retry
        .run("remove_item", move || try_remove_item(store, item_id))
        .await?;

    tracing::info!(item_id = %item_id.value(), "item removed from catalogue");
    Ok(())
}

async fn try_remove_item(store: &dyn LibraryStore, item_id: ItemId) -> Result<()> {
    let mut tx = store.begin().await?;

    let item = tx
        .item_for_update(item_id)
        .await?
        .ok_or(LibraryError::NotFound(EntityKind::Item))?;

    let outstanding = tx.count_outstanding_loans(item_id).await?;
    if outstanding > 0 {
        return Err(LibraryError::Conflict(ConflictReason::OutstandingLoans {
            count: outstanding,
        }));
    }

    tx.delete_item(item_id).await?;
    tx.append_event(
        &ItemRemoved {
            item_id,
            catalogue_code: item.catalogue_code,
            removed_at: Utc::now(),
        }
        .into(),
    )
    .await?;
    tx.commit().await?;

    Ok(())
}

/// 貸出可能数を増減する（唯一の変更経路）
///
/// 蔵書の行ロックを取り、`0..=total_copies`に収まる場合のみ書き込む。
/// 収まらない場合は何も書かずに`Conflict`を返す。
/// 呼び出し側のトランザクションがコミットされるまで結果は誰にも見えない。
pub(crate) async fn adjust_availability(
    tx: &mut dyn Transaction,
    item_id: ItemId,
    delta: i32,
    adjusted_at: DateTime<Utc>,
) -> Result<Item> {
    let item = tx
        .item_for_update(item_id)
        .await?
        .ok_or(LibraryError::NotFound(EntityKind::Item))?;

    let adjusted = domain::item::adjust_availability(&item, delta, adjusted_at)?;
    tx.update_item(&adjusted).await?;

    tracing::debug!(
        item_id = %item_id.value(),
        delta,
        available_copies = adjusted.available_copies,
        total_copies = adjusted.total_copies,
        "availability adjusted"
    );
    Ok(adjusted)
}

/// IDで蔵書を取得する
pub async fn get_item(deps: &ServiceDependencies, item_id: ItemId) -> Result<Item> {
    let store = deps.store.as_ref();
    deps.retry
        .run("get_item", move || async move {
            Ok(store.get_item(item_id).await?)
        })
        .await?
        .ok_or(LibraryError::NotFound(EntityKind::Item))
}

/// 蔵書一覧を取得する
pub async fn list_items(deps: &ServiceDependencies, filter: &ItemFilter) -> Result<Vec<Item>> {
    let store = deps.store.as_ref();
    deps.retry
        .run("list_items", move || async move {
            Ok(store.list_items(filter).await?)
        })
        .await
}
