use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::{
    Borrower, BorrowerId, CatalogueCode, DomainEvent, Item, ItemId, Loan, LoanId,
};
use crate::ports::store::{
    BorrowerFilter, ItemFilter, LibrarySnapshot, LibraryStore, LoanFilter, Result, StoreError,
    Transaction,
};

/// 行ロックのキー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LockKey {
    Item(ItemId),
    Loan(LoanId),
}

/// コミット済みの状態
#[derive(Debug, Default)]
struct State {
    items: HashMap<ItemId, Item>,
    borrowers: HashMap<BorrowerId, Borrower>,
    loans: HashMap<LoanId, Loan>,
    events: Vec<DomainEvent>,
}

#[derive(Debug, Default)]
struct Inner {
    state: RwLock<State>,
    row_locks: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
    failing_begins: AtomicU32,
    failing_commits: AtomicU32,
}

fn poisoned() -> StoreError {
    StoreError::fatal("memory store lock poisoned")
}

/// 残り回数があれば1減らしてtrueを返す
fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// LibraryStoreのインメモリ実装
///
/// テストとローカル実行用。行ロックは`tokio::sync::Mutex`で表現し、
/// 変更はトランザクション内に溜めてコミット時にまとめて反映する。
/// 読み取り専用のメソッドは行ロックを待たない。
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// テスト用：次のn回の`begin`を一時的障害で失敗させる
    pub fn fail_next_begins(&self, n: u32) {
        self.inner.failing_begins.store(n, Ordering::SeqCst);
    }

    /// テスト用：次のn回の`commit`を一時的障害で失敗させる
    pub fn fail_next_commits(&self, n: u32) {
        self.inner.failing_commits.store(n, Ordering::SeqCst);
    }

    /// テスト用：蔵書の行ロックを外から保持する
    ///
    /// 返されたガードをdropするまで、その蔵書の貸出・返却は待たされる。
    pub async fn hold_item_lock(&self, item_id: ItemId) -> Result<OwnedMutexGuard<()>> {
        let mutex = row_lock(&self.inner, LockKey::Item(item_id))?;
        Ok(mutex.lock_owned().await)
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, State>> {
        self.inner.state.read().map_err(|_| poisoned())
    }
}

fn row_lock(inner: &Inner, key: LockKey) -> Result<Arc<AsyncMutex<()>>> {
    let mut locks = inner.row_locks.lock().map_err(|_| poisoned())?;
    Ok(Arc::clone(locks.entry(key).or_default()))
}

#[async_trait]
impl LibraryStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        if take_failure(&self.inner.failing_begins) {
            return Err(StoreError::transient("injected begin failure"));
        }
        Ok(Box::new(MemoryTransaction::new(Arc::clone(&self.inner))))
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>> {
        Ok(self.read_state()?.items.get(&item_id).cloned())
    }

    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<Item>> {
        let mut items: Vec<Item> = self
            .read_state()?
            .items
            .values()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(items)
    }

    async fn get_borrower(&self, borrower_id: BorrowerId) -> Result<Option<Borrower>> {
        Ok(self.read_state()?.borrowers.get(&borrower_id).cloned())
    }

    async fn list_borrowers(&self, filter: &BorrowerFilter) -> Result<Vec<Borrower>> {
        let mut borrowers: Vec<Borrower> = self
            .read_state()?
            .borrowers
            .values()
            .filter(|borrower| filter.matches(borrower))
            .cloned()
            .collect();
        borrowers.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(borrowers)
    }

    async fn get_loan(&self, loan_id: LoanId) -> Result<Option<Loan>> {
        Ok(self.read_state()?.loans.get(&loan_id).cloned())
    }

    async fn list_loans(&self, filter: &LoanFilter) -> Result<Vec<Loan>> {
        let mut loans: Vec<Loan> = self
            .read_state()?
            .loans
            .values()
            .filter(|loan| filter.matches(loan))
            .cloned()
            .collect();
        loans.sort_by(|a, b| b.core().issued_at.cmp(&a.core().issued_at));
        Ok(loans)
    }

    async fn overdue_candidates(&self, now: DateTime<Utc>) -> Result<Vec<LoanId>> {
        let state = self.read_state()?;
        let mut candidates: Vec<(DateTime<Utc>, LoanId)> = state
            .loans
            .values()
            .filter_map(|loan| match loan {
                Loan::Active(active) if active.due_date < now => {
                    Some((active.due_date, active.loan_id))
                }
                _ => None,
            })
            .collect();
        candidates.sort_by_key(|(due_date, _)| *due_date);
        Ok(candidates.into_iter().map(|(_, loan_id)| loan_id).collect())
    }

    async fn snapshot(&self) -> Result<LibrarySnapshot> {
        let mut snapshot = {
            let state = self.read_state()?;
            LibrarySnapshot {
                items: state.items.values().cloned().collect(),
                borrowers: state.borrowers.values().cloned().collect(),
                loans: state.loans.values().cloned().collect(),
            }
        };
        snapshot.items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        snapshot
            .borrowers
            .sort_by(|a, b| a.created_at.cmp(&b.created_at));
        snapshot
            .loans
            .sort_by(|a, b| a.core().issued_at.cmp(&b.core().issued_at));
        Ok(snapshot)
    }

    async fn recent_events(&self, limit: usize) -> Result<Vec<DomainEvent>> {
        Ok(self
            .read_state()?
            .events
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

/// インメモリの作業単位
///
/// 取得した行ロックはdropまで保持する。未コミットの変更は`pending_*`にのみ存在し、
/// 他のトランザクションからは見えない。
struct MemoryTransaction {
    inner: Arc<Inner>,
    held: HashSet<LockKey>,
    guards: Vec<OwnedMutexGuard<()>>,
    // None は削除
    pending_items: HashMap<ItemId, Option<Item>>,
    pending_borrowers: HashMap<BorrowerId, Option<Borrower>>,
    pending_loans: HashMap<LoanId, Loan>,
    pending_events: Vec<DomainEvent>,
}

impl MemoryTransaction {
    fn new(inner: Arc<Inner>) -> Self {
        Self {
            inner,
            held: HashSet::new(),
            guards: Vec::new(),
            pending_items: HashMap::new(),
            pending_borrowers: HashMap::new(),
            pending_loans: HashMap::new(),
            pending_events: Vec::new(),
        }
    }

    async fn lock(&mut self, key: LockKey) -> Result<()> {
        if self.held.contains(&key) {
            return Ok(());
        }
        let mutex = row_lock(&self.inner, key)?;
        let guard = mutex.lock_owned().await;
        self.held.insert(key);
        self.guards.push(guard);
        Ok(())
    }

    fn state(&self) -> Result<std::sync::RwLockReadGuard<'_, State>> {
        self.inner.state.read().map_err(|_| poisoned())
    }

    fn current_item(&self, item_id: ItemId) -> Result<Option<Item>> {
        match self.pending_items.get(&item_id) {
            Some(pending) => Ok(pending.clone()),
            None => Ok(self.state()?.items.get(&item_id).cloned()),
        }
    }

    fn current_borrower(&self, borrower_id: BorrowerId) -> Result<Option<Borrower>> {
        match self.pending_borrowers.get(&borrower_id) {
            Some(pending) => Ok(pending.clone()),
            None => Ok(self.state()?.borrowers.get(&borrower_id).cloned()),
        }
    }

    fn current_loan(&self, loan_id: LoanId) -> Result<Option<Loan>> {
        match self.pending_loans.get(&loan_id) {
            Some(pending) => Ok(Some(pending.clone())),
            None => Ok(self.state()?.loans.get(&loan_id).cloned()),
        }
    }

    fn code_in_use(&self, code: &CatalogueCode) -> Result<bool> {
        let state = self.state()?;
        let committed = state.items.values().filter(|item| {
            !self.pending_items.contains_key(&item.item_id)
        });
        let pending = self.pending_items.values().flatten();
        Ok(committed
            .chain(pending)
            .any(|item| &item.catalogue_code == code))
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn item_for_update(&mut self, item_id: ItemId) -> Result<Option<Item>> {
        self.lock(LockKey::Item(item_id)).await?;
        self.current_item(item_id)
    }

    async fn insert_item(&mut self, item: &Item) -> Result<()> {
        if self.current_item(item.item_id)?.is_some() {
            return Err(StoreError::fatal(format!("item {} already exists", item.item_id.value())));
        }
        if self.code_in_use(&item.catalogue_code)? {
            return Err(StoreError::Duplicate(item.catalogue_code.to_string()));
        }
        self.pending_items.insert(item.item_id, Some(item.clone()));
        Ok(())
    }

    async fn update_item(&mut self, item: &Item) -> Result<()> {
        if self.current_item(item.item_id)?.is_none() {
            return Err(StoreError::fatal(format!("item {} does not exist", item.item_id.value())));
        }
        self.pending_items.insert(item.item_id, Some(item.clone()));
        Ok(())
    }

    async fn delete_item(&mut self, item_id: ItemId) -> Result<()> {
        self.pending_items.insert(item_id, None);
        Ok(())
    }

    async fn catalogue_code_taken(&mut self, code: &CatalogueCode) -> Result<bool> {
        self.code_in_use(code)
    }

    async fn count_outstanding_loans(&mut self, item_id: ItemId) -> Result<u32> {
        let state = self.state()?;
        let committed = state
            .loans
            .values()
            .filter(|loan| !self.pending_loans.contains_key(&loan.loan_id()));
        let count = committed
            .chain(self.pending_loans.values())
            .filter(|loan| loan.item_id() == item_id && loan.is_outstanding())
            .count();
        u32::try_from(count).map_err(StoreError::fatal)
    }

    async fn borrower(&mut self, borrower_id: BorrowerId) -> Result<Option<Borrower>> {
        self.current_borrower(borrower_id)
    }

    async fn insert_borrower(&mut self, borrower: &Borrower) -> Result<()> {
        if self.current_borrower(borrower.borrower_id)?.is_some() {
            return Err(StoreError::fatal(format!(
                "borrower {} already exists",
                borrower.borrower_id.value()
            )));
        }
        self.pending_borrowers
            .insert(borrower.borrower_id, Some(borrower.clone()));
        Ok(())
    }

    async fn delete_borrower(&mut self, borrower_id: BorrowerId) -> Result<()> {
        self.pending_borrowers.insert(borrower_id, None);
        Ok(())
    }

    async fn loan_for_update(&mut self, loan_id: LoanId) -> Result<Option<Loan>> {
        self.lock(LockKey::Loan(loan_id)).await?;
        self.current_loan(loan_id)
    }

    async fn insert_loan(&mut self, loan: &Loan) -> Result<()> {
        if self.current_loan(loan.loan_id())?.is_some() {
            return Err(StoreError::fatal(format!("loan {} already exists", loan.loan_id().value())));
        }
        self.pending_loans.insert(loan.loan_id(), loan.clone());
        Ok(())
    }

    async fn update_loan(&mut self, loan: &Loan) -> Result<()> {
        if self.current_loan(loan.loan_id())?.is_none() {
            return Err(StoreError::fatal(format!("loan {} does not exist", loan.loan_id().value())));
        }
        self.pending_loans.insert(loan.loan_id(), loan.clone());
        Ok(())
    }

    async fn append_event(&mut self, event: &DomainEvent) -> Result<()> {
        self.pending_events.push(event.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if take_failure(&self.inner.failing_commits) {
            return Err(StoreError::transient("injected commit failure"));
        }

        let MemoryTransaction {
            inner,
            guards,
            pending_items,
            pending_borrowers,
            pending_loans,
            pending_events,
            ..
        } = *self;

        {
            let mut state = inner.state.write().map_err(|_| poisoned())?;

            // 同時に追加された蔵書同士の目録コード重複はここで検出する
            for item in pending_items.values().flatten() {
                let taken = state.items.values().any(|existing| {
                    existing.item_id != item.item_id
                        && existing.catalogue_code == item.catalogue_code
                        && !matches!(pending_items.get(&existing.item_id), Some(None))
                });
                if taken {
                    return Err(StoreError::Duplicate(item.catalogue_code.to_string()));
                }
            }

            for (item_id, item) in pending_items {
                match item {
                    Some(item) => state.items.insert(item_id, item),
                    None => state.items.remove(&item_id),
                };
            }
            for (borrower_id, borrower) in pending_borrowers {
                match borrower {
                    Some(borrower) => state.borrowers.insert(borrower_id, borrower),
                    None => state.borrowers.remove(&borrower_id),
                };
            }
            state.loans.extend(pending_loans);
            state.events.extend(pending_events);
        }

        drop(guards);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::item::{NewItem, add_item, tests::hobbit_details};

    fn hobbit(code: &str) -> Item {
        let new_item = NewItem {
            details: hobbit_details(),
            total_copies: 2,
            catalogue_code: None,
        };
        let code = CatalogueCode::parse(code).unwrap();
        add_item(new_item, code, Utc::now()).unwrap().0
    }

    #[tokio::test]
    async fn test_uncommitted_changes_are_invisible_and_discarded() {
        let store = MemoryStore::new();
        let item = hobbit("BK-AA-0001");

        let mut tx = store.begin().await.unwrap();
        tx.insert_item(&item).await.unwrap();
        assert!(store.get_item(item.item_id).await.unwrap().is_none());
        drop(tx);

        assert!(store.get_item(item.item_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_applies_pending_changes() {
        let store = MemoryStore::new();
        let item = hobbit("BK-AA-0001");

        let mut tx = store.begin().await.unwrap();
        tx.insert_item(&item).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.get_item(item.item_id).await.unwrap(), Some(item));
    }

    #[tokio::test]
    async fn test_injected_commit_failure_discards_changes() {
        let store = MemoryStore::new();
        let item = hobbit("BK-AA-0001");
        store.fail_next_commits(1);

        let mut tx = store.begin().await.unwrap();
        tx.insert_item(&item).await.unwrap();
        let err = tx.commit().await.unwrap_err();

        assert!(err.is_transient());
        assert!(store.get_item(item.item_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_catalogue_code_rejected_on_insert() {
        let store = MemoryStore::new();
        let first = hobbit("BK-AA-0001");
        let second = hobbit("BK-AA-0001");

        let mut tx = store.begin().await.unwrap();
        tx.insert_item(&first).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.catalogue_code_taken(&second.catalogue_code).await.unwrap());
        let err = tx.insert_item(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_item_lock_released_on_drop() {
        let store = MemoryStore::new();
        let item = hobbit("BK-AA-0001");
        let mut tx = store.begin().await.unwrap();
        tx.insert_item(&item).await.unwrap();
        tx.commit().await.unwrap();

        let mut first = store.begin().await.unwrap();
        first.item_for_update(item.item_id).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            second.item_for_update(item.item_id),
        )
        .await;
        assert!(blocked.is_err());

        drop(first);
        let reread = second.item_for_update(item.item_id).await.unwrap();
        assert_eq!(reread, Some(item));
    }
}
