//! 横断検索（SearchIndex）

use std::collections::HashMap;

use crate::domain::search::{Needle, SearchHit, match_borrower, match_item, match_loan};
use crate::domain::{BorrowerId, ItemId};
use crate::ports::LibrarySnapshot;

use super::ServiceDependencies;
use super::errors::Result;

/// 検索結果
///
/// 1回の検索で取得したスナップショットを保持し、照合は`iter`のたびに
/// 遅延評価で行う。何度反復しても同じ結果になる。
/// 並びは蔵書 → 利用者 → 貸出。
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    needle: Option<Needle>,
    snapshot: LibrarySnapshot,
    items_by_id: HashMap<ItemId, usize>,
    borrowers_by_id: HashMap<BorrowerId, usize>,
}

impl SearchResults {
    fn empty() -> Self {
        Self::default()
    }

    fn new(needle: Needle, snapshot: LibrarySnapshot) -> Self {
        let items_by_id = snapshot
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| (item.item_id, index))
            .collect();
        let borrowers_by_id = snapshot
            .borrowers
            .iter()
            .enumerate()
            .map(|(index, borrower)| (borrower.borrower_id, index))
            .collect();
        Self {
            needle: Some(needle),
            snapshot,
            items_by_id,
            borrowers_by_id,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = SearchHit> + '_ {
        let needle = self.needle.as_ref();
        let snapshot = &self.snapshot;

        let items = snapshot
            .items
            .iter()
            .filter_map(move |item| match_item(item, needle?));
        let borrowers = snapshot
            .borrowers
            .iter()
            .filter_map(move |borrower| match_borrower(borrower, needle?));
        let loans = snapshot.loans.iter().filter_map(move |loan| {
            let item = self
                .items_by_id
                .get(&loan.item_id())
                .map(|&index| &snapshot.items[index]);
            let borrower_name = self
                .borrowers_by_id
                .get(&loan.borrower_id())
                .map(|&index| snapshot.borrowers[index].name.as_str());
            match_loan(loan, item, borrower_name, needle?)
        });

        items.chain(borrowers).chain(loans)
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl<'a> IntoIterator for &'a SearchResults {
    type Item = SearchHit;
    type IntoIter = Box<dyn Iterator<Item = SearchHit> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// 蔵書・利用者・貸出を横断して検索する
///
/// 検索語が短すぎる場合はストアに問い合わせずに空の結果を返す。
pub async fn search(deps: &ServiceDependencies, query: &str) -> Result<SearchResults> {
    let Some(needle) = Needle::parse(query) else {
        return Ok(SearchResults::empty());
    };

    let store = deps.store.as_ref();
    let snapshot = deps
        .retry
        .run("search", move || async move { Ok(store.snapshot().await?) })
        .await?;

    tracing::debug!(
        items = snapshot.items.len(),
        borrowers = snapshot.borrowers.len(),
        loans = snapshot.loans.len(),
        "searching snapshot"
    );
    Ok(SearchResults::new(needle, snapshot))
}
