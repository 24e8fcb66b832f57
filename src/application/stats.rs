//! 蔵書・利用者・貸出の集計
//!
//! ダッシュボード表示用。1つのスナップショットから計算する。

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{DomainEvent, Loan, RoleKind};
use crate::ports::LibrarySnapshot;

use super::ServiceDependencies;
use super::errors::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LibraryStats {
    pub total_titles: usize,
    pub total_copies: u64,
    pub available_copies: u64,
    pub students: usize,
    pub teachers: usize,
    pub librarians: usize,
    /// 貸出中（Active）
    pub issued_loans: usize,
    pub overdue_loans: usize,
    /// 分類ごとのタイトル数
    pub categories: BTreeMap<String, usize>,
}

impl LibraryStats {
    /// 純粋関数：スナップショットから集計する
    pub fn from_snapshot(snapshot: &LibrarySnapshot) -> Self {
        let mut stats = Self {
            total_titles: snapshot.items.len(),
            ..Self::default()
        };

        for item in &snapshot.items {
            stats.total_copies += u64::from(item.total_copies);
            stats.available_copies += u64::from(item.available_copies);
            *stats
                .categories
                .entry(item.details.category.clone())
                .or_default() += 1;
        }

        for borrower in &snapshot.borrowers {
            match borrower.role.kind() {
                RoleKind::Student => stats.students += 1,
                RoleKind::Teacher => stats.teachers += 1,
                RoleKind::Librarian => stats.librarians += 1,
            }
        }

        for loan in &snapshot.loans {
            match loan {
                Loan::Active(_) => stats.issued_loans += 1,
                Loan::Overdue(_) => stats.overdue_loans += 1,
                Loan::Returned(_) => {}
            }
        }

        stats
    }
}

pub async fn library_stats(deps: &ServiceDependencies) -> Result<LibraryStats> {
    let store = deps.store.as_ref();
    let snapshot = deps
        .retry
        .run("library_stats", move || async move {
            Ok(store.snapshot().await?)
        })
        .await?;
    Ok(LibraryStats::from_snapshot(&snapshot))
}

/// 最近の操作履歴（新しい順）
pub async fn recent_activity(deps: &ServiceDependencies, limit: usize) -> Result<Vec<DomainEvent>> {
    let store = deps.store.as_ref();
    deps.retry
        .run("recent_activity", move || async move {
            Ok(store.recent_events(limit).await?)
        })
        .await
}
