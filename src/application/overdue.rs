//! 延滞検出（OverdueScanner）

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::domain::{self, DomainEvent, Loan, LoanId};
use crate::ports::LibraryStore;

use super::ServiceDependencies;
use super::errors::Result;

/// 同時に処理する候補の数
const SWEEP_CONCURRENCY: usize = 8;

/// 延滞検出の結果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// 候補として調べた貸出の数
    pub examined: usize,
    /// Overdueに遷移させた数
    pub marked_overdue: usize,
    /// 処理中にエラーになった数（次回の検出で再度候補になる）
    pub failed: usize,
}

enum Outcome {
    Marked,
    Skipped,
}

/// 返却期限を過ぎたActiveの貸出をOverdueにする
///
/// 候補の取得はロックなしの読み取りなので、書き込み前に貸出の行ロックを取って
/// 状態を読み直す。その間に返却された貸出には触れない。
/// 在庫数は変更しない。何度実行しても結果は同じ。
pub async fn sweep_overdue(deps: &ServiceDependencies, now: DateTime<Utc>) -> Result<SweepReport> {
    let store = deps.store.as_ref();
    let candidates = deps
        .retry
        .run("overdue_candidates", move || async move {
            Ok(store.overdue_candidates(now).await?)
        })
        .await?;

    let mut report = SweepReport {
        examined: candidates.len(),
        ..SweepReport::default()
    };

    let mut outcomes = stream::iter(candidates)
        .map(|loan_id| async move {
            let outcome = deps
                .retry
                .run("mark_overdue", move || try_mark_overdue(store, loan_id, now))
                .await;
            (loan_id, outcome)
        })
        .buffer_unordered(SWEEP_CONCURRENCY);

    while let Some((loan_id, outcome)) = outcomes.next().await {
        match outcome {
            Ok(Outcome::Marked) => report.marked_overdue += 1,
            Ok(Outcome::Skipped) => {}
            Err(err) => {
                tracing::error!(loan_id = %loan_id.value(), error = %err, "failed to mark loan overdue");
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        examined = report.examined,
        marked_overdue = report.marked_overdue,
        failed = report.failed,
        "overdue sweep finished"
    );
    Ok(report)
}

async fn try_mark_overdue(
    store: &dyn LibraryStore,
    loan_id: LoanId,
    now: DateTime<Utc>,
) -> Result<Outcome> {
    let mut tx = store.begin().await?;

    let Some(loan) = tx.loan_for_update(loan_id).await? else {
        return Ok(Outcome::Skipped);
    };

    // ロック取得までに返却・延滞処理が済んでいれば何もしない
    if !domain::is_overdue(&loan, now) {
        tracing::debug!(loan_id = %loan_id.value(), status = %loan.status(), "candidate no longer overdue");
        return Ok(Outcome::Skipped);
    }

    let (overdue, event) = domain::mark_overdue(loan, now)?;
    tx.update_loan(&Loan::Overdue(overdue)).await?;
    tx.append_event(&DomainEvent::LoanBecameOverdue(event)).await?;
    tx.commit().await?;

    tracing::info!(loan_id = %loan_id.value(), "loan marked overdue");
    Ok(Outcome::Marked)
}
