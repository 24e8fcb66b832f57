pub mod circulation;
pub mod directory;
mod errors;
pub mod inventory;
pub mod overdue;
mod retry;
pub mod search;
pub mod stats;
pub mod uploads;

use std::sync::Arc;
use std::time::Duration;

use crate::ports::LibraryStore;

pub use errors::{ConflictReason, EntityKind, ErrorKind, LibraryError, Result};
pub use retry::RetryPolicy;

/// サービスの依存関係
///
/// 関数型DDDの原則に従い、データ構造として定義。
/// 各ユースケースは純粋な関数で、依存関係を引数として受け取る。
#[derive(Clone)]
pub struct ServiceDependencies {
    pub store: Arc<dyn LibraryStore>,
    pub retry: RetryPolicy,
}

impl ServiceDependencies {
    pub fn new(store: Arc<dyn LibraryStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(self, retry: RetryPolicy) -> Self {
        Self { retry, ..self }
    }

    /// 呼び出し単位のタイムアウトを設定した依存関係を返す
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            store: Arc::clone(&self.store),
            retry: self.retry.with_timeout(timeout),
        }
    }
}
