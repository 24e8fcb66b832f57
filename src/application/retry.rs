use std::future::Future;
use std::time::Duration;

use super::errors::{LibraryError, Result};

/// 一時的障害の再試行ポリシー
///
/// 指数バックオフ（上限付き）で`max_attempts`回まで試す。
/// `timeout`を指定した場合、再試行を含む全体がその時間内に終わらなければ中断する。
/// 中断時、未コミットのトランザクションは破棄されるので部分的な変更は残らない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
            timeout: None,
        }
    }
}

impl RetryPolicy {
    /// 再試行しないポリシー
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self
        }
    }

    /// n回目（1始まり）の失敗後に待つ時間
    pub fn backoff_for(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    /// 操作を再試行ポリシーに従って実行する
    ///
    /// `attempt`は呼ばれるたびに新しい作業単位を開始すること。
    pub async fn run<T, F, Fut>(&self, operation: &'static str, attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run_attempts(operation, attempt))
                .await
                .map_err(|_| {
                    tracing::warn!(operation, ?limit, "operation timed out");
                    LibraryError::TimedOut(limit)
                })?,
            None => self.run_attempts(operation, attempt).await,
        }
    }

    async fn run_attempts<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempts = 0;
        loop {
            attempts += 1;
            match attempt().await {
                Err(err) if err.is_retryable() => {
                    let LibraryError::Store(source) = err else {
                        return Err(err);
                    };
                    if attempts >= max_attempts {
                        tracing::error!(operation, attempts, error = %source, "giving up after transient failures");
                        return Err(LibraryError::RetriesExhausted { attempts, source });
                    }
                    let delay = self.backoff_for(attempts);
                    tracing::warn!(operation, attempts, ?delay, error = %source, "transient failure, retrying");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::ConflictReason;
    use crate::ports::StoreError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            timeout: None,
        }
    }

    #[test]
    fn test_backoff_grows_exponentially_with_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(300),
            timeout: None,
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(50));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(300));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(3)
            .run("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StoreError::transient("flaky").into())
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_surfaces_retries_exhausted() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy(2)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::transient("down").into())
            })
            .await;

        assert!(matches!(
            result,
            Err(LibraryError::RetriesExhausted { attempts: 2, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_never_retries_conflicts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy(5)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LibraryError::Conflict(ConflictReason::ItemUnavailable))
            })
            .await;

        assert!(matches!(
            result,
            Err(LibraryError::Conflict(ConflictReason::ItemUnavailable))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_aborts_attempt() {
        let policy = fast_policy(1).with_timeout(Duration::from_millis(20));
        let result: Result<()> = policy
            .run("test", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(LibraryError::TimedOut(_))));
    }
}
