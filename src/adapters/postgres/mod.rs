mod rows;
mod store;

pub use store::PostgresStore;

use crate::ports::store::StoreError;

/// 直列化失敗・デッドロック検出
const TRANSIENT_SQLSTATES: &[&str] = &["40001", "40P01"];
/// 一意制約違反
const UNIQUE_VIOLATION: &str = "23505";

fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| TRANSIENT_SQLSTATES.contains(&code.as_ref())),
        _ => false,
    }
}

/// 一意制約違反なら制約名を返す
fn violated_unique_constraint(err: &sqlx::Error) -> Option<String> {
    let db_err = err.as_database_error()?;
    if db_err.code().as_deref() != Some(UNIQUE_VIOLATION) {
        return None;
    }
    Some(db_err.constraint().unwrap_or("unique").to_string())
}

/// sqlxのエラーを再試行可否で分類する
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if is_transient(&err) {
            StoreError::transient(err)
        } else if let Some(constraint) = violated_unique_constraint(&err) {
            StoreError::Duplicate(constraint)
        } else {
            StoreError::fatal(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_failures_are_transient() {
        assert!(StoreError::from(sqlx::Error::PoolTimedOut).is_transient());
        assert!(StoreError::from(sqlx::Error::PoolClosed).is_transient());
        assert!(
            StoreError::from(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset by peer",
            )))
            .is_transient()
        );
    }

    #[test]
    fn test_missing_row_is_fatal() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Fatal(_)));
    }
}
