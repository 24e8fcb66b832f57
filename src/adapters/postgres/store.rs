use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row};

use crate::domain::{
    Borrower, BorrowerId, CatalogueCode, DomainEvent, Item, ItemId, Loan, LoanId,
};
use crate::ports::store::{
    BorrowerFilter, ItemFilter, LibrarySnapshot, LibraryStore, LoanFilter, Result, StoreError,
    Transaction,
};

use super::rows::{
    BORROWER_COLUMNS, ITEM_COLUMNS, LOAN_COLUMNS, copies_to_db, map_row_to_borrower,
    map_row_to_item, map_row_to_loan,
};

/// LibraryStoreのPostgreSQL実装
///
/// 書き込みはすべて`begin`で開始したトランザクション内で行い、
/// 行ロックは`SELECT ... FOR UPDATE`で取得する。
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// PostgreSQLコネクションプールから新しいPostgresStoreを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LibraryStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE item_id = $1"
        ))
        .bind(item_id.value())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_row_to_item).transpose()
    }

    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<Item>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM items
            WHERE ($1::text IS NULL OR category = $1)
              AND (NOT $2 OR available_copies > 0)
            ORDER BY created_at ASC
            "#
        ))
        .bind(filter.category.as_deref())
        .bind(filter.available_only)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row_to_item).collect()
    }

    async fn get_borrower(&self, borrower_id: BorrowerId) -> Result<Option<Borrower>> {
        let row = sqlx::query(&format!(
            "SELECT {BORROWER_COLUMNS} FROM borrowers WHERE borrower_id = $1"
        ))
        .bind(borrower_id.value())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_row_to_borrower).transpose()
    }

    async fn list_borrowers(&self, filter: &BorrowerFilter) -> Result<Vec<Borrower>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {BORROWER_COLUMNS}
            FROM borrowers
            WHERE ($1::text IS NULL OR role_kind = $1)
            ORDER BY created_at ASC
            "#
        ))
        .bind(filter.role.map(|role| role.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row_to_borrower).collect()
    }

    async fn get_loan(&self, loan_id: LoanId) -> Result<Option<Loan>> {
        let row = sqlx::query(&format!(
            "SELECT {LOAN_COLUMNS} FROM loans WHERE loan_id = $1"
        ))
        .bind(loan_id.value())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_row_to_loan).transpose()
    }

    async fn list_loans(&self, filter: &LoanFilter) -> Result<Vec<Loan>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {LOAN_COLUMNS}
            FROM loans
            WHERE ($1::uuid IS NULL OR item_id = $1)
              AND ($2::uuid IS NULL OR borrower_id = $2)
              AND ($3::text IS NULL OR status = $3)
            ORDER BY issued_at DESC
            "#
        ))
        .bind(filter.item_id.map(|id| id.value()))
        .bind(filter.borrower_id.map(|id| id.value()))
        .bind(filter.status.map(|status| status.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row_to_loan).collect()
    }

    /// 延滞候補を検索
    ///
    /// (due_date) WHERE status = 'active' の部分インデックスを使う。
    async fn overdue_candidates(&self, now: DateTime<Utc>) -> Result<Vec<LoanId>> {
        let ids: Vec<uuid::Uuid> = sqlx::query_scalar(
            r#"
            SELECT loan_id
            FROM loans
            WHERE status = 'active' AND due_date < $1
            ORDER BY due_date ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(LoanId::from_uuid).collect())
    }

    /// REPEATABLE READ の読み取り専用トランザクションで全件を読む
    ///
    /// 行ロックは取らないので、貸出・返却を待たせない。
    async fn snapshot(&self) -> Result<LibrarySnapshot> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let items = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items ORDER BY created_at ASC"
        ))
        .fetch_all(&mut *tx)
        .await?;
        let borrowers = sqlx::query(&format!(
            "SELECT {BORROWER_COLUMNS} FROM borrowers ORDER BY created_at ASC"
        ))
        .fetch_all(&mut *tx)
        .await?;
        let loans = sqlx::query(&format!(
            "SELECT {LOAN_COLUMNS} FROM loans ORDER BY issued_at ASC"
        ))
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(LibrarySnapshot {
            items: items.iter().map(map_row_to_item).collect::<Result<_>>()?,
            borrowers: borrowers
                .iter()
                .map(map_row_to_borrower)
                .collect::<Result<_>>()?,
            loans: loans.iter().map(map_row_to_loan).collect::<Result<_>>()?,
        })
    }

    async fn recent_events(&self, limit: usize) -> Result<Vec<DomainEvent>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r#"
            SELECT event_data
            FROM events
            ORDER BY sequence_number DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let Json(event): Json<DomainEvent> = row.try_get("event_data")?;
                Ok(event)
            })
            .collect()
    }
}

/// PostgreSQLの作業単位
///
/// `sqlx::Transaction`はdrop時にロールバックされる。
struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn item_for_update(&mut self, item_id: ItemId) -> Result<Option<Item>> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE item_id = $1 FOR UPDATE"
        ))
        .bind(item_id.value())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(map_row_to_item).transpose()
    }

    async fn insert_item(&mut self, item: &Item) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO items (
                item_id, catalogue_code, title, author, isbn, category, publication_year,
                publisher, cover_url, description, total_copies, available_copies,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(item.item_id.value())
        .bind(item.catalogue_code.as_str())
        .bind(&item.details.title)
        .bind(&item.details.author)
        .bind(&item.details.isbn)
        .bind(&item.details.category)
        .bind(item.details.publication_year)
        .bind(&item.details.publisher)
        .bind(item.details.cover_url.as_deref())
        .bind(item.details.description.as_deref())
        .bind(copies_to_db(item.total_copies)?)
        .bind(copies_to_db(item.available_copies)?)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update_item(&mut self, item: &Item) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE items SET
                title = $2,
                author = $3,
                isbn = $4,
                category = $5,
                publication_year = $6,
                publisher = $7,
                cover_url = $8,
                description = $9,
                total_copies = $10,
                available_copies = $11,
                updated_at = $12
            WHERE item_id = $1
            "#,
        )
        .bind(item.item_id.value())
        .bind(&item.details.title)
        .bind(&item.details.author)
        .bind(&item.details.isbn)
        .bind(&item.details.category)
        .bind(item.details.publication_year)
        .bind(&item.details.publisher)
        .bind(item.details.cover_url.as_deref())
        .bind(item.details.description.as_deref())
        .bind(copies_to_db(item.total_copies)?)
        .bind(copies_to_db(item.available_copies)?)
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::fatal(format!(
                "item {} does not exist",
                item.item_id.value()
            )));
        }
        Ok(())
    }

    async fn delete_item(&mut self, item_id: ItemId) -> Result<()> {
        sqlx::query("DELETE FROM items WHERE item_id = $1")
            .bind(item_id.value())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn catalogue_code_taken(&mut self, code: &CatalogueCode) -> Result<bool> {
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM items WHERE catalogue_code = $1)")
                .bind(code.as_str())
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(taken)
    }

    async fn count_outstanding_loans(&mut self, item_id: ItemId) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM loans
            WHERE item_id = $1 AND status IN ('active', 'overdue')
            "#,
        )
        .bind(item_id.value())
        .fetch_one(&mut *self.tx)
        .await?;

        u32::try_from(count).map_err(StoreError::fatal)
    }

    async fn borrower(&mut self, borrower_id: BorrowerId) -> Result<Option<Borrower>> {
        let row = sqlx::query(&format!(
            "SELECT {BORROWER_COLUMNS} FROM borrowers WHERE borrower_id = $1"
        ))
        .bind(borrower_id.value())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(map_row_to_borrower).transpose()
    }

    async fn insert_borrower(&mut self, borrower: &Borrower) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO borrowers (
                borrower_id, name, email, image_url, role_kind, role, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(borrower.borrower_id.value())
        .bind(&borrower.name)
        .bind(borrower.email.as_str())
        .bind(borrower.image_url.as_deref())
        .bind(borrower.role.kind().as_str())
        .bind(Json(&borrower.role))
        .bind(borrower.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn delete_borrower(&mut self, borrower_id: BorrowerId) -> Result<()> {
        sqlx::query("DELETE FROM borrowers WHERE borrower_id = $1")
            .bind(borrower_id.value())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn loan_for_update(&mut self, loan_id: LoanId) -> Result<Option<Loan>> {
        let row = sqlx::query(&format!(
            "SELECT {LOAN_COLUMNS} FROM loans WHERE loan_id = $1 FOR UPDATE"
        ))
        .bind(loan_id.value())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(map_row_to_loan).transpose()
    }

    async fn insert_loan(&mut self, loan: &Loan) -> Result<()> {
        let core = loan.core();
        sqlx::query(
            r#"
            INSERT INTO loans (
                loan_id, item_id, catalogue_code, borrower_id, status, issued_at, due_date,
                returned_at, remarks, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(core.loan_id.value())
        .bind(core.item_id.value())
        .bind(core.catalogue_code.as_str())
        .bind(core.borrower_id.value())
        .bind(loan.status().as_str())
        .bind(core.issued_at)
        .bind(core.due_date)
        .bind(loan.returned_at())
        .bind(core.remarks.as_deref())
        .bind(core.created_at)
        .bind(core.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update_loan(&mut self, loan: &Loan) -> Result<()> {
        let core = loan.core();
        let result = sqlx::query(
            r#"
            UPDATE loans SET
                status = $2,
                returned_at = $3,
                remarks = $4,
                updated_at = $5
            WHERE loan_id = $1
            "#,
        )
        .bind(core.loan_id.value())
        .bind(loan.status().as_str())
        .bind(loan.returned_at())
        .bind(core.remarks.as_deref())
        .bind(core.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::fatal(format!(
                "loan {} does not exist",
                core.loan_id.value()
            )));
        }
        Ok(())
    }

    async fn append_event(&mut self, event: &DomainEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO events (event_type, event_data, occurred_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(event.event_type())
        .bind(Json(event))
        .bind(event.occurred_at())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
