//! PostgreSQLの行データとドメイン型の変換

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Row, postgres::PgRow};

use crate::domain::{
    ActiveLoan, Borrower, BorrowerId, BorrowerRole, CatalogueCode, EmailAddress, Item,
    ItemDetails, ItemId, Loan, LoanCore, LoanId, LoanStatus, OverdueLoan, ReturnedLoan,
};
use crate::ports::store::{Result, StoreError};

pub(super) const ITEM_COLUMNS: &str = r#"
    item_id, catalogue_code, title, author, isbn, category, publication_year,
    publisher, cover_url, description, total_copies, available_copies,
    created_at, updated_at
"#;

pub(super) const BORROWER_COLUMNS: &str = r#"
    borrower_id, name, email, image_url, role, created_at
"#;

pub(super) const LOAN_COLUMNS: &str = r#"
    loan_id, item_id, catalogue_code, borrower_id, status, issued_at, due_date,
    returned_at, remarks, created_at, updated_at
"#;

fn invalid_data(message: String) -> StoreError {
    StoreError::fatal(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message,
    ))
}

/// 冊数をPostgreSQLのINTEGERに変換する
pub(super) fn copies_to_db(copies: u32) -> Result<i32> {
    i32::try_from(copies).map_err(|_| invalid_data(format!("copy count out of range: {copies}")))
}

fn copies_from_db(copies: i32) -> Result<u32> {
    u32::try_from(copies).map_err(|_| invalid_data(format!("negative copy count: {copies}")))
}

/// 行をItemに変換する
///
/// 目録コードは保存時に検証済みだが、読み出し時も値オブジェクトを通す。
pub(super) fn map_row_to_item(row: &PgRow) -> Result<Item> {
    let code: String = row.try_get("catalogue_code")?;
    let catalogue_code =
        CatalogueCode::parse(&code).map_err(|e| invalid_data(e.to_string()))?;

    Ok(Item {
        item_id: ItemId::from_uuid(row.try_get("item_id")?),
        catalogue_code,
        details: ItemDetails {
            title: row.try_get("title")?,
            author: row.try_get("author")?,
            isbn: row.try_get("isbn")?,
            category: row.try_get("category")?,
            publication_year: row.try_get("publication_year")?,
            publisher: row.try_get("publisher")?,
            cover_url: row.try_get("cover_url")?,
            description: row.try_get("description")?,
        },
        total_copies: copies_from_db(row.try_get("total_copies")?)?,
        available_copies: copies_from_db(row.try_get("available_copies")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(super) fn map_row_to_borrower(row: &PgRow) -> Result<Borrower> {
    let email: String = row.try_get("email")?;
    let email = EmailAddress::parse(&email).map_err(|e| invalid_data(e.to_string()))?;
    let Json(role): Json<BorrowerRole> = row.try_get("role")?;

    Ok(Borrower {
        borrower_id: BorrowerId::from_uuid(row.try_get("borrower_id")?),
        name: row.try_get("name")?,
        email,
        image_url: row.try_get("image_url")?,
        role,
        created_at: row.try_get("created_at")?,
    })
}

/// 行をLoanに変換する
///
/// statusの文字列から型付きの状態に戻す。returnedなのにreturned_atが
/// 空の行はデータ不整合として扱う。
pub(super) fn map_row_to_loan(row: &PgRow) -> Result<Loan> {
    let status_str: String = row.try_get("status")?;
    let status = LoanStatus::from_str(&status_str).map_err(invalid_data)?;

    let core = LoanCore {
        loan_id: LoanId::from_uuid(row.try_get("loan_id")?),
        item_id: ItemId::from_uuid(row.try_get("item_id")?),
        catalogue_code: {
            let code: String = row.try_get("catalogue_code")?;
            CatalogueCode::parse(&code).map_err(|e| invalid_data(e.to_string()))?
        },
        borrower_id: BorrowerId::from_uuid(row.try_get("borrower_id")?),
        issued_at: row.try_get("issued_at")?,
        due_date: row.try_get("due_date")?,
        remarks: row.try_get("remarks")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    };

    Ok(match status {
        LoanStatus::Active => Loan::Active(ActiveLoan { core }),
        LoanStatus::Overdue => Loan::Overdue(OverdueLoan { core }),
        LoanStatus::Returned => {
            let returned_at = row.try_get::<Option<DateTime<Utc>>, _>("returned_at")?.ok_or_else(|| {
                invalid_data(format!(
                    "returned loan {} has no returned_at",
                    core.loan_id.value()
                ))
            })?;
            Loan::Returned(ReturnedLoan { core, returned_at })
        }
    })
}
