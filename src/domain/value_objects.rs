use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{ValidationError, Violations};

/// 蔵書ID - 目録管理の集約ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

/// 利用者ID - 利用者名簿の集約ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BorrowerId(Uuid);

impl BorrowerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for BorrowerId {
    fn default() -> Self {
        Self::new()
    }
}

/// 貸出ID - 貸出管理の集約ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoanId(Uuid);

impl LoanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for LoanId {
    fn default() -> Self {
        Self::new()
    }
}

const CODE_LETTERS: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// 目録コード（例: `BK-QX-0427`）
///
/// 利用者が手で読み上げられる短い識別子。指定がない場合は自動採番する。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogueCode(String);

impl CatalogueCode {
    /// ランダムな目録コードを生成する
    ///
    /// 乱数源にはUUID v4のランダムビットを使う。一意性は保証しないため、
    /// 呼び出し側で重複確認を行うこと。
    pub fn generate() -> Self {
        let bytes = Uuid::new_v4().into_bytes();
        let first = CODE_LETTERS[usize::from(bytes[0]) % CODE_LETTERS.len()] as char;
        let second = CODE_LETTERS[usize::from(bytes[1]) % CODE_LETTERS.len()] as char;
        let number = u16::from_be_bytes([bytes[2], bytes[3]]) % 10_000;
        Self(format!("BK-{first}{second}-{number:04}"))
    }

    /// 利用者指定のコードを受け付ける
    ///
    /// 前後の空白は除去する。空文字は不可。
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        let mut violations = Violations::default();
        violations.require("catalogue_code", trimmed);
        violations.finish()?;
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CatalogueCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\S+@\S+\.\S+$").expect("email pattern is a valid regex")
});

/// メールアドレス
///
/// 形式チェック済みの値のみ生成できる。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        let mut violations = Violations::default();
        if trimmed.is_empty() {
            violations.push("email", "Email is required");
        } else if !EMAIL_PATTERN.is_match(trimmed) {
            violations.push("email", "Invalid email format");
        }
        violations.finish()?;
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 貸出期間
///
/// 不変条件：返却期限は貸出日より後。
/// 型でこの制約を保証し、期限が逆転した貸出を作れないようにする。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanPeriod {
    issued_at: DateTime<Utc>,
    due_date: DateTime<Utc>,
}

impl LoanPeriod {
    pub fn new(issued_at: DateTime<Utc>, due_date: DateTime<Utc>) -> Result<Self, ValidationError> {
        if due_date <= issued_at {
            return Err(ValidationError::single(
                "due_date",
                "Return date must be after issue date",
            ));
        }
        Ok(Self {
            issued_at,
            due_date,
        })
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn due_date(&self) -> DateTime<Utc> {
        self.due_date
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_item_id_creation() {
        let id1 = ItemId::new();
        let id2 = ItemId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_loan_id_from_uuid() {
        let uuid = Uuid::new_v4();
        let id = LoanId::from_uuid(uuid);
        assert_eq!(id.value(), uuid);
    }

    #[test]
    fn test_borrower_id_creation() {
        assert_ne!(BorrowerId::new(), BorrowerId::new());
    }

    // TDD: CatalogueCode のテスト
    #[test]
    fn test_catalogue_code_generate_format() {
        for _ in 0..50 {
            let code = CatalogueCode::generate();
            let s = code.as_str();
            assert_eq!(s.len(), 10);
            assert!(s.starts_with("BK-"));
            assert!(s[3..5].chars().all(|c| c.is_ascii_uppercase()));
            assert_eq!(&s[5..6], "-");
            assert!(s[6..].chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_catalogue_code_parse_trims() {
        let code = CatalogueCode::parse("  BK-AA-0001 ").unwrap();
        assert_eq!(code.as_str(), "BK-AA-0001");
    }

    #[test]
    fn test_catalogue_code_parse_rejects_blank() {
        let err = CatalogueCode::parse("   ").unwrap_err();
        assert_eq!(err.violations[0].field, "catalogue_code");
    }

    // TDD: EmailAddress のテスト
    #[test]
    fn test_email_address_accepts_valid() {
        let email = EmailAddress::parse("bilbo@shire.me").unwrap();
        assert_eq!(email.as_str(), "bilbo@shire.me");
    }

    #[test]
    fn test_email_address_rejects_invalid() {
        let err = EmailAddress::parse("bilbo-at-shire").unwrap_err();
        assert_eq!(err.violations[0].message, "Invalid email format");

        let err = EmailAddress::parse("").unwrap_err();
        assert_eq!(err.violations[0].message, "Email is required");
    }

    // TDD: LoanPeriod のテスト
    #[test]
    fn test_loan_period_requires_due_after_issue() {
        let now = Utc::now();
        assert!(LoanPeriod::new(now, now + Duration::days(14)).is_ok());
        assert!(LoanPeriod::new(now, now).is_err());
        assert!(LoanPeriod::new(now, now - Duration::days(1)).is_err());
    }
}
