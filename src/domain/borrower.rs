use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BorrowerId, BorrowerRegistered, EmailAddress, ValidationError, Violations};

/// 利用者区分ごとの固有情報
///
/// 区分タグと固有フィールドを1つの列挙型で表す（クラス階層ではない）。
/// 登録後に区分は変更できない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum BorrowerRole {
    /// 学生（一般利用者）
    Student {
        roll_number: String,
        degree: String,
        stream: String,
    },
    /// 教員
    Teacher {
        staff_code: String,
        department: String,
    },
    /// 図書館職員
    Librarian { staff_id: String },
}

impl BorrowerRole {
    pub fn kind(&self) -> RoleKind {
        match self {
            BorrowerRole::Student { .. } => RoleKind::Student,
            BorrowerRole::Teacher { .. } => RoleKind::Teacher,
            BorrowerRole::Librarian { .. } => RoleKind::Librarian,
        }
    }

    /// 区分固有の識別情報（検索対象）
    pub fn identifiers(&self) -> Vec<&str> {
        match self {
            BorrowerRole::Student {
                roll_number,
                degree,
                stream,
            } => vec![roll_number.as_str(), degree.as_str(), stream.as_str()],
            BorrowerRole::Teacher {
                staff_code,
                department,
            } => vec![staff_code.as_str(), department.as_str()],
            BorrowerRole::Librarian { staff_id } => vec![staff_id.as_str()],
        }
    }

    fn validate(&self, violations: &mut Violations) {
        match self {
            BorrowerRole::Student {
                roll_number,
                degree,
                stream,
            } => {
                violations.require("roll_number", roll_number);
                violations.require("degree", degree);
                violations.require("stream", stream);
            }
            BorrowerRole::Teacher {
                staff_code,
                department,
            } => {
                violations.require("staff_code", staff_code);
                violations.require("department", department);
            }
            BorrowerRole::Librarian { staff_id } => {
                violations.require("staff_id", staff_id);
            }
        }
    }

    fn normalized(self) -> Self {
        match self {
            BorrowerRole::Student {
                roll_number,
                degree,
                stream,
            } => BorrowerRole::Student {
                roll_number: roll_number.trim().to_string(),
                degree: degree.trim().to_string(),
                stream: stream.trim().to_string(),
            },
            BorrowerRole::Teacher {
                staff_code,
                department,
            } => BorrowerRole::Teacher {
                staff_code: staff_code.trim().to_string(),
                department: department.trim().to_string(),
            },
            BorrowerRole::Librarian { staff_id } => BorrowerRole::Librarian {
                staff_id: staff_id.trim().to_string(),
            },
        }
    }
}

/// 利用者区分（タグのみ）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    Student,
    Teacher,
    Librarian,
}

impl RoleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::Student => "student",
            RoleKind::Teacher => "teacher",
            RoleKind::Librarian => "librarian",
        }
    }

    /// 表示用ラベル
    pub fn label(&self) -> &'static str {
        match self {
            RoleKind::Student => "Student",
            RoleKind::Teacher => "Teacher",
            RoleKind::Librarian => "Librarian",
        }
    }
}

impl std::str::FromStr for RoleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(RoleKind::Student),
            "teacher" => Ok(RoleKind::Teacher),
            "librarian" => Ok(RoleKind::Librarian),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// 利用者の登録内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBorrower {
    pub name: String,
    pub email: String,
    pub image_url: Option<String>,
    #[serde(flatten)]
    pub role: BorrowerRole,
}

/// Borrower集約 - 貸出を受けられる利用者
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Borrower {
    pub borrower_id: BorrowerId,
    pub name: String,
    pub email: EmailAddress,
    pub image_url: Option<String>,
    #[serde(flatten)]
    pub role: BorrowerRole,
    pub created_at: DateTime<Utc>,
}

/// 純粋関数：利用者を登録する
///
/// ビジネスルール：
/// - 氏名は必須
/// - メールアドレスは形式チェックを通ること
/// - 区分ごとの必須項目がすべて埋まっていること
///
/// 違反はまとめて返す。副作用なし。
pub fn register_borrower(
    new_borrower: NewBorrower,
    registered_at: DateTime<Utc>,
) -> Result<(Borrower, BorrowerRegistered), ValidationError> {
    let mut violations = Violations::default();
    violations.require("name", &new_borrower.name);
    let email = match EmailAddress::parse(&new_borrower.email) {
        Ok(email) => Some(email),
        Err(err) => {
            violations.merge(err);
            None
        }
    };
    new_borrower.role.validate(&mut violations);
    violations.optional_url("image_url", new_borrower.image_url.as_deref());
    violations.finish()?;

    let Some(email) = email else {
        return Err(ValidationError::single("email", "Invalid email format"));
    };

    let borrower = Borrower {
        borrower_id: BorrowerId::new(),
        name: new_borrower.name.trim().to_string(),
        email,
        image_url: new_borrower
            .image_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty()),
        role: new_borrower.role.normalized(),
        created_at: registered_at,
    };

    let event = BorrowerRegistered {
        borrower_id: borrower.borrower_id,
        role: borrower.role.kind(),
        registered_at,
    };

    Ok((borrower, event))
}
