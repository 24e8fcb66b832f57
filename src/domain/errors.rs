use serde::Serialize;
use thiserror::Error;

/// 入力値の違反1件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

/// 入力バリデーションのエラー
///
/// 違反したフィールドをすべて列挙する。呼び出し側はそのまま表示してよい。
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{}", describe(.violations))]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            violations: vec![FieldViolation {
                field,
                message: message.into(),
            }],
        }
    }
}

fn describe(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// 違反を集めて最後にまとめて返すためのビルダー
#[derive(Debug, Default)]
pub struct Violations(Vec<FieldViolation>);

impl Violations {
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldViolation {
            field,
            message: message.into(),
        });
    }

    /// 空白のみの値を必須違反として記録する
    pub fn require(&mut self, field: &'static str, value: &str) {
        if value.trim().is_empty() {
            self.push(field, format!("{} is required", humanize(field)));
        }
    }

    /// 絶対URLとして解釈できない値を記録する（未指定は許可）
    pub fn optional_url(&mut self, field: &'static str, value: Option<&str>) {
        if let Some(raw) = value {
            if url::Url::parse(raw.trim()).is_err() {
                self.push(field, "Please enter a valid URL");
            }
        }
    }

    pub fn merge(&mut self, other: ValidationError) {
        self.0.extend(other.violations);
    }

    pub fn finish(self) -> Result<(), ValidationError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { violations: self.0 })
        }
    }
}

fn humanize(field: &str) -> String {
    let spaced = field.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// 在庫数調整のエラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityError {
    /// 貸出可能数が0を下回る
    NoCopiesAvailable,
    /// 貸出可能数が所蔵数を上回る
    ExceedsTotalCopies,
}

/// 返却のエラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnLoanError {
    /// 既に返却済み
    AlreadyReturned,
    /// 返却日が貸出日より前
    ReturnedBeforeIssue,
}

/// 延滞遷移のエラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOverdueError {
    /// Active以外の状態（延滞済み・返却済み）
    NotActive,
    /// 返却期限がまだ来ていない
    NotYetDue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violations_collects_all_fields() {
        let mut v = Violations::default();
        v.require("title", "");
        v.require("author", "  ");
        v.require("publisher", "Allen & Unwin");
        let err = v.finish().unwrap_err();

        assert_eq!(err.violations.len(), 2);
        assert_eq!(err.violations[0].message, "Title is required");
        assert_eq!(err.violations[1].field, "author");
    }

    #[test]
    fn test_violations_optional_url() {
        let mut v = Violations::default();
        v.optional_url("cover_url", None);
        v.optional_url("cover_url", Some("https://covers.example.org/hobbit.jpg"));
        assert!(v.finish().is_ok());

        let mut v = Violations::default();
        v.optional_url("cover_url", Some("not a url"));
        assert!(v.finish().is_err());
    }

    #[test]
    fn test_validation_error_display_lists_fields() {
        let err = ValidationError {
            violations: vec![
                FieldViolation {
                    field: "name",
                    message: "Name is required".into(),
                },
                FieldViolation {
                    field: "email",
                    message: "Invalid email format".into(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "name: Name is required; email: Invalid email format"
        );
    }
}
