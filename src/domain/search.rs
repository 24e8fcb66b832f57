//! 横断検索の照合ルール。
//!
//! 大文字小文字を区別しない部分一致のみ。順位付けは行わない。

use serde::Serialize;
use uuid::Uuid;

use super::{Borrower, Item, Loan};

/// 検索語の最小文字数（前後の空白を除く）
pub const MIN_QUERY_LEN: usize = 2;

/// 検索結果の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HitKind {
    Item,
    Borrower,
    Loan,
}

/// 検索結果1件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub kind: HitKind,
    pub id: Uuid,
    pub title: String,
    pub subtitle: String,
    pub image_url: Option<String>,
}

/// 正規化済みの検索語
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Needle(String);

impl Needle {
    /// 検索語を正規化する。短すぎる場合は`None`。
    pub fn parse(query: &str) -> Option<Self> {
        let trimmed = query.trim();
        if trimmed.chars().count() < MIN_QUERY_LEN {
            return None;
        }
        Some(Self(trimmed.to_lowercase()))
    }

    pub fn matches(&self, haystack: &str) -> bool {
        haystack.to_lowercase().contains(&self.0)
    }

    fn matches_any<'a>(&self, mut fields: impl Iterator<Item = &'a str>) -> bool {
        fields.any(|field| self.matches(field))
    }
}

/// 蔵書の照合：書名・著者・目録コード・ISBN
pub fn match_item(item: &Item, needle: &Needle) -> Option<SearchHit> {
    let fields = [
        item.details.title.as_str(),
        item.details.author.as_str(),
        item.catalogue_code.as_str(),
        item.details.isbn.as_str(),
    ];
    if !needle.matches_any(fields.into_iter()) {
        return None;
    }

    Some(SearchHit {
        kind: HitKind::Item,
        id: item.item_id.value(),
        title: item.details.title.clone(),
        subtitle: format!("by {}", item.details.author),
        image_url: item.details.cover_url.clone(),
    })
}

/// 利用者の照合：氏名・メール・区分固有の識別情報
pub fn match_borrower(borrower: &Borrower, needle: &Needle) -> Option<SearchHit> {
    let common = [borrower.name.as_str(), borrower.email.as_str()];
    let fields = common.into_iter().chain(borrower.role.identifiers());
    if !needle.matches_any(fields) {
        return None;
    }

    Some(SearchHit {
        kind: HitKind::Borrower,
        id: borrower.borrower_id.value(),
        title: borrower.name.clone(),
        subtitle: borrower.role.kind().label().to_string(),
        image_url: borrower.image_url.clone(),
    })
}

/// 貸出の照合：目録コード・利用者名・ステータス
///
/// 参照先の蔵書・利用者が削除済みの場合は代替表示を使う。
pub fn match_loan(
    loan: &Loan,
    item: Option<&Item>,
    borrower_name: Option<&str>,
    needle: &Needle,
) -> Option<SearchHit> {
    let core = loan.core();
    let status = loan.status();
    let fields = [
        Some(core.catalogue_code.as_str()),
        borrower_name,
        Some(status.as_str()),
    ];
    if !needle.matches_any(fields.into_iter().flatten()) {
        return None;
    }

    Some(SearchHit {
        kind: HitKind::Loan,
        id: core.loan_id.value(),
        title: item
            .map(|i| i.details.title.clone())
            .unwrap_or_else(|| "Unknown Item".to_string()),
        subtitle: format!(
            "Issued to {} - {}",
            borrower_name.unwrap_or("Unknown Borrower"),
            status
        ),
        image_url: item.and_then(|i| i.details.cover_url.clone()),
    })
}
