use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    AvailabilityError, CatalogueCode, ItemAdded, ItemId, ItemUpdated, ValidationError, Violations,
};

/// 蔵書の書誌情報（編集可能な部分）
///
/// 所蔵数・貸出可能数は含まない。冊数は貸出・返却でのみ変化する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: String,
    pub publication_year: i32,
    pub publisher: String,
    pub cover_url: Option<String>,
    pub description: Option<String>,
}

impl ItemDetails {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Violations::default();
        violations.require("title", &self.title);
        violations.require("author", &self.author);
        violations.require("isbn", &self.isbn);
        violations.require("category", &self.category);
        violations.require("publisher", &self.publisher);
        if !(1..=9999).contains(&self.publication_year) {
            violations.push("publication_year", "Publication year is out of range");
        }
        violations.optional_url("cover_url", self.cover_url.as_deref());
        violations.finish()
    }

    fn normalized(self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            author: self.author.trim().to_string(),
            isbn: self.isbn.trim().to_string(),
            category: self.category.trim().to_string(),
            publisher: self.publisher.trim().to_string(),
            cover_url: self.cover_url.map(|url| url.trim().to_string()),
            description: self
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            ..self
        }
    }
}

/// 1タイトルあたりの所蔵数の上限（PostgreSQLのINTEGERに収まる範囲）
pub const MAX_COPIES: u32 = i32::MAX as u32;

/// 蔵書の新規登録内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    #[serde(flatten)]
    pub details: ItemDetails,
    pub total_copies: u32,
    /// 未指定の場合は自動採番する
    pub catalogue_code: Option<String>,
}

impl NewItem {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Violations::default();
        if let Err(err) = self.details.validate() {
            violations.merge(err);
        }
        if self.total_copies < 1 {
            violations.push("total_copies", "At least 1 copy is required");
        } else if self.total_copies > MAX_COPIES {
            violations.push("total_copies", "Too many copies");
        }
        if let Some(code) = &self.catalogue_code {
            violations.require("catalogue_code", code);
        }
        violations.finish()
    }
}

/// Item集約 - 目録上の1タイトルとその冊数
///
/// 不変条件：`0 <= available_copies <= total_copies`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub item_id: ItemId,
    pub catalogue_code: CatalogueCode,
    #[serde(flatten)]
    pub details: ItemDetails,
    pub total_copies: u32,
    pub available_copies: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// 貸出中（未返却）の冊数
    pub fn copies_on_loan(&self) -> u32 {
        self.total_copies - self.available_copies
    }
}

/// 純粋関数：蔵書を目録に追加する
///
/// ビジネスルール：
/// - 必須項目（書名・著者・ISBN・分類・出版社）が空でないこと
/// - 所蔵数は1冊以上
/// - 追加時点では全冊貸出可能
///
/// 副作用なし。新しいItemとイベントを返す。
pub fn add_item(
    new_item: NewItem,
    catalogue_code: CatalogueCode,
    added_at: DateTime<Utc>,
) -> Result<(Item, ItemAdded), ValidationError> {
    new_item.validate()?;

    let item = Item {
        item_id: ItemId::new(),
        catalogue_code,
        details: new_item.details.normalized(),
        total_copies: new_item.total_copies,
        available_copies: new_item.total_copies,
        created_at: added_at,
        updated_at: added_at,
    };

    let event = ItemAdded {
        item_id: item.item_id,
        catalogue_code: item.catalogue_code.clone(),
        title: item.details.title.clone(),
        total_copies: item.total_copies,
        added_at,
    };

    Ok((item, event))
}

/// 純粋関数：書誌情報を更新する
///
/// 冊数は変更しない。
pub fn update_details(
    item: &Item,
    details: ItemDetails,
    updated_at: DateTime<Utc>,
) -> Result<(Item, ItemUpdated), ValidationError> {
    details.validate()?;

    let updated = Item {
        details: details.normalized(),
        updated_at,
        ..item.clone()
    };

    let event = ItemUpdated {
        item_id: item.item_id,
        updated_at,
    };

    Ok((updated, event))
}

/// 純粋関数：貸出可能数を増減する
///
/// 結果が `0..=total_copies` に収まらない場合は変更せずエラーを返す。
pub fn adjust_availability(
    item: &Item,
    delta: i32,
    adjusted_at: DateTime<Utc>,
) -> Result<Item, AvailabilityError> {
    let next = i64::from(item.available_copies) + i64::from(delta);
    if next < 0 {
        return Err(AvailabilityError::NoCopiesAvailable);
    }
    if next > i64::from(item.total_copies) {
        return Err(AvailabilityError::ExceedsTotalCopies);
    }

    Ok(Item {
        available_copies: next as u32,
        updated_at: adjusted_at,
        ..item.clone()
    })
}
