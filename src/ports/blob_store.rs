use async_trait::async_trait;
use thiserror::Error;

/// 画像アップロードのエラー
#[derive(Debug, Error)]
pub enum UploadError {
    /// 空のデータ
    #[error("upload is empty")]
    Empty,

    /// 受け付けないコンテンツ種別
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// 転送先の障害
    #[error("blob transport failed")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// 表紙画像・利用者画像の保存先ポート
///
/// アップロード処理が`add_item`/`register_borrower`の前に呼び出し、
/// 得られたURLを登録内容に含める。中核ロジックからは呼ばない。
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// バイト列を保存し、参照用URLを返す
    async fn upload(&self, bytes: Vec<u8>, content_type: &str) -> Result<String, UploadError>;
}
