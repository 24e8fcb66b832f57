//! 表紙画像・利用者画像のアップロード
//!
//! 得られたURLを`cover_url`/`image_url`として登録内容に含める。

use crate::ports::{BlobStore, UploadError};

use super::errors::Result;

/// 受け付ける画像形式
const ACCEPTED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

pub async fn upload_image(
    blobs: &dyn BlobStore,
    bytes: Vec<u8>,
    content_type: &str,
) -> Result<String> {
    let content_type = content_type.trim().to_ascii_lowercase();
    if !ACCEPTED_IMAGE_TYPES.contains(&content_type.as_str()) {
        return Err(UploadError::UnsupportedContentType(content_type).into());
    }
    if bytes.is_empty() {
        return Err(UploadError::Empty.into());
    }

    let size = bytes.len();
    let url = blobs.upload(bytes, &content_type).await?;
    tracing::info!(%url, size, content_type = %content_type, "image uploaded");
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryBlobStore;
    use crate::application::{ErrorKind, LibraryError};

    #[tokio::test]
    async fn test_upload_returns_retrievable_url() {
        let blobs = MemoryBlobStore::new();
        let url = upload_image(&blobs, vec![0xFF, 0xD8, 0xFF], "image/JPEG")
            .await
            .unwrap();

        let stored = blobs.get(&url).unwrap();
        assert_eq!(stored.content_type, "image/jpeg");
        assert_eq!(stored.bytes, vec![0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn test_rejects_non_image_content() {
        let blobs = MemoryBlobStore::new();
        let err = upload_image(&blobs, b"%PDF".to_vec(), "application/pdf")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Upload);
        assert!(matches!(
            err,
            LibraryError::Upload(UploadError::UnsupportedContentType(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_empty_upload() {
        let blobs = MemoryBlobStore::new();
        let err = upload_image(&blobs, Vec::new(), "image/png").await.unwrap_err();
        assert!(matches!(err, LibraryError::Upload(UploadError::Empty)));
    }
}
