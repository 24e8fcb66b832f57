use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::ports::blob_store::{BlobStore, UploadError};

/// 保存された画像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// BlobStoreのインメモリ実装
///
/// `memory://blobs/{uuid}`形式のURLを返す。
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, StoredBlob>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// テスト用：URLから保存内容を取り出す
    pub fn get(&self, url: &str) -> Option<StoredBlob> {
        self.blobs.lock().ok()?.get(url).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, bytes: Vec<u8>, content_type: &str) -> Result<String, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }

        let url = format!("memory://blobs/{}", Uuid::new_v4());
        let blob = StoredBlob {
            content_type: content_type.to_string(),
            bytes,
        };
        self.blobs
            .lock()
            .map_err(|_| UploadError::Transport("blob store lock poisoned".into()))?
            .insert(url.clone(), blob);

        Ok(url)
    }
}
