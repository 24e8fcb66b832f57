mod blob_store;
mod store;

pub use blob_store::{MemoryBlobStore, StoredBlob};
pub use store::MemoryStore;
