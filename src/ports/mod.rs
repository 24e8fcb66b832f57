pub mod blob_store;
pub mod store;

pub use blob_store::*;
pub use store::*;
